//! Statsd UDP sink.
//!
//! Metrics are rendered in the statsd text protocol and batched
//! newline-separated into datagrams kept under [`MAX_DATAGRAM_LEN`]. This is
//! a small hand-rolled client rather than a dependency; the protocol is two
//! format strings and a size check.

use std::io;
use std::mem;
use std::net::UdpSocket;

use tracing::warn;

use crate::stats::Counters;

/// Conservative bound for the MTU of one datagram.
pub const MAX_DATAGRAM_LEN: usize = 512;

/// Replace the characters the statsd line protocol reserves.
fn clean_metric_name(name: &str) -> String {
    name.replace([':', '|', '@'], "_")
}

/// Batching statsd client over UDP.
///
/// Dropping the client flushes any buffered metrics on a best-effort basis;
/// call [`flush`](Self::flush) to observe send errors.
#[derive(Debug)]
pub struct StatsdClient {
    socket: UdpSocket,
    prefix: String,
    packet: String,
}

impl StatsdClient {
    /// Connect to a statsd daemon. `prefix` is prepended to every metric
    /// name.
    pub fn connect(host: &str, port: u16, prefix: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect((host, port))?;
        Ok(Self {
            socket,
            prefix: clean_metric_name(prefix),
            packet: String::new(),
        })
    }

    /// Record a gauge.
    pub fn gauge(&mut self, name: &str, value: u64) -> io::Result<()> {
        self.add_metric(name, value, "g")
    }

    /// Record a timing in nanoseconds.
    ///
    /// The name is suffixed `.duration_ns` so the unit survives into the
    /// metric store.
    pub fn timing(&mut self, name: &str, ns: u64) -> io::Result<()> {
        self.add_metric(&format!("{name}.duration_ns"), ns, "ms")
    }

    /// Send whatever is buffered.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.packet.is_empty() {
            return Ok(());
        }
        let packet = mem::take(&mut self.packet);
        self.send(&packet)
    }

    // Multi-metric packets are newline separated. Append while the datagram
    // stays under the MTU bound, otherwise flush and start a new one.
    fn add_metric(&mut self, name: &str, value: u64, kind: &str) -> io::Result<()> {
        let line = if self.prefix.is_empty() {
            format!("{}:{}|{}", clean_metric_name(name), value, kind)
        } else {
            format!("{}.{}:{}|{}", self.prefix, clean_metric_name(name), value, kind)
        };

        if self.packet.len() + line.len() + 1 < MAX_DATAGRAM_LEN {
            if !self.packet.is_empty() {
                self.packet.push('\n');
            }
            self.packet.push_str(&line);
            Ok(())
        } else if !self.packet.is_empty() {
            self.flush()?;
            self.packet = line;
            Ok(())
        } else {
            // A single metric can exceed the bound; send it on its own.
            warn!(len = line.len(), "statsd metric exceeds the datagram budget");
            self.send(&line)
        }
    }

    fn send(&self, payload: &str) -> io::Result<()> {
        self.socket.send(payload.as_bytes()).map(|_| ())
    }
}

impl Drop for StatsdClient {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Submit a full set of counters.
///
/// Categorized counters come first (each key as its own gauge plus a
/// `.total` sum per category), then histograms in the same shape, then plain
/// counters, then timings. Flushes before returning.
pub fn submit_counters(client: &mut StatsdClient, counters: &Counters) -> io::Result<()> {
    for (category, entries) in counters.by_category() {
        let mut sum = 0u64;
        for (key, value) in entries {
            sum += value;
            client.gauge(&format!("{category}.{key}"), *value)?;
        }
        client.gauge(&format!("{category}.total"), sum)?;
    }

    for (histogram, buckets) in counters.histograms() {
        let mut sum = 0u64;
        for (bucket, count) in buckets {
            sum += count;
            client.gauge(&format!("{histogram}.{bucket}"), *count)?;
        }
        client.gauge(&format!("{histogram}.total"), sum)?;
    }

    for (counter, value) in counters.counters() {
        client.gauge(counter, *value)?;
    }

    for (name, samples) in counters.timings() {
        for ns in samples {
            client.timing(name, *ns)?;
        }
    }

    client.flush()
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::time::Duration;

    use super::*;

    /// A local UDP endpoint plus a client connected to it.
    fn local_pair(prefix: &str) -> (UdpSocket, StatsdClient) {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();
        let client = StatsdClient::connect("127.0.0.1", port, prefix).unwrap();
        (receiver, client)
    }

    fn recv_datagram(receiver: &UdpSocket) -> String {
        let mut buf = [0u8; 2048];
        let n = receiver.recv(&mut buf).unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn test_clean_metric_name() {
        assert_eq!(clean_metric_name("a:b|c@d"), "a_b_c_d");
        assert_eq!(clean_metric_name("plain.name"), "plain.name");
    }

    #[test]
    fn test_gauge_format_and_prefix() {
        let (receiver, mut client) = local_pair("typer.prod");
        client.gauge("errors.total", 3).unwrap();
        client.flush().unwrap();

        assert_eq!(recv_datagram(&receiver), "typer.prod.errors.total:3|g");
    }

    #[test]
    fn test_timing_suffix_and_kind() {
        let (receiver, mut client) = local_pair("");
        client.timing("slow_path", 1500).unwrap();
        client.flush().unwrap();

        assert_eq!(recv_datagram(&receiver), "slow_path.duration_ns:1500|ms");
    }

    #[test]
    fn test_metrics_batch_into_one_datagram() {
        let (receiver, mut client) = local_pair("t");
        client.gauge("a", 1).unwrap();
        client.gauge("b", 2).unwrap();
        client.flush().unwrap();

        assert_eq!(recv_datagram(&receiver), "t.a:1|g\nt.b:2|g");
    }

    #[test]
    fn test_packet_stays_under_datagram_bound() {
        let (receiver, mut client) = local_pair("");
        // Each line is 28 bytes; 20 of them cannot fit in one datagram.
        for i in 0..20 {
            client.gauge(&format!("some.long.metric.name.{i:02}"), 1).unwrap();
        }
        client.flush().unwrap();

        let first = recv_datagram(&receiver);
        let second = recv_datagram(&receiver);
        assert!(first.len() < MAX_DATAGRAM_LEN);
        assert!(second.len() < MAX_DATAGRAM_LEN);

        let mut lines: Vec<String> = first.lines().map(str::to_string).collect();
        lines.extend(second.lines().map(str::to_string));
        assert_eq!(lines.len(), 20);
        assert_eq!(lines[0], "some.long.metric.name.00:1|g");
        assert_eq!(lines[19], "some.long.metric.name.19:1|g");
    }

    #[test]
    fn test_flush_on_drop() {
        let (receiver, mut client) = local_pair("");
        client.gauge("dropped", 9).unwrap();
        drop(client);

        assert_eq!(recv_datagram(&receiver), "dropped:9|g");
    }

    #[test]
    fn test_submit_counters_walk_order() {
        let (receiver, mut client) = local_pair("");

        let mut counters = Counters::new();
        counters.category_add("error", "arity", 2);
        counters.category_add("error", "unknown_method", 5);
        counters.histogram_inc("depth", 3);
        counters.inc("files");
        counters.timing_ns("resolve", 100);

        submit_counters(&mut client, &counters).unwrap();

        let datagram = recv_datagram(&receiver);
        let lines: Vec<&str> = datagram.lines().collect();
        assert_eq!(
            lines,
            vec![
                "error.arity:2|g",
                "error.unknown_method:5|g",
                "error.total:7|g",
                "depth.3:1|g",
                "depth.total:1|g",
                "files:1|g",
                "resolve.duration_ns:100|ms",
            ]
        );
    }
}
