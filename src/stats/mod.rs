//! Statistics collection for the typechecker
//!
//! Counter aggregation plus a statsd sink that batches metrics into
//! fixed-size UDP datagrams. Workers record into their own [`Counters`] and
//! the results are merged and submitted once a run finishes.

mod counters;
mod statsd;

pub use counters::Counters;
pub use statsd::{StatsdClient, submit_counters, MAX_DATAGRAM_LEN};
