//! Control-flow-graph fragment of the typechecker
//!
//! Method bodies are lowered into basic blocks of bindings, each binding
//! assigning the result of one tagged operation to a local. The in-memory
//! form refers to names through a [`NameTable`]; the [`wire`] module renders
//! a graph with every reference resolved for consumption outside the
//! process.

pub mod wire;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index of an interned name in a [`NameTable`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NameRef(u32);

/// Interner for method, variable and type names.
///
/// Stands in for the typechecker's global state when lowering and rendering
/// CFGs: a `NameRef` is only meaningful together with the table it came
/// from.
#[derive(Debug, Default)]
pub struct NameTable {
    names: Vec<String>,
    index: HashMap<String, NameRef>,
}

impl NameTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the existing reference if it is known.
    pub fn intern(&mut self, name: &str) -> NameRef {
        if let Some(&existing) = self.index.get(name) {
            return existing;
        }
        let reference = NameRef(u32::try_from(self.names.len()).expect("name table overflow"));
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), reference);
        reference
    }

    /// Resolve a reference back to its string.
    ///
    /// # Panics
    ///
    /// Panics when `reference` came from a different table.
    pub fn resolve(&self, reference: NameRef) -> &str {
        &self.names[reference.0 as usize]
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Byte range in the source file a CFG was lowered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    /// Offset of the first byte.
    pub begin: u32,
    /// Offset one past the last byte.
    pub end: u32,
}

impl Loc {
    /// Create a location from byte offsets.
    pub const fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }
}

/// A variable occurrence together with the type it had at that point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableUseSite {
    /// The local variable.
    pub variable: NameRef,
    /// Its inferred type, once inference has run.
    pub ty: Option<NameRef>,
}

impl VariableUseSite {
    /// A use site with no inferred type yet.
    pub fn untyped(variable: NameRef) -> Self {
        Self { variable, ty: None }
    }

    /// A use site carrying an inferred type.
    pub fn typed(variable: NameRef, ty: NameRef) -> Self {
        Self {
            variable,
            ty: Some(ty),
        }
    }
}

/// A literal value appearing in lowered code.
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    /// The nil/none singleton.
    Nil,
    /// A boolean literal.
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A float literal.
    Float(f64),
    /// A string literal.
    Str(NameRef),
    /// An interned symbol literal.
    Sym(NameRef),
}

/// One lowered operation, the right-hand side of a [`Binding`].
///
/// The set mirrors what the wire format can represent; lowering may grow new
/// variants, which serialize as `Unknown` until the wire format learns them.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Read of a local.
    Ident(NameRef),
    /// Alias to a global or constant.
    Alias {
        /// Fully qualified name of the aliased symbol.
        target: NameRef,
    },
    /// Method call.
    Send {
        /// Receiver of the call.
        receiver: VariableUseSite,
        /// Location of the receiver expression.
        receiver_loc: Loc,
        /// Name of the called method.
        method: NameRef,
        /// Positional arguments.
        args: Vec<VariableUseSite>,
        /// Locations of the argument expressions, parallel to `args`.
        arg_locs: Vec<Loc>,
        /// Whether the call carries a block.
        has_block: bool,
    },
    /// Method return.
    Return(VariableUseSite),
    /// Literal load.
    Literal(LiteralValue),
    /// Code the lowering pass could not analyze.
    Unanalyzable,
    /// Load of a declared method argument.
    LoadArg {
        /// Name of the argument being loaded.
        argument: NameRef,
    },
    /// Type cast/assertion.
    Cast {
        /// The value being cast.
        value: VariableUseSite,
        /// The asserted type.
        ty: NameRef,
    },
}

/// A single `bind = op` assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    /// The local being assigned.
    pub bind: VariableUseSite,
    /// Location of the assignment.
    pub loc: Loc,
    /// The operation producing the value.
    pub op: Op,
}

/// Conditional exit out of a basic block.
///
/// An unconditional jump has no condition and identical branch targets; a
/// method exit has no targets at all.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockExit {
    /// The branch condition, when there is one.
    pub cond: Option<VariableUseSite>,
    /// Target block when the condition holds.
    pub then_block: Option<u32>,
    /// Target block when it does not.
    pub else_block: Option<u32>,
    /// Location of the exit.
    pub loc: Loc,
}

/// A basic block: straight-line bindings followed by one exit.
#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    /// Block id, unique within its CFG.
    pub id: u32,
    /// The block's bindings, in execution order.
    pub bindings: Vec<Binding>,
    /// The exit closing the block.
    pub exit: BlockExit,
}

/// Declared argument of the method a CFG belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Argument {
    /// Argument name.
    pub name: NameRef,
    /// Declared type, if any.
    pub ty: Option<NameRef>,
}

/// Control-flow graph of one method body.
#[derive(Clone, Debug, PartialEq)]
pub struct Cfg {
    /// Fully qualified name of the method.
    pub method: NameRef,
    /// Location of the method definition.
    pub loc: Loc,
    /// Declared return type, if any.
    pub returns: Option<NameRef>,
    /// Declared arguments.
    pub args: Vec<Argument>,
    /// Basic blocks; block 0 is the entry.
    pub blocks: Vec<BasicBlock>,
}
