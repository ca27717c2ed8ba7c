//! Wire-format rendering of CFGs
//!
//! The in-memory graph refers to interned names; the wire form resolves
//! every reference to a string so the output is self-contained. Conversion
//! is a plain visitor over the tagged operation variants, and the result
//! serializes with serde + bincode like every other persisted structure in
//! this crate.

use serde::{Deserialize, Serialize};

use crate::cfg::{self, LiteralValue, NameTable, Op};

pub use crate::cfg::Loc;

/// Errors from encoding or decoding a wire CFG.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Serialization failed.
    #[error("cfg encode error: {0}")]
    Encode(#[source] bincode::Error),
    /// Deserialization failed.
    #[error("cfg decode error: {0}")]
    Decode(#[source] bincode::Error),
}

/// A variable occurrence with its name and type resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypedVariable {
    /// Variable name.
    pub name: String,
    /// Inferred type, if inference has run.
    pub ty: Option<String>,
    /// Location of the occurrence, when one is attached.
    pub loc: Option<Loc>,
}

/// A literal value with interned strings resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// The nil/none singleton.
    Nil,
    /// A boolean literal.
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A float literal.
    Float(f64),
    /// A string literal.
    Str(String),
    /// A symbol literal.
    Sym(String),
}

/// Tagged wire form of one lowered operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Read of a local.
    Ident {
        /// Name of the local.
        name: String,
    },
    /// Alias to a global or constant.
    Alias {
        /// Fully qualified name of the aliased symbol.
        target: String,
    },
    /// Method call.
    Send {
        /// Receiver of the call.
        receiver: TypedVariable,
        /// Name of the called method.
        method: String,
        /// Positional arguments.
        args: Vec<TypedVariable>,
        /// Whether the call carries a block.
        has_block: bool,
    },
    /// Method return.
    Return {
        /// The returned value.
        value: TypedVariable,
    },
    /// Literal load.
    Literal {
        /// The literal value.
        value: Literal,
    },
    /// Code the lowering pass could not analyze.
    Unanalyzable,
    /// Load of a declared method argument.
    LoadArg {
        /// Name of the argument.
        argument: String,
    },
    /// Type cast/assertion.
    Cast {
        /// The value being cast.
        value: TypedVariable,
        /// The asserted type.
        ty: String,
    },
    /// An operation this build does not know about. Never produced here;
    /// decoders can hit it when reading output from a newer producer.
    Unknown,
}

/// Wire form of a [`cfg::Binding`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// The local being assigned.
    pub bind: TypedVariable,
    /// The operation producing the value.
    pub instruction: Instruction,
}

/// Wire form of a [`cfg::BlockExit`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockExit {
    /// The branch condition, when there is one.
    pub cond: Option<TypedVariable>,
    /// Target block when the condition holds.
    pub then_block: Option<u32>,
    /// Target block when it does not.
    pub else_block: Option<u32>,
    /// Location of the exit.
    pub loc: Loc,
}

/// Wire form of a [`cfg::BasicBlock`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block id, unique within its CFG.
    pub id: u32,
    /// The block's bindings, in execution order.
    pub bindings: Vec<Binding>,
    /// The exit closing the block.
    pub exit: BlockExit,
}

/// Wire form of a declared method argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Argument name.
    pub name: String,
    /// Declared type, if any.
    pub ty: Option<String>,
}

/// Self-contained wire form of a control-flow graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cfg {
    /// Fully qualified name of the method.
    pub method: String,
    /// Location of the method definition.
    pub loc: Loc,
    /// Declared return type, if any.
    pub returns: Option<String>,
    /// Declared arguments.
    pub args: Vec<Argument>,
    /// Basic blocks; block 0 is the entry.
    pub blocks: Vec<Block>,
}

impl Cfg {
    /// Render `cfg` with every name resolved through `names`.
    pub fn from_cfg(cfg: &cfg::Cfg, names: &NameTable) -> Self {
        Self {
            method: names.resolve(cfg.method).to_string(),
            loc: cfg.loc,
            returns: cfg.returns.map(|ty| names.resolve(ty).to_string()),
            args: cfg
                .args
                .iter()
                .map(|arg| Argument {
                    name: names.resolve(arg.name).to_string(),
                    ty: arg.ty.map(|ty| names.resolve(ty).to_string()),
                })
                .collect(),
            blocks: cfg.blocks.iter().map(|b| block_to_wire(b, names)).collect(),
        }
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        bincode::serialize(self).map_err(WireError::Encode)
    }

    /// Deserialize from bytes produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        bincode::deserialize(bytes).map_err(WireError::Decode)
    }
}

fn variable_to_wire(
    vus: &cfg::VariableUseSite,
    loc: Option<Loc>,
    names: &NameTable,
) -> TypedVariable {
    TypedVariable {
        name: names.resolve(vus.variable).to_string(),
        ty: vus.ty.map(|ty| names.resolve(ty).to_string()),
        loc,
    }
}

fn literal_to_wire(value: &LiteralValue, names: &NameTable) -> Literal {
    match value {
        LiteralValue::Nil => Literal::Nil,
        LiteralValue::Bool(b) => Literal::Bool(*b),
        LiteralValue::Int(i) => Literal::Int(*i),
        LiteralValue::Float(f) => Literal::Float(*f),
        LiteralValue::Str(s) => Literal::Str(names.resolve(*s).to_string()),
        LiteralValue::Sym(s) => Literal::Sym(names.resolve(*s).to_string()),
    }
}

fn instruction_to_wire(op: &Op, names: &NameTable) -> Instruction {
    match op {
        Op::Ident(name) => Instruction::Ident {
            name: names.resolve(*name).to_string(),
        },
        Op::Alias { target } => Instruction::Alias {
            target: names.resolve(*target).to_string(),
        },
        Op::Send {
            receiver,
            receiver_loc,
            method,
            args,
            arg_locs,
            has_block,
        } => Instruction::Send {
            receiver: variable_to_wire(receiver, Some(*receiver_loc), names),
            method: names.resolve(*method).to_string(),
            args: args
                .iter()
                .zip(arg_locs.iter())
                .map(|(arg, loc)| variable_to_wire(arg, Some(*loc), names))
                .collect(),
            has_block: *has_block,
        },
        Op::Return(value) => Instruction::Return {
            value: variable_to_wire(value, None, names),
        },
        Op::Literal(value) => Instruction::Literal {
            value: literal_to_wire(value, names),
        },
        Op::Unanalyzable => Instruction::Unanalyzable,
        Op::LoadArg { argument } => Instruction::LoadArg {
            argument: names.resolve(*argument).to_string(),
        },
        Op::Cast { value, ty } => Instruction::Cast {
            value: variable_to_wire(value, None, names),
            ty: names.resolve(*ty).to_string(),
        },
    }
}

fn block_to_wire(block: &cfg::BasicBlock, names: &NameTable) -> Block {
    Block {
        id: block.id,
        bindings: block
            .bindings
            .iter()
            .map(|binding| Binding {
                bind: variable_to_wire(&binding.bind, Some(binding.loc), names),
                instruction: instruction_to_wire(&binding.op, names),
            })
            .collect(),
        exit: BlockExit {
            cond: block
                .exit
                .cond
                .as_ref()
                .map(|cond| variable_to_wire(cond, None, names)),
            then_block: block.exit.then_block,
            else_block: block.exit.else_block,
            loc: block.exit.loc,
        },
    }
}
