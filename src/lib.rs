pub mod ast;
pub mod ir;
pub mod backend;

use std::fmt;
use thiserror::Error;

use crate::ir::VirtualRegister;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("UnknownSymbol: '{name}' is not declared ({node})")]
    UnknownSymbol { name: String, node: NodeKind },

    #[error("MalformedLiteral: '{text}' is not a valid integer ({node})")]
    MalformedLiteral { text: String, node: NodeKind },

    #[error("internal error: branch placeholder at instruction {index} was never resolved")]
    UnresolvedBranchTarget { index: usize },

    #[error("RegisterPressureExceeded: no free register for {register} at instruction {index} ({available} available)")]
    RegisterPressureExceeded {
        register: VirtualRegister,
        index: usize,
        available: usize,
    },
}

impl CompileError {
    /// True for faults in the compiler itself rather than in its input.
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::UnresolvedBranchTarget { .. })
    }
}

/// The kind of syntax node an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    NumericExpr,
    VariableExpr,
    ElementExpr,
    ArrayDecl,
    AssignVariable,
    AssignElement,
    Increment,
    Decrement,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::NumericExpr => write!(f, "numeric expression"),
            NodeKind::VariableExpr => write!(f, "variable expression"),
            NodeKind::ElementExpr => write!(f, "array element expression"),
            NodeKind::ArrayDecl => write!(f, "array declaration"),
            NodeKind::AssignVariable => write!(f, "variable assignment"),
            NodeKind::AssignElement => write!(f, "array element assignment"),
            NodeKind::Increment => write!(f, "increment statement"),
            NodeKind::Decrement => write!(f, "decrement statement"),
        }
    }
}
