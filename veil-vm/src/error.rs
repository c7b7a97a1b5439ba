//! Error types of the front-end.

use veil_asm::AssemblyError;
use veil_types::HexError;

use crate::{backend::BackendError, handles::HandleError, serialize::SerializeError};

/// Failure while lowering a contract declaration to IR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("unknown contract type {name}")]
    UnknownContract {
        name: String,
    },
    #[error("contract {class} has no field {field}")]
    UnknownField {
        class: String,
        field: String,
    },
    #[error("contract {class} has no function {function}")]
    UnknownFunction {
        class: String,
        function: String,
    },
    /// Field access or call on a value that is not an object reference.
    #[error("value of type {ty} is not an object reference")]
    NotAContract {
        ty: String,
    },
    #[error("function {class}.{function} is not a constructor")]
    NotAConstructor {
        class: String,
        function: String,
    },
    #[error(transparent)]
    Type(#[from] veil_asm::TypeError),
    #[error(transparent)]
    Security(#[from] veil_asm::SecurityError),
}

/// The back-end refused or failed to execute a program.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("error while executing instructions: {0}")]
pub struct BackendExecuteError(#[from] pub BackendError);

/// Ledger-level rejection of a transaction.
///
/// A single error kind carrying a human-readable reason; no ledger state is
/// mutated when a transaction is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transaction rejected: {reason}")]
pub struct TxRejected {
    reason: String,
}

impl TxRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Any failure of the front-end.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    #[error(transparent)]
    BackendExecute(#[from] BackendExecuteError),
    /// A back-end failure outside program execution (key handling, state
    /// reads, synchronization).
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    TxRejected(#[from] TxRejected),
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[error("unknown function {class}.{function} or function not public")]
    UnknownFunction {
        class: String,
        function: String,
    },
    #[error("unknown class id {id}")]
    UnknownClassId {
        id: String,
    },
    #[error("malformed hex value: {0}")]
    Hex(#[from] HexError),
}
