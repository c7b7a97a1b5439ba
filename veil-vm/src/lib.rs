//! Front-end of the Veil privacy-preserving smart-contract platform.
//!
//! Contracts are described as class declarations whose function bodies are
//! closures over an instruction emitter. The [`compiler`] lowers them to the
//! typed register IR of [`veil_asm`]; the [`ledger`] drives the whole-program
//! pipeline (link, check, inline, allocate) and validates submitted
//! transactions; the [`runtime`] executes calls through a pluggable
//! [`backend`] and resynchronizes local state.

#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod backend;
pub mod compiler;
pub mod consts;
pub mod error;
pub mod handles;
pub mod ledger;
pub mod runtime;
pub mod serialize;

// Fully re-export the sibling crates
#[doc(no_inline)]
pub use veil_asm;
#[doc(no_inline)]
pub use veil_merkle;
#[doc(no_inline)]
pub use veil_tx;
#[doc(no_inline)]
pub use veil_types;

pub mod prelude {
    //! Required implementations for full functionality.
    #[doc(no_inline)]
    pub use veil_asm::{
        AsmType, AssemblyClass, AssemblyFunction, AssemblyStorage, BinaryOp, Opcode,
    };
    #[doc(no_inline)]
    pub use veil_tx::Transaction;
    #[doc(no_inline)]
    pub use veil_types::{Address, Scalar};

    pub use crate::{
        backend::{Account, Backend, ExecutionResult, LocalBackend, ObjectState},
        compiler::{compile_contract, ContractDecl, ContractRegistry, Expr, FnEmitter, FunctionDecl},
        error::{BackendExecuteError, CompileError, TxRejected, VmError},
        handles::{CallArg, ClassHandle, HandleValue, ObjectHandle},
        ledger::{Ledger, LedgerParameters, ProofVerifier},
        runtime::Runtime,
        serialize::{SerializedFunction, SerializedInstruction},
    };
}
