//! Interface to the cryptographic back-end.
//!
//! The real back-end performs trusted setup, proof generation and
//! verification, record encryption and Merkle commitments; the front-end
//! only depends on this trait surface. [`LocalBackend`] is a proofless
//! reference processor used for development and tests.

mod local;

pub use local::LocalBackend;

use serde::{Deserialize, Serialize};
use veil_merkle::MerkleTreeError;
use veil_types::{Address, HexError, Scalar};

use crate::serialize::SerializedInstruction;

/// Back-end failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// A `REQ` condition evaluated to zero.
    #[error("requirement not satisfied")]
    RequirementFailed,
    /// A `uint` operand lies outside `[0, 2^120)`.
    #[error("value out of uint range")]
    RangeCheck,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("arithmetic underflow")]
    ArithmeticUnderflow,
    #[error("unknown object {id}")]
    UnknownObject {
        id: String,
    },
    #[error("unknown account for address {address}")]
    UnknownAccount {
        address: String,
    },
    #[error("malformed program: {0}")]
    MalformedProgram(String),
    #[error("malformed record commitment")]
    MalformedRecord,
    #[error("field location {location} out of record bounds")]
    FieldOutOfBounds {
        location: usize,
    },
    #[error("malformed hex value: {0}")]
    Hex(#[from] HexError),
    #[error(transparent)]
    Merkle(#[from] MerkleTreeError),
    #[error("expected sync index {expected}, got {actual}")]
    SyncIndexOutOfOrder {
        expected: usize,
        actual: usize,
    },
}

/// A back-end key pair with its derived address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub secret_key: Scalar,
    pub public_key: Scalar,
    pub address: Address,
}

/// A user account known to the back-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub keys: KeyPair,
    pub address: Address,
}

impl Account {
    pub fn new(keys: KeyPair) -> Self {
        let address = keys.address;
        Self { keys, address }
    }
}

/// Everything the back-end reports about one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Hex-encoded content of the return register.
    pub return_value: String,
    /// Serials of the records consumed.
    pub consumed_serials: Vec<String>,
    /// Commitments of the records created.
    pub new_records: Vec<String>,
    /// The zk proof; absent when proving is disabled.
    pub proof: Option<String>,
    /// Per-transaction nonce.
    pub unique_seed: String,
    /// The Merkle root the execution was performed against.
    pub merkle_tree_root: String,
    /// Hex-encoded time the execution observed.
    pub current_time: String,
}

/// Decrypted state of one object.
///
/// The payload is ordered by field location starting at 1; the owner
/// occupies location 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    pub contract_id: String,
    pub addr_object: String,
    pub addr_owner: String,
    pub payload: Vec<String>,
}

/// The synchronous back-end surface the runtime drives.
///
/// All values cross the boundary as lowercase, even-length, minimal hex
/// strings, matching the processor's FFI.
pub trait Backend {
    /// Generate and cache a fresh user account.
    fn new_user_account(&mut self) -> Result<Account, BackendError>;

    /// Add an externally supplied account.
    fn register_account(&mut self, account: &Account) -> Result<(), BackendError>;

    /// Look up a cached account by address.
    fn account_for_address(&self, address: &Address) -> Result<Account, BackendError>;

    /// Execute one serialized function and assemble the transaction data.
    ///
    /// `arguments` is `[sender_address, arg0, arg1, ...]`; argument `i`
    /// lands in register slot `i`. Executions observe committed state only;
    /// persistence happens through [`Backend::sync_transaction`].
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        class_id: &str,
        function_id: &str,
        instructions: &[SerializedInstruction],
        arguments: &[String],
        return_slot: u64,
        current_time: &str,
    ) -> Result<ExecutionResult, BackendError>;

    /// Decrypt the current state of an object.
    fn object_state(&self, object_id: &str) -> Result<ObjectState, BackendError>;

    /// Number of ledger transactions already applied locally.
    fn synced_transactions(&self) -> usize;

    /// Apply one accepted ledger transaction.
    ///
    /// Replaying an already-synced index is a no-op.
    fn sync_transaction(
        &mut self,
        index: usize,
        serials: &[String],
        records: &[String],
    ) -> Result<(), BackendError>;
}
