//! The transaction wire type of the Veil ledger.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use veil_types::{HexError, Scalar};

/// Stateless transaction validity failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidityError {
    /// The same serial is consumed twice by one transaction.
    #[error("serial numbers of transaction not unique")]
    DuplicateSerial,
}

/// A transaction produced by one contract-function execution.
///
/// Hex-string fields use the lowercase, even-length, minimal-width encoding
/// shared with the back-end. The proof is absent when the proof system is
/// disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Qualified name of the called class.
    pub class_name: String,
    /// Name of the called function.
    pub function_name: String,
    /// Merkle root the execution was proven against.
    pub merkle_tree_root: String,
    /// Serials of the records consumed by this transaction.
    pub consumed_serials: Vec<String>,
    /// Commitments of the records created by this transaction.
    pub new_records: Vec<String>,
    /// The zk proof, if one was produced.
    pub proof: Option<String>,
    /// Per-transaction nonce preventing replay.
    pub unique_seed: String,
    /// Ledger time the execution observed.
    pub current_time: u64,
}

impl Transaction {
    /// Wrap the fields of a back-end execution result into a transaction.
    ///
    /// `current_time` arrives hex encoded from the back-end and must fit
    /// the ledger clock.
    #[allow(clippy::too_many_arguments)]
    pub fn from_execution_result(
        class_name: &str,
        function_name: &str,
        merkle_tree_root: &str,
        consumed_serials: &[String],
        new_records: &[String],
        proof: Option<&str>,
        unique_seed: &str,
        current_time: &str,
    ) -> Result<Self, HexError> {
        let current_time = Scalar::from_hex(current_time)?
            .to_u128()
            .and_then(|time| u64::try_from(time).ok())
            .ok_or(HexError::Overflow)?;
        Ok(Self {
            class_name: class_name.to_owned(),
            function_name: function_name.to_owned(),
            merkle_tree_root: merkle_tree_root.to_owned(),
            consumed_serials: consumed_serials.to_vec(),
            new_records: new_records.to_vec(),
            proof: proof.map(str::to_owned),
            unique_seed: unique_seed.to_owned(),
            current_time,
        })
    }

    /// Check that the consumed serials are mutually distinct.
    ///
    /// This is the only validity rule that needs no ledger state; everything
    /// else is checked by the ledger on submission.
    pub fn check_serials_distinct(&self) -> Result<(), ValidityError> {
        if !self.consumed_serials.iter().all_unique() {
            return Err(ValidityError::DuplicateSerial);
        }
        Ok(())
    }

    /// Rough on-chain size of the transaction in bytes.
    ///
    /// Evaluation aid only; the ledger does not consume this. Class and
    /// function ids are counted as 32-byte words, the proof as a constant
    /// 388 bytes.
    pub fn estimated_size_bytes(&self) -> usize {
        4 + 4
            + 32
            + 32 * self.new_records.len()
            + 32 * self.consumed_serials.len()
            + 388
    }
}
