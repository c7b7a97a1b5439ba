//! The stateful validator holding the accepted history.

use std::collections::{HashMap, HashSet};

use tracing::{debug, debug_span, info};
use veil_asm::{AssemblyClass, AssemblyStorage, ClassId};
use veil_merkle::MerkleTree;
use veil_tx::Transaction;

use crate::{
    consts::{DEFAULT_INITIAL_TIME, DEFAULT_REGISTER_LIMIT},
    error::{TxRejected, VmError},
    serialize::{SerializedFunction, SerializedInstruction},
};

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerParameters {
    /// Register slots the back-end provides per function.
    pub register_limit: usize,
    /// Clock value at genesis.
    pub initial_time: u64,
}

impl Default for LedgerParameters {
    fn default() -> Self {
        Self {
            register_limit: DEFAULT_REGISTER_LIMIT,
            initial_time: DEFAULT_INITIAL_TIME,
        }
    }
}

/// Proof verification seam of the ledger.
///
/// Mirrors the back-end verifier: returns whether the proof holds; an error
/// is treated as a rejection, never as acceptance.
pub trait ProofVerifier {
    #[allow(clippy::too_many_arguments)]
    fn verify(
        &self,
        unique_seed: &str,
        merkle_tree_root: &str,
        consumed_serials: &[String],
        new_records: &[String],
        class_id: &str,
        function_id: &str,
        instructions: &[SerializedInstruction],
        current_time: &str,
        proof: Option<&str>,
    ) -> Result<bool, Box<dyn std::error::Error>>;
}

/// Content-addressed append-only ledger of record commitments.
///
/// Owns the compiled class registry, the serialized public functions, the
/// published serial and seed sets, and the Merkle commitment tree. All
/// mutation goes through [`Ledger::register_classes`] and
/// [`Ledger::verify_and_execute_transaction`]; a rejected transaction
/// mutates nothing.
pub struct Ledger {
    storage: AssemblyStorage,
    serialized: HashMap<(String, String), SerializedFunction>,
    published_serials: HashSet<String>,
    published_seeds: HashSet<String>,
    merkle: MerkleTree,
    accepted: Vec<(Vec<String>, Vec<String>)>,
    current_time: u64,
    verifier: Option<Box<dyn ProofVerifier>>,
    params: LedgerParameters,
}

impl Ledger {
    /// A ledger without proof checking.
    pub fn new(params: LedgerParameters) -> Self {
        Self {
            storage: AssemblyStorage::new(),
            serialized: HashMap::new(),
            published_serials: HashSet::new(),
            published_seeds: HashSet::new(),
            merkle: MerkleTree::new(),
            accepted: Vec::new(),
            current_time: params.initial_time,
            verifier: None,
            params,
        }
    }

    /// A ledger that checks proofs through `verifier`.
    pub fn with_verifier(params: LedgerParameters, verifier: Box<dyn ProofVerifier>) -> Self {
        let mut ledger = Self::new(params);
        ledger.verifier = Some(verifier);
        ledger
    }

    /// Compile-side registry of the ledger.
    pub fn storage(&self) -> &AssemblyStorage {
        &self.storage
    }

    /// Run the whole pipeline over `classes` and serialize their public
    /// functions.
    pub fn register_classes(&mut self, classes: Vec<AssemblyClass>) -> Result<(), VmError> {
        let names: Vec<String> = classes
            .iter()
            .map(|class| class.qualified_name().to_owned())
            .collect();

        for class in classes {
            self.storage.add_class(class).map_err(veil_asm::AssemblyError::from)?;
        }
        self.storage.link_new_classes().map_err(veil_asm::AssemblyError::from)?;
        self.storage.check_new_classes()?;
        self.storage.inline_new_classes()?;
        self.storage.insert_runtime_checks_for_new_classes()?;
        self.storage
            .allocate_new_classes(self.params.register_limit)
            .map_err(veil_asm::AssemblyError::from)?;
        self.storage.reset_new_classes();

        for name in names {
            let class = match self.storage.class_by_name(&name) {
                Some(class) => class,
                None => continue,
            };
            let class_id = match class.class_id() {
                Some(id) => id,
                None => continue,
            };
            let mut function_id = 0usize;
            let mut serialized = Vec::new();
            for function in class.functions() {
                debug!(
                    class = %name,
                    function = function.name(),
                    instructions = function.all_instructions().count(),
                    "finalized function"
                );
                if function.is_private() {
                    continue;
                }
                serialized.push((
                    function.name().to_owned(),
                    SerializedFunction::new(&self.storage, class_id, function_id, function)?,
                ));
                function_id += 1;
            }
            for (function_name, function) in serialized {
                self.serialized
                    .insert((name.clone(), function_name), function);
            }
            info!(class = %name, "registered contract class");
        }
        Ok(())
    }

    /// The class compiled under `class_id`.
    pub fn class_for_id(&self, class_id: usize) -> Option<&AssemblyClass> {
        self.storage
            .classes()
            .find(|class| class.class_id().map(ClassId::as_usize) == Some(class_id))
    }

    /// The serialized form of a public function.
    pub fn serialized_function(
        &self,
        class_name: &str,
        function_name: &str,
    ) -> Option<&SerializedFunction> {
        self.serialized
            .get(&(class_name.to_owned(), function_name.to_owned()))
    }

    /// Current Merkle root, hex encoded.
    pub fn current_root(&self) -> String {
        hex::encode(self.merkle.root())
    }

    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    /// Advance the clock; the timestamping mechanism is externally driven.
    pub fn advance_time(&mut self, amount: u64) {
        self.current_time += amount;
    }

    /// The accepted `(serials, records)` history, in submission order.
    pub fn accepted_transactions(&self) -> &[(Vec<String>, Vec<String>)] {
        &self.accepted
    }

    /// Validate `transaction` and, on success, apply it.
    ///
    /// Checks run in a fixed order and short-circuit before any mutation:
    /// serial distinctness, serial reuse, seed replay, root staleness,
    /// timestamp, function resolution, proof verification.
    pub fn verify_and_execute_transaction(
        &mut self,
        transaction: &Transaction,
    ) -> Result<(), TxRejected> {
        transaction
            .check_serials_distinct()
            .map_err(|_| TxRejected::new("serial numbers of transaction not unique"))?;

        if transaction
            .consumed_serials
            .iter()
            .any(|serial| self.published_serials.contains(serial))
        {
            return Err(TxRejected::new(
                "at least one serial number of transaction has been observed earlier",
            ));
        }

        if self.published_seeds.contains(&transaction.unique_seed) {
            return Err(TxRejected::new("unique_seed has been observed earlier"));
        }

        if transaction.merkle_tree_root != self.current_root() {
            return Err(TxRejected::new(
                "transaction root does not match current merkle tree root",
            ));
        }

        if transaction.current_time != self.current_time {
            return Err(TxRejected::new("timestamp of transaction invalid"));
        }

        let function = self
            .serialized_function(&transaction.class_name, &transaction.function_name)
            .ok_or_else(|| {
                TxRejected::new(format!(
                    "unknown function {}.{} or function not public",
                    transaction.class_name, transaction.function_name
                ))
            })?;

        if let Some(verifier) = &self.verifier {
            let span = debug_span!("verify_check_proof").entered();
            let valid = verifier
                .verify(
                    &transaction.unique_seed,
                    &transaction.merkle_tree_root,
                    &transaction.consumed_serials,
                    &transaction.new_records,
                    &id_hex(function.class_id as u64),
                    &id_hex(function.function_id as u64),
                    &function.instructions,
                    &id_hex(self.current_time),
                    transaction.proof.as_deref(),
                )
                .map_err(|e| {
                    TxRejected::new(format!("proof verification raised an error: {e}"))
                })?;
            drop(span);
            if !valid {
                return Err(TxRejected::new("proof verification failed"));
            }
        }

        // everything is validated; decode before mutating to stay atomic
        let records: Vec<Vec<u8>> = transaction
            .new_records
            .iter()
            .map(hex::decode)
            .collect::<Result<_, _>>()
            .map_err(|_| TxRejected::new("malformed record commitment"))?;

        self.published_serials
            .extend(transaction.consumed_serials.iter().cloned());
        self.published_seeds.insert(transaction.unique_seed.clone());
        {
            let _span = debug_span!("verify_insert_merkle").entered();
            for record in &records {
                // appends at the next monotonically increasing index
                self.merkle.push(record);
            }
        }
        self.accepted.push((
            transaction.consumed_serials.clone(),
            transaction.new_records.clone(),
        ));
        info!(
            class = %transaction.class_name,
            function = %transaction.function_name,
            records = transaction.new_records.len(),
            "accepted transaction"
        );
        Ok(())
    }
}

/// Minimal hex rendering of ids crossing the verifier boundary.
fn id_hex(id: u64) -> String {
    veil_types::Scalar::from(id).to_hex()
}
