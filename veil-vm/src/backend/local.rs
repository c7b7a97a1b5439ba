//! Proofless reference processor.
//!
//! Executes serialized programs over a plaintext object store with the same
//! observable semantics as the proving back-end: executions only read
//! committed state, every touched record is consumed and re-published, and
//! persistence happens exclusively through transaction synchronization. No
//! proofs are produced.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rand::{rngs::StdRng, RngCore, SeedableRng};
use sha3::{Digest, Sha3_256};
use tracing::debug;
use veil_asm::Opcode;
use veil_merkle::MerkleTree;
use veil_types::{Address, HexError, Scalar};

use super::{
    Account, Backend, BackendError, ExecutionResult, KeyPair, ObjectState,
};
use crate::serialize::SerializedInstruction;

/// Fixed payload width of a record; field locations 1..=8 land here,
/// location 0 is the owner.
const PAYLOAD_SLOTS: usize = 8;

/// Words of a record commitment: object id, nonce, class id, object
/// address, owner, payload.
const RECORD_WORDS: usize = 5 + PAYLOAD_SLOTS;

const UINT_LIMIT: u128 = 1 << 120;

fn digest(domain: &str, parts: &[&[u8]]) -> Scalar {
    let mut hash = Sha3_256::new();
    hash.update(domain.as_bytes());
    for part in parts {
        hash.update(part);
    }
    Scalar::new(hash.finalize().into())
}

fn serial_of(record: &[u8]) -> String {
    digest("veil.serial", &[record]).to_hex()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredObject {
    class_id: Scalar,
    address: Scalar,
    owner: Scalar,
    payload: Vec<Scalar>,
    record: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StagedObject {
    class_id: Scalar,
    address: Scalar,
    owner: Scalar,
    payload: Vec<Scalar>,
}

impl From<&StoredObject> for StagedObject {
    fn from(stored: &StoredObject) -> Self {
        Self {
            class_id: stored.class_id,
            address: stored.address,
            owner: stored.owner,
            payload: stored.payload.clone(),
        }
    }
}

fn parse_record(bytes: &[u8]) -> Result<(Scalar, StoredObject), BackendError> {
    if bytes.len() != RECORD_WORDS * Scalar::LEN {
        return Err(BackendError::MalformedRecord);
    }
    let mut words = bytes.chunks_exact(Scalar::LEN).map(|chunk| {
        let mut word = [0u8; Scalar::LEN];
        word.copy_from_slice(chunk);
        Scalar::new(word)
    });
    let oid = words.next().ok_or(BackendError::MalformedRecord)?;
    let _nonce = words.next().ok_or(BackendError::MalformedRecord)?;
    let class_id = words.next().ok_or(BackendError::MalformedRecord)?;
    let address = words.next().ok_or(BackendError::MalformedRecord)?;
    let owner = words.next().ok_or(BackendError::MalformedRecord)?;
    let payload = words.collect();
    Ok((
        oid,
        StoredObject {
            class_id,
            address,
            owner,
            payload,
            record: bytes.to_vec(),
        },
    ))
}

fn build_record(oid: &Scalar, nonce: &Scalar, staged: &StagedObject) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(RECORD_WORDS * Scalar::LEN);
    bytes.extend_from_slice(oid.as_bytes());
    bytes.extend_from_slice(nonce.as_bytes());
    bytes.extend_from_slice(staged.class_id.as_bytes());
    bytes.extend_from_slice(staged.address.as_bytes());
    bytes.extend_from_slice(staged.owner.as_bytes());
    for word in &staged.payload {
        bytes.extend_from_slice(word.as_bytes());
    }
    bytes
}

/// Scratch state of one execution; discarded afterwards.
struct TxState<'a> {
    committed: &'a BTreeMap<Scalar, StoredObject>,
    staged: BTreeMap<Scalar, StagedObject>,
    touched: Vec<Scalar>,
    killed: BTreeSet<Scalar>,
    fresh_counter: u64,
    new_counter: u64,
}

impl<'a> TxState<'a> {
    fn new(committed: &'a BTreeMap<Scalar, StoredObject>) -> Self {
        Self {
            committed,
            staged: BTreeMap::new(),
            touched: Vec::new(),
            killed: BTreeSet::new(),
            fresh_counter: 0,
            new_counter: 0,
        }
    }

    fn touch(&mut self, oid: Scalar) {
        if !self.touched.contains(&oid) {
            self.touched.push(oid);
        }
    }

    fn object_mut(&mut self, oid: Scalar) -> Result<&mut StagedObject, BackendError> {
        if !self.staged.contains_key(&oid) {
            let stored = self
                .committed
                .get(&oid)
                .ok_or_else(|| BackendError::UnknownObject { id: oid.to_hex() })?;
            self.staged.insert(oid, StagedObject::from(stored));
        }
        self.touch(oid);
        self.staged
            .get_mut(&oid)
            .ok_or_else(|| BackendError::UnknownObject { id: oid.to_hex() })
    }

    fn create(&mut self, seed: &Scalar, class_id: Scalar) -> Scalar {
        let oid = digest(
            "veil.oid",
            &[seed.as_bytes(), &self.new_counter.to_be_bytes()],
        );
        self.new_counter += 1;
        let address = digest("veil.object-address", &[oid.as_bytes()]);
        self.staged.insert(
            oid,
            StagedObject {
                class_id,
                address,
                owner: Scalar::zeroed(),
                payload: vec![Scalar::zeroed(); PAYLOAD_SLOTS],
            },
        );
        self.touch(oid);
        oid
    }

    fn fresh(&mut self, seed: &Scalar) -> Scalar {
        let value = digest(
            "veil.fresh",
            &[seed.as_bytes(), &self.fresh_counter.to_be_bytes()],
        );
        self.fresh_counter += 1;
        value
    }
}

/// In-process [`Backend`] without a proof system.
#[derive(Debug)]
pub struct LocalBackend {
    accounts: HashMap<Address, KeyPair>,
    objects: BTreeMap<Scalar, StoredObject>,
    serials: HashMap<String, Scalar>,
    merkle: MerkleTree,
    synced: usize,
    rng: StdRng,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic instance for reproducible tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            accounts: HashMap::new(),
            objects: BTreeMap::new(),
            serials: HashMap::new(),
            merkle: MerkleTree::new(),
            synced: 0,
            rng,
        }
    }

    fn random_scalar(&mut self) -> Scalar {
        let mut bytes = [0u8; Scalar::LEN];
        self.rng.fill_bytes(&mut bytes);
        Scalar::new(bytes)
    }

    fn uint(value: &Scalar) -> Result<u128, BackendError> {
        value
            .to_u128()
            .filter(|v| *v < UINT_LIMIT)
            .ok_or(BackendError::RangeCheck)
    }

    fn to_slot(value: &str) -> Result<usize, BackendError> {
        Scalar::from_hex(value)?
            .to_u128()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| BackendError::MalformedProgram("register slot".to_owned()))
    }

    fn to_location(value: &Scalar) -> Result<usize, BackendError> {
        value
            .to_u128()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| BackendError::MalformedProgram("field location".to_owned()))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for LocalBackend {
    fn new_user_account(&mut self) -> Result<Account, BackendError> {
        let secret_key = self.random_scalar();
        let public_key = digest("veil.pk", &[secret_key.as_bytes()]);
        let address = Address::from(digest("veil.address", &[public_key.as_bytes()]));
        let keys = KeyPair {
            secret_key,
            public_key,
            address,
        };
        self.accounts.insert(address, keys.clone());
        Ok(Account::new(keys))
    }

    fn register_account(&mut self, account: &Account) -> Result<(), BackendError> {
        self.accounts
            .insert(account.keys.address, account.keys.clone());
        Ok(())
    }

    fn account_for_address(&self, address: &Address) -> Result<Account, BackendError> {
        self.accounts
            .get(address)
            .cloned()
            .map(Account::new)
            .ok_or_else(|| BackendError::UnknownAccount {
                address: address.to_hex(),
            })
    }

    fn execute(
        &mut self,
        class_id: &str,
        function_id: &str,
        instructions: &[SerializedInstruction],
        arguments: &[String],
        return_slot: u64,
        current_time: &str,
    ) -> Result<ExecutionResult, BackendError> {
        debug!(class_id, function_id, "executing function locally");
        let time = Scalar::from_hex(current_time)?;
        let seed = self.random_scalar();

        // size the register file from the program
        let mut width = arguments.len().max(return_slot as usize + 1);
        for instruction in instructions {
            width = width.max(instruction.dst as usize + 1);
            if !instruction.src_1_is_const {
                width = width.max(Self::to_slot(&instruction.src_1)? + 1);
            }
            if !instruction.src_2_is_const {
                width = width.max(Self::to_slot(&instruction.src_2)? + 1);
            }
        }
        let mut regs = vec![Scalar::zeroed(); width];
        for (slot, argument) in arguments.iter().enumerate() {
            regs[slot] = Scalar::from_hex(argument)?;
        }

        let mut tx = TxState::new(&self.objects);
        for instruction in instructions {
            let opcode = Opcode::try_from(instruction.opcode)
                .map_err(|e| BackendError::MalformedProgram(e.to_string()))?;
            let fetch = |src: &str, is_const: bool, regs: &[Scalar]| -> Result<Scalar, BackendError> {
                if is_const {
                    Ok(Scalar::from_hex(src)?)
                } else {
                    Ok(regs[Self::to_slot(src)?])
                }
            };
            let v1 = fetch(&instruction.src_1, instruction.src_1_is_const, &regs)?;
            let v2 = fetch(&instruction.src_2, instruction.src_2_is_const, &regs)?;
            let dst = instruction.dst as usize;

            match opcode {
                Opcode::NOOP => {}
                Opcode::MOV => regs[dst] = v1,
                Opcode::CMOV => {
                    if !v1.is_zero() {
                        regs[dst] = v2;
                    }
                }
                Opcode::REQ => {
                    if v1.is_zero() {
                        return Err(BackendError::RequirementFailed);
                    }
                }
                Opcode::LOAD => {
                    let location = Self::to_location(&v2)?;
                    let object = tx.object_mut(v1)?;
                    regs[dst] = if location == 0 {
                        object.owner
                    } else {
                        *object
                            .payload
                            .get(location - 1)
                            .ok_or(BackendError::FieldOutOfBounds { location })?
                    };
                }
                Opcode::STORE => {
                    let value = regs[dst];
                    let location = Self::to_location(&v2)?;
                    let object = tx.object_mut(v1)?;
                    if location == 0 {
                        object.owner = value;
                    } else {
                        let slot = object
                            .payload
                            .get_mut(location - 1)
                            .ok_or(BackendError::FieldOutOfBounds { location })?;
                        *slot = value;
                    }
                }
                Opcode::KILL => {
                    tx.object_mut(v1)?;
                    tx.killed.insert(v1);
                }
                Opcode::PK => {
                    regs[dst] = tx.object_mut(v1)?.address;
                }
                Opcode::NEW => {
                    regs[dst] = tx.create(&seed, v1);
                }
                Opcode::CID => {
                    regs[dst] = tx.object_mut(v1)?.class_id;
                }
                Opcode::FRESH => {
                    regs[dst] = tx.fresh(&seed);
                }
                Opcode::NOW => {
                    regs[dst] = time;
                }
                Opcode::PLUS => {
                    let (a, b) = (Self::uint(&v1)?, Self::uint(&v2)?);
                    let result = a + b;
                    if result >= UINT_LIMIT {
                        return Err(BackendError::ArithmeticOverflow);
                    }
                    regs[dst] = Scalar::from(result);
                }
                Opcode::MINUS => {
                    let (a, b) = (Self::uint(&v1)?, Self::uint(&v2)?);
                    let result = a
                        .checked_sub(b)
                        .ok_or(BackendError::ArithmeticUnderflow)?;
                    regs[dst] = Scalar::from(result);
                }
                Opcode::MULTIPLY => {
                    let (a, b) = (Self::uint(&v1)?, Self::uint(&v2)?);
                    let result = a
                        .checked_mul(b)
                        .filter(|r| *r < UINT_LIMIT)
                        .ok_or(BackendError::ArithmeticOverflow)?;
                    regs[dst] = Scalar::from(result);
                }
                Opcode::EQUALS => {
                    regs[dst] = Scalar::from(u64::from(v1 == v2));
                }
                Opcode::LESS => {
                    let (a, b) = (Self::uint(&v1)?, Self::uint(&v2)?);
                    regs[dst] = Scalar::from(u64::from(a < b));
                }
            }
        }

        // every pre-existing touched record is consumed first
        let consumed_serials = tx
            .touched
            .iter()
            .filter_map(|oid| self.objects.get(oid))
            .map(|stored| serial_of(&stored.record))
            .collect();

        // and every surviving touched object is re-published
        let mut new_records = Vec::new();
        for (index, oid) in tx.touched.iter().enumerate() {
            if tx.killed.contains(oid) {
                continue;
            }
            if let Some(staged) = tx.staged.get(oid) {
                let nonce = digest(
                    "veil.nonce",
                    &[seed.as_bytes(), &(index as u64).to_be_bytes()],
                );
                new_records.push(hex::encode(build_record(oid, &nonce, staged)));
            }
        }

        Ok(ExecutionResult {
            return_value: regs[return_slot as usize].to_hex(),
            consumed_serials,
            new_records,
            proof: None,
            unique_seed: seed.to_hex(),
            merkle_tree_root: hex::encode(self.merkle.root()),
            current_time: current_time.to_owned(),
        })
    }

    fn object_state(&self, object_id: &str) -> Result<ObjectState, BackendError> {
        let oid = Scalar::from_hex(object_id)?;
        let object = self
            .objects
            .get(&oid)
            .ok_or_else(|| BackendError::UnknownObject { id: oid.to_hex() })?;
        Ok(ObjectState {
            contract_id: object.class_id.to_hex(),
            addr_object: object.address.to_hex(),
            addr_owner: object.owner.to_hex(),
            payload: object.payload.iter().map(Scalar::to_hex).collect(),
        })
    }

    fn synced_transactions(&self) -> usize {
        self.synced
    }

    fn sync_transaction(
        &mut self,
        index: usize,
        serials: &[String],
        records: &[String],
    ) -> Result<(), BackendError> {
        if index < self.synced {
            // replayed transaction, already applied
            return Ok(());
        }
        if index != self.synced {
            return Err(BackendError::SyncIndexOutOfOrder {
                expected: self.synced,
                actual: index,
            });
        }

        for serial in serials {
            if let Some(oid) = self.serials.remove(serial) {
                self.objects.remove(&oid);
            }
        }
        for record in records {
            let bytes =
                hex::decode(record).map_err(|e| BackendError::Hex(HexError::Malformed(e)))?;
            let (oid, object) = parse_record(&bytes)?;
            self.merkle.push(&bytes);
            self.serials.insert(serial_of(&bytes), oid);
            self.objects.insert(oid, object);
        }
        self.synced += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mov(dst: u64, src: &str, is_const: bool) -> SerializedInstruction {
        SerializedInstruction {
            opcode: Opcode::MOV as u8,
            dst,
            src_1: src.to_owned(),
            src_1_is_const: is_const,
            src_2: "00".to_owned(),
            src_2_is_const: false,
        }
    }

    #[test]
    fn accounts_round_trip() {
        let mut backend = LocalBackend::seeded(7);
        let account = backend.new_user_account().unwrap();
        let found = backend.account_for_address(&account.address).unwrap();
        assert_eq!(account, found);
    }

    #[test]
    fn execute_moves_arguments_and_returns() {
        let mut backend = LocalBackend::seeded(7);
        let program = vec![mov(2, "01", false)];
        let result = backend
            .execute("00", "00", &program, &["2a".to_owned(), "07".to_owned()], 2, "09")
            .unwrap();
        assert_eq!(result.return_value, "07");
        assert_eq!(result.current_time, "09");
        assert!(result.consumed_serials.is_empty());
        assert!(result.new_records.is_empty());
    }

    #[test]
    fn req_aborts_without_touching_state() {
        let mut backend = LocalBackend::seeded(7);
        let program = vec![SerializedInstruction {
            opcode: Opcode::REQ as u8,
            dst: 0,
            src_1: "00".to_owned(),
            src_1_is_const: true,
            src_2: "00".to_owned(),
            src_2_is_const: false,
        }];
        let err = backend
            .execute("00", "00", &program, &["2a".to_owned()], 0, "09")
            .unwrap_err();
        assert_eq!(err, BackendError::RequirementFailed);
        assert_eq!(backend.synced_transactions(), 0);
    }

    #[test]
    fn uint_arithmetic_is_range_checked() {
        let mut backend = LocalBackend::seeded(7);
        let wide = Scalar::from(u128::MAX).to_hex();
        let program = vec![SerializedInstruction {
            opcode: Opcode::PLUS as u8,
            dst: 1,
            src_1: wide.clone(),
            src_1_is_const: true,
            src_2: "00".to_owned(),
            src_2_is_const: true,
        }];
        let err = backend
            .execute("00", "00", &program, &["2a".to_owned()], 0, "09")
            .unwrap_err();
        assert_eq!(err, BackendError::RangeCheck);
    }

    #[test]
    fn sync_is_idempotent_on_replayed_indices() {
        let mut backend = LocalBackend::seeded(7);
        let staged = StagedObject {
            class_id: Scalar::from(1u64),
            address: Scalar::from(2u64),
            owner: Scalar::from(3u64),
            payload: vec![Scalar::zeroed(); PAYLOAD_SLOTS],
        };
        let record = hex::encode(build_record(
            &Scalar::from(9u64),
            &Scalar::from(4u64),
            &staged,
        ));

        backend.sync_transaction(0, &[], &[record.clone()]).unwrap();
        let root = hex::encode(backend.merkle.root());
        assert_eq!(backend.synced_transactions(), 1);

        // replay is a no-op
        backend.sync_transaction(0, &[], &[record]).unwrap();
        assert_eq!(backend.synced_transactions(), 1);
        assert_eq!(hex::encode(backend.merkle.root()), root);

        assert_eq!(
            backend.sync_transaction(5, &[], &[]),
            Err(BackendError::SyncIndexOutOfOrder {
                expected: 1,
                actual: 5
            })
        );
    }

    #[test]
    fn fresh_values_are_pairwise_distinct() {
        let mut backend = LocalBackend::seeded(7);
        let program = vec![
            SerializedInstruction {
                opcode: Opcode::FRESH as u8,
                dst: 1,
                src_1: "00".to_owned(),
                src_1_is_const: false,
                src_2: "00".to_owned(),
                src_2_is_const: false,
            },
            SerializedInstruction {
                opcode: Opcode::FRESH as u8,
                dst: 2,
                src_1: "00".to_owned(),
                src_1_is_const: false,
                src_2: "00".to_owned(),
                src_2_is_const: false,
            },
            SerializedInstruction {
                opcode: Opcode::EQUALS as u8,
                dst: 3,
                src_1: "01".to_owned(),
                src_1_is_const: false,
                src_2: "02".to_owned(),
                src_2_is_const: false,
            },
        ];
        let result = backend
            .execute("00", "00", &program, &["2a".to_owned()], 3, "09")
            .unwrap();
        assert_eq!(result.return_value, "00");
    }
}
