//! Per-call coordinator: execute, submit, resynchronize.

use std::collections::BTreeMap;

use tracing::{debug_span, error, info};
use veil_tx::Transaction;
use veil_types::{Address, Scalar};

use crate::{
    backend::{Account, Backend, ObjectState},
    error::{BackendExecuteError, VmError},
    ledger::Ledger,
};

/// Thin coordinator between the ledger and one back-end instance.
///
/// Several runtimes may serve the same ledger; a runtime that has fallen
/// behind replays the accepted history into its back-end before the next
/// call.
pub struct Runtime<B: Backend> {
    backend: B,
}

impl<B: Backend> Runtime<B> {
    /// Wrap `backend` and synchronize it with `ledger`.
    pub fn new(backend: B, ledger: &Ledger) -> Result<Self, VmError> {
        let mut runtime = Self { backend };
        runtime.sync(ledger)?;
        Ok(runtime)
    }

    /// Replay accepted transactions the back-end has not seen yet.
    pub fn sync(&mut self, ledger: &Ledger) -> Result<(), VmError> {
        info!("synchronizing local state with ledger...");
        let synced = self.backend.synced_transactions();
        let accepted = ledger.accepted_transactions();
        for (index, (serials, records)) in accepted.iter().enumerate().skip(synced) {
            self.backend.sync_transaction(index, serials, records)?;
        }
        Ok(())
    }

    /// Create and cache a fresh user account.
    pub fn new_user_account(&mut self) -> Result<Account, VmError> {
        let account = self.backend.new_user_account()?;
        info!(address = %account.address, "created new user");
        Ok(account)
    }

    /// Add an externally supplied account.
    pub fn register_account(&mut self, account: &Account) -> Result<(), VmError> {
        self.backend.register_account(account)?;
        info!(address = %account.address, "registered account");
        Ok(())
    }

    pub fn account_for_address(&self, address: &Address) -> Result<Account, VmError> {
        Ok(self.backend.account_for_address(address)?)
    }

    /// Execute `class_name.function_name`, submit the resulting transaction
    /// to the ledger and resynchronize.
    ///
    /// Returns the decoded return value. `args` are raw values; object
    /// references travel as their object ids.
    pub fn call_function(
        &mut self,
        ledger: &mut Ledger,
        class_name: &str,
        function_name: &str,
        sender: &Account,
        args: &[Scalar],
    ) -> Result<Scalar, VmError> {
        let function = ledger
            .serialized_function(class_name, function_name)
            .ok_or_else(|| VmError::UnknownFunction {
                class: class_name.to_owned(),
                function: function_name.to_owned(),
            })?
            .clone();

        let arguments = Self::prepare_arguments(sender, args);
        info!(
            class = class_name,
            function = function_name,
            ?arguments,
            "locally executing function..."
        );
        let result = {
            let _span = debug_span!("execute").entered();
            self.backend
                .execute(
                    &Scalar::from(function.class_id as u64).to_hex(),
                    &Scalar::from(function.function_id as u64).to_hex(),
                    &function.instructions,
                    &arguments,
                    function.return_register,
                    &Scalar::from(ledger.current_time()).to_hex(),
                )
                .map_err(|e| {
                    error!("error while executing instructions: {e}");
                    BackendExecuteError(e)
                })?
        };
        info!(return_value = %result.return_value, "finished execution");

        let transaction = Transaction::from_execution_result(
            class_name,
            function_name,
            &result.merkle_tree_root,
            &result.consumed_serials,
            &result.new_records,
            result.proof.as_deref(),
            &result.unique_seed,
            &result.current_time,
        )?;
        info!("sending transaction to ledger for verification...");
        {
            let _span = debug_span!("verify").entered();
            ledger.verify_and_execute_transaction(&transaction)?;
        }
        info!("successfully accepted transaction at ledger");

        self.backend.sync_transaction(
            self.backend.synced_transactions(),
            &transaction.consumed_serials,
            &transaction.new_records,
        )?;

        info!(class = class_name, function = function_name, "finished call");
        Ok(Scalar::from_hex(&result.return_value)?)
    }

    /// Raw decrypted state of an object.
    pub fn raw_state(&self, object_id: &Scalar) -> Result<ObjectState, VmError> {
        Ok(self.backend.object_state(&object_id.to_hex())?)
    }

    /// Field map of an object, keyed by field name.
    ///
    /// The owner sits at location 0; payload entries follow field
    /// locations.
    pub fn field_values(
        &self,
        ledger: &Ledger,
        object_id: &Scalar,
    ) -> Result<BTreeMap<String, Scalar>, VmError> {
        let state = self.raw_state(object_id)?;
        let class_id = Scalar::from_hex(&state.contract_id)?
            .to_u128()
            .and_then(|id| usize::try_from(id).ok())
            .ok_or_else(|| VmError::UnknownClassId {
                id: state.contract_id.clone(),
            })?;
        let class = ledger
            .class_for_id(class_id)
            .ok_or_else(|| VmError::UnknownClassId {
                id: state.contract_id.clone(),
            })?;

        let mut values = BTreeMap::new();
        for field in class.fields() {
            let location = match field.location() {
                Some(location) => location,
                None => continue,
            };
            let raw = if location == 0 {
                Some(&state.addr_owner)
            } else {
                state.payload.get(location - 1)
            };
            if let Some(raw) = raw {
                values.insert(field.name().to_owned(), Scalar::from_hex(raw)?);
            }
        }
        Ok(values)
    }

    /// `[sender_address, args...]`, hex encoded for the back-end.
    fn prepare_arguments(sender: &Account, args: &[Scalar]) -> Vec<String> {
        let mut arguments = Vec::with_capacity(args.len() + 1);
        arguments.push(Scalar::from(sender.address).to_hex());
        arguments.extend(args.iter().map(Scalar::to_hex));
        arguments
    }
}
