use std::collections::{BTreeSet, HashMap};

use crate::{
    error::AllocationError,
    function::AssemblyFunction,
    value::RegId,
};

/// Linear-scan register allocator.
///
/// Slot 0 goes to `me`, slots 1..n to the argument registers in order; the
/// instruction stream (runtime checks included) is then walked front to
/// back, assigning the lowest free slot to every yet-unplaced register and
/// returning slots to the free pool after the last use of their register.
#[derive(Debug, Default)]
pub struct RegisterAllocation {
    free: BTreeSet<usize>,
    next: usize,
}

impl RegisterAllocation {
    fn next_free(&mut self) -> usize {
        match self.free.iter().next().copied() {
            Some(slot) => {
                self.free.remove(&slot);
                slot
            }
            None => {
                let slot = self.next;
                self.next += 1;
                slot
            }
        }
    }

    /// Assign a slot to every register of `function`.
    ///
    /// The back-end bounds the register count per function; exceeding
    /// `register_limit` is an error.
    pub fn run(
        function: &mut AssemblyFunction,
        register_limit: usize,
    ) -> Result<(), AllocationError> {
        let mut allocation = Self::default();

        let mentioned: Vec<Vec<RegId>> = function
            .all_instructions()
            .map(|instruction| instruction.registers())
            .collect();

        let mut last_used: HashMap<RegId, usize> = HashMap::new();
        for (index, registers) in mentioned.iter().enumerate() {
            for &register in registers {
                last_used.insert(register, index);
            }
        }

        let me = function.me();
        let args: Vec<RegId> = function.args().to_vec();
        let regs = function.registers_mut();

        let me_slot = allocation.next_free();
        regs[me].set_slot(me_slot);
        for arg in args {
            let slot = allocation.next_free();
            regs[arg].set_slot(slot);
        }

        for (index, registers) in mentioned.iter().enumerate() {
            for &register in registers {
                if regs[register].slot().is_none() {
                    let slot = allocation.next_free();
                    regs[register].set_slot(slot);
                }
            }
            for &register in registers {
                if last_used.get(&register) == Some(&index) {
                    if let Some(slot) = regs[register].slot() {
                        allocation.free.insert(slot);
                    }
                }
            }
        }

        if allocation.next > register_limit {
            return Err(AllocationError::RegisterLimit {
                function: function.name().to_owned(),
                used: allocation.next,
                limit: register_limit,
            });
        }
        Ok(())
    }
}
