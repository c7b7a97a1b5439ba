//! Conversion of finalized IR into the fixed-width encoding the back-end
//! processor consumes.
//!
//! Operands serialize as `(integer, is_const)` pairs; integer values travel
//! as lowercase, even-length hex strings so arbitrarily wide constants
//! survive the trip into the back-end.

use serde::{Deserialize, Serialize};
use veil_asm::{
    AssemblyFunction, AssemblyStorage, ClassId, ClassRef, FieldRef, InstrKind, Instruction,
    Operand, RegisterFile,
};
use veil_types::Scalar;

/// Serialization failure; all variants are programmer errors in the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    /// A `CALL` survived inlining.
    #[error("tried to serialize non-inlined call instruction")]
    CallNotInlined,
    #[error("tried to serialize non-linked class reference {class}")]
    UnlinkedClassRef {
        class: String,
    },
    #[error("tried to serialize non-linked field reference {class}.{field}")]
    UnlinkedFieldRef {
        class: String,
        field: String,
    },
    /// A register reached serialization without a slot.
    #[error("register '{label}' has no allocated slot")]
    UnassignedSlot {
        label: String,
    },
    #[error("field {class}.{field} has no assigned location")]
    UnassignedFieldLocation {
        class: String,
        field: String,
    },
}

/// One instruction in processor encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedInstruction {
    pub opcode: u8,
    pub dst: u64,
    pub src_1: String,
    pub src_1_is_const: bool,
    pub src_2: String,
    pub src_2_is_const: bool,
}

/// One public function in processor encoding.
///
/// Function ids count only the public functions of a class, in declaration
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedFunction {
    pub class_id: usize,
    pub function_id: usize,
    pub return_register: u64,
    pub instructions: Vec<SerializedInstruction>,
}

impl SerializedFunction {
    /// Serialize `function` (runtime checks first, then the body).
    pub fn new(
        storage: &AssemblyStorage,
        class_id: ClassId,
        function_id: usize,
        function: &AssemblyFunction,
    ) -> Result<Self, SerializeError> {
        let regs = function.registers();
        let return_register = slot_of(regs, function.ret())?;
        let instructions = function
            .all_instructions()
            .map(|instruction| serialize_instruction(storage, regs, instruction))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            class_id: class_id.as_usize(),
            function_id,
            return_register,
            instructions,
        })
    }
}

fn slot_of(regs: &RegisterFile, id: veil_asm::RegId) -> Result<u64, SerializeError> {
    regs[id]
        .slot()
        .map(|slot| slot as u64)
        .ok_or_else(|| SerializeError::UnassignedSlot {
            label: regs[id].label().to_owned(),
        })
}

fn serialize_operand(
    regs: &RegisterFile,
    operand: &Operand,
) -> Result<(String, bool), SerializeError> {
    match operand {
        Operand::Reg(id) => Ok((Scalar::from(slot_of(regs, *id)?).to_hex(), false)),
        Operand::Const(constant) => Ok((constant.value().to_hex(), true)),
    }
}

fn serialize_field(
    storage: &AssemblyStorage,
    field: &FieldRef,
) -> Result<(String, bool), SerializeError> {
    let unlinked = || SerializeError::UnlinkedFieldRef {
        class: field.class_name.clone(),
        field: field.field_name.clone(),
    };
    let class = storage.class(field.target().ok_or_else(unlinked)?);
    let location = class
        .field(&field.field_name)
        .and_then(|f| f.location())
        .ok_or_else(|| SerializeError::UnassignedFieldLocation {
            class: field.class_name.clone(),
            field: field.field_name.clone(),
        })?;
    Ok((Scalar::from(location as u64).to_hex(), true))
}

fn serialize_class(class: &ClassRef) -> Result<(String, bool), SerializeError> {
    let id = class.target().ok_or_else(|| SerializeError::UnlinkedClassRef {
        class: class.class_name.clone(),
    })?;
    Ok((Scalar::from(id.as_usize() as u64).to_hex(), true))
}

const ABSENT: (&str, bool) = ("00", false);

/// Serialize one instruction.
pub fn serialize_instruction(
    storage: &AssemblyStorage,
    regs: &RegisterFile,
    instruction: &Instruction,
) -> Result<SerializedInstruction, SerializeError> {
    let absent = || Ok::<_, SerializeError>((ABSENT.0.to_owned(), ABSENT.1));

    let opcode = instruction.opcode().ok_or(SerializeError::CallNotInlined)?;
    let (dst, src_1, src_2) = match &instruction.kind {
        InstrKind::NoOp => (None, absent()?, absent()?),
        InstrKind::Mov { dst, src } => {
            (Some(*dst), serialize_operand(regs, src)?, absent()?)
        }
        InstrKind::CMov { dst, cond, src } => (
            Some(*dst),
            serialize_operand(regs, cond)?,
            serialize_operand(regs, src)?,
        ),
        InstrKind::Req { cond } => (None, serialize_operand(regs, cond)?, absent()?),
        InstrKind::Load { dst, obj, field } => (
            Some(*dst),
            serialize_operand(regs, obj)?,
            serialize_field(storage, field)?,
        ),
        // STORE carries its source in the register slot and targets
        // `obj.field` through the value operands
        InstrKind::Store { src, obj, field } => (
            Some(*src),
            serialize_operand(regs, obj)?,
            serialize_field(storage, field)?,
        ),
        InstrKind::Kill { obj } => (None, serialize_operand(regs, obj)?, absent()?),
        InstrKind::Pk { dst, obj } | InstrKind::Cid { dst, obj } => {
            (Some(*dst), serialize_operand(regs, obj)?, absent()?)
        }
        InstrKind::New { dst, class } => {
            (Some(*dst), serialize_class(class)?, absent()?)
        }
        InstrKind::Fresh { dst } | InstrKind::Now { dst } => {
            (Some(*dst), absent()?, absent()?)
        }
        InstrKind::Bin { dst, lhs, rhs, .. } => (
            Some(*dst),
            serialize_operand(regs, lhs)?,
            serialize_operand(regs, rhs)?,
        ),
        InstrKind::Call { .. } => return Err(SerializeError::CallNotInlined),
    };

    let dst = match dst {
        Some(id) => slot_of(regs, id)?,
        None => 0,
    };
    let (src_1, src_1_is_const) = src_1;
    let (src_2, src_2_is_const) = src_2;
    Ok(SerializedInstruction {
        opcode: opcode as u8,
        dst,
        src_1,
        src_1_is_const,
        src_2,
        src_2_is_const,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_asm::{Constant, Opcode};

    fn regs_with_slots() -> (RegisterFile, veil_asm::RegId, veil_asm::RegId, veil_asm::RegId) {
        let mut regs = RegisterFile::new();
        let destination = regs.alloc("destination");
        let condition = regs.alloc("condition");
        let source = regs.alloc("source");
        regs[destination].set_slot(7);
        regs[condition].set_slot(4);
        regs[source].set_slot(2);
        (regs, destination, condition, source)
    }

    #[test]
    fn cmov_operands_serialize_as_hex_slot_and_const_pairs() {
        let storage = AssemblyStorage::new();
        let (regs, destination, condition, source) = regs_with_slots();

        let cmov = Instruction::from(InstrKind::CMov {
            dst: destination,
            cond: Operand::Reg(condition),
            src: Operand::Reg(source),
        });
        let serialized = serialize_instruction(&storage, &regs, &cmov).unwrap();
        assert_eq!(serialized.opcode, Opcode::CMOV as u8);
        assert_eq!(serialized.dst, 7);
        assert_eq!(serialized.src_1, "04");
        assert!(!serialized.src_1_is_const);
        assert_eq!(serialized.src_2, "02");
        assert!(!serialized.src_2_is_const);

        let cmov = Instruction::from(InstrKind::CMov {
            dst: destination,
            cond: Operand::Const(Constant::uint(33).unwrap()),
            src: Operand::Reg(source),
        });
        let serialized = serialize_instruction(&storage, &regs, &cmov).unwrap();
        assert_eq!(serialized.src_1, "21");
        assert!(serialized.src_1_is_const);

        let cmov = Instruction::from(InstrKind::CMov {
            dst: destination,
            cond: Operand::Reg(condition),
            src: Operand::Const(Constant::uint(77).unwrap()),
        });
        let serialized = serialize_instruction(&storage, &regs, &cmov).unwrap();
        assert_eq!(serialized.src_2, "4d");
        assert!(serialized.src_2_is_const);
    }

    #[test]
    fn calls_and_unassigned_slots_are_refused() {
        let storage = AssemblyStorage::new();
        let mut regs = RegisterFile::new();
        let dst = regs.alloc("dst");

        let call = Instruction::from(InstrKind::Call {
            dst,
            callee: veil_asm::FuncRef::named("C", "f"),
            args: vec![],
            sender_is_self: false,
        });
        assert_eq!(
            serialize_instruction(&storage, &regs, &call),
            Err(SerializeError::CallNotInlined)
        );

        let fresh = Instruction::from(InstrKind::Fresh { dst });
        assert_eq!(
            serialize_instruction(&storage, &regs, &fresh),
            Err(SerializeError::UnassignedSlot {
                label: "dst".to_owned()
            })
        );
    }

    #[test]
    fn serialized_instructions_survive_a_serde_round_trip() {
        let storage = AssemblyStorage::new();
        let (regs, destination, condition, source) = regs_with_slots();
        let cmov = Instruction::from(InstrKind::CMov {
            dst: destination,
            cond: Operand::Reg(condition),
            src: Operand::Reg(source),
        });
        let serialized = serialize_instruction(&storage, &regs, &cmov).unwrap();
        let json = serde_json::to_string(&serialized).unwrap();
        let back: SerializedInstruction = serde_json::from_str(&json).unwrap();
        assert_eq!(serialized, back);
    }
}
