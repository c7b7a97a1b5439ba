use core::fmt;

/// The numeric code is not part of the instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid opcode {0:#04x}")]
pub struct InvalidOpcode(pub u8);

/// Opcode representation shared with the back-end processor.
///
/// The numeric codes are fixed by compatibility with the proving circuits and
/// must never be reassigned.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum Opcode {
    /// No operation.
    NOOP = 0x00,
    /// Copy a register or constant into a register.
    MOV = 0x01,
    /// Copy the source into the destination iff the condition is non-zero.
    CMOV = 0x02,
    /// Abort the transaction iff the condition is zero.
    REQ = 0x03,
    /// Read a field of an object into a register.
    LOAD = 0x04,
    /// Write a register into a field of an object.
    STORE = 0x05,
    /// Consume an object, publishing its serial.
    KILL = 0x06,
    /// Public address of an object.
    PK = 0x07,
    /// Allocate a new object of a class.
    NEW = 0x08,
    /// Class id of an object.
    CID = 0x09,
    /// Draw a fresh unique value.
    FRESH = 0x0a,
    /// Current ledger timestamp.
    NOW = 0x0b,
    /// `uint` addition.
    PLUS = 0x0c,
    /// `uint` subtraction.
    MINUS = 0x0d,
    /// `uint` multiplication.
    MULTIPLY = 0x0e,
    /// Equality test, `0`/`1` result.
    EQUALS = 0x0f,
    /// `uint` less-than test, `0`/`1` result.
    LESS = 0x10,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        match byte {
            0x00 => Ok(NOOP),
            0x01 => Ok(MOV),
            0x02 => Ok(CMOV),
            0x03 => Ok(REQ),
            0x04 => Ok(LOAD),
            0x05 => Ok(STORE),
            0x06 => Ok(KILL),
            0x07 => Ok(PK),
            0x08 => Ok(NEW),
            0x09 => Ok(CID),
            0x0a => Ok(FRESH),
            0x0b => Ok(NOW),
            0x0c => Ok(PLUS),
            0x0d => Ok(MINUS),
            0x0e => Ok(MULTIPLY),
            0x0f => Ok(EQUALS),
            0x10 => Ok(LESS),
            _ => Err(InvalidOpcode(byte)),
        }
    }
}

/// Binary arithmetic and comparison operators.
///
/// The operators occupy the contiguous opcode range starting at
/// [`Opcode::PLUS`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Equals,
    Less,
}

impl BinaryOp {
    /// The opcode this operator encodes to.
    pub const fn opcode(self) -> Opcode {
        match self {
            Self::Plus => Opcode::PLUS,
            Self::Minus => Opcode::MINUS,
            Self::Multiply => Opcode::MULTIPLY,
            Self::Equals => Opcode::EQUALS,
            Self::Less => Opcode::LESS,
        }
    }

    /// Mnemonic, also used as the label prefix of result registers.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Plus => "PLUS",
            Self::Minus => "MINUS",
            Self::Multiply => "MULTIPLY",
            Self::Equals => "EQUALS",
            Self::Less => "LESS",
        }
    }

    /// `true` for the operators restricted to `uint` operands.
    pub const fn requires_uint(self) -> bool {
        !matches!(self, Self::Equals)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
