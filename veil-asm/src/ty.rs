use core::fmt;

use crate::{error::TypeError, instruction::Span};

/// Type of an IR value.
///
/// Contract types are identified by the qualified name of their class; an
/// object reference serializes as the object id (a `long`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AsmType {
    /// Unsigned integer in `[0, 2^120)`.
    Uint,
    /// Unsigned integer below the back-end prime.
    Long,
    /// A group element, the public address of an account or object.
    Address,
    /// Reference to an object of the named class.
    Contract(String),
}

impl AsmType {
    /// Contract type from a qualified class name.
    pub fn contract(name: impl Into<String>) -> Self {
        Self::Contract(name.into())
    }

    pub fn is_uint(&self) -> bool {
        matches!(self, Self::Uint)
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long)
    }

    pub fn is_address(&self) -> bool {
        matches!(self, Self::Address)
    }

    /// The qualified class name, if this is a contract type.
    pub fn contract_name(&self) -> Option<&str> {
        match self {
            Self::Contract(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for AsmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint => f.write_str("uint"),
            Self::Long => f.write_str("long"),
            Self::Address => f.write_str("address"),
            Self::Contract(name) => f.write_str(name),
        }
    }
}

/// Ensure that `lhs = rhs` type-checks.
pub(crate) fn check_assignable(
    expected: &AsmType,
    actual: Option<&AsmType>,
    span: &Span,
) -> Result<(), TypeError> {
    match actual {
        Some(actual) if actual == expected => Ok(()),
        actual => Err(TypeError::Mismatch {
            expected: expected.clone(),
            actual: actual.cloned(),
            span: span.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering() {
        assert_eq!(AsmType::Uint.to_string(), "uint");
        assert_eq!(AsmType::Long.to_string(), "long");
        assert_eq!(AsmType::Address.to_string(), "address");
        assert_eq!(AsmType::contract("demo.Coin").to_string(), "demo.Coin");
    }

    #[test]
    fn assignability_is_equality() {
        let span = Span::none();
        assert!(check_assignable(&AsmType::Uint, Some(&AsmType::Uint), &span).is_ok());
        assert!(check_assignable(&AsmType::Uint, Some(&AsmType::Long), &span).is_err());
        assert!(check_assignable(&AsmType::Uint, None, &span).is_err());
    }
}
