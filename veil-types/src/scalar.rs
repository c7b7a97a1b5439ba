use core::{fmt, str};

use serde::{Deserialize, Serialize};

/// Error produced when parsing hex-encoded values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HexError {
    /// The string contains characters outside `[0-9a-fA-F]`.
    #[error("malformed hex string")]
    Malformed(#[from] hex::FromHexError),
    /// The decoded value does not fit in 32 bytes.
    #[error("hex value wider than {} bytes", Scalar::LEN)]
    Overflow,
}

macro_rules! scalar_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug,
            Default,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        pub struct $name([u8; 32]);

        impl $name {
            /// Width of the value in bytes.
            pub const LEN: usize = 32;

            /// Bypass integer conversion and instantiate directly from bytes.
            pub const fn new(bytes: [u8; Self::LEN]) -> Self {
                Self(bytes)
            }

            /// The zero value.
            pub const fn zeroed() -> Self {
                Self([0u8; Self::LEN])
            }

            /// Returns `true` iff the value is zero.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; Self::LEN]
            }

            /// Big-endian byte representation.
            pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
                &self.0
            }

            /// Lowercase hex rendering without leading zero bytes.
            ///
            /// The result always has even length; zero renders as `"00"`.
            pub fn to_hex(&self) -> String {
                let first = self.0.iter().position(|b| *b != 0);
                match first {
                    Some(i) => hex::encode(&self.0[i..]),
                    None => "00".to_owned(),
                }
            }

            /// Parses a (possibly odd-length) hex string into a value.
            pub fn from_hex(s: &str) -> Result<Self, HexError> {
                let padded;
                let s = if s.len() % 2 == 0 {
                    s
                } else {
                    padded = format!("0{s}");
                    padded.as_str()
                };
                let decoded = hex::decode(s)?;
                if decoded.len() > Self::LEN {
                    return Err(HexError::Overflow);
                }
                let mut bytes = [0u8; Self::LEN];
                bytes[Self::LEN - decoded.len()..].copy_from_slice(&decoded);
                Ok(Self(bytes))
            }

            /// The value as `u128`, if it fits.
            pub fn to_u128(&self) -> Option<u128> {
                if self.0[..Self::LEN - 16].iter().any(|b| *b != 0) {
                    return None;
                }
                let mut low = [0u8; 16];
                low.copy_from_slice(&self.0[Self::LEN - 16..]);
                Some(u128::from_be_bytes(low))
            }
        }

        impl From<[u8; $name::LEN]> for $name {
            fn from(bytes: [u8; $name::LEN]) -> Self {
                Self(bytes)
            }
        }

        impl From<$name> for [u8; $name::LEN] {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::from(value as u128)
            }
        }

        impl From<u128> for $name {
            fn from(value: u128) -> Self {
                let mut bytes = [0u8; Self::LEN];
                bytes[Self::LEN - 16..].copy_from_slice(&value.to_be_bytes());
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if f.alternate() {
                    write!(f, "0x")?;
                }
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl str::FromStr for $name {
            type Err = HexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s.trim_start_matches("0x"))
            }
        }
    };
}

scalar_newtype!(
    Scalar,
    "A 32-byte big-endian unsigned integer covering the full back-end value domain."
);
scalar_newtype!(Address, "The public address of an account or object.");

impl Scalar {
    pub(crate) const fn max_uint() -> Self {
        let mut bytes = [0u8; Self::LEN];
        let mut i = Self::LEN - 15;
        while i < Self::LEN {
            bytes[i] = 0xff;
            i += 1;
        }
        Self(bytes)
    }
}

impl From<Address> for Scalar {
    fn from(address: Address) -> Self {
        Self(address.0)
    }
}

impl From<Scalar> for Address {
    fn from(scalar: Scalar) -> Self {
        Self(scalar.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_minimal_and_even() {
        assert_eq!(Scalar::from(0u64).to_hex(), "00");
        assert_eq!(Scalar::from(33u64).to_hex(), "21");
        assert_eq!(Scalar::from(77u64).to_hex(), "4d");
        assert_eq!(Scalar::from(0x0222u64).to_hex(), "0222");
        assert_eq!(Scalar::from(0x1234u64).to_hex(), "1234");
    }

    #[test]
    fn hex_round_trip() {
        for value in [0u128, 1, 15, 16, 255, 256, 1 << 119, u128::MAX] {
            let scalar = Scalar::from(value);
            let parsed = Scalar::from_hex(&scalar.to_hex()).unwrap();
            assert_eq!(scalar, parsed);
        }
    }

    #[test]
    fn odd_length_hex_is_accepted() {
        assert_eq!(Scalar::from_hex("3cf102a").unwrap(), Scalar::from(0x3cf102au64));
    }

    #[test]
    fn overflowing_hex_is_rejected() {
        let too_wide = "01".repeat(Scalar::LEN + 1);
        assert_eq!(Scalar::from_hex(&too_wide), Err(HexError::Overflow));
    }

    #[test]
    fn u128_conversion_detects_wide_values() {
        assert_eq!(Scalar::from(42u64).to_u128(), Some(42));

        let mut wide = [0u8; Scalar::LEN];
        wide[0] = 1;
        assert_eq!(Scalar::new(wide).to_u128(), None);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Scalar::from(2u64) < Scalar::from(10u64));
        assert!(Scalar::from(1u128 << 100) > Scalar::from(u64::MAX));
    }
}
