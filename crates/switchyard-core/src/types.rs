//! Fixed-width identifier types shared across the crate.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Size of an address in bytes.
pub const ADDRESS_SIZE: usize = 32;

/// Size of a route key in bytes.
pub const ROUTE_KEY_SIZE: usize = 4;

/// Errors that can occur when parsing identifier types from text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TypeParseError {
    /// The hex string decodes to the wrong number of bytes.
    #[error("invalid length for {kind}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// The type being parsed (`address` or `route key`).
        kind: &'static str,
        /// The expected byte length.
        expected: usize,
        /// The actual byte length.
        actual: usize,
    },

    /// The input is not valid hex.
    #[error("invalid hex for {kind}: {value}")]
    InvalidHex {
        /// The type being parsed.
        kind: &'static str,
        /// The offending input.
        value: String,
    },
}

/// A 32-byte instance or code-unit address.
///
/// Addresses are derived from hashes (see [`crate::crypto`]) and displayed
/// as `0x`-prefixed lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Self = Self([0u8; ADDRESS_SIZE]);

    /// Creates an address from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the address.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Parses an address from a hex string, with or without a `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`TypeParseError`] if the input is not valid hex or decodes
    /// to the wrong length.
    pub fn parse(s: &str) -> Result<Self, TypeParseError> {
        let bytes = parse_hex("address", s)?;
        let actual = bytes.len();
        let arr: [u8; ADDRESS_SIZE] =
            bytes
                .try_into()
                .map_err(|_| TypeParseError::InvalidLength {
                    kind: "address",
                    expected: ADDRESS_SIZE,
                    actual,
                })?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A fixed-width route key selecting which handler answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey([u8; ROUTE_KEY_SIZE]);

impl RouteKey {
    /// Creates a route key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ROUTE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the route key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ROUTE_KEY_SIZE] {
        &self.0
    }

    /// Parses a route key from a hex string, with or without a `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`TypeParseError`] if the input is not valid hex or decodes
    /// to the wrong length.
    pub fn parse(s: &str) -> Result<Self, TypeParseError> {
        let bytes = parse_hex("route key", s)?;
        let actual = bytes.len();
        let arr: [u8; ROUTE_KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| TypeParseError::InvalidLength {
                    kind: "route key",
                    expected: ROUTE_KEY_SIZE,
                    actual,
                })?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

fn parse_hex(kind: &'static str, s: &str) -> Result<Vec<u8>, TypeParseError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|_| TypeParseError::InvalidHex {
        kind,
        value: s.to_string(),
    })
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddressVisitor;

        impl Visitor<'_> for AddressVisitor {
            type Value = Address;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a 0x-prefixed 32-byte hex address")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Address::parse(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(AddressVisitor)
    }
}

impl Serialize for RouteKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RouteKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RouteKeyVisitor;

        impl Visitor<'_> for RouteKeyVisitor {
            type Value = RouteKey;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a 0x-prefixed 4-byte hex route key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                RouteKey::parse(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(RouteKeyVisitor)
    }
}

/// Serde adapter encoding `Vec<u8>` as lowercase hex.
///
/// Used for code and content payloads in snapshots so the persisted form
/// stays compact and diffable.
pub(crate) mod hex_bytes {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                hex::decode(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_roundtrip() {
        let addr = Address::from_bytes([0xab; 32]);
        let text = addr.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(Address::parse(&text).unwrap(), addr);
    }

    #[test]
    fn address_parse_without_prefix() {
        let addr = Address::from_bytes([7; 32]);
        let bare = hex::encode(addr.as_bytes());
        assert_eq!(Address::parse(&bare).unwrap(), addr);
    }

    #[test]
    fn address_parse_rejects_wrong_length() {
        let err = Address::parse("0xdeadbeef").unwrap_err();
        match err {
            TypeParseError::InvalidLength {
                expected, actual, ..
            } => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 4);
            },
            other => panic!("expected InvalidLength, got {other:?}"),
        }
    }

    #[test]
    fn route_key_parse_rejects_bad_hex() {
        let err = RouteKey::parse("0xzzzz").unwrap_err();
        assert!(matches!(err, TypeParseError::InvalidHex { .. }));
    }

    #[test]
    fn route_key_serde_as_hex_string() {
        let key = RouteKey::from_bytes([1, 2, 3, 4]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"0x01020304\"");
        let back: RouteKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
