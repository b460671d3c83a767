//! Loom identifiers: RFC 4122 v4 UUIDs with a compact base-36 form.
//!
//! The base-36 form treats the 128-bit value as a big-endian integer and
//! renders it as 25 lowercase digits, zero-padded. It round-trips with the
//! canonical hyphenated form.

use crate::error::{Error, ErrorCode, Result};
use uuid::Uuid;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A 128-bit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoomId(Uuid);

impl LoomId {
    /// Generate a fresh v4 identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the canonical hyphenated lowercase form.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error for malformed input.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::new(ErrorCode::Parse, format!("invalid UUID '{s}': {e}")))
    }

    /// The raw 16 bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// 25-character base-36 encoding of the big-endian 128-bit value.
    #[must_use]
    pub fn to_base36(&self) -> String {
        let mut n = self.0.as_u128();
        let mut buf = [b'0'; 25];
        for slot in buf.iter_mut().rev() {
            *slot = BASE36[(n % 36) as usize];
            n /= 36;
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Decode a 25-character base-36 string.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error for wrong length or invalid digits.
    pub fn from_base36(s: &str) -> Result<Self> {
        if s.len() != 25 {
            return Err(Error::new(
                ErrorCode::Parse,
                format!("base-36 id must be 25 characters, got {}", s.len()),
            ));
        }

        let mut n: u128 = 0;
        for c in s.chars() {
            let digit = match c {
                '0'..='9' => c as u128 - '0' as u128,
                'a'..='z' => c as u128 - 'a' as u128 + 10,
                'A'..='Z' => c as u128 - 'A' as u128 + 10,
                _ => {
                    return Err(Error::new(
                        ErrorCode::Parse,
                        format!("invalid base-36 character '{c}'"),
                    ))
                }
            };
            n = n
                .checked_mul(36)
                .and_then(|n| n.checked_add(digit))
                .ok_or_else(|| {
                    Error::new(ErrorCode::Parse, "base-36 id out of 128-bit range")
                })?;
        }

        Ok(Self(Uuid::from_u128(n)))
    }
}

impl std::fmt::Display for LoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Canonical 8-4-4-4-12 lowercase hex.
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_version_and_variant_bits() {
        for _ in 0..32 {
            let id = LoomId::generate();
            let s = id.to_string();
            assert_eq!(s.len(), 36);
            assert_eq!(s.as_bytes()[14], b'4', "version nibble in {s}");
            let variant = id.as_bytes()[8] >> 6;
            assert_eq!(variant, 0b10, "variant bits in {s}");
        }
    }

    #[test]
    fn string_roundtrip() {
        let id = LoomId::generate();
        let parsed = LoomId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn base36_roundtrip() {
        for _ in 0..32 {
            let id = LoomId::generate();
            let encoded = id.to_base36();
            assert_eq!(encoded.len(), 25);
            assert_eq!(LoomId::from_base36(&encoded).unwrap(), id);
        }
    }

    #[test]
    fn base36_zero_pads() {
        let id = LoomId::parse("00000000-0000-0000-0000-000000000001").unwrap();
        let encoded = id.to_base36();
        assert_eq!(encoded, "0000000000000000000000001");
        assert_eq!(LoomId::from_base36(&encoded).unwrap(), id);
    }

    #[test]
    fn base36_rejects_bad_input() {
        assert!(LoomId::from_base36("short").is_err());
        assert!(LoomId::from_base36("!!!!!!!!!!!!!!!!!!!!!!!!!").is_err());
    }
}
