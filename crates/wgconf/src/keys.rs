// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Curve25519 key handling. WireGuard keys travel as base64 of 32 raw bytes.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use x25519_dalek::{PublicKey as DalekPublic, StaticSecret};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("failed to decode base64 key: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

pub fn decode_key(b64: &str) -> Result<[u8; 32], KeyError> {
    let bytes = BASE64.decode(b64.trim())?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| KeyError::InvalidLength(len))
}

#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self(secret.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        PublicKey(*DalekPublic::from(&secret).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for PrivateKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64.encode(self.0))
    }
}

impl FromStr for PrivateKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_key(s).map(Self)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64.encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_key(s).map(Self)
    }
}

macro_rules! base64_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

base64_serde!(PrivateKey);
base64_serde!(PublicKey);

/// A fresh private key from the OS random source.
pub fn generate_key() -> PrivateKey {
    PrivateKey::generate()
}

/// Base64 public key for a base64 private key.
pub fn derive_public(private_key: &str) -> Result<String, KeyError> {
    let key: PrivateKey = private_key.parse()?;
    Ok(key.public_key().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(
        "9ZFnCUpTWG3/rOLWXr1Yx5nHY6TawlthxoVl9WsPWJk=",
        "clrrtKlXuXnbDXN7nM00fMytLHDzaAGChERA1Pmvqns=" ; "first vector"
    )]
    #[test_case(
        "aJ7VaCMQNg0qIQ5Xa3xYJQpF9OZaWk/PQRFYtHxyWVE=",
        "ZJMdTDweEMnyoSxa88HWulr3NUtkqhldHHNG/Oup9iM=" ; "second vector"
    )]
    fn derive_known_public(private: &str, public: &str) {
        assert_eq!(derive_public(private).unwrap(), public);
    }

    #[test]
    fn derive_is_stable() {
        let key = generate_key().to_string();
        assert_eq!(derive_public(&key).unwrap(), derive_public(&key).unwrap());
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(generate_key(), generate_key());
    }

    #[test_case("not base64!" ; "bad alphabet")]
    #[test_case("AAAA" ; "too short")]
    #[test_case("" ; "empty")]
    fn derive_rejects_invalid(input: &str) {
        assert!(derive_public(input).is_err());
    }

    #[test]
    fn wrong_length_reports_length() {
        let short = BASE64.encode([7u8; 16]);
        assert_eq!(derive_public(&short), Err(KeyError::InvalidLength(16)));
    }

    #[test]
    fn private_debug_is_redacted() {
        let key = generate_key();
        let debug = format!("{key:?}");
        assert!(!debug.contains(&key.to_string()));
    }

    #[test]
    fn display_round_trips() {
        let key = generate_key();
        let parsed: PrivateKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.public_key(), key.public_key());
    }
}
