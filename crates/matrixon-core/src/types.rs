//! Core types for Matrixon
//!
//! Numeric identifiers, room-scoped pseudo-identity keys and the request
//! shapes exchanged with the membership engine.

use std::fmt;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use rand::{rngs::OsRng, Rng};
use ruma::{OwnedRoomId, OwnedUserId};
use serde::{Deserialize, Serialize};

use crate::{MatrixonError, Result};

/// Compact internal identifier for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserNid(pub i64);

/// Compact internal identifier for a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomNid(pub i64);

impl fmt::Display for UserNid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RoomNid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Private half of a room-scoped pseudo-identity.
///
/// Only held for users local to this server. The public half is always
/// derived from it, so a private key can never be paired with the wrong
/// public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PseudoIdKey(SigningKey);

impl PseudoIdKey {
    /// Generate a fresh key from the operating system RNG
    pub fn generate() -> Self {
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        OsRng.fill(&mut seed);
        Self(SigningKey::from_bytes(&seed))
    }

    /// Rebuild a key from its stored 32-byte seed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let seed: [u8; SECRET_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            MatrixonError::Database(format!(
                "pseudo-id private key has {} bytes, expected {}",
                bytes.len(),
                SECRET_KEY_LENGTH
            ))
        })?;
        Ok(Self(SigningKey::from_bytes(&seed)))
    }

    /// Seed bytes as persisted
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PseudoIdPublicKey {
        PseudoIdPublicKey(self.0.verifying_key().to_bytes())
    }
}

impl fmt::Debug for PseudoIdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PseudoIdKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Public half of a room-scoped pseudo-identity
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PseudoIdPublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PseudoIdPublicKey {
    /// Parse and validate a 32-byte ed25519 public key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            MatrixonError::Database(format!(
                "pseudo-id public key has {} bytes, expected {}",
                bytes.len(),
                PUBLIC_KEY_LENGTH
            ))
        })?;
        VerifyingKey::from_bytes(&raw)
            .map_err(|e| MatrixonError::Validation(format!("invalid ed25519 public key: {e}")))?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for PseudoIdPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PseudoIdPublicKey({})", STANDARD_NO_PAD.encode(self.0))
    }
}

/// The identity a user presents as event sender inside one room.
///
/// Encoded as unpadded base64 of the pseudo-identity public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    pub fn from_public_key(key: &PseudoIdPublicKey) -> Self {
        Self(STANDARD_NO_PAD.encode(key.as_bytes()))
    }

    /// Accept a sender id received from a client or remote server
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let sender = Self(raw.into());
        sender.to_public_key()?;
        Ok(sender)
    }

    /// Decode the public key this sender id stands for
    pub fn to_public_key(&self) -> Result<PseudoIdPublicKey> {
        let bytes = STANDARD_NO_PAD
            .decode(&self.0)
            .map_err(|e| MatrixonError::Validation(format!("sender id is not base64: {e}")))?;
        PseudoIdPublicKey::from_bytes(&bytes)
            .map_err(|e| MatrixonError::Validation(format!("sender id is not a public key: {e}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated client device.
///
/// `user_id` is kept as the raw string the device was registered with; it
/// is validated by whoever acts on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub user_id: String,
    pub device_id: String,
}

/// The pseudo-identity and the real user behind one membership change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderUserIdPair {
    pub sender_id: SenderId,
    pub user_id: OwnedUserId,
}

/// Instruction handed to the membership engine for a leave
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformLeaveRequest {
    pub room_id: OwnedRoomId,
    pub leaver: SenderUserIdPair,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_private_key_roundtrips_through_seed() {
        let key = PseudoIdKey::generate();
        let restored = PseudoIdKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(key, restored);
        assert_eq!(key.public_key(), restored.public_key());
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(PseudoIdKey::generate(), PseudoIdKey::generate());
    }

    #[test]
    fn test_wrong_length_key_bytes_are_rejected() {
        assert!(matches!(
            PseudoIdKey::from_bytes(&[0u8; 31]),
            Err(MatrixonError::Database(_))
        ));
        assert!(matches!(
            PseudoIdPublicKey::from_bytes(&[0u8; 64]),
            Err(MatrixonError::Database(_))
        ));
    }

    #[test]
    fn test_sender_id_decodes_to_public_key() {
        let key = PseudoIdKey::generate();
        let sender = SenderId::from_public_key(&key.public_key());
        assert!(!sender.as_str().ends_with('='));
        assert_eq!(sender.to_public_key().unwrap(), key.public_key());
    }

    #[test]
    fn test_garbage_sender_id_is_a_validation_error() {
        let sender = SenderId("@alice:example.org".to_owned());
        assert!(matches!(sender.to_public_key(), Err(MatrixonError::Validation(_))));
    }

    #[test]
    fn test_parse_accepts_only_encoded_keys() {
        let key = PseudoIdKey::generate();
        let encoded = SenderId::from_public_key(&key.public_key());
        assert_eq!(SenderId::parse(encoded.as_str()).unwrap(), encoded);
        assert!(SenderId::parse("AAAA").is_err());
    }

    #[test]
    fn test_debug_does_not_print_seed() {
        let key = PseudoIdKey::generate();
        let debug = format!("{key:?}");
        let seed = STANDARD_NO_PAD.encode(key.to_bytes());
        assert!(!debug.contains(&seed));
    }
}
