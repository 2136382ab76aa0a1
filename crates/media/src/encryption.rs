//! E2EE pass-through metadata
//!
//! The SFU never touches key material; it carries encryption metadata for
//! signaling and enforces presence when a room demands it.

use serde::{Deserialize, Serialize};

use crate::MediaError;

/// E2EE metadata declared by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub algorithm: String,
    pub key_id: u32,
    #[serde(default)]
    pub sender_key: Vec<u8>,
}

/// Check a peer's encryption metadata against the room's E2EE requirement.
pub fn validate_e2ee(required: bool, enc: Option<&EncryptionInfo>) -> Result<(), MediaError> {
    if !required {
        return Ok(());
    }
    match enc {
        None => Err(MediaError::E2eeMissing),
        Some(info) if info.algorithm.is_empty() => Err(MediaError::E2eeNoAlgorithm),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_required_accepts_anything() {
        validate_e2ee(false, None).unwrap();
    }

    #[test]
    fn test_required_rejects_missing_and_empty() {
        assert!(matches!(
            validate_e2ee(true, None),
            Err(MediaError::E2eeMissing)
        ));
        let empty = EncryptionInfo {
            algorithm: String::new(),
            key_id: 0,
            sender_key: vec![],
        };
        assert!(matches!(
            validate_e2ee(true, Some(&empty)),
            Err(MediaError::E2eeNoAlgorithm)
        ));
    }

    #[test]
    fn test_required_accepts_declared() {
        let enc = EncryptionInfo {
            algorithm: "aes-256-gcm".into(),
            key_id: 1,
            sender_key: vec![1, 2, 3],
        };
        validate_e2ee(true, Some(&enc)).unwrap();
    }
}
