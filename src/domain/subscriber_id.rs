//! Event subscriber identifier.
//!
//! [`SubscriberId`] is a newtype over the 32-character alphanumeric string
//! a WebSocket client presents (or is assigned) when it subscribes to an
//! event. Clients may pick their own ids, so no format is enforced on
//! ids that arrive over the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of a generated subscriber id.
pub const SUBSCRIBER_ID_LEN: usize = 32;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// Largest multiple of the alphabet size that fits in a byte.
const UNBIASED_LIMIT: u8 = 252;

// Bytes of a v4 uuid that carry the version and variant bits.
const FIXED_UUID_BYTES: [usize; 2] = [6, 8];

/// Identifier of one event subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Generates a fresh random id of 32 characters drawn uniformly from
    /// `0-9A-Z`.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = String::with_capacity(SUBSCRIBER_ID_LEN);
        while id.len() < SUBSCRIBER_ID_LEN {
            let random = uuid::Uuid::new_v4().into_bytes();
            let usable = random
                .iter()
                .enumerate()
                .filter(|(i, byte)| !FIXED_UUID_BYTES.contains(i) && **byte < UNBIASED_LIMIT)
                .filter_map(|(_, byte)| ALPHABET.get(usize::from(*byte) % ALPHABET.len()));
            for &c in usable {
                if id.len() == SUBSCRIBER_ID_LEN {
                    break;
                }
                id.push(char::from(c));
            }
        }
        Self(id)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<SubscriberId> for String {
    fn from(id: SubscriberId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(SubscriberId::generate(), SubscriberId::generate());
    }

    #[test]
    fn generated_id_is_32_alphanumeric() {
        let id = SubscriberId::generate();
        assert_eq!(id.as_str().len(), SUBSCRIBER_ID_LEN);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn generated_ids_use_letters_past_f() {
        // 64 ids give 2048 characters; the chance of never drawing one of
        // the 20 letters G-Z is (16/36)^2048.
        let seen_high = (0..64)
            .map(|_| SubscriberId::generate())
            .any(|id| id.as_str().chars().any(|c| ('G'..='Z').contains(&c)));
        assert!(seen_high);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = SubscriberId::from("CLIENT1");
        assert_eq!(
            serde_json::to_value(&id).ok(),
            Some(serde_json::json!("CLIENT1"))
        );
    }
}
