//! Conversation identifiers
//!
//! A conversation between two users is keyed by their identities sorted
//! lexicographically and joined with [`SEPARATOR`]. Identities may not contain
//! the separator, which keeps the key collision-free and lets it be split back
//! into its two participants.

use crate::error::{Error, Result};

pub const SEPARATOR: char = ':';

/// Reject identities that would make a conversation key ambiguous.
pub fn validate_identity(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(Error::Validation("User id must not be empty".to_string()));
    }
    if user_id.contains(SEPARATOR) {
        return Err(Error::Validation(format!(
            "User id must not contain '{}'",
            SEPARATOR
        )));
    }
    Ok(())
}

/// Derive the conversation key for two participants, independent of argument order.
pub fn conversation_id(a: &str, b: &str) -> Result<String> {
    validate_identity(a)?;
    validate_identity(b)?;
    if a == b {
        return Err(Error::Validation(
            "A conversation needs two distinct participants".to_string(),
        ));
    }

    let (first, second) = if a < b { (a, b) } else { (b, a) };
    Ok(format!("{}{}{}", first, SEPARATOR, second))
}

/// Split a conversation key into its two participants.
pub fn participants(conversation_id: &str) -> Option<(&str, &str)> {
    let (first, second) = conversation_id.split_once(SEPARATOR)?;
    if first.is_empty() || second.is_empty() || second.contains(SEPARATOR) {
        return None;
    }
    Some((first, second))
}

pub fn is_participant(conversation_id: &str, user_id: &str) -> bool {
    participants(conversation_id)
        .map(|(a, b)| a == user_id || b == user_id)
        .unwrap_or(false)
}

pub fn ensure_participant(conversation_id: &str, user_id: &str) -> Result<()> {
    if participants(conversation_id).is_none() {
        return Err(Error::Validation(format!(
            "Malformed conversation id: {}",
            conversation_id
        )));
    }
    if !is_participant(conversation_id, user_id) {
        return Err(Error::Forbidden(
            "Not a participant of this conversation".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_order_independent() {
        let pairs = [("alice", "bob"), ("u-2", "u-10"), ("Z", "a"), ("x", "xy")];
        for (a, b) in pairs {
            assert_eq!(conversation_id(a, b).unwrap(), conversation_id(b, a).unwrap());
        }
    }

    #[test]
    fn test_id_sorts_lexicographically() {
        assert_eq!(conversation_id("bob", "alice").unwrap(), "alice:bob");
    }

    #[test]
    fn test_id_rejects_separator_and_self() {
        assert!(matches!(
            conversation_id("a:b", "c"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(conversation_id("", "c"), Err(Error::Validation(_))));
        assert!(matches!(
            conversation_id("same", "same"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_participants() {
        let id = conversation_id("carol", "bob").unwrap();
        assert_eq!(participants(&id), Some(("bob", "carol")));
        assert!(is_participant(&id, "carol"));
        assert!(!is_participant(&id, "dave"));
        assert_eq!(participants("no-separator"), None);
        assert_eq!(participants("a:b:c"), None);
    }

    #[test]
    fn test_ensure_participant() {
        let id = conversation_id("a", "b").unwrap();
        assert!(ensure_participant(&id, "a").is_ok());
        assert!(matches!(
            ensure_participant(&id, "c"),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            ensure_participant("garbage", "a"),
            Err(Error::Validation(_))
        ));
    }
}
