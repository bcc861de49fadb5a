//! Opaque single-use tokens (invitations)
//!
//! A token is `inv_` followed by 40 base62 characters. Only its SHA-256 hex
//! digest is stored, so a database leak does not expose usable links.

use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

const TOKEN_RANDOM_LENGTH: usize = 40;

pub const INVITE_PREFIX: &str = "inv_";

pub const INVITE_TOKEN_LENGTH: usize = INVITE_PREFIX.len() + TOKEN_RANDOM_LENGTH;

/// Generates a token and its hash. The plaintext goes to the recipient, the
/// hash to the database.
pub fn generate_token(prefix: &str) -> (String, String) {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LENGTH)
        .map(char::from)
        .collect();

    let token = format!("{}{}", prefix, random);
    let hash = hash_token(&token);
    (token, hash)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cheap shape check before touching the database.
pub fn validate_token_format(token: &str, prefix: &str) -> bool {
    token.len() == prefix.len() + TOKEN_RANDOM_LENGTH
        && token.starts_with(prefix)
        && token[prefix.len()..].chars().all(|c| c.is_ascii_alphanumeric())
}

/// Compares two strings without short-circuiting on the first difference.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let (token, hash) = generate_token(INVITE_PREFIX);
        let (other, other_hash) = generate_token(INVITE_PREFIX);

        assert!(token.starts_with("inv_"));
        assert_eq!(token.len(), INVITE_TOKEN_LENGTH);
        assert_eq!(hash.len(), 64);
        assert_ne!(token, other);
        assert_ne!(hash, other_hash);
        assert_eq!(hash_token(&token), hash);
    }

    #[test]
    fn test_validate_token_format() {
        let (token, _) = generate_token(INVITE_PREFIX);
        assert!(validate_token_format(&token, INVITE_PREFIX));

        assert!(!validate_token_format("inv_short", INVITE_PREFIX));
        assert!(!validate_token_format(&token.replacen("inv_", "key_", 1), INVITE_PREFIX));

        let bad_chars = format!("inv_{}", "!".repeat(40));
        assert!(!validate_token_format(&bad_chars, INVITE_PREFIX));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
