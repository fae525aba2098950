/// Random secrets: device API keys, activation and password-reset tokens
///
/// # Formats
///
/// - **Device API key**: 16 random bytes, lowercase hex (32 chars). The key
///   is embedded in the iSpindel firmware URL, so it is stored as-is and
///   looked up directly.
/// - **Secret token**: 32 random bytes, lowercase hex (64 chars). Sent by
///   email; only its SHA-256 hex digest is stored.
///
/// # Example
///
/// ```
/// use ispindel_shared::auth::tokens::{generate_api_key, generate_secret_token, hash_token};
///
/// let key = generate_api_key();
/// assert_eq!(key.len(), 32);
///
/// let token = generate_secret_token();
/// assert_eq!(token.len(), 64);
/// assert_eq!(hash_token(&token), hash_token(&token));
/// ```

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Bytes of randomness in a device API key
const API_KEY_BYTES: usize = 16;

/// Bytes of randomness in an emailed token
const SECRET_TOKEN_BYTES: usize = 32;

/// Length of a device API key in hex characters
pub const API_KEY_LENGTH: usize = API_KEY_BYTES * 2;

/// Generates a device API key
pub fn generate_api_key() -> String {
    random_hex(API_KEY_BYTES)
}

/// Generates an activation or password-reset token
pub fn generate_secret_token() -> String {
    random_hex(SECRET_TOKEN_BYTES)
}

/// SHA-256 hex digest used to store emailed tokens
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks that a string looks like a device API key
///
/// Used to short-circuit obviously malformed keys before touching the
/// database.
pub fn is_valid_api_key_format(key: &str) -> bool {
    key.len() == API_KEY_LENGTH && key.chars().all(|c| c.is_ascii_hexdigit())
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_api_key_format() {
        let key = generate_api_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(is_valid_api_key_format(&key));
    }

    #[test]
    fn test_secret_token_format() {
        let token = generate_secret_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<String> = (0..200).map(|_| generate_api_key()).collect();
        assert_eq!(keys.len(), 200);
    }

    #[test]
    fn test_hash_token() {
        let hash = hash_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[test]
    fn test_invalid_api_key_formats() {
        assert!(!is_valid_api_key_format(""));
        assert!(!is_valid_api_key_format("deadbeef"));
        assert!(!is_valid_api_key_format("zz16fb3a1f2c4e0d8a9b7c6d5e4f3a2b"));
        assert!(!is_valid_api_key_format(&format!("{}0", generate_api_key())));
    }
}
