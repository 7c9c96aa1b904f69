//! Key generation for stored content
//!
//! Keys are 8 characters drawn uniformly from digits and lowercase ASCII
//! letters, giving a keyspace of 36^8 (about 2.8 * 10^12).

use rand::Rng;

/// Symbols a key may contain
pub const KEY_ALPHABET: &[u8; 36] = b"1234567890abcdefghijklmnopqrstuvwxyz";

/// Length of every generated key
pub const KEY_LENGTH: usize = 8;

/// Generate a new random key
///
/// Uses the thread-local CSPRNG, so successive keys carry no predictable
/// sequence. Generation cannot fail.
pub fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    (0..KEY_LENGTH)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Check that a string has the shape of a generated key
pub fn is_valid_key(key: &str) -> bool {
    key.len() == KEY_LENGTH && key.bytes().all(|b| KEY_ALPHABET.contains(&b))
}
