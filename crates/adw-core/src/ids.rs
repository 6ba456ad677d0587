//! Run identifiers
//!
//! A run id is an 8-character lowercase base-36 key. It doubles as the
//! primary key of the state store and as the input to deterministic
//! port allocation, so the alphabet is restricted to `0-9a-z`.

use rand::Rng;

/// Length of a run id
pub const RUN_ID_LEN: usize = 8;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a fresh 8-character run id.
pub fn generate_run_id() -> String {
    let mut rng = rand::thread_rng();
    (0..RUN_ID_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Check that a candidate id has the expected shape.
pub fn is_valid_run_id(id: &str) -> bool {
    id.len() == RUN_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}
