//! Opaque token generation.
//!
//! A token is two 13-character base-36 fragments (26 characters, ~134 bits).
//! Uniqueness comes from entropy; storage is never consulted.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const FRAGMENT_LEN: usize = 13;

pub const TOKEN_LEN: usize = FRAGMENT_LEN * 2;

pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let mut token = String::with_capacity(TOKEN_LEN);
    for _ in 0..2 {
        token.push_str(&fragment(&mut rng));
    }
    token
}

fn fragment<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..FRAGMENT_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Cheap shape check applied to caller-supplied tokens before hitting storage
pub fn looks_like_token(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 128
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
