//! Random token material
//!
//! `thread_rng` is a CSPRNG reseeded from the operating system, which is
//! what every secret in the panel is drawn from.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Hex-encoded secret of at least 32 characters (16 random bytes).
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// 8-character alias drawn uniformly from `[a-zA-Z0-9]`.
#[must_use]
pub fn generate_short_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Uppercase hex block used for coupon batches and invite codes.
#[must_use]
pub fn generate_code_block(len: usize) -> String {
    let bytes: Vec<u8> = (0..len.div_ceil(2)).map(|_| rand::thread_rng().gen()).collect();
    hex::encode_upper(bytes)[..len].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_length_and_alphabet() {
        for _ in 0..100 {
            let token = generate_token();
            assert!(token.len() >= 32);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_tokens_distinct() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_short_code_shape() {
        for _ in 0..100 {
            let code = generate_short_code();
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_code_block_shape() {
        let block = generate_code_block(8);
        assert_eq!(block.len(), 8);
        assert!(block.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
