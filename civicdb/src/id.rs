use nanoid::nanoid;

/// Alphabet for lock owner tokens (no ambiguous glyphs).
const TOKEN_ALPHABET: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y',
    'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];
const TOKEN_LENGTH: usize = 24;

/// Generates the token a lock manager writes into every lock key it owns.
pub fn generate_owner_token() -> String {
    nanoid!(TOKEN_LENGTH, TOKEN_ALPHABET)
}
