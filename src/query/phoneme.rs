//! The phoneme inventory shared by every acoustic model.

/// All phonemes, in the index order the models were trained with.
pub const PHONEME_LIST: [&str; 45] = [
    "pau", "A", "E", "I", "N", "O", "U", "a", "b", "by", "ch", "cl", "d", "dy", "e", "f", "g",
    "gw", "gy", "h", "hy", "i", "j", "k", "kw", "ky", "m", "my", "n", "ny", "o", "p", "py", "r",
    "ry", "s", "sh", "t", "ts", "ty", "u", "v", "w", "y", "z",
];

pub const NUM_PHONEMES: usize = PHONEME_LIST.len();

/// Phonemes that may end a mora.
pub const MORA_TAIL_PHONEMES: [&str; 13] = [
    "pau", "A", "E", "I", "N", "O", "U", "a", "cl", "e", "i", "o", "u",
];

/// Mora-tails whose pitch is always zero.
pub const UNVOICED_MORA_TAIL_PHONEMES: [&str; 7] = ["A", "I", "U", "E", "O", "cl", "pau"];

/// Id of a phoneme symbol. `sil` is an alias of `pau`.
pub fn phoneme_id(phoneme: &str) -> Option<i64> {
    let phoneme = if phoneme == "sil" { "pau" } else { phoneme };
    PHONEME_LIST
        .iter()
        .position(|&p| p == phoneme)
        .map(|i| i as i64)
}

pub fn is_mora_tail(phoneme: &str) -> bool {
    MORA_TAIL_PHONEMES.contains(&phoneme)
}

pub fn is_consonant(phoneme: &str) -> bool {
    phoneme_id(phoneme).is_some() && phoneme != "sil" && !is_mora_tail(phoneme)
}

pub fn is_unvoiced_mora_tail(phoneme: &str) -> bool {
    UNVOICED_MORA_TAIL_PHONEMES.contains(&phoneme)
}
