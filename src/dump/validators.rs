//! Per-kind semantic validators and the false-positive ASCII filter the dump
//! scanner applies before accepting a speculative candidate (spec §4.4).

use crate::binary::{is_uppercase_ascii, reverse_signature};

/// GPU debug-register prefixes observed colliding with record signatures in
/// captured memory (spec §4.4 step 2). Listed canonical; the reversed spelling is
/// checked alongside it since a console-layout dump stores signatures reversed.
const FALSE_POSITIVE_PREFIXES: &[[u8; 4]] = &[*b"VGT_", *b"SX_D", *b"SPI_"];

/// True if `sig` matches a known GPU-register false-positive prefix, canonical or
/// reversed spelling.
pub fn is_false_positive(sig: [u8; 4]) -> bool {
    FALSE_POSITIVE_PREFIXES
        .iter()
        .any(|&p| p == sig || reverse_signature(p) == sig)
}

/// True if `sig` reads as a plausible-looking record signature absent a registry
/// hit: every byte uppercase ASCII (spec §4.4 "Main-record header validation").
pub fn looks_like_unregistered_signature(sig: [u8; 4]) -> bool {
    is_uppercase_ascii(sig)
}

/// Editor-id validator (spec §8 property 3, GLOSSARY "Editor identifier"):
/// alphanumeric-or-underscore, starts with a letter, length >= 2, and does not
/// contain any 2..6-byte substring repeated 3 or more times (a cheap "looks like
/// garbage" filter for bytes misread as text).
pub fn is_valid_editor_id(s: &str) -> bool {
    if s.len() < 2 {
        return false;
    }
    let bytes = s.as_bytes();
    if !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    if !bytes.iter().all(|&b| b.is_ascii_alphanumeric() || b == b'_') {
        return false;
    }
    !has_repeated_substring(bytes)
}

fn has_repeated_substring(bytes: &[u8]) -> bool {
    for len in 2..=6usize.min(bytes.len()) {
        let mut counts = std::collections::HashMap::new();
        for window in bytes.windows(len) {
            let count = counts.entry(window).or_insert(0u32);
            *count += 1;
            if *count >= 3 {
                return true;
            }
        }
    }
    false
}
