//! Fuzzy destination matching for movement commands
//!
//! Free-text destinations are typed by humans, so they get normalized and then
//! compared to room names by prefix or by a bounded edit distance.

use unicode_normalization::UnicodeNormalization;

/// Fraction of a room name's length that may be mistyped
const EDIT_DISTANCE_RATIO: f64 = 0.25;

/// Possessive suffixes stripped from names ("Sarah's office" -> "sarah_office")
const POSSESSIVES: &[&str] = &["'s", "\u{2019}s"];

/// Normalize a room name or typed destination for comparison
///
/// NFC composition, lower-case, possessives stripped, whitespace runs
/// collapsed to a single underscore. Idempotent.
pub fn normalize_name(raw: &str) -> String {
    let mut out: String = raw.nfc().collect::<String>().to_lowercase().nfc().collect();

    // stripping can expose a new suffix ("''ss") or a new composition, so repeat until stable
    loop {
        let stripped: String = POSSESSIVES
            .iter()
            .fold(out.clone(), |acc, suffix| acc.replace(suffix, ""))
            .nfc()
            .collect();
        if stripped == out {
            break;
        }
        out = stripped;
    }

    out.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Levenshtein distance counted in chars
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Maximum edits tolerated against a normalized room name
pub fn distance_threshold(normalized_room: &str) -> usize {
    let len = normalized_room.chars().count() as f64;
    (len * EDIT_DISTANCE_RATIO).ceil() as usize
}

/// Whether an already-normalized destination matches an already-normalized room name
pub fn matches_room(normalized_desired: &str, normalized_room: &str) -> bool {
    normalized_room.starts_with(normalized_desired)
        || edit_distance(normalized_desired, normalized_room) <= distance_threshold(normalized_room)
}
