//! Fuzzy string similarity on a 0-100 scale
//!
//! `ratio` is the normalized indel similarity from `rapidfuzz`. `partial_ratio` slides the
//! shorter string over the longer one and keeps the best window. `token_set_ratio` compares the
//! shared and differing token sets so word order and repetition do not matter.

use rapidfuzz::distance::indel;
use std::collections::{BTreeSet, HashSet};

/// Similarity of two whole strings
pub fn ratio(a: &str, b: &str) -> u8 {
    to_score(indel::normalized_similarity(a.chars(), b.chars()))
}

/// Best similarity of the shorter string against any same-length window of the longer one
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return if long.is_empty() { 100 } else { 0 };
    }

    let m = short.len();
    let n = long.len();
    let short_chars: HashSet<char> = short.iter().copied().collect();
    let mut best = 0.0_f64;

    let mut consider = |window: &[char]| {
        if best < 1.0 {
            best = best.max(indel::normalized_similarity(short.iter().copied(), window.iter().copied()));
        }
    };

    // Windows cut off at the start of the longer string.
    for end in 1..m.min(n + 1) {
        if short_chars.contains(&long[end - 1]) {
            consider(&long[..end]);
        }
    }

    for start in 0..=(n - m) {
        let window = &long[start..start + m];
        if short_chars.contains(&window[0]) || short_chars.contains(&window[m - 1]) {
            consider(window);
        }
    }

    // Windows cut off at the end.
    for start in (n - m + 1)..n {
        if short_chars.contains(&long[start]) {
            consider(&long[start..]);
        }
    }

    to_score(best)
}

/// Token-set similarity after lowercasing and stripping punctuation
///
/// Scores 100 when one string's tokens are a subset of the other's.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let a = default_process(a);
    let b = default_process(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersection.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100;
    }

    let sect = intersection.join(" ");
    let combined_ab = join_nonempty(&sect, &diff_ab.join(" "));
    let combined_ba = join_nonempty(&sect, &diff_ba.join(" "));

    ratio(&sect, &combined_ab)
        .max(ratio(&sect, &combined_ba))
        .max(ratio(&combined_ab, &combined_ba))
}

/// Lowercase, replace non-alphanumerics with spaces, and trim
pub fn default_process(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    replaced.trim().to_string()
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}

fn to_score(similarity: f64) -> u8 {
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}
