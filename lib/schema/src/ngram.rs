//! Character n-grams for the tfidf-like encoder

use fraudx_core::hashing::bucket;

/// Character n-grams of `text`, padded with `n - 1` spaces on each side.
///
/// Duplicates are kept so callers can count term frequency.
pub fn char_ngrams(text: &str, n: usize) -> Vec<String> {
    if text.is_empty() || n == 0 {
        return Vec::new();
    }

    let pad = " ".repeat(n - 1);
    let padded = format!("{}{}{}", pad, text, pad);
    let chars: Vec<char> = padded.chars().collect();

    if chars.len() < n {
        return Vec::new();
    }

    chars.windows(n).map(|w| w.iter().collect::<String>()).collect()
}

/// Term counts of the n-grams of `text` folded into `buckets` slots.
pub fn hashed_counts(text: &str, n: usize, buckets: usize) -> Vec<f64> {
    let mut counts = vec![0.0; buckets];
    for gram in char_ngrams(text, n) {
        counts[bucket(&gram, buckets as u64) as usize] += 1.0;
    }
    counts
}
