//! Closeness scoring for free-text answers and numeric guesses.

use std::collections::{BTreeMap, BTreeSet};

/// Guesses further than 30% from the target score nothing
const RELATIVE_ERROR_MARGIN: f64 = 0.3;

/// Both compared strings form the whole corpus
const CORPUS_SIZE: f64 = 2.0;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn term_counts(tokens: &[String]) -> BTreeMap<&str, f64> {
    let mut counts = BTreeMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Cosine similarity in [0,1] between TF-IDF vectors of `a` and `b`, each
/// treated as one document in a two-document corpus.
///
/// With only two documents the IDF degenerates: terms appearing in both
/// strings get `1 + ln(2/3)` while exclusive terms get `1 + ln(1)`, so
/// matching the reference text's distinctive vocabulary counts for more than
/// matching words both sides use anyway. That skew is the intended scoring
/// feel; keep the arithmetic as is.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    let counts_a = term_counts(&tokens_a);
    let counts_b = term_counts(&tokens_b);

    let terms: BTreeSet<&str> = counts_a.keys().chain(counts_b.keys()).copied().collect();

    let mut dot = 0.0;
    let mut magnitude_a = 0.0;
    let mut magnitude_b = 0.0;

    for term in terms {
        let tf_a = counts_a.get(term).copied().unwrap_or(0.0);
        let tf_b = counts_b.get(term).copied().unwrap_or(0.0);

        let document_frequency = (tf_a > 0.0) as u32 + (tf_b > 0.0) as u32;
        let idf = 1.0 + (CORPUS_SIZE / (1.0 + f64::from(document_frequency))).ln();

        let weight_a = tf_a * idf;
        let weight_b = tf_b * idf;
        dot += weight_a * weight_b;
        magnitude_a += weight_a * weight_a;
        magnitude_b += weight_b * weight_b;
    }

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot / (magnitude_a.sqrt() * magnitude_b.sqrt())
}

/// Score a raw numeric guess against the target: 1 for an exact match,
/// linear falloff to 0 at a 30% relative error, 0 beyond it.
///
/// Unparsable input scores 0 rather than erroring. A target of 0 makes the
/// relative error undefined, so any inexact guess fails closed to 0.
pub fn number_proximity(guess_raw: &str, target: f64) -> f64 {
    let Ok(guess) = guess_raw.trim().parse::<f64>() else {
        return 0.0;
    };
    if !guess.is_finite() || !target.is_finite() {
        return 0.0;
    }

    let diff = (guess - target).abs();
    if diff == 0.0 {
        return 1.0;
    }
    if target == 0.0 {
        return 0.0;
    }

    let relative_error = diff / target.abs();
    if relative_error > RELATIVE_ERROR_MARGIN {
        return 0.0;
    }
    (1.0 - relative_error / RELATIVE_ERROR_MARGIN).max(0.0)
}
