//! Weighted score fusion

use super::{SearchResult, Signal, SignalHits};

use pocket_core::SearchConfig;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Weighted sum of the three signal scores; a signal that did not fire contributes 0
pub fn total_score(vector_score: f64, fts_score: f64, fuzzy_score: f64, config: &SearchConfig) -> f64 {
    vector_score * config.vector_weight + fts_score * config.fts_weight + fuzzy_score * config.fuzzy_weight
}

/// Merge per-signal hits by record id, score, filter by `min_total_score`, rank and truncate
///
/// Reasons are appended in signal order (vector, text, fuzzy). Equal totals are ordered most
/// recent first, then by id.
pub fn fuse(mut partials: Vec<SignalHits>, config: &SearchConfig, limit: usize) -> Vec<SearchResult> {
    partials.sort_by_key(|partial| partial.signal);

    let mut merged: HashMap<String, SearchResult> = HashMap::new();
    for partial in partials {
        let mut seen: HashSet<String> = HashSet::new();
        for hit in partial.hits {
            if !seen.insert(hit.record.id.clone()) {
                continue;
            }

            let result = merged
                .entry(hit.record.id.clone())
                .or_insert_with(|| SearchResult::new(hit.record));
            match partial.signal {
                Signal::Vector => result.vector_score = hit.score,
                Signal::FullText => result.fts_score = hit.score,
                Signal::Fuzzy => result.fuzzy_score = hit.score,
            }
            result.match_reasons.push(format!("{}: {:.3}", partial.signal.reason_label(), hit.score));
        }
    }

    let mut results: Vec<SearchResult> = merged
        .into_values()
        .map(|mut result| {
            result.total_score = total_score(result.vector_score, result.fts_score, result.fuzzy_score, config);
            result
        })
        .filter(|result| result.total_score >= config.min_total_score)
        .collect();

    results.sort_by(rank_order);
    results.truncate(limit);
    results
}

/// Total score descending, then created descending, then id ascending
pub fn rank_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.total_score
        .total_cmp(&a.total_score)
        .then_with(|| b.record.created.cmp(&a.record.created))
        .then_with(|| a.record_id.cmp(&b.record_id))
}
