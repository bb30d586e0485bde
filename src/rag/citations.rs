// Citation list: one entry per source document, first-seen order
use std::collections::HashSet;

use crate::types::{CitationEntry, Cited, RankedHit};

/// Drop repeated `doc_id`s, keeping the first occurrence of each
pub fn dedupe<T: Cited + Clone>(hits: &[T]) -> Vec<T> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(hits.len());
    hits.iter()
        .filter(|hit| seen.insert(hit.doc_id()))
        .cloned()
        .collect()
}

/// Render ranked hits as display entries, one per document
pub fn citations(hits: &[RankedHit]) -> Vec<CitationEntry> {
    dedupe(hits)
        .iter()
        .map(|ranked| CitationEntry::from(&ranked.hit))
        .collect()
}
