//! Search hit records
//!
//! A [`SearchHit`] is validated once at the search boundary and never
//! mutated afterwards. Later stages wrap it instead of editing it: the
//! reranker produces [`RankedHit`], the citation list holds
//! [`CitationEntry`].

use serde::{Deserialize, Serialize};

/// A retrieved passage from the hybrid index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Source document id; one episode yields many passages
    pub doc_id: String,
    pub content: String,
    pub guest: String,
    pub title: String,
    pub episode_url: String,
    pub thumbnail_url: String,
    /// Episode duration in seconds
    pub length: u64,
    /// Retrieval score reported by the search service
    pub score: f32,
    /// Episode summary, when the index carries one
    #[serde(default)]
    pub summary: Option<String>,
}

/// A search hit with its calibrated relevance and position after reranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub hit: SearchHit,
    /// Cross-encoder relevance; in (0, 1) when calibration is applied
    pub rerank_score: f32,
    /// Zero-based position in the reranked order
    pub rank: usize,
}

/// A deduplicated hit rendered for display next to the answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationEntry {
    pub doc_id: String,
    pub title: String,
    pub guest: String,
    pub episode_url: String,
    pub thumbnail_url: String,
    /// Duration formatted as `HH:MM:SS`
    pub duration: String,
    pub content: String,
}

impl CitationEntry {
    /// Episode title up to the first `|`, used as an image caption
    pub fn caption(&self) -> &str {
        self.title.split('|').next().unwrap_or_default().trim()
    }
}

impl From<&SearchHit> for CitationEntry {
    fn from(hit: &SearchHit) -> Self {
        Self {
            doc_id: hit.doc_id.clone(),
            title: hit.title.clone(),
            guest: hit.guest.clone(),
            episode_url: hit.episode_url.clone(),
            thumbnail_url: hit.thumbnail_url.clone(),
            duration: format_duration(hit.length),
            content: hit.content.clone(),
        }
    }
}

/// Anything that can be traced back to a source document
pub trait Cited {
    fn doc_id(&self) -> &str;
}

impl Cited for SearchHit {
    fn doc_id(&self) -> &str {
        &self.doc_id
    }
}

impl Cited for RankedHit {
    fn doc_id(&self) -> &str {
        &self.hit.doc_id
    }
}

impl Cited for CitationEntry {
    fn doc_id(&self) -> &str {
        &self.doc_id
    }
}

/// Format a duration in seconds as `HH:MM:SS`
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}


#[cfg(test)]
mod tests {
    use super::fixtures::hit;
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(59), "00:00:59");
        assert_eq!(format_duration(3725), "01:02:05");
    }

    #[test]
    fn test_citation_from_hit() {
        let entry = CitationEntry::from(&hit("ep1", "some words"));
        assert_eq!(entry.doc_id, "ep1");
        assert_eq!(entry.duration, "01:02:05");
        assert_eq!(entry.caption(), "Episode ep1");
    }

    #[test]
    fn test_caption_without_separator() {
        let mut source = hit("ep2", "text");
        source.title = "Plain title".to_string();
        assert_eq!(CitationEntry::from(&source).caption(), "Plain title");
    }

    #[test]
    fn test_hit_deserializes_without_summary() {
        let json = r#"{"doc_id":"a","content":"c","guest":"g","title":"t",
            "episode_url":"u","thumbnail_url":"i","length":10,"score":0.1}"#;
        let parsed: SearchHit = serde_json::from_str(json).unwrap();
        assert!(parsed.summary.is_none());
    }
}
