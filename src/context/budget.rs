//! Token-budget-aware context selection
//!
//! # Algorithm
//!
//! ```text
//! running ← tokens(skeleton(query))
//! if running ≥ threshold: return ∅            // budget exhausted
//! for hit in ranked order:
//!     total ← tokens(build(query, accepted ∪ {hit}))
//!     if running < total < threshold: accept hit, running ← total
//!     else: reject hit (and stop, under StopAtFirstOverflow)
//! ```
//!
//! Totals are always measured on the fully rendered prompt, so the ceiling
//! holds even for tokenizers whose counts are not additive across
//! concatenation. A hit is either included whole or not at all.

use serde::{Deserialize, Serialize};

use crate::context::counter::TokenEstimator;
use crate::errors::Result;
use crate::rag::prompt::{PromptAssembler, CONTEXT_BLOCK_TEMPLATE};
use crate::types::RankedHit;

/// What to do after the first hit that would overflow the budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Keep probing lower-ranked (possibly cheaper) hits
    #[default]
    ContinueScanning,
    /// Accept only the longest fitting prefix of the ranking
    StopAtFirstOverflow,
}

/// Outcome of a budget selection
#[derive(Debug, Clone)]
pub struct BudgetSelection {
    /// Accepted hits, in relevance order
    pub accepted: Vec<RankedHit>,
    /// Hits left out, in relevance order
    pub rejected: Vec<RankedHit>,
    /// Tokens used by template plus query alone
    pub skeleton_tokens: usize,
    /// Tokens of the prompt rendered with the accepted hits
    pub prompt_tokens: usize,
    pub threshold: usize,
}

impl BudgetSelection {
    /// No grounding context fits. Not an error, but callers must handle it.
    pub fn is_exhausted(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Greedy selector that keeps the rendered prompt under a token ceiling
#[derive(Debug, Clone)]
pub struct ContextBudgetSelector {
    token_threshold: usize,
    policy: SelectionPolicy,
}

impl ContextBudgetSelector {
    pub fn new(token_threshold: usize) -> Self {
        Self {
            token_threshold,
            policy: SelectionPolicy::default(),
        }
    }

    pub fn with_policy(token_threshold: usize, policy: SelectionPolicy) -> Self {
        Self {
            token_threshold,
            policy,
        }
    }

    /// Select the highest-ranked hits whose rendered prompt stays strictly
    /// below the threshold
    pub fn select(
        &self,
        ranked_hits: &[RankedHit],
        assembler: &PromptAssembler,
        query: &str,
        estimator: &dyn TokenEstimator,
    ) -> BudgetSelection {
        let threshold = self.token_threshold;
        let skeleton_tokens = estimator.count_tokens(&assembler.skeleton(query));

        if skeleton_tokens >= threshold {
            tracing::warn!(
                skeleton_tokens,
                threshold,
                "prompt skeleton alone exceeds the token budget"
            );
            return BudgetSelection {
                accepted: Vec::new(),
                rejected: ranked_hits.to_vec(),
                skeleton_tokens,
                prompt_tokens: skeleton_tokens,
                threshold,
            };
        }

        let mut accepted: Vec<RankedHit> = Vec::with_capacity(ranked_hits.len());
        let mut rejected = Vec::new();
        let mut running = skeleton_tokens;
        let mut stopped = false;

        for hit in ranked_hits {
            if stopped {
                rejected.push(hit.clone());
                continue;
            }

            accepted.push(hit.clone());
            let total = estimator.count_tokens(&assembler.build(query, &accepted));

            if total < threshold && total > running {
                running = total;
                continue;
            }

            tracing::debug!(
                doc_id = %hit.hit.doc_id,
                rank = hit.rank,
                total,
                threshold,
                "hit does not fit the token budget"
            );
            if let Some(skipped) = accepted.pop() {
                rejected.push(skipped);
            }
            if self.policy == SelectionPolicy::StopAtFirstOverflow {
                stopped = true;
            }
        }

        tracing::info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            prompt_tokens = running,
            "total final token count"
        );

        BudgetSelection {
            accepted,
            rejected,
            skeleton_tokens,
            prompt_tokens: running,
            threshold,
        }
    }

    pub fn token_threshold(&self) -> usize {
        self.token_threshold
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }
}

/// Select context for `prompt_template` with the default block format
pub fn select(
    ranked_hits: &[RankedHit],
    prompt_template: &str,
    query: &str,
    token_threshold: usize,
    estimator: &dyn TokenEstimator,
) -> Result<Vec<RankedHit>> {
    let assembler = PromptAssembler::new(prompt_template, CONTEXT_BLOCK_TEMPLATE)?;
    let selection =
        ContextBudgetSelector::new(token_threshold).select(ranked_hits, &assembler, query, estimator);
    Ok(selection.accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hits::fixtures::ranked;
    use quickcheck_macros::quickcheck;

    /// One token per whitespace-separated word
    struct WordCount;

    impl TokenEstimator for WordCount {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }

        fn model_id(&self) -> &str {
            "words"
        }
    }

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    /// Nine fixed words plus a one-word question: skeleton costs 10 tokens
    fn assembler() -> PromptAssembler {
        PromptAssembler::new("a b c d e f g h i {question} {series}", "{transcript}").unwrap()
    }

    fn hits_with_costs(costs: &[usize]) -> Vec<RankedHit> {
        costs
            .iter()
            .enumerate()
            .map(|(i, &cost)| ranked(&format!("doc{}", i), &words(cost), 1.0 - i as f32 * 0.01, i))
            .collect()
    }

    fn ids(hits: &[RankedHit]) -> Vec<&str> {
        hits.iter().map(|h| h.hit.doc_id.as_str()).collect()
    }

    #[test]
    fn test_accepts_until_budget() {
        let hits = hits_with_costs(&[15, 20, 30]);
        let selection = ContextBudgetSelector::new(50).select(&hits, &assembler(), "why", &WordCount);

        assert_eq!(selection.skeleton_tokens, 10);
        assert_eq!(ids(&selection.accepted), vec!["doc0", "doc1"]);
        assert_eq!(ids(&selection.rejected), vec!["doc2"]);
        assert_eq!(selection.prompt_tokens, 45);
        assert!(!selection.is_exhausted());
    }

    #[test]
    fn test_continue_scanning_takes_cheaper_later_hit() {
        let hits = hits_with_costs(&[15, 30, 5]);
        let selection = ContextBudgetSelector::new(50).select(&hits, &assembler(), "why", &WordCount);

        assert_eq!(ids(&selection.accepted), vec!["doc0", "doc2"]);
        assert_eq!(selection.prompt_tokens, 30);
    }

    #[test]
    fn test_stop_at_first_overflow() {
        let hits = hits_with_costs(&[15, 30, 5]);
        let selector = ContextBudgetSelector::with_policy(50, SelectionPolicy::StopAtFirstOverflow);
        let selection = selector.select(&hits, &assembler(), "why", &WordCount);

        assert_eq!(ids(&selection.accepted), vec!["doc0"]);
        assert_eq!(ids(&selection.rejected), vec!["doc1", "doc2"]);
    }

    #[test]
    fn test_threshold_is_strict() {
        // 10 + 40 = 50 is not below 50
        let hits = hits_with_costs(&[40]);
        let selection = ContextBudgetSelector::new(50).select(&hits, &assembler(), "why", &WordCount);
        assert!(selection.is_exhausted());
    }

    #[test]
    fn test_oversized_hit_is_skipped_not_truncated() {
        let hits = hits_with_costs(&[500, 5]);
        let selection = ContextBudgetSelector::new(50).select(&hits, &assembler(), "why", &WordCount);

        assert_eq!(ids(&selection.accepted), vec!["doc1"]);
        assert_eq!(selection.accepted[0].hit.content, words(5));
    }

    #[test]
    fn test_skeleton_over_budget_is_exhausted() {
        let hits = hits_with_costs(&[1, 2]);
        let selection = ContextBudgetSelector::new(10).select(&hits, &assembler(), "why", &WordCount);

        assert!(selection.is_exhausted());
        assert_eq!(selection.rejected.len(), 2);
        assert_eq!(selection.prompt_tokens, 10);
    }

    #[test]
    fn test_zero_cost_hit_is_not_accepted() {
        let hits = hits_with_costs(&[0, 5]);
        let selection = ContextBudgetSelector::new(50).select(&hits, &assembler(), "why", &WordCount);
        assert_eq!(ids(&selection.accepted), vec!["doc1"]);
    }

    #[test]
    fn test_continue_scanning_is_not_prefix_monotonic() {
        // At 35 the cheap second hit fits; at 45 the first hit takes its place.
        let hits = hits_with_costs(&[30, 10]);
        let low = ContextBudgetSelector::new(35).select(&hits, &assembler(), "why", &WordCount);
        let high = ContextBudgetSelector::new(45).select(&hits, &assembler(), "why", &WordCount);

        assert_eq!(ids(&low.accepted), vec!["doc1"]);
        assert_eq!(ids(&high.accepted), vec!["doc0"]);
    }

    #[test]
    fn test_free_function_validates_template() {
        assert!(select(&[], "no slots here", "q", 100, &WordCount).is_err());

        let hits = hits_with_costs(&[3]);
        let chosen = select(&hits, "{question} {series}", "q", 100, &WordCount).unwrap();
        assert_eq!(chosen.len(), 1);
    }

    #[quickcheck]
    fn prop_rendered_prompt_stays_under_threshold(costs: Vec<u8>, threshold: u16, scan: bool) -> bool {
        let costs: Vec<usize> = costs.into_iter().take(24).map(usize::from).collect();
        let hits = hits_with_costs(&costs);
        let policy = if scan {
            SelectionPolicy::ContinueScanning
        } else {
            SelectionPolicy::StopAtFirstOverflow
        };
        let assembler = assembler();
        let selection = ContextBudgetSelector::with_policy(threshold as usize, policy)
            .select(&hits, &assembler, "why", &WordCount);

        let rendered = WordCount.count_tokens(&assembler.build("why", &selection.accepted));
        let under = selection.is_exhausted() || rendered < threshold as usize;
        let in_order = selection.accepted.windows(2).all(|w| w[0].rank < w[1].rank);
        let partitioned = selection.accepted.len() + selection.rejected.len() == hits.len();

        under && in_order && partitioned && rendered == selection.prompt_tokens
    }

    #[quickcheck]
    fn prop_prefix_selection_is_monotonic(costs: Vec<u8>, a: u16, b: u16) -> bool {
        let costs: Vec<usize> = costs.into_iter().take(24).map(usize::from).collect();
        let hits = hits_with_costs(&costs);
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let assembler = assembler();

        let pick = |threshold: u16| {
            ContextBudgetSelector::with_policy(threshold as usize, SelectionPolicy::StopAtFirstOverflow)
                .select(&hits, &assembler, "why", &WordCount)
                .accepted
        };
        let smaller = pick(low);
        let larger = pick(high);

        smaller.len() <= larger.len()
            && smaller
                .iter()
                .zip(larger.iter())
                .all(|(s, l)| s.hit.doc_id == l.hit.doc_id)
    }
}
