//! Context management module
//!
//! Handles token counting and token-budget-aware context selection.

pub mod budget;
pub mod counter;

// Re-export commonly used types
pub use budget::{BudgetSelection, ContextBudgetSelector, SelectionPolicy};
pub use counter::{
    estimator_for_model, HeuristicEstimator, HuggingFaceEstimator, TiktokenEstimator,
    TokenEstimator,
};
