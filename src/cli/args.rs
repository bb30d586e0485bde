//! Command-line argument parsing for RagBuddy
//!
//! Provides clap-based CLI with subcommands, per-query overrides and
//! verbosity control.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::rag::QueryParams;

/// RagBuddy - ask questions of a podcast transcript index
#[derive(Parser, Debug)]
#[command(name = "ragbuddy")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Grounded answers from a hybrid transcript index, streamed to the terminal", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress everything except the answer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Per-query overrides shared by `ask` and `start`
#[derive(ClapArgs, Debug, Clone, Default, PartialEq)]
pub struct QueryOverrides {
    /// Only search episodes with this guest
    #[arg(long)]
    pub guest: Option<String>,

    /// Hybrid weighting: 0.0 is pure keyword, 1.0 is pure vector
    #[arg(long)]
    pub alpha: Option<f32>,

    /// Number of hits to retrieve before reranking
    #[arg(long)]
    pub limit: Option<usize>,

    /// Number of hits to keep after reranking
    #[arg(long = "top-k")]
    pub top_k: Option<usize>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Index class to search
    #[arg(long = "class")]
    pub class_name: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question and stream the answer
    Ask {
        /// The question
        #[arg(value_name = "QUESTION", required = true, num_args = 1..)]
        question: Vec<String>,

        #[command(flatten)]
        overrides: QueryOverrides,
    },

    /// Start interactive REPL mode
    Start {
        #[command(flatten)]
        overrides: QueryOverrides,
    },

    /// List the classes in the search index
    Classes,

    /// Run health checks against the configured services
    Doctor,

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl QueryOverrides {
    /// Convert to pipeline query parameters
    pub fn to_params(&self) -> QueryParams {
        QueryParams {
            guest: self.guest.clone(),
            alpha: self.alpha,
            limit: self.limit,
            top_k: self.top_k,
            temperature: self.temperature,
            class_name: self.class_name.clone(),
        }
    }

    /// Reject values the pipeline would refuse anyway, before any network call
    pub fn validate(&self) -> Result<(), String> {
        if let Some(alpha) = self.alpha {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(format!("--alpha must be between 0.0 and 1.0, got {}", alpha));
            }
        }
        if self.limit == Some(0) {
            return Err("--limit must be greater than 0".to_string());
        }
        if self.top_k == Some(0) {
            return Err("--top-k must be greater than 0".to_string());
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(format!("--temperature must be between 0.0 and 2.0, got {}", temperature));
            }
        }
        Ok(())
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "ragbuddy=info,warn",
            Verbosity::VeryVerbose => "ragbuddy=debug,info",
        }
    }

    /// Check if should show the spinner
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show detailed events
    pub fn show_events(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }

    /// Check if should print the full prompt before generation
    pub fn show_prompt(&self) -> bool {
        matches!(self, Verbosity::VeryVerbose)
    }
}
