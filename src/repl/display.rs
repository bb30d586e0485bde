//! Terminal output for answers and citations
//!
//! Owns the spinner shown until the first fragment arrives, writes answer
//! fragments as they stream in, and renders the citation list afterwards.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::streaming::{Interrupted, StreamOutcome};
use crate::types::CitationEntry;

/// Display manager for CLI and REPL output
pub struct DisplayManager {
    current_bar: Option<ProgressBar>,
    update_interval: Duration,
    show_progress: bool,
}

impl DisplayManager {
    /// Create new display manager
    pub fn new() -> Self {
        Self::with_progress(true)
    }

    /// Create a display manager, optionally without spinners (quiet mode)
    pub fn with_progress(show_progress: bool) -> Self {
        DisplayManager {
            current_bar: None,
            update_interval: Duration::from_millis(100),
            show_progress,
        }
    }

    /// Show welcome banner
    pub fn show_banner(&self, version: &str, model: &str, class_name: &str) {
        let width = 64;
        let title = format!("  RagBuddy {} - Ask the transcript index", version);
        let info = format!("  Model: {} | Index: {} | Mode: REPL", model, class_name);

        println!("\n{}", "=".repeat(width).cyan());
        println!("{}", title.bold().cyan());
        println!("{}", info.dimmed());
        println!("{}\n", "=".repeat(width).cyan());
        println!(
            "Ask a question (or {} for commands, {} to quit)\n",
            "/help".green(),
            "/exit".green()
        );
    }

    /// Start a spinner with a message
    pub fn start_spinner(&mut self, message: &str) {
        self.finish_current();
        if !self.show_progress {
            return;
        }

        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(self.update_interval);
        self.current_bar = Some(pb);
    }

    /// Update the spinner message
    pub fn set_message(&self, message: &str) {
        if let Some(pb) = &self.current_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish current spinner
    pub fn finish_current(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_and_clear();
        }
    }

    pub fn has_spinner(&self) -> bool {
        self.current_bar.is_some()
    }

    /// Write one answer fragment, clearing the spinner first
    pub fn stream_fragment(&mut self, fragment: &str) -> io::Result<()> {
        self.finish_current();
        let mut stdout = io::stdout();
        write!(stdout, "{}", fragment)?;
        stdout.flush()
    }

    /// Close the answer, noting why it is incomplete if it is
    pub fn finish_answer(&mut self, outcome: &StreamOutcome) {
        self.finish_current();
        println!();

        if let Some(fault) = &outcome.fault {
            self.show_warning(&format!("The answer was cut off: {}", fault));
        }
        match outcome.interrupted {
            Some(Interrupted::Deadline) => self.show_warning("The answer took too long and was stopped."),
            Some(Interrupted::Cancelled) => self.show_warning("The answer was cancelled."),
            None => {}
        }
        if outcome.transcript.is_empty() && outcome.is_complete() {
            self.show_warning("The model returned an empty answer.");
        }
    }

    /// Render the citation list
    pub fn show_citations(&self, citations: &[CitationEntry], show_content: bool) {
        if citations.is_empty() {
            return;
        }

        self.show_section("Sources");
        for (index, entry) in citations.iter().enumerate() {
            println!("{}", format_citation(index + 1, entry));
            if show_content {
                println!("     {}", entry.content.dimmed());
            }
        }
        println!();
    }

    /// Display error message
    pub fn show_error(&self, error: &str) {
        eprintln!("{} {}", "Error:".red().bold(), error.red());
    }

    /// Display warning message
    pub fn show_warning(&self, warning: &str) {
        eprintln!("{} {}", "Warning:".yellow().bold(), warning.yellow());
    }

    /// Display info message
    pub fn show_info(&self, info: &str) {
        println!("{} {}", "Info:".cyan(), info);
    }

    /// Show section header
    pub fn show_section(&self, title: &str) {
        println!("\n{}", title.bold().cyan());
        println!("{}", "-".repeat(60).cyan());
    }

    /// Show the rendered prompt (very verbose mode)
    pub fn show_prompt_text(&self, prompt: &str, tokens: usize) {
        self.show_section(&format!("Prompt ({} tokens)", tokens));
        println!("{}", prompt.dimmed());
    }
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One citation line: index, caption, guest, duration and link
pub fn format_citation(index: usize, entry: &CitationEntry) -> String {
    format!(
        "  {}. {} {} {} {}\n     {}",
        index.to_string().cyan(),
        entry.caption().bold(),
        format!("with {}", entry.guest).dimmed(),
        format!("[{}]", entry.duration).dimmed(),
        entry.thumbnail_url.dimmed(),
        entry.episode_url.underline()
    )
}
