//! REPL (Read-Eval-Print Loop) module for interactive question answering
//!
//! Each line is either a `/command` that adjusts the session overrides or a
//! question answered through the shared execution flow. Pipeline state is
//! per question; only the overrides persist between questions.

pub mod commands;
pub mod display;
pub mod input;

use anyhow::Result;
use std::path::PathBuf;

use crate::cli::QueryOverrides;
use crate::execution::{answer_query, AnswerOptions};
use crate::rag::RagPipeline;
use crate::repl::commands::{is_command, CommandHandler};
pub use crate::repl::display::{format_citation, DisplayManager};
use crate::repl::input::{InputHandler, ReadOutcome};

/// REPL session coordinator
pub struct ReplSession {
    input_handler: InputHandler,
    command_handler: CommandHandler,
    display_manager: DisplayManager,
    overrides: QueryOverrides,
}

impl ReplSession {
    /// Create REPL session with persistent history
    pub fn with_history(history_path: PathBuf, overrides: QueryOverrides, show_progress: bool) -> Result<Self> {
        Ok(ReplSession {
            input_handler: InputHandler::with_history(history_path)?,
            command_handler: CommandHandler::new(),
            display_manager: DisplayManager::with_progress(show_progress),
            overrides,
        })
    }

    /// Show welcome banner
    pub fn show_welcome(&self, version: &str, model: &str, class_name: &str) {
        self.display_manager.show_banner(version, model, class_name);
    }

    /// Run until `/exit` or Ctrl-D
    pub async fn run(&mut self, pipeline: &RagPipeline, options: AnswerOptions) -> Result<()> {
        loop {
            let line = match self.input_handler.read_line()? {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Interrupted => {
                    self.display_manager.show_info("Type /exit or press Ctrl-D to quit");
                    continue;
                }
                ReadOutcome::Eof => break,
            };

            if line.is_empty() {
                continue;
            }

            if is_command(&line) {
                let command = self.command_handler.parse(&line);
                if !self.command_handler.execute(command, &mut self.overrides) {
                    break;
                }
                continue;
            }

            let options = AnswerOptions {
                show_sources: options.show_sources || self.command_handler.show_sources(),
                ..options.clone()
            };
            let params = self.overrides.to_params();

            // A failed question must not end the session
            if let Err(e) = answer_query(pipeline, &line, &params, &options, &mut self.display_manager).await {
                tracing::debug!(error = %e, "question failed");
                self.display_manager.show_error(&e.to_string());
            }
        }

        self.shutdown()
    }

    /// Save history on the way out
    pub fn shutdown(&mut self) -> Result<()> {
        self.display_manager.finish_current();
        self.input_handler.save_history()
    }

    pub fn overrides(&self) -> &QueryOverrides {
        &self.overrides
    }
}
