//! Shared question-answering flow for CLI and REPL modes
//!
//! prepare -> (maybe) generate -> stream to the terminal -> citations.
//! A partial answer is always printed, whatever stopped the stream.

use anyhow::Result;
use std::time::Duration;

use crate::errors::{RagError, RerankError};
use crate::rag::{EmptyContextPolicy, PreparedAnswer, QueryParams, RagPipeline};
use crate::repl::DisplayManager;
use crate::streaming::{CompletionStream, StreamOutcome};

/// Presentation options for one answer
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    pub empty_context: EmptyContextPolicy,
    /// Abandon the answer stream after this long
    pub deadline: Option<Duration>,
    pub show_sources: bool,
    pub show_prompt: bool,
}

/// What happened to one question
#[derive(Debug)]
pub enum AnswerReport {
    /// The index returned nothing for the query
    NoResults,
    /// No passage fit the budget and the policy forbids ungrounded answers
    Refused(PreparedAnswer),
    Answered {
        prepared: PreparedAnswer,
        outcome: StreamOutcome,
    },
}

enum Step {
    Fragment(Option<String>),
    Cancelled,
}

/// Answer one question, streaming the answer to the terminal
pub async fn answer_query(
    pipeline: &RagPipeline,
    query: &str,
    params: &QueryParams,
    options: &AnswerOptions,
    display: &mut DisplayManager,
) -> Result<AnswerReport> {
    display.start_spinner("Searching the index...");

    let prepared = match pipeline.prepare(query, params).await {
        Ok(prepared) => prepared,
        Err(RagError::Rerank(RerankError::EmptyCandidates)) => {
            display.finish_current();
            display.show_warning("No passages matched the question. Try another guest or a broader query.");
            return Ok(AnswerReport::NoResults);
        }
        Err(e) => {
            display.finish_current();
            return Err(e.into());
        }
    };

    if options.show_prompt {
        display.finish_current();
        display.show_prompt_text(&prepared.prompt, prepared.selection.prompt_tokens);
    }

    if !prepared.should_generate(options.empty_context) {
        display.finish_current();
        display.show_warning("None of the retrieved passages fit the token budget, so no answer was generated.");
        display.show_citations(&prepared.citations, options.show_sources);
        return Ok(AnswerReport::Refused(prepared));
    }
    if !prepared.is_grounded() {
        display.show_warning("None of the retrieved passages fit the token budget; answering without them.");
    }

    display.start_spinner("Generating answer...");
    let stream = match pipeline.generate(&prepared).await {
        Ok(stream) => stream,
        Err(e) => {
            display.finish_current();
            return Err(e.into());
        }
    };

    let outcome = stream_to_terminal(stream, options.deadline, display).await?;
    display.finish_answer(&outcome);
    display.show_citations(&prepared.citations, options.show_sources);

    Ok(AnswerReport::Answered { prepared, outcome })
}

/// Print fragments as they arrive until the stream ends, the deadline
/// passes or the user presses Ctrl-C
async fn stream_to_terminal(
    mut stream: CompletionStream,
    deadline: Option<Duration>,
    display: &mut DisplayManager,
) -> Result<StreamOutcome> {
    let until = deadline.map(|d| tokio::time::Instant::now() + d);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let step = tokio::select! {
            fragment = next_fragment(&mut stream, until) => Step::Fragment(fragment),
            _ = &mut ctrl_c => Step::Cancelled,
        };

        match step {
            Step::Fragment(Some(fragment)) => display.stream_fragment(&fragment)?,
            Step::Fragment(None) => break,
            Step::Cancelled => {
                stream.cancel();
                break;
            }
        }
    }

    Ok(stream.finish())
}

async fn next_fragment(
    stream: &mut CompletionStream,
    until: Option<tokio::time::Instant>,
) -> Option<String> {
    match until {
        Some(until) => {
            let remaining = until.saturating_duration_since(tokio::time::Instant::now());
            stream.next_fragment_within(remaining).await
        }
        None => stream.next_fragment().await,
    }
}
