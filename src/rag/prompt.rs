//! Prompt assembly for grounded question answering
//!
//! A prompt is a template with a `{question}` slot and a `{series}` slot.
//! Each selected passage is rendered through a block template
//! (`{summary}`, `{guest}`, `{title}`, `{transcript}`) and the blocks are
//! joined with newlines into the series. Rendering is a single pass, so
//! slot-like text inside a query or transcript is never expanded.

use crate::errors::{RagError, Result};
use crate::types::RankedHit;

pub const QUESTION_SLOT: &str = "question";
pub const SERIES_SLOT: &str = "series";
pub const TRANSCRIPT_SLOT: &str = "transcript";

/// Default question-answering template over a series of transcript passages
pub const QUESTION_ANSWERING_TEMPLATE: &str = "\
Your task is to synthesize and reason over a series of transcripts of an interview between Tom Bilyeu and his guest(s).
After your synthesis, use the series of transcripts to answer the question below. The series will be in the following format:

```
Show Summary: <summary>
Show Guest: <guest>
Transcript: <transcript>
```

Start Series:
```
{series}
```
Question:
{question}

Answer the question and provide reasoning if necessary to explain the answer.
If the context does not provide enough information to answer the question, then
state that you cannot answer the question with the provided context.

Answer:
";

/// Default rendering of one passage inside the series
pub const CONTEXT_BLOCK_TEMPLATE: &str = "\
Show Summary: {summary}
Show Guest: {guest}
Transcript: {transcript}
";

/// Renders grounding prompts from validated templates
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    template: String,
    block_template: String,
}

impl PromptAssembler {
    /// Create an assembler, rejecting templates that lack required slots
    pub fn new(template: impl Into<String>, block_template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let block_template = block_template.into();

        for slot in [QUESTION_SLOT, SERIES_SLOT] {
            if !has_slot(&template, slot) {
                return Err(RagError::Template(format!(
                    "prompt template is missing the {{{}}} slot",
                    slot
                )));
            }
        }
        if !has_slot(&block_template, TRANSCRIPT_SLOT) {
            return Err(RagError::Template(format!(
                "context block template is missing the {{{}}} slot",
                TRANSCRIPT_SLOT
            )));
        }

        Ok(Self {
            template,
            block_template,
        })
    }

    /// Render the full prompt for `query` grounded on `context`, in order
    pub fn build(&self, query: &str, context: &[RankedHit]) -> String {
        let series = self.render_series(context);
        render(
            &self.template,
            &[(QUESTION_SLOT, query), (SERIES_SLOT, series.as_str())],
        )
    }

    /// Prompt with an empty series: the fixed cost of template plus query
    pub fn skeleton(&self, query: &str) -> String {
        self.build(query, &[])
    }

    /// Concatenated context blocks for `context`
    pub fn render_series(&self, context: &[RankedHit]) -> String {
        context
            .iter()
            .map(|ranked| {
                let hit = &ranked.hit;
                render(
                    &self.block_template,
                    &[
                        ("summary", hit.summary.as_deref().unwrap_or("")),
                        ("guest", hit.guest.as_str()),
                        ("title", hit.title.as_str()),
                        (TRANSCRIPT_SLOT, hit.content.as_str()),
                    ],
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            template: QUESTION_ANSWERING_TEMPLATE.to_string(),
            block_template: CONTEXT_BLOCK_TEMPLATE.to_string(),
        }
    }
}

/// Render `query` and `context` into `template` with the default block format
pub fn build(query: &str, context: &[RankedHit], template: &str) -> Result<String> {
    let assembler = PromptAssembler::new(template, CONTEXT_BLOCK_TEMPLATE)?;
    Ok(assembler.build(query, context))
}

fn has_slot(template: &str, slot: &str) -> bool {
    template.contains(&format!("{{{}}}", slot))
}

/// Single-pass `{name}` substitution; unknown slots are left verbatim
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(slot, _)| *slot == name)
                .map(|(_, value)| (*value, close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
