//! Grounded answer synthesis with a fixed refusal sentence.

use std::sync::Arc;

use tracing::{debug, instrument};

use evmanual_shared::{LanguageModel, Result};

use crate::prompts::{self, REFUSAL, ROLE_MARKER};

/// A post-processed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub answer: String,
    /// `answer` is exactly [`REFUSAL`].
    pub refused: bool,
}

impl Synthesis {
    fn refusal() -> Self {
        Self {
            answer: REFUSAL.to_string(),
            refused: true,
        }
    }
}

/// Answers a question from an assembled context.
pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Answer `question` from `context`.
    ///
    /// A blank context yields the refusal without a model call. Model errors
    /// are returned as-is; no answer is made up locally.
    #[instrument(skip_all, fields(model = self.model.model_id(), context_chars = context.chars().count()))]
    pub async fn synthesize(&self, context: &str, question: &str) -> Result<Synthesis> {
        if context.trim().is_empty() {
            debug!("empty context, refusing");
            return Ok(Synthesis::refusal());
        }

        let raw = self
            .model
            .complete(&prompts::answer_prompt(context, question))
            .await?;
        let answer = clean_answer(&raw);

        if is_refusal(&answer) {
            return Ok(Synthesis::refusal());
        }
        Ok(Synthesis {
            answer,
            refused: false,
        })
    }
}

/// Strip an echoed role marker and surrounding whitespace.
pub fn clean_answer(raw: &str) -> String {
    let text = raw.trim();
    let text = match text.strip_prefix(ROLE_MARKER) {
        Some(rest) => rest.trim_start().trim_start_matches(':'),
        None => text,
    };
    text.trim().to_string()
}

/// Whether `answer` is the refusal sentence, ignoring spacing, quotes and final punctuation.
pub fn is_refusal(answer: &str) -> bool {
    refusal_key(answer) == refusal_key(REFUSAL)
}

fn refusal_key(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .trim_matches(|c: char| matches!(c, '.' | '。' | '!' | '"' | '\'' | '“' | '”' | '‘' | '’'))
        .to_string()
}
