use hikarin_core::{CommentaryContext, CommentaryDispatcher};
use log::{debug, warn};
use serde::Deserialize;

use crate::gemini::TextGenerator;
use crate::prompt::build_prompt;

pub const THINKING: &str = "The commentator is thinking...";
pub const SPEECHLESS: &str = "The commentator is speechless! (No response from API).";
pub const TECHNICAL_DIFFICULTIES: &str = "The commentator seems to be having technical difficulties.";

#[derive(Deserialize)]
struct ResponsePayload {
    response: String,
}

/// Strips a surrounding ``` fence (with an optional language tag).
pub fn unfence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.split_once('\n') {
        Some((tag, body)) if !tag.trim().contains(' ') => body,
        _ => rest.strip_prefix("json").unwrap_or(rest),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// The `response` field of a `{"response": ...}` payload, or the raw text
/// when the model ignored the format.
pub fn extract_response(text: &str) -> String {
    match serde_json::from_str::<ResponsePayload>(unfence(text)) {
        Ok(payload) => payload.response,
        Err(e) => {
            debug!("commentary is not a response payload ({e}), using raw text");
            text.trim().to_string()
        }
    }
}

/// [`CommentaryDispatcher`] that prompts a [`TextGenerator`]. Never fails:
/// every error becomes a fixed fallback line.
pub struct Commentator<G: TextGenerator> {
    generator: G,
}

impl<G: TextGenerator> Commentator<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

impl<G: TextGenerator> CommentaryDispatcher for Commentator<G> {
    fn dispatch(&mut self, ctx: &CommentaryContext) -> String {
        let prompt = build_prompt(ctx);
        match self.generator.generate(&prompt) {
            Ok(Some(text)) => extract_response(&text),
            Ok(None) => SPEECHLESS.to_string(),
            Err(e) => {
                warn!("commentary failed: {e}");
                TECHNICAL_DIFFICULTIES.to_string()
            }
        }
    }
}
