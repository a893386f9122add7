//! Commentary for committed engine moves.
//!
//! [`Commentator`] builds a prompt from the move context, sends it to a
//! [`TextGenerator`] (normally [`GeminiClient`]) and extracts the reply. It
//! implements `hikarin_core::CommentaryDispatcher`, so the orchestrator calls
//! it exactly once per committed engine move.

pub mod dispatcher;
pub mod error;
pub mod gemini;
pub mod prompt;

pub use dispatcher::{Commentator, SPEECHLESS, TECHNICAL_DIFFICULTIES, THINKING, extract_response, unfence};
pub use error::CommentaryError;
pub use gemini::{GeminiClient, GeminiConfig, TextGenerator};
pub use prompt::build_prompt;
