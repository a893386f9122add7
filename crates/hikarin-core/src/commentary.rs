//! Seam between the orchestrator and whatever produces commentary text.

use crate::board::{GameState, PlayedMove};
use crate::mood::Mood;

/// Everything known about a move at commit time. `reply` is normally the
/// engine's move; a human move that ends the game is also commented.
#[derive(Debug, Clone)]
pub struct CommentaryContext {
    /// The other side's move just before `reply`, if any
    pub opponent_move: Option<PlayedMove>,
    pub reply: PlayedMove,
    /// FEN after the reply
    pub position: String,
    pub evaluation: Option<f64>,
    pub mate: Option<i32>,
    pub mood: Mood,
    pub game_state: GameState,
}

/// Produces one line of commentary per committed engine move, and one for
/// a human move that ends the game.
///
/// Implementations must not fail: remote errors are folded into fallback text.
pub trait CommentaryDispatcher: Send {
    fn dispatch(&mut self, ctx: &CommentaryContext) -> String;
}

impl<F> CommentaryDispatcher for F
where
    F: FnMut(&CommentaryContext) -> String + Send,
{
    fn dispatch(&mut self, ctx: &CommentaryContext) -> String {
        self(ctx)
    }
}
