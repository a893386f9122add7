//! Prompt construction.
//!
//! Ordinary moves and checks are voiced by the persona; game endings are
//! narrated by a neutral commentator.

use hikarin_core::board::side_name;
use hikarin_core::{CommentaryContext, GameState};

const PERSONA_INTRO: &str = "You are Hikarin, a cheerful, extroverted, and happy-go-lucky anime girl who is playing a chess game.";
const COMMENTATOR_INTRO: &str = "You are an expert and witty chess commentator.";

const RESPONSE_FORMAT: &str = r#"Reply with JSON in exactly this format and nothing else:
{
    "response": "your comment"
}"#;

pub fn build_prompt(ctx: &CommentaryContext) -> String {
    match ctx.game_state {
        GameState::Checkmate { winner } => checkmate_prompt(ctx, side_name(winner)),
        GameState::Draw => draw_prompt(ctx),
        GameState::Check => persona_prompt(ctx, "You have just put your opponent in check!"),
        GameState::InProgress => persona_prompt(ctx, "It is now your opponent's turn."),
    }
}

fn persona_prompt(ctx: &CommentaryContext, situation: &str) -> String {
    let (opponent_move, piece) = match &ctx.opponent_move {
        Some(m) => (m.san.clone(), m.piece_name()),
        None => ("none yet, you are opening the game".to_string(), "none".to_string()),
    };
    format!(
        "{PERSONA_INTRO} Your opponent has just made a move and you answered it.

Given the following information:
* Opponent's move: {opponent_move}
* Piece moved: {piece}
* Your mood: {mood}
* Your move: {reply} ({reply_piece})
* Evaluation: {evaluation}
* Board (FEN): {fen}
* Game state: {situation}

Generate a short in-character reaction to your opponent's move that fits your mood.
{RESPONSE_FORMAT}",
        mood = ctx.mood,
        reply = ctx.reply.san,
        reply_piece = ctx.reply.piece_name(),
        evaluation = describe_evaluation(ctx),
        fen = ctx.position,
    )
}

fn checkmate_prompt(ctx: &CommentaryContext, winner: &str) -> String {
    format!(
        "{COMMENTATOR_INTRO} The game has ended in checkmate! {winner} wins. \
The final move was {}. The final board state is {}. \
Provide a final, conclusive, and perhaps dramatic comment on the victory.
{RESPONSE_FORMAT}",
        ctx.reply.san, ctx.position
    )
}

fn draw_prompt(ctx: &CommentaryContext) -> String {
    format!(
        "{COMMENTATOR_INTRO} The game has ended in a draw. \
The final move was {}. The final board state is {}. \
Provide a comment on this drawn game.
{RESPONSE_FORMAT}",
        ctx.reply.san, ctx.position
    )
}

fn describe_evaluation(ctx: &CommentaryContext) -> String {
    match (ctx.evaluation, ctx.mate) {
        (Some(eval), _) => format!("{eval:+.2} pawns from White's point of view"),
        (None, Some(m)) if m > 0 => format!("you have mate in {m}"),
        (None, Some(m)) => format!("your opponent has mate in {}", -m),
        (None, None) => "unknown".to_string(),
    }
}
