//! Plain-text rendering for the terminal.

use hikarin_core::board::side_name;
use hikarin_core::{BoardUpdate, GameState};

/// Board diagram from the placement field of a FEN, White at the bottom.
pub fn board_diagram(fen: &str) -> String {
    let placement = fen.split_whitespace().next().unwrap_or("");
    let mut out = String::new();
    for (i, rank) in placement.split('/').enumerate() {
        out.push_str(&format!("{} ", 8 - i));
        for c in rank.chars() {
            match c.to_digit(10) {
                Some(n) => (0..n).for_each(|_| out.push_str(" .")),
                None => {
                    out.push(' ');
                    out.push(c);
                }
            }
        }
        out.push('\n');
    }
    out.push_str("   a b c d e f g h\n");
    out
}

/// `+0.35`, `#3`, `#-2` or `-` when nothing is known.
pub fn format_eval(evaluation: Option<f64>, mate: Option<i32>) -> String {
    match (evaluation, mate) {
        (Some(e), _) => format!("{e:+.2}"),
        (None, Some(m)) => format!("#{m}"),
        (None, None) => "-".to_string(),
    }
}

pub fn describe_state(state: GameState) -> &'static str {
    match state {
        GameState::InProgress => "in progress",
        GameState::Check => "check",
        GameState::Checkmate { .. } => "checkmate",
        GameState::Draw => "draw",
    }
}

pub fn render_update(update: &BoardUpdate) -> String {
    let mut out = board_diagram(&update.position);
    if let Some(m) = &update.last_move {
        out.push_str(&format!(
            "last move: {} {} ({})\n",
            side_name(m.side),
            m.san,
            m.uci
        ));
    }
    out.push_str(&format!(
        "eval: {}  depth: {}  mood: {}  state: {}\n",
        format_eval(update.evaluation, update.mate),
        update.search_depth,
        update.mood,
        describe_state(update.game_state)
    ));
    if let Some(pv) = &update.principal_variation {
        out.push_str(&format!("pv: {pv}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_position_diagram() {
        let diagram = board_diagram("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
        let lines: Vec<&str> = diagram.lines().collect();
        assert_eq!(lines[0], "8  r n b q k b n r");
        assert_eq!(lines[4], "4  . . . . P . . .");
        assert_eq!(lines[8], "   a b c d e f g h");
    }

    #[test]
    fn eval_formats() {
        assert_eq!(format_eval(Some(0.35), None), "+0.35");
        assert_eq!(format_eval(Some(-1.5), None), "-1.50");
        assert_eq!(format_eval(None, Some(3)), "#3");
        assert_eq!(format_eval(None, None), "-");
    }
}
