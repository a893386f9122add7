//! Board authority.
//!
//! Rules live in `shakmaty`; this module only adapts it to the shape the
//! orchestrator needs and records the game history.

use std::collections::HashMap;

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role, Square};

use crate::error::BoardError;

/// One committed move, normalized for observers and commentary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub side: Color,
    pub piece: Role,
    pub from: Square,
    pub to: Square,
    pub captured: Option<Role>,
    pub promotion: Option<Role>,
    pub san: String,
    pub uci: String,
}

impl PlayedMove {
    /// e.g. "White Knight"
    pub fn piece_name(&self) -> String {
        format!("{} {}", side_name(self.side), role_name(self.piece))
    }
}

pub fn side_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

pub fn role_name(role: Role) -> &'static str {
    match role {
        Role::Pawn => "Pawn",
        Role::Knight => "Knight",
        Role::Bishop => "Bishop",
        Role::Rook => "Rook",
        Role::Queen => "Queen",
        Role::King => "King",
    }
}

pub fn parse_square(s: &str) -> Result<Square, BoardError> {
    s.trim()
        .parse::<Square>()
        .map_err(|_| BoardError::InvalidSquare(s.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    InProgress,
    Check,
    Checkmate { winner: Color },
    Draw,
}

impl GameState {
    pub fn is_over(self) -> bool {
        matches!(self, GameState::Checkmate { .. } | GameState::Draw)
    }
}

/// Source of truth for legality and game termination.
pub trait BoardAuthority {
    /// Current position as FEN.
    fn current_position(&self) -> String;

    /// Applies `from`→`to`. `promotion` is used only when the move promotes.
    fn apply_move(&mut self, from: &str, to: &str, promotion: Role) -> Result<PlayedMove, BoardError>;

    fn is_game_over(&self) -> bool;
    fn is_draw(&self) -> bool;
    fn is_check(&self) -> bool;
    fn is_checkmate(&self) -> bool;
    fn turn(&self) -> Color;
    fn history(&self) -> &[PlayedMove];

    fn history_san(&self) -> Vec<String> {
        self.history().iter().map(|m| m.san.clone()).collect()
    }

    fn game_state(&self) -> GameState {
        if self.is_checkmate() {
            GameState::Checkmate { winner: !self.turn() }
        } else if self.is_draw() {
            GameState::Draw
        } else if self.is_check() {
            GameState::Check
        } else {
            GameState::InProgress
        }
    }
}

/// [`BoardAuthority`] backed by `shakmaty::Chess`.
#[derive(Debug, Clone)]
pub struct ShakmatyBoard {
    pos: Chess,
    history: Vec<PlayedMove>,
    // 千日手判定用: FEN の先頭4フィールドごとの出現回数
    seen: HashMap<String, u32>,
}

impl Default for ShakmatyBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ShakmatyBoard {
    pub fn new() -> Self {
        Self::with_position(Chess::default())
    }

    pub fn from_fen(fen: &str) -> Result<Self, BoardError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| BoardError::InvalidFen(format!("{fen}: {e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| BoardError::InvalidFen(format!("{fen}: {e}")))?;
        Ok(Self::with_position(pos))
    }

    fn with_position(pos: Chess) -> Self {
        let mut board = Self {
            pos,
            history: Vec::new(),
            seen: HashMap::new(),
        };
        board.record_position();
        board
    }

    fn record_position(&mut self) {
        *self.seen.entry(repetition_key(&self.pos)).or_insert(0) += 1;
    }

    fn is_threefold(&self) -> bool {
        self.seen
            .get(&repetition_key(&self.pos))
            .is_some_and(|&n| n >= 3)
    }

    fn find_move(&self, from: Square, to: Square, promotion: Role) -> Option<Move> {
        self.pos.legal_moves().into_iter().find(|m| {
            match m.to_uci(CastlingMode::Standard) {
                UciMove::Normal {
                    from: f,
                    to: t,
                    promotion: p,
                } => f == from && t == to && p.is_none_or(|p| p == promotion),
                _ => false,
            }
        })
    }
}

fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string()
}

fn repetition_key(pos: &Chess) -> String {
    fen_of(pos)
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

impl BoardAuthority for ShakmatyBoard {
    fn current_position(&self) -> String {
        fen_of(&self.pos)
    }

    fn apply_move(&mut self, from: &str, to: &str, promotion: Role) -> Result<PlayedMove, BoardError> {
        let from_sq = parse_square(from)?;
        let to_sq = parse_square(to)?;
        let m = self
            .find_move(from_sq, to_sq, promotion)
            .ok_or_else(|| BoardError::IllegalMove {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        let side = self.pos.turn();
        let uci = m.to_uci(CastlingMode::Standard).to_string();
        let san = SanPlus::from_move_and_play_unchecked(&mut self.pos, &m).to_string();
        let played = PlayedMove {
            side,
            piece: m.role(),
            from: from_sq,
            to: to_sq,
            captured: m.capture(),
            promotion: m.promotion(),
            san,
            uci,
        };
        self.record_position();
        self.history.push(played.clone());
        Ok(played)
    }

    fn is_game_over(&self) -> bool {
        self.is_checkmate() || self.is_draw()
    }

    fn is_draw(&self) -> bool {
        self.pos.is_stalemate()
            || self.pos.is_insufficient_material()
            || self.pos.halfmoves() >= 100
            || self.is_threefold()
    }

    fn is_check(&self) -> bool {
        self.pos.is_check()
    }

    fn is_checkmate(&self) -> bool {
        self.pos.is_checkmate()
    }

    fn turn(&self) -> Color {
        self.pos.turn()
    }

    fn history(&self) -> &[PlayedMove] {
        &self.history
    }
}
