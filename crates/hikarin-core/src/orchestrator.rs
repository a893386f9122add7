//! Turn-taking between the human and the engine.
//!
//! The orchestrator owns the engine connection, the search controller and the
//! board authority. Human moves come in through [`MoveOrchestrator::attempt_move`];
//! engine moves are committed when the running search resolves, either by
//! blocking in [`MoveOrchestrator::run_engine_turn`] or from an event loop via
//! [`MoveOrchestrator::poll_engine`]. Everything observers need is published
//! as [`GameEvent`]s.

use log::{debug, info, warn};
use shakmaty::{Color, Role};

use crate::board::{BoardAuthority, GameState, PlayedMove};
use crate::commentary::{CommentaryContext, CommentaryDispatcher};
use crate::error::SearchError;
use crate::mood::Mood;
use crate::search::{SearchController, SearchLimits, SearchPoll, SearchResult, clamp_depth};
use crate::transport::EngineConnection;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub engine_side: Color,
    pub depth: u32,
    pub limits: SearchLimits,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            engine_side: Color::Black,
            depth: 3,
            limits: SearchLimits::default(),
        }
    }
}

/// Snapshot published after every committed move.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardUpdate {
    pub position: String,
    /// Pawns from White's point of view
    pub evaluation: Option<f64>,
    pub mate: Option<i32>,
    pub game_state: GameState,
    pub mood: Mood,
    pub last_move: Option<PlayedMove>,
    pub principal_variation: Option<String>,
    pub search_depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Board(BoardUpdate),
    EngineThinking { depth: u32 },
    CommentaryPending,
    Commentary(String),
    EngineMoveRejected { best_move: String },
}

type Observer = Box<dyn FnMut(&GameEvent) + Send>;

pub struct MoveOrchestrator<B: BoardAuthority> {
    conn: EngineConnection,
    searches: SearchController,
    board: B,
    config: OrchestratorConfig,
    commentary: Option<Box<dyn CommentaryDispatcher>>,
    observers: Vec<Observer>,
    evaluation: Option<f64>,
    mate: Option<i32>,
    principal_variation: Option<String>,
    search_depth: u32,
}

impl<B: BoardAuthority> MoveOrchestrator<B> {
    pub fn new(conn: EngineConnection, board: B, config: OrchestratorConfig) -> Self {
        Self {
            conn,
            searches: SearchController::new(),
            board,
            config: OrchestratorConfig {
                depth: clamp_depth(config.depth),
                ..config
            },
            commentary: None,
            observers: Vec::new(),
            evaluation: None,
            mate: None,
            principal_variation: None,
            search_depth: 0,
        }
    }

    pub fn with_commentary(mut self, dispatcher: Box<dyn CommentaryDispatcher>) -> Self {
        self.commentary = Some(dispatcher);
        self
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&GameEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn connection(&self) -> &EngineConnection {
        &self.conn
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.config.depth = clamp_depth(depth);
    }

    pub fn is_engine_turn(&self) -> bool {
        self.board.turn() == self.config.engine_side
    }

    pub fn is_thinking(&self) -> bool {
        self.searches.is_running()
    }

    /// Latest snapshot without committing anything.
    pub fn snapshot(&self) -> BoardUpdate {
        BoardUpdate {
            position: self.board.current_position(),
            evaluation: self.evaluation,
            mate: self.mate,
            game_state: self.board.game_state(),
            mood: self.mood(),
            last_move: self.board.history().last().cloned(),
            principal_variation: self.principal_variation.clone(),
            search_depth: self.search_depth,
        }
    }

    /// Starts an engine search when it is the engine's turn.
    pub fn position_changed(&mut self) {
        if self.board.is_game_over() {
            debug!("game over, no search");
            return;
        }
        if !self.is_engine_turn() || self.searches.is_running() {
            return;
        }
        let fen = self.board.current_position();
        let depth = self.config.depth;
        self.searches
            .start(&mut self.conn, &fen, depth, self.config.engine_side);
        self.emit(GameEvent::EngineThinking { depth });
    }

    /// Applies a human move. Returns false when it is not the human's turn,
    /// the game is over or the move is illegal; the board is untouched then.
    pub fn attempt_move(&mut self, from: &str, to: &str) -> bool {
        if self.board.is_game_over() {
            debug!("move {from}{to} rejected: game is over");
            return false;
        }
        if self.is_engine_turn() {
            debug!("move {from}{to} rejected: engine to move");
            return false;
        }
        match self.board.apply_move(from, to, Role::Queen) {
            Ok(played) => {
                info!("human played {}", played.san);
                if self.searches.is_running() {
                    self.searches.cancel(&mut self.conn);
                }
                let update = self.snapshot();
                let finished = update.game_state.is_over();
                self.emit(GameEvent::Board(update.clone()));
                if finished {
                    // 人間の手で終局: エンジンの手番は来ないのでここで一度だけ実況する
                    self.comment_on(played, &update);
                } else {
                    self.position_changed();
                }
                true
            }
            Err(e) => {
                info!("move rejected: {e}");
                false
            }
        }
    }

    /// Non-blocking: commits the engine move if its search has resolved.
    pub fn poll_engine(&mut self) -> Result<Option<PlayedMove>, SearchError> {
        match self.searches.poll() {
            Ok(SearchPoll::Resolved(result)) => Ok(self.commit(result)),
            Ok(SearchPoll::Pending) | Err(SearchError::Idle) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Blocks until the engine's move is committed (or rejected).
    pub fn run_engine_turn(&mut self) -> Result<Option<PlayedMove>, SearchError> {
        self.position_changed();
        if !self.searches.is_running() {
            return Ok(None);
        }
        let result = self.searches.wait(&mut self.conn, self.config.limits)?;
        Ok(self.commit(result))
    }

    pub fn shutdown(&mut self) {
        self.searches.cancel(&mut self.conn);
        self.conn.terminate();
    }

    fn commit(&mut self, result: SearchResult) -> Option<PlayedMove> {
        let token = result.best_move.split_whitespace().next().unwrap_or("");
        let Some((from, to)) = split_uci_move(token) else {
            warn!("engine returned no playable move: {:?}", result.best_move);
            self.emit(GameEvent::EngineMoveRejected {
                best_move: result.best_move,
            });
            return None;
        };
        let played = match self.board.apply_move(from, to, Role::Queen) {
            Ok(played) => played,
            Err(e) => {
                // 再探索はしない。盤面はそのまま人間側の操作を待つ
                warn!("engine move {token} rejected by the board: {e}");
                self.emit(GameEvent::EngineMoveRejected {
                    best_move: result.best_move,
                });
                return None;
            }
        };
        // Telemetry only describes the position once its move is on the board.
        self.evaluation = result.final_evaluation;
        self.mate = result.mate_distance;
        self.principal_variation = result.principal_variation;
        self.search_depth = result.search_depth;
        info!(
            "engine played {} (eval {:?}, mate {:?}, depth {})",
            played.san, self.evaluation, self.mate, self.search_depth
        );

        let update = self.snapshot();
        self.emit(GameEvent::Board(update.clone()));
        self.comment_on(played.clone(), &update);
        Some(played)
    }

    /// Dispatches commentary once for `reply`, the move that produced `update`.
    fn comment_on(&mut self, reply: PlayedMove, update: &BoardUpdate) {
        if self.commentary.is_none() {
            return;
        }
        let ctx = CommentaryContext {
            opponent_move: self.move_before(&reply),
            reply,
            position: update.position.clone(),
            evaluation: update.evaluation,
            mate: update.mate,
            mood: update.mood,
            game_state: update.game_state,
        };
        self.emit(GameEvent::CommentaryPending);
        if let Some(dispatcher) = self.commentary.as_mut() {
            let text = dispatcher.dispatch(&ctx);
            self.emit(GameEvent::Commentary(text));
        }
    }

    /// The other side's move played just before `reply`.
    fn move_before(&self, reply: &PlayedMove) -> Option<PlayedMove> {
        let history = self.board.history();
        let n = history.len();
        if n < 2 {
            return None;
        }
        let prev = &history[n - 2];
        (prev.side != reply.side).then(|| prev.clone())
    }

    fn mood(&self) -> Mood {
        match (self.evaluation, self.mate) {
            (Some(eval), _) => Mood::from_evaluation(eval, self.config.engine_side),
            (None, Some(mate)) => Mood::from_mate(mate > 0),
            (None, None) => Mood::Neutral,
        }
    }

    fn emit(&mut self, event: GameEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
    }
}

/// Splits `e2e4` / `e7e8q` into its source and destination squares.
pub fn split_uci_move(token: &str) -> Option<(&str, &str)> {
    if token == "(none)" || token == "0000" {
        return None;
    }
    let from = token.get(0..2)?;
    let to = token.get(2..4)?;
    Some((from, to))
}
