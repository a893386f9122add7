//! Engine plumbing for the hikarin chess companion.
//!
//! The crate drives an external UCI engine process and sequences its output
//! against the board:
//!
//! - [`transport`]: one long-lived engine connection, command writes and a
//!   broadcast of every emitted line to all subscriptions
//! - [`uci`]: stateless decoding of one engine line into telemetry
//! - [`search`]: one `go` request at a time, accumulated into a [`SearchResult`]
//! - [`orchestrator`]: turn-taking, engine move application and event publishing
//!
//! Chess rules are never implemented here. Legality and game termination are
//! delegated to a [`BoardAuthority`], backed by `shakmaty` in [`ShakmatyBoard`].

pub mod board;
pub mod commentary;
pub mod error;
pub mod mood;
pub mod orchestrator;
pub mod search;
pub mod transport;
pub mod uci;

pub use board::{BoardAuthority, GameState, PlayedMove, ShakmatyBoard};
pub use commentary::{CommentaryContext, CommentaryDispatcher};
pub use error::{BoardError, EngineError, SearchError};
pub use mood::Mood;
pub use orchestrator::{BoardUpdate, GameEvent, MoveOrchestrator, OrchestratorConfig};
pub use search::{SearchController, SearchLimits, SearchPoll, SearchResult, SessionState};
pub use transport::{CommandSink, EngineConfig, EngineConnection, EngineLine, Listeners, Subscription};
pub use uci::{TelemetryRecord, decode};

pub use shakmaty::{Color, Role, Square};
