//! Error types for engine communication, searches and board access

use std::time::Duration;

/// Failures while starting or talking to the engine process
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The engine executable could not be started
    #[error("failed to spawn engine at {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A piped stdio handle was not available after spawning
    #[error("engine {0} pipe is not available")]
    MissingPipe(&'static str),

    /// The engine did not answer within the handshake deadline
    #[error("{label}: no {expected} within {waited:?}")]
    Timeout {
        label: String,
        expected: &'static str,
        waited: Duration,
    },

    /// The engine's output stream closed
    #[error("{0}: engine exited unexpectedly")]
    Disconnected(String),

    /// Reader thread creation or other I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of a single search request
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// No search is running on this controller
    #[error("no search is running")]
    Idle,

    /// Neither the soft limit nor the grace period after `stop` produced a terminal line
    #[error("search did not complete within {0:?}")]
    Timeout(Duration),

    /// The engine output ended before the terminal line arrived
    #[error("engine output closed before the search completed")]
    Disconnected,

    /// A terminal line arrived without a move token
    #[error("terminal line without a move: {0:?}")]
    MissingBestMove(String),
}

/// Rejections from the board authority
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("invalid square {0:?}")]
    InvalidSquare(String),

    #[error("illegal move {from}{to}")]
    IllegalMove { from: String, to: String },

    #[error("invalid FEN: {0}")]
    InvalidFen(String),
}
