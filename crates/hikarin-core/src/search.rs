//! Search session control.
//!
//! A [`SearchController`] owns at most one running search per connection.
//! Each search is tagged with a token (the number of `go` commands issued on
//! the connection before it); engine lines whose epoch is below the token
//! belong to an older search and are dropped.

use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use log::{debug, info, warn};
use shakmaty::Color;

use crate::error::SearchError;
use crate::transport::{EngineConnection, EngineLine, Subscription};
use crate::uci::decode;

pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 24;

/// Clamps a requested depth into `MIN_DEPTH..=MAX_DEPTH`.
pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(MIN_DEPTH, MAX_DEPTH)
}

/// Time bounds for a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// `stop` is sent once this has elapsed without a terminal line
    pub soft: Duration,
    /// Additional time allowed after `stop` before giving up
    pub grace: Duration,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            soft: Duration::from_secs(30),
            grace: Duration::from_secs(5),
        }
    }
}

/// Outcome of one completed search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub best_move: String,
    pub ponder_move: Option<String>,
    /// Pawns from White's point of view. `None` when the last score was a mate.
    pub final_evaluation: Option<f64>,
    /// Moves to mate from the side to move's point of view
    pub mate_distance: Option<i32>,
    pub principal_variation: Option<String>,
    pub search_depth: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchPoll {
    Pending,
    Resolved(SearchResult),
}

#[derive(Debug, Default)]
struct Accumulator {
    evaluation: Option<f64>,
    mate: Option<i32>,
    pv: Option<String>,
    depth: u32,
}

struct SearchSession {
    token: u64,
    side: Color,
    depth: u32,
    subscription: Subscription,
    acc: Accumulator,
    started: Instant,
}

impl SearchSession {
    fn absorb(&mut self, line: &EngineLine) -> Result<Option<SearchResult>, SearchError> {
        if line.epoch != self.token {
            if crate::uci::is_terminal(&line.text) {
                debug!(
                    "dropping stale terminal line (epoch {} != token {}): {}",
                    line.epoch, self.token, line.text
                );
            }
            return Ok(None);
        }

        let rec = decode(&line.text);
        if rec.is_secondary_line() {
            return Ok(None);
        }

        let sign = match self.side {
            Color::White => 1.0,
            Color::Black => -1.0,
        };
        if let Some(cp) = rec.score_centipawns {
            self.acc.evaluation = Some(sign * f64::from(cp) / 100.0);
            self.acc.mate = None;
        }
        if let Some(mate) = rec.mate_in {
            self.acc.mate = Some(mate);
            self.acc.evaluation = None;
        }
        if rec.principal_variation.is_some() {
            self.acc.pv = rec.principal_variation.clone();
        }
        if rec.search_depth > 0 {
            self.acc.depth = rec.search_depth;
        }

        if !rec.is_terminal() {
            return Ok(None);
        }
        let best_move = rec
            .best_move
            .ok_or_else(|| SearchError::MissingBestMove(rec.raw_line.clone()))?;
        let acc = std::mem::take(&mut self.acc);
        Ok(Some(SearchResult {
            best_move,
            ponder_move: rec.ponder_move,
            final_evaluation: acc.evaluation,
            mate_distance: acc.mate,
            principal_variation: acc.pv,
            search_depth: acc.depth,
            elapsed: self.started.elapsed(),
        }))
    }
}

/// Drives one search at a time on a connection.
#[derive(Default)]
pub struct SearchController {
    active: Option<SearchSession>,
    resolved: Option<SearchResult>,
}

impl SearchController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Running
        } else if self.resolved.is_some() {
            SessionState::Resolved
        } else {
            SessionState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Starts a search for `fen`. A running search is abandoned first: its
    /// subscription is released and the engine is told to `stop`.
    ///
    /// The new search only resolves after the engine has answered every
    /// earlier `go` with a `bestmove`; see [`SearchController::wait`].
    pub fn start(&mut self, conn: &mut EngineConnection, fen: &str, depth: u32, side: Color) -> u64 {
        if let Some(previous) = self.active.take() {
            debug!("abandoning search #{}", previous.token);
            drop(previous);
            conn.stop();
        } else if conn.outstanding_searches() > 0 {
            warn!(
                "{}: {} earlier search(es) never reported bestmove; the new search waits behind them",
                conn.label(),
                conn.outstanding_searches()
            );
        }
        self.resolved = None;

        let depth = clamp_depth(depth);
        let subscription = conn.subscribe();
        let token = conn.issue_search(fen, depth);
        info!("{}: search #{token} started (depth {depth})", conn.label());
        self.active = Some(SearchSession {
            token,
            side,
            depth,
            subscription,
            acc: Accumulator::default(),
            started: Instant::now(),
        });
        token
    }

    /// Drains every line already delivered without blocking.
    pub fn pump(&mut self) -> Result<SessionState, SearchError> {
        loop {
            let received = match self.active.as_ref() {
                Some(session) => session.subscription.try_recv(),
                None => return Ok(self.state()),
            };
            match received {
                Ok(line) => {
                    if let Some(result) = self.finish_on(&line)? {
                        self.resolved = Some(result);
                        return Ok(SessionState::Resolved);
                    }
                }
                Err(TryRecvError::Empty) => return Ok(SessionState::Running),
                Err(TryRecvError::Disconnected) => {
                    self.active = None;
                    return Err(SearchError::Disconnected);
                }
            }
        }
    }

    /// Non-blocking check. A resolved result is handed out exactly once.
    pub fn poll(&mut self) -> Result<SearchPoll, SearchError> {
        if self.active.is_none() && self.resolved.is_none() {
            return Err(SearchError::Idle);
        }
        self.pump()?;
        Ok(match self.take_result() {
            Some(result) => SearchPoll::Resolved(result),
            None => SearchPoll::Pending,
        })
    }

    pub fn take_result(&mut self) -> Option<SearchResult> {
        self.resolved.take()
    }

    /// Blocks until the running search resolves. `stop` is sent once after
    /// `limits.soft`; the search is abandoned after a further `limits.grace`.
    ///
    /// After [`SearchError::Timeout`] the connection stays out of step until
    /// the engine emits the overdue `bestmove`
    /// ([`EngineConnection::outstanding_searches`] is non-zero meanwhile).
    /// Searches started before that never resolve, so callers that cannot
    /// wait for the engine should treat the connection as unusable.
    pub fn wait(
        &mut self,
        conn: &mut EngineConnection,
        limits: SearchLimits,
    ) -> Result<SearchResult, SearchError> {
        if let Some(result) = self.resolved.take() {
            return Ok(result);
        }
        let Some(session) = self.active.as_ref() else {
            return Err(SearchError::Idle);
        };
        let mut deadline = session.started + limits.soft;
        let mut stop_sent = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = match self.active.as_ref() {
                Some(session) => session.subscription.recv_timeout(remaining),
                None => return Err(SearchError::Idle),
            };
            match received {
                Ok(line) => {
                    if let Some(result) = self.finish_on(&line)? {
                        return Ok(result);
                    }
                }
                Err(RecvTimeoutError::Timeout) if !stop_sent => {
                    // 思考時間超過: 一度だけ stop を送り猶予時間だけ待つ
                    warn!(
                        "{}: no bestmove within {:?}, sending stop",
                        conn.label(),
                        limits.soft
                    );
                    conn.stop();
                    stop_sent = true;
                    deadline = Instant::now() + limits.grace;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("{}: engine ignored stop, abandoning search", conn.label());
                    self.active = None;
                    return Err(SearchError::Timeout(limits.soft + limits.grace));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.active = None;
                    return Err(SearchError::Disconnected);
                }
            }
        }
    }

    /// Sends `stop` and abandons the running search.
    pub fn cancel(&mut self, conn: &mut EngineConnection) {
        if let Some(session) = self.active.take() {
            debug!("cancelling search #{} (depth {})", session.token, session.depth);
            conn.stop();
        }
    }

    fn finish_on(&mut self, line: &EngineLine) -> Result<Option<SearchResult>, SearchError> {
        let Some(session) = self.active.as_mut() else {
            return Ok(None);
        };
        match session.absorb(line) {
            Ok(Some(result)) => {
                debug!("search #{} resolved: {}", session.token, result.best_move);
                self.active = None;
                Ok(Some(result))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.active = None;
                Err(e)
            }
        }
    }
}
