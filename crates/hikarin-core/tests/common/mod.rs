//! Common test utilities for hikarin-core tests

#![allow(dead_code)] // These utilities may be used by various test files

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hikarin_core::{CommandSink, EngineConfig, EngineConnection, Listeners};

// Timeout constants for CI stability
pub const T_READY: Duration = Duration::from_millis(500); // Handshake wait
pub const T_SHORT: Duration = Duration::from_millis(30); // Soft limit for stalled searches

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AFTER_E4_FEN: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

#[derive(Default)]
struct Script {
    sent: Vec<String>,
    options: Vec<String>,
    go_replies: VecDeque<Vec<String>>,
    hold: bool,
    held: VecDeque<Vec<String>>,
    stop_reply: Option<String>,
    mute: bool,
}

/// In-memory engine. Replies are broadcast synchronously from inside the
/// command write, so every reply lands after the caller subscribed.
#[derive(Clone)]
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
    hub: Arc<Listeners>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// `RUST_LOG=debug cargo test` shows the scripted traffic.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

impl ScriptedEngine {
    pub fn new() -> Self {
        init_logging();
        let script = Script {
            options: ["UCI_LimitStrength", "UCI_Elo", "Threads", "Hash"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
            hub: Listeners::new(),
        }
    }

    /// Replaces the advertised option names.
    pub fn advertise(self, names: &[&str]) -> Self {
        self.script.lock().unwrap().options = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Never answers anything.
    pub fn mute(self) -> Self {
        self.script.lock().unwrap().mute = true;
        self
    }

    /// Queues the output of the next `go`.
    pub fn reply_to_go(&self, lines: &[&str]) {
        self.script
            .lock()
            .unwrap()
            .go_replies
            .push_back(lines.iter().map(|s| s.to_string()).collect());
    }

    /// Line emitted in response to `stop`.
    pub fn answer_stop_with(&self, line: &str) {
        self.script.lock().unwrap().stop_reply = Some(line.to_string());
    }

    /// While held, `go` output is deferred until `release_next`.
    pub fn hold_searches(&self, hold: bool) {
        self.script.lock().unwrap().hold = hold;
    }

    pub fn release_next(&self) {
        let lines = self.script.lock().unwrap().held.pop_front();
        for line in lines.unwrap_or_default() {
            self.hub.broadcast(&line);
        }
    }

    pub fn emit(&self, line: &str) {
        self.hub.broadcast(line);
    }

    pub fn sent(&self) -> Vec<String> {
        self.script.lock().unwrap().sent.clone()
    }

    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.hub
    }

    /// Connection without the handshake.
    pub fn raw_connection(&self) -> EngineConnection {
        EngineConnection::with_sink("scripted", Box::new(self.clone()), Arc::clone(&self.hub))
    }

    pub fn connection(&self) -> EngineConnection {
        self.connection_with(&test_config())
    }

    pub fn connection_with(&self, cfg: &EngineConfig) -> EngineConnection {
        let mut conn = self.raw_connection();
        conn.handshake(cfg).expect("scripted handshake");
        conn
    }

    fn respond(&self, command: &str) -> Vec<String> {
        let mut script = self.script.lock().unwrap();
        script.sent.push(command.to_string());
        if script.mute {
            return Vec::new();
        }
        let keyword = command.split_whitespace().next().unwrap_or("");
        match keyword {
            "uci" => {
                let mut out = vec!["id name Scripted".to_string()];
                out.extend(
                    script
                        .options
                        .iter()
                        .map(|name| format!("option name {name} type spin default 0 min 0 max 4096")),
                );
                out.push("uciok".to_string());
                out
            }
            "isready" => vec!["readyok".to_string()],
            "go" => {
                let reply = script.go_replies.pop_front().unwrap_or_default();
                if script.hold {
                    script.held.push_back(reply);
                    Vec::new()
                } else {
                    reply
                }
            }
            "stop" => script.stop_reply.clone().into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl CommandSink for ScriptedEngine {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        for reply in self.respond(line) {
            self.hub.broadcast(&reply);
        }
        Ok(())
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        label: "scripted".to_string(),
        ready_timeout: T_READY,
        ..EngineConfig::default()
    }
}
