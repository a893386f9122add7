//! Engine transport.
//!
//! An [`EngineConnection`] owns the single long-lived link to an engine
//! process. Commands are written fire-and-forget; every line the engine emits
//! is broadcast to all live [`Subscription`]s in emission order. The transport
//! does not interpret lines beyond stamping each one with an epoch (the number
//! of terminal lines delivered before it), which search sessions use as their
//! correlation token.

use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};

use crate::error::EngineError;
use crate::uci::is_terminal;

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default strength cap applied through `UCI_LimitStrength` / `UCI_Elo`.
pub const DEFAULT_ELO: u32 = 700;

/// エンジンプロセス起動時の設定。
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Prefix for log lines and the reader thread name
    pub label: String,
    pub threads: Option<usize>,
    pub hash_mb: Option<u32>,
    /// `Some` enables `UCI_LimitStrength` with this `UCI_Elo`
    pub elo: Option<u32>,
    /// 追加の UCI オプション (Name=Value 形式)
    pub uci_options: Vec<String>,
    pub ready_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            label: "engine".to_string(),
            threads: None,
            hash_mb: None,
            elo: Some(DEFAULT_ELO),
            uci_options: Vec::new(),
            ready_timeout: ENGINE_READY_TIMEOUT,
        }
    }
}

/// One engine output line as seen by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLine {
    /// Number of terminal lines the connection delivered before this one
    pub epoch: u64,
    pub text: String,
}

/// Write side of a transport.
pub trait CommandSink: Send {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

impl<W: Write + Send> CommandSink for BufWriter<W> {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write_all(line.as_bytes())?;
        self.write_all(b"\n")?;
        self.flush()
    }
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    epoch: u64,
    closed: bool,
    senders: Vec<(u64, Sender<EngineLine>)>,
}

/// Listener registry shared between the reader side and subscribers.
#[derive(Default)]
pub struct Listeners {
    table: Mutex<ListenerTable>,
}

impl Listeners {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new listener. On a closed registry the returned
    /// subscription is already disconnected.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut table = self.lock();
        let id = table.next_id;
        table.next_id += 1;
        if !table.closed {
            table.senders.push((id, tx));
        }
        Subscription {
            id,
            rx,
            owner: Arc::downgrade(self),
        }
    }

    /// Delivers `text` to every live listener.
    pub fn broadcast(&self, text: &str) {
        let mut table = self.lock();
        if table.closed {
            return;
        }
        let line = EngineLine {
            epoch: table.epoch,
            text: text.to_string(),
        };
        table.senders.retain(|(_, tx)| tx.send(line.clone()).is_ok());
        if is_terminal(text) {
            table.epoch += 1;
        }
    }

    /// Drops every listener and refuses new ones.
    pub fn close(&self) {
        let mut table = self.lock();
        table.closed = true;
        table.senders.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().senders.retain(|(sid, _)| *sid != id);
    }

    fn lock(&self) -> MutexGuard<'_, ListenerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one registered listener. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: Receiver<EngineLine>,
    owner: Weak<Listeners>,
}

impl Subscription {
    pub fn try_recv(&self) -> Result<EngineLine, TryRecvError> {
        self.rx.try_recv()
    }

    /// Blocks until a line arrives or the connection closes.
    pub fn recv(&self) -> Result<EngineLine, RecvError> {
        self.rx.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<EngineLine, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.unsubscribe(self.id);
        }
    }
}

/// 1本のエンジンに対する入出力をカプセル化する。
pub struct EngineConnection {
    label: String,
    sink: Box<dyn CommandSink>,
    listeners: Arc<Listeners>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    option_names: HashSet<String>,
    ready_timeout: Duration,
    searches_issued: u64,
    ready: bool,
    terminated: bool,
}

impl EngineConnection {
    /// Starts the engine process and runs the configuration handshake.
    pub fn spawn(cfg: &EngineConfig) -> Result<Self, EngineError> {
        let mut cmd = Command::new(&cfg.path);
        if !cfg.args.is_empty() {
            cmd.args(&cfg.args);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: cfg.path.display().to_string(),
                source,
            })?;
        let stdin = child.stdin.take().ok_or(EngineError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(EngineError::MissingPipe("stdout"))?;

        let listeners = Listeners::new();
        let hub = Arc::clone(&listeners);
        let reader_label = cfg.label.clone();
        let reader = thread::Builder::new()
            .name(format!("{}-reader", cfg.label))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(l) => {
                            debug!("{reader_label} >> {l}");
                            hub.broadcast(l.trim_end());
                        }
                        Err(e) => {
                            warn!("{reader_label}: read error: {e}");
                            break;
                        }
                    }
                }
                // 出力が閉じたら待機中の購読者に切断を知らせる
                hub.close();
            })?;

        let mut conn = Self::with_sink(cfg.label.clone(), Box::new(BufWriter::new(stdin)), listeners);
        conn.child = Some(child);
        conn.reader = Some(reader);
        conn.handshake(cfg)?;
        Ok(conn)
    }

    /// Builds a connection over an arbitrary command sink. Engine output must
    /// be fed into `listeners` by whoever owns the read side.
    pub fn with_sink(
        label: impl Into<String>,
        sink: Box<dyn CommandSink>,
        listeners: Arc<Listeners>,
    ) -> Self {
        Self {
            label: label.into(),
            sink,
            listeners,
            child: None,
            reader: None,
            option_names: HashSet::new(),
            ready_timeout: ENGINE_READY_TIMEOUT,
            searches_issued: 0,
            ready: false,
            terminated: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.listeners
    }

    /// Option names the engine advertised during the handshake.
    pub fn option_names(&self) -> &HashSet<String> {
        &self.option_names
    }

    pub fn subscribe(&self) -> Subscription {
        self.listeners.subscribe()
    }

    /// Searches whose `bestmove` has not arrived yet. Abandoned searches
    /// count until the engine finally reports them; while any are
    /// outstanding, lines of a new search are stamped with an older epoch
    /// and cannot resolve it.
    pub fn outstanding_searches(&self) -> u64 {
        self.searches_issued.saturating_sub(self.listeners.epoch())
    }

    /// Writes one command line. Failures are logged, not returned.
    pub fn send(&mut self, command: &str) {
        if self.terminated {
            warn!("{}: connection terminated, dropping {command:?}", self.label);
            return;
        }
        debug!("{} << {command}", self.label);
        if let Err(e) = self.sink.write_line(command) {
            warn!("{}: failed to send {command:?}: {e}", self.label);
        }
    }

    /// Sends `position fen` + `go depth` and returns the search token.
    pub fn issue_search(&mut self, fen: &str, depth: u32) -> u64 {
        let token = self.searches_issued;
        self.send(&format!("position fen {fen}"));
        self.send(&format!("go depth {depth}"));
        self.searches_issued += 1;
        token
    }

    pub fn stop(&mut self) {
        self.send("stop");
    }

    /// `uci` → options → `isready`. Marks the connection ready on `readyok`.
    pub fn handshake(&mut self, cfg: &EngineConfig) -> Result<(), EngineError> {
        self.ready_timeout = cfg.ready_timeout;
        let sub = self.subscribe();
        self.send("uci");
        let mut advertised = HashSet::new();
        wait_for(&sub, &self.label, cfg.ready_timeout, "uciok", |line| {
            if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = parse_option_name(rest) {
                    advertised.insert(name);
                }
                return false;
            }
            line == "uciok"
        })?;
        self.option_names = advertised;

        if let Some(elo) = cfg.elo {
            self.set_option_if_available("UCI_LimitStrength", "true");
            self.set_option_if_available("UCI_Elo", &elo.to_string());
        }
        if let Some(threads) = cfg.threads {
            self.set_option_if_available("Threads", &threads.to_string());
        }
        if let Some(hash) = cfg.hash_mb {
            self.set_option_if_available("Hash", &hash.to_string());
        }
        for opt in &cfg.uci_options {
            if let Some((name, value)) = opt.split_once('=') {
                self.set_option_if_available(name.trim(), value.trim());
            } else {
                // "=" がない場合はボタン型オプションとみなし、値なしで送る
                self.send(&format!("setoption name {}", opt.trim()));
            }
        }

        self.sync_ready_on(&sub)?;
        self.ready = true;
        info!(
            "{}: ready ({} options advertised)",
            self.label,
            self.option_names.len()
        );
        Ok(())
    }

    /// Sends `setoption` unless the engine advertised options and this one is
    /// not among them.
    pub fn set_option_if_available(&mut self, name: &str, value: &str) {
        if self.option_names.is_empty() || self.option_names.contains(name) {
            self.send(&format!("setoption name {name} value {value}"));
        } else {
            debug!("{}: engine does not advertise {name}, skipped", self.label);
        }
    }

    pub fn sync_ready(&mut self) -> Result<(), EngineError> {
        let sub = self.subscribe();
        self.sync_ready_on(&sub)
    }

    pub fn new_game(&mut self) -> Result<(), EngineError> {
        self.send("ucinewgame");
        self.sync_ready()
    }

    fn sync_ready_on(&mut self, sub: &Subscription) -> Result<(), EngineError> {
        self.send("isready");
        wait_for(sub, &self.label, self.ready_timeout, "readyok", |line| {
            line == "readyok"
        })
    }

    /// Sends `quit`, drops every listener and reaps the process.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.send("quit");
        self.terminated = true;
        self.ready = false;
        self.listeners.close();

        if let Some(mut child) = self.child.take() {
            let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
            let mut exited = false;
            while Instant::now() < deadline {
                if let Ok(Some(_)) = child.try_wait() {
                    exited = true;
                    break;
                }
                thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
            }
            if !exited {
                warn!("{}: engine ignored quit, killing it", self.label);
                let _ = child.kill();
                let _ = child.wait();
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        info!("{}: terminated", self.label);
    }
}

impl Drop for EngineConnection {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn wait_for(
    sub: &Subscription,
    label: &str,
    timeout: Duration,
    expected: &'static str,
    mut done: impl FnMut(&str) -> bool,
) -> Result<(), EngineError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match sub.recv_timeout(remaining) {
            Ok(line) => {
                if done(line.text.trim()) {
                    return Ok(());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(EngineError::Timeout {
                    label: label.to_string(),
                    expected,
                    waited: timeout,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(EngineError::Disconnected(label.to_string()));
            }
        }
    }
}

/// Extracts the option name from the tail of an `option name ... type ...` line.
pub fn parse_option_name(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    while let Some(tok) = tokens.next() {
        if tok == "name" {
            let parts: Vec<&str> = tokens.by_ref().take_while(|t| *t != "type").collect();
            if !parts.is_empty() {
                return Some(parts.join(" "));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_name_spans_until_type() {
        assert_eq!(
            parse_option_name("name Skill Level type spin default 20 min 0 max 20").as_deref(),
            Some("Skill Level")
        );
        assert_eq!(parse_option_name("name UCI_Elo type spin").as_deref(), Some("UCI_Elo"));
        assert_eq!(parse_option_name("type check default false"), None);
    }

    #[test]
    fn epoch_advances_after_terminal_line() {
        let hub = Listeners::new();
        let sub = hub.subscribe();
        hub.broadcast("info depth 1 score cp 3");
        hub.broadcast("bestmove e2e4");
        hub.broadcast("info depth 1 score cp 5");
        let epochs: Vec<u64> = (0..3).map(|_| sub.try_recv().unwrap().epoch).collect();
        assert_eq!(epochs, vec![0, 0, 1]);
        assert_eq!(hub.epoch(), 1);
    }

    #[test]
    fn closed_registry_hands_out_disconnected_subscriptions() {
        let hub = Listeners::new();
        hub.close();
        let sub = hub.subscribe();
        assert!(hub.is_empty());
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
    }
}
