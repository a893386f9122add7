use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use clap::Parser;
use hikarin_commentary::{Commentator, GeminiClient, GeminiConfig, THINKING};
use hikarin_core::orchestrator::split_uci_move;
use hikarin_core::{
    BoardAuthority, EngineConnection, GameEvent, GameState, MoveOrchestrator, ShakmatyBoard,
    Subscription,
};
use log::{info, warn};

mod config;
mod render;

use config::Side;

/// Play chess in the terminal against a UCI engine voiced by Hikarin.
///
/// Enter moves as `e2e4` (or `e2 e4`). Other commands: `board`, `history`,
/// `depth <n>`, `quit`. Set `RUST_LOG=debug` to see raw engine traffic.
///
/// Example:
///   `cargo run -p hikarin-cli -- --engine-path /usr/games/stockfish --elo 900 --depth 5`
#[derive(Parser, Debug)]
#[command(author, version, about = "Play chess against a UCI engine with persona commentary")]
pub struct Cli {
    /// UCI engine executable (default: `stockfish` on PATH)
    #[arg(long)]
    engine_path: Option<PathBuf>,

    /// Argument passed to the engine executable (repeatable)
    #[arg(long, allow_hyphen_values = true)]
    engine_arg: Vec<String>,

    /// Search depth per engine move (clamped to 1..=24)
    #[arg(long)]
    depth: Option<u32>,

    /// UCI_Elo used with UCI_LimitStrength (default 700)
    #[arg(long)]
    elo: Option<u32>,

    /// Do not limit engine strength
    #[arg(long, default_value_t = false)]
    full_strength: bool,

    /// Threads UCI option (if available)
    #[arg(long)]
    threads: Option<usize>,

    /// Hash UCI option in MiB (if available)
    #[arg(long)]
    hash_mb: Option<u32>,

    /// Extra UCI option as Name=Value (repeatable)
    #[arg(long)]
    uci_option: Vec<String>,

    /// Side the engine plays
    #[arg(long, value_enum)]
    engine_side: Option<Side>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable commentary even when an API key is available
    #[arg(long, default_value_t = false)]
    no_commentary: bool,

    /// Gemini model used for commentary
    #[arg(long)]
    model: Option<String>,

    /// Log every raw engine line at info level
    #[arg(long, default_value_t = false)]
    log_info: bool,

    /// Time the engine may think before `stop` is sent (milliseconds)
    #[arg(long)]
    think_timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => config::load(path)?,
        None => config::FileConfig::default(),
    };
    let settings = config::resolve(&cli, file, GeminiConfig::from_env());

    let mut conn = EngineConnection::spawn(&settings.engine)
        .with_context(|| format!("start engine {}", settings.engine.path.display()))?;
    conn.new_game().context("ucinewgame")?;
    let diagnostics = if cli.log_info {
        Some(spawn_info_logger(conn.subscribe())?)
    } else {
        None
    };

    let mut orch = MoveOrchestrator::new(conn, ShakmatyBoard::new(), settings.game);
    if let Some(cfg) = settings.commentary {
        info!("commentary enabled ({})", cfg.model);
        let client = GeminiClient::new(cfg).context("build commentary client")?;
        orch = orch.with_commentary(Box::new(Commentator::new(client)));
    }
    orch.subscribe(print_event);

    print!("{}", render::render_update(&orch.snapshot()));
    orch.position_changed();
    let outcome = play(&mut orch);
    orch.shutdown();
    if let Some(handle) = diagnostics {
        let _ = handle.join();
    }
    outcome
}

/// Second listener on the connection that logs every raw line.
fn spawn_info_logger(sub: Subscription) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("engine-info-log".to_string())
        .spawn(move || {
            while let Ok(line) = sub.recv() {
                info!("[engine] {}", line.text);
            }
        })?;
    Ok(handle)
}

fn play(orch: &mut MoveOrchestrator<ShakmatyBoard>) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if orch.board().is_game_over() {
            println!("{}", final_message(orch.board().game_state()));
            return Ok(());
        }
        if orch.is_engine_turn() {
            match orch.run_engine_turn() {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    println!("Hikarin could not find a move. Game stopped.");
                    return Ok(());
                }
                Err(e) => {
                    warn!("engine search failed: {e}");
                    println!("The engine stopped responding ({e}).");
                    return Ok(());
                }
            }
        }

        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line.context("read stdin")?;
        let input = line.trim();
        match input.split_whitespace().collect::<Vec<_>>().as_slice() {
            [] => {}
            ["quit"] | ["exit"] => return Ok(()),
            ["board"] => print!("{}", render::render_update(&orch.snapshot())),
            ["history"] => println!("{}", orch.board().history_san().join(" ")),
            ["depth", n] => match n.parse::<u32>() {
                Ok(depth) => {
                    orch.set_depth(depth);
                    println!("depth set to {}", orch.config().depth);
                }
                Err(_) => println!("usage: depth <n>"),
            },
            [from, to] if from.len() == 2 && to.len() == 2 => {
                if !orch.attempt_move(from, to) {
                    println!("Illegal move: {from}{to}");
                }
            }
            [mv] => match split_uci_move(mv) {
                Some((from, to)) => {
                    if !orch.attempt_move(from, to) {
                        println!("Illegal move: {mv}");
                    }
                }
                None => println!("Unknown command: {mv}"),
            },
            _ => println!("Unknown command: {input}"),
        }
    }
}

fn print_event(event: &GameEvent) {
    match event {
        GameEvent::Board(update) => print!("{}", render::render_update(update)),
        GameEvent::EngineThinking { depth } => println!("Hikarin is thinking (depth {depth})..."),
        GameEvent::CommentaryPending => println!("{THINKING}"),
        GameEvent::Commentary(text) => println!("Hikarin: {text}"),
        GameEvent::EngineMoveRejected { best_move } => {
            println!("Engine proposed an unplayable move: {best_move}")
        }
    }
}

fn final_message(state: GameState) -> String {
    match state {
        GameState::Checkmate { winner } => {
            format!("Checkmate! {} wins.", hikarin_core::board::side_name(winner))
        }
        GameState::Draw => "Draw.".to_string(),
        GameState::InProgress | GameState::Check => "Game over.".to_string(),
    }
}
