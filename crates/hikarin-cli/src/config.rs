//! TOML configuration file and its merge with command-line flags.
//!
//! ```toml
//! [engine]
//! path = "/usr/bin/stockfish"
//! elo = 900
//! options = ["Skill Level=5"]
//!
//! [game]
//! engine_side = "white"
//! depth = 6
//!
//! [commentary]
//! model = "gemini-2.5-flash"
//! ```
//!
//! Flags given on the command line win over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use hikarin_commentary::GeminiConfig;
use hikarin_core::{Color, EngineConfig, OrchestratorConfig, SearchLimits};
use log::warn;
use serde::Deserialize;

use crate::Cli;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub engine: EngineSection,
    pub game: GameSection,
    pub commentary: CommentarySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub path: Option<PathBuf>,
    pub args: Vec<String>,
    pub elo: Option<u32>,
    pub full_strength: Option<bool>,
    pub threads: Option<usize>,
    pub hash_mb: Option<u32>,
    /// `Name=Value` pairs
    pub options: Vec<String>,
    pub ready_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameSection {
    pub engine_side: Option<Side>,
    pub depth: Option<u32>,
    pub think_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommentarySection {
    pub enabled: Option<bool>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    /// Overrides `GEMINI_API_KEY`
    pub api_key: Option<String>,
    pub timeout_ms: Option<u64>,
}

pub fn load(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse(&text).with_context(|| format!("parse config {}", path.display()))
}

pub fn parse(text: &str) -> Result<FileConfig> {
    Ok(toml::from_str(text)?)
}

/// Everything `main` needs, after merging flags over the file.
#[derive(Debug)]
pub struct Settings {
    pub engine: EngineConfig,
    pub game: OrchestratorConfig,
    pub commentary: Option<GeminiConfig>,
}

pub fn resolve(cli: &Cli, file: FileConfig, env_key: Option<GeminiConfig>) -> Settings {
    let FileConfig {
        engine: fe,
        game: fg,
        commentary: fc,
    } = file;

    let defaults = EngineConfig::default();
    let full_strength = cli.full_strength || fe.full_strength.unwrap_or(false);
    let mut uci_options = fe.options;
    uci_options.extend(cli.uci_option.iter().cloned());
    let engine = EngineConfig {
        path: cli.engine_path.clone().or(fe.path).unwrap_or(defaults.path),
        args: if cli.engine_arg.is_empty() { fe.args } else { cli.engine_arg.clone() },
        label: "engine".to_string(),
        threads: cli.threads.or(fe.threads),
        hash_mb: cli.hash_mb.or(fe.hash_mb),
        elo: if full_strength {
            None
        } else {
            cli.elo.or(fe.elo).or(defaults.elo)
        },
        uci_options,
        ready_timeout: fe
            .ready_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.ready_timeout),
    };

    let game_defaults = OrchestratorConfig::default();
    let limits_defaults = SearchLimits::default();
    let game = OrchestratorConfig {
        engine_side: cli
            .engine_side
            .or(fg.engine_side)
            .map(Color::from)
            .unwrap_or(game_defaults.engine_side),
        depth: cli.depth.or(fg.depth).unwrap_or(game_defaults.depth),
        limits: SearchLimits {
            soft: cli
                .think_timeout_ms
                .or(fg.think_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(limits_defaults.soft),
            ..limits_defaults
        },
    };

    let commentary = if cli.no_commentary || fc.enabled == Some(false) {
        None
    } else {
        let base = fc.api_key.map(GeminiConfig::new).or(env_key);
        if base.is_none() {
            warn!("no Gemini API key (set GEMINI_API_KEY), commentary disabled");
        }
        base.map(|mut cfg| {
            if let Some(model) = cli.model.clone().or(fc.model) {
                cfg.model = model;
            }
            if let Some(endpoint) = fc.endpoint {
                cfg.endpoint = endpoint;
            }
            if let Some(ms) = fc.timeout_ms {
                cfg.timeout = Duration::from_millis(ms);
            }
            cfg
        })
    };

    Settings {
        engine,
        game,
        commentary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("hikarin").chain(args.iter().copied()))
    }

    const SAMPLE: &str = r#"
[engine]
path = "/opt/sf"
elo = 900
threads = 2
options = ["Skill Level=5"]

[game]
engine_side = "white"
depth = 6
think_timeout_ms = 1500

[commentary]
model = "from-file"
api_key = "file-key"
"#;

    #[test]
    fn defaults_without_file_or_flags() {
        let s = resolve(&cli(&[]), FileConfig::default(), None);
        assert_eq!(s.engine.path, PathBuf::from("stockfish"));
        assert_eq!(s.engine.elo, Some(700));
        assert_eq!(s.game.engine_side, Color::Black);
        assert_eq!(s.game.depth, 3);
        assert!(s.commentary.is_none());
    }

    #[test]
    fn file_values_are_used() {
        let s = resolve(&cli(&[]), parse(SAMPLE).unwrap(), None);
        assert_eq!(s.engine.path, PathBuf::from("/opt/sf"));
        assert_eq!(s.engine.elo, Some(900));
        assert_eq!(s.engine.threads, Some(2));
        assert_eq!(s.engine.uci_options, vec!["Skill Level=5"]);
        assert_eq!(s.game.engine_side, Color::White);
        assert_eq!(s.game.depth, 6);
        assert_eq!(s.game.limits.soft, Duration::from_millis(1500));
        let c = s.commentary.unwrap();
        assert_eq!(c.api_key, "file-key");
        assert_eq!(c.model, "from-file");
    }

    #[test]
    fn flags_override_the_file() {
        let args = [
            "--engine-path", "/usr/games/stockfish", "--elo", "1500", "--engine-side", "black",
            "--depth", "9", "--model", "from-flag", "--uci-option", "Contempt=0",
        ];
        let s = resolve(&cli(&args), parse(SAMPLE).unwrap(), None);
        assert_eq!(s.engine.path, PathBuf::from("/usr/games/stockfish"));
        assert_eq!(s.engine.elo, Some(1500));
        assert_eq!(s.engine.uci_options, vec!["Skill Level=5", "Contempt=0"]);
        assert_eq!(s.game.engine_side, Color::Black);
        assert_eq!(s.game.depth, 9);
        assert_eq!(s.commentary.unwrap().model, "from-flag");
    }

    #[test]
    fn commentary_can_be_switched_off() {
        let env = Some(GeminiConfig::new("env-key"));
        let s = resolve(&cli(&["--no-commentary"]), FileConfig::default(), env.clone());
        assert!(s.commentary.is_none());

        let s = resolve(&cli(&[]), FileConfig::default(), env);
        assert_eq!(s.commentary.unwrap().api_key, "env-key");
    }

    #[test]
    fn full_strength_drops_the_elo_limit() {
        let s = resolve(&cli(&["--full-strength", "--elo", "1000"]), FileConfig::default(), None);
        assert_eq!(s.engine.elo, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse("[engine]\npaht = \"x\"\n").is_err());
        assert!(parse("[game]\nengine_side = \"red\"\n").is_err());
    }
}
