//! UCI output decoding.
//!
//! Each field is extracted by its own pattern against the whole line, so field
//! order inside the line does not matter and unknown tokens are ignored.

use once_cell::sync::Lazy;
use regex::Regex;

static BEST_MOVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bbestmove\s+(\S+)").unwrap());
static PONDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bponder\s+(\S+)").unwrap());
static CP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bcp\s+(\S+)").unwrap());
static MATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bmate\s+(\S+)").unwrap());
// 直前の空白を必須にして multipv などの部分一致を避ける。
static PV_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" pv\s+(.*)").unwrap());
// `\b` により seldepth は一致しない。
static DEPTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bdepth\s+(\S+)").unwrap());
static MULTIPV_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bmultipv\s+(\S+)").unwrap());

/// Terminal marker of a search.
pub const TERMINAL_MARKER: &str = "bestmove";

/// Structured telemetry decoded from one engine line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub raw_line: String,
    pub best_move: Option<String>,
    pub ponder_move: Option<String>,
    /// Score from the side to move's point of view
    pub score_centipawns: Option<i32>,
    pub mate_in: Option<i32>,
    /// Space separated move list
    pub principal_variation: Option<String>,
    /// 0 when the line carries no depth
    pub search_depth: u32,
    pub multipv: Option<u32>,
}

impl TelemetryRecord {
    pub fn is_terminal(&self) -> bool {
        is_terminal(&self.raw_line)
    }

    /// Whether this line reports a secondary multipv line.
    pub fn is_secondary_line(&self) -> bool {
        self.multipv.is_some_and(|k| k > 1)
    }
}

/// Decodes one raw engine line. Never fails: a line without any marker
/// yields an empty record, and malformed numbers read as 0.
pub fn decode(raw_line: &str) -> TelemetryRecord {
    TelemetryRecord {
        raw_line: raw_line.to_string(),
        best_move: token_after(&BEST_MOVE_RE, raw_line).map(str::to_string),
        ponder_move: token_after(&PONDER_RE, raw_line).map(str::to_string),
        score_centipawns: token_after(&CP_RE, raw_line).map(coerce_number),
        mate_in: token_after(&MATE_RE, raw_line).map(coerce_number),
        principal_variation: token_after(&PV_RE, raw_line)
            .map(str::trim)
            .filter(|pv| !pv.is_empty())
            .map(str::to_string),
        search_depth: token_after(&DEPTH_RE, raw_line).map(coerce_number).unwrap_or(0),
        multipv: token_after(&MULTIPV_RE, raw_line).map(coerce_number),
    }
}

/// Whether `line` ends a search.
pub fn is_terminal(line: &str) -> bool {
    line.trim_start().starts_with(TERMINAL_MARKER)
}

fn token_after<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

fn coerce_number<T>(token: &str) -> T
where
    T: std::str::FromStr + Default,
{
    token.parse::<T>().unwrap_or_default()
}
