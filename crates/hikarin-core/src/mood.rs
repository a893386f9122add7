//! Engine mood derived from the latest evaluation.

use std::fmt;

use shakmaty::Color;

/// Pawns of evaluation per mood unit.
pub const MOOD_DIVISOR: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mood {
    Desperate,
    Panicking,
    Nervous,
    Uneasy,
    Neutral,
    Calm,
    Pleased,
    Confident,
    Smug,
}

impl Mood {
    /// Buckets an engine-perspective score (positive = good for the engine).
    pub fn from_normalized(normalized: f64) -> Self {
        if normalized.is_nan() {
            return Mood::Neutral;
        }
        match normalized {
            n if n >= 8.0 => Mood::Smug,
            n if n >= 5.0 => Mood::Confident,
            n if n >= 2.0 => Mood::Pleased,
            n if n >= 0.5 => Mood::Calm,
            n if n > -0.5 => Mood::Neutral,
            n if n > -2.0 => Mood::Uneasy,
            n if n > -4.0 => Mood::Nervous,
            n if n > -6.0 => Mood::Panicking,
            _ => Mood::Desperate,
        }
    }

    /// Mood for a White-perspective evaluation when the engine plays `engine_side`.
    pub fn from_evaluation(evaluation: f64, engine_side: Color) -> Self {
        Self::from_normalized(normalize(evaluation, engine_side))
    }

    /// Mood when only a mate distance is known. `mate_for_engine` is true when
    /// the mating side is the engine.
    pub fn from_mate(mate_for_engine: bool) -> Self {
        if mate_for_engine { Mood::Smug } else { Mood::Desperate }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mood::Desperate => "desperate",
            Mood::Panicking => "panicking",
            Mood::Nervous => "nervous",
            Mood::Uneasy => "uneasy",
            Mood::Neutral => "neutral",
            Mood::Calm => "calm",
            Mood::Pleased => "pleased",
            Mood::Confident => "confident",
            Mood::Smug => "smug",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Converts a White-perspective evaluation (pawns) into the engine's own scale.
pub fn normalize(evaluation: f64, engine_side: Color) -> f64 {
    let sign = match engine_side {
        Color::White => 1.0,
        Color::Black => -1.0,
    };
    sign * evaluation / MOOD_DIVISOR
}
