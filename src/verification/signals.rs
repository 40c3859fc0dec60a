//! Numeric evidence extraction from raw execution output.
//!
//! Executed training scripts are expected to print two labelled lines,
//! `LOSS_START: <float>` and `LOSS_END: <float>`, somewhere among their
//! other log output. Missing or malformed markers are not errors; they
//! simply leave the corresponding value absent.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Label of the initial-loss marker.
pub const LOSS_START_MARKER: &str = "LOSS_START";

/// Label of the final-loss marker.
pub const LOSS_END_MARKER: &str = "LOSS_END";

/// Matches `LABEL: payload` anywhere in a line. The label must not be glued
/// to a preceding word character, so `MY_LOSS_START` does not count.
static MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(LOSS_START|LOSS_END)[ \t]*:[ \t]*([^\s,;]*)")
        .expect("Invalid regex for loss markers")
});

/// Start and end loss values reported by an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NumericProof {
    /// Value of the first `LOSS_START` marker, if it parsed.
    pub start: Option<f64>,
    /// Value of the first `LOSS_END` marker, if it parsed.
    pub end: Option<f64>,
}

impl NumericProof {
    /// Creates a proof from already-parsed values.
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        Self { start, end }
    }

    /// Returns both values when both are present.
    pub fn pair(&self) -> Option<(f64, f64)> {
        Some((self.start?, self.end?))
    }

    /// True when both values are present and therefore count as evidence.
    pub fn is_complete(&self) -> bool {
        self.pair().is_some()
    }

    /// True when complete evidence shows the loss went down.
    pub fn shows_decrease(&self) -> bool {
        matches!(self.pair(), Some((start, end)) if end < start)
    }
}

/// Parses a marker payload, returning `None` for anything that is not a
/// finite floating-point number.
pub fn parse_optional_float(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Scans `output` for the loss markers.
///
/// The first occurrence of each label wins, even when its payload is
/// malformed and a later occurrence would have parsed: `LOSS_START: oops`
/// followed by `LOSS_START: 1.0` leaves the start absent. Labels are
/// resolved independently of each other.
pub fn extract(output: &str) -> NumericProof {
    let mut start: Option<Option<f64>> = None;
    let mut end: Option<Option<f64>> = None;

    for caps in MARKER_PATTERN.captures_iter(output) {
        let payload = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let slot = match caps.get(1).map(|m| m.as_str()) {
            Some(LOSS_START_MARKER) => &mut start,
            Some(LOSS_END_MARKER) => &mut end,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(parse_optional_float(payload));
        }
        if start.is_some() && end.is_some() {
            break;
        }
    }

    let proof = NumericProof::new(start.flatten(), end.flatten());
    debug!(
        start = ?proof.start,
        end = ?proof.end,
        "Extracted numeric evidence"
    );
    proof
}
