//! Evidence extraction and verdict reconciliation.
//!
//! ```text
//! ExecutionResult.output ──► signals::extract ──► NumericProof ─┐
//!                                                               ├─► verdict::aggregate ──► FinalVerdict
//! judge text ──────────────► QualitativeVerdict ────────────────┘
//! ```

pub mod signals;
pub mod verdict;

pub use signals::{extract, parse_optional_float, NumericProof, LOSS_END_MARKER, LOSS_START_MARKER};
pub use verdict::{
    aggregate, aggregate_text, FinalVerdict, QualitativeVerdict, VerdictLabel, AUTHENTIC_TOKEN,
};
