//! Hybrid verdict aggregation.
//!
//! A run is authentic when either signal says so: the qualitative judgment
//! mentions the authenticity token, or the numeric evidence shows the loss
//! decreasing. There is no weighting and no score.

use std::fmt;

use serde::Serialize;

use super::signals::NumericProof;

/// Token whose presence (case-insensitive) marks a positive judgment.
pub const AUTHENTIC_TOKEN: &str = "AUTHENTIC";

/// Final verdict label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerdictLabel {
    #[serde(rename = "AUTHENTIC")]
    Authentic,
    #[serde(rename = "NOT_VERIFIED")]
    NotVerified,
}

impl VerdictLabel {
    /// Returns the wire form of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::Authentic => "AUTHENTIC",
            VerdictLabel::NotVerified => "NOT_VERIFIED",
        }
    }
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-text judgment reduced to a boolean claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualitativeVerdict {
    text: String,
    claims_authentic: bool,
}

impl QualitativeVerdict {
    /// Wraps judgment text, detecting the authenticity token.
    ///
    /// Detection is plain substring containment, so any spelling that
    /// contains the token (for example "inauthentic") counts as a claim.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let claims_authentic = text.to_uppercase().contains(AUTHENTIC_TOKEN);
        Self {
            text,
            claims_authentic,
        }
    }

    /// Returns the original judgment text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the judgment contains the authenticity token.
    pub fn claims_authentic(&self) -> bool {
        self.claims_authentic
    }
}

/// Authenticity decision for one session. Always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinalVerdict {
    /// Overall decision.
    pub is_authentic: bool,
    /// Human-readable label matching `is_authentic`.
    pub label: VerdictLabel,
    /// The qualitative judgment claimed authenticity.
    pub qualitative_claim: bool,
    /// The numeric evidence showed a decreasing loss.
    pub numeric_proof: bool,
}

/// Combines both signals with an inclusive OR.
pub fn aggregate(qualitative: &QualitativeVerdict, proof: &NumericProof) -> FinalVerdict {
    let qualitative_claim = qualitative.claims_authentic();
    let numeric_proof = proof.shows_decrease();
    let is_authentic = qualitative_claim || numeric_proof;

    FinalVerdict {
        is_authentic,
        label: if is_authentic {
            VerdictLabel::Authentic
        } else {
            VerdictLabel::NotVerified
        },
        qualitative_claim,
        numeric_proof,
    }
}

/// Convenience form of [`aggregate`] taking raw judgment text.
pub fn aggregate_text(qualitative_text: &str, proof: &NumericProof) -> FinalVerdict {
    aggregate(&QualitativeVerdict::from_text(qualitative_text), proof)
}
