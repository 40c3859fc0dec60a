//! Qualitative judgment of execution evidence.
//!
//! A [`Judge`] reads the claim summary and the captured execution logs and
//! returns free text. The verdict aggregator only looks for the
//! `AUTHENTIC` token in that text; everything else about the judge is
//! opaque to the pipeline.

pub mod llm_judge;

use async_trait::async_trait;

use crate::error::JudgeError;

pub use llm_judge::{JudgeConfig, LlmJudge};

/// Evidence handed to a judge.
#[derive(Debug, Clone, Copy)]
pub struct JudgeInput<'a> {
    /// Description of the claim under test.
    pub summary: &'a str,
    /// Captured output of the isolated run.
    pub logs: &'a str,
}

impl<'a> JudgeInput<'a> {
    pub fn new(summary: &'a str, logs: &'a str) -> Self {
        Self { summary, logs }
    }
}

/// Produces a qualitative verdict text for a run.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Returns the judge's verdict text.
    async fn judge(&self, input: &JudgeInput<'_>) -> Result<String, JudgeError>;
}

/// A judge that always answers with the same text.
#[derive(Debug, Clone)]
pub struct StaticJudge {
    text: String,
}

impl StaticJudge {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[async_trait]
impl Judge for StaticJudge {
    async fn judge(&self, _input: &JudgeInput<'_>) -> Result<String, JudgeError> {
        Ok(self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_judge_ignores_input() {
        let judge = StaticJudge::new("NOT_VERIFIED: no loss reported");
        let first = judge
            .judge(&JudgeInput::new("summary", "LOSS_START: 1.0"))
            .await
            .unwrap();
        let second = judge.judge(&JudgeInput::new("", "")).await.unwrap();

        assert_eq!(first, "NOT_VERIFIED: no loss reported");
        assert_eq!(first, second);
    }
}
