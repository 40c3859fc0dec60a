//! LLM-backed judge.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Judge, JudgeInput};
use crate::error::JudgeError;
use crate::llm::{GenerationRequest, LlmProvider, Message, DEFAULT_MODEL};

const JUDGE_SYSTEM_PROMPT: &str = "You are a scientific verification agent.";

const JUDGE_QUESTION: &str =
    "Does the loss decrease? Provide a verdict: AUTHENTIC or NOT_VERIFIED.";

/// Marker inserted where the middle of an oversized log was dropped.
const TRUNCATION_MARKER: &str = "\n... [output truncated] ...\n";

/// Configuration for [`LlmJudge`].
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Temperature for LLM generation.
    pub temperature: f64,
    /// Maximum tokens for response.
    pub max_tokens: u32,
    /// Logs longer than this many characters keep only their head and tail.
    pub max_log_chars: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            max_log_chars: 16_000,
        }
    }
}

impl JudgeConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_log_chars(mut self, max_log_chars: usize) -> Self {
        self.max_log_chars = max_log_chars;
        self
    }
}

/// Asks a language model whether the logs show the loss decreasing.
pub struct LlmJudge {
    llm_client: Arc<dyn LlmProvider>,
    config: JudgeConfig,
}

impl std::fmt::Debug for LlmJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmJudge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmJudge {
    pub fn new(llm_client: Arc<dyn LlmProvider>, config: JudgeConfig) -> Self {
        Self { llm_client, config }
    }

    /// Creates with default configuration.
    pub fn with_defaults(llm_client: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm_client, JudgeConfig::default())
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    fn build_prompt(&self, input: &JudgeInput<'_>) -> String {
        let logs = clip_middle(input.logs, self.config.max_log_chars);
        format!(
            "Summary: {}\nLogs: {}\n\n{}",
            input.summary, logs, JUDGE_QUESTION
        )
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, input: &JudgeInput<'_>) -> Result<String, JudgeError> {
        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(JUDGE_SYSTEM_PROMPT),
                Message::user(self.build_prompt(input)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self
            .llm_client
            .generate(request)
            .await
            .map_err(|source| JudgeError::Llm {
                model: self.config.model.clone(),
                source,
            })?;

        let content = response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or(JudgeError::EmptyResponse)?;

        tracing::debug!(model = %self.config.model, chars = content.len(), "Judge responded");

        Ok(content.to_string())
    }
}

/// Keeps the first and last halves of `text` when it exceeds `max_chars`.
fn clip_middle(text: &str, max_chars: usize) -> std::borrow::Cow<'_, str> {
    let total = text.chars().count();
    if total <= max_chars {
        return std::borrow::Cow::Borrowed(text);
    }

    let head_len = max_chars / 2;
    let tail_len = max_chars - head_len;
    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();

    std::borrow::Cow::Owned(format!("{}{}{}", head, TRUNCATION_MARKER, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse};
    use std::sync::Mutex;

    struct MockProvider {
        reply: Result<String, u16>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl MockProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(code: u16) -> Self {
            Self {
                reply: Err(code),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(GenerationResponse {
                    id: "mock".to_string(),
                    model: "mock".to_string(),
                    choices: vec![Choice {
                        index: 0,
                        message: Message::assistant(text.clone()),
                    }],
                }),
                Err(code) => Err(LlmError::ApiError {
                    code: *code,
                    message: "upstream failure".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_prompt_carries_summary_and_logs() {
        let provider = Arc::new(MockProvider::replying("AUTHENTIC"));
        let judge = LlmJudge::with_defaults(provider.clone());

        let text = judge
            .judge(&JudgeInput::new(
                "SGD on a linear model",
                "LOSS_START: 2.0\nLOSS_END: 0.5",
            ))
            .await
            .unwrap();
        assert_eq!(text, "AUTHENTIC");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let request = &seen[0];
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.messages[0].content, JUDGE_SYSTEM_PROMPT);
        assert_eq!(
            request.messages[1].content,
            "Summary: SGD on a linear model\nLogs: LOSS_START: 2.0\nLOSS_END: 0.5\n\n\
             Does the loss decrease? Provide a verdict: AUTHENTIC or NOT_VERIFIED."
        );
    }

    #[tokio::test]
    async fn test_configured_model_is_used() {
        let provider = Arc::new(MockProvider::replying("NOT_VERIFIED"));
        let judge = LlmJudge::new(
            provider.clone(),
            JudgeConfig::default().with_model("llama-3.3-70b-versatile"),
        );

        judge.judge(&JudgeInput::new("s", "l")).await.unwrap();
        assert_eq!(
            provider.seen.lock().unwrap()[0].model,
            "llama-3.3-70b-versatile"
        );
    }

    #[tokio::test]
    async fn test_blank_response_is_an_error() {
        let judge = LlmJudge::with_defaults(Arc::new(MockProvider::replying("  \n")));
        let result = judge.judge(&JudgeInput::new("s", "l")).await;
        assert!(matches!(result, Err(JudgeError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_provider_error_names_model() {
        let judge = LlmJudge::with_defaults(Arc::new(MockProvider::failing(503)));
        let err = judge.judge(&JudgeInput::new("s", "l")).await.unwrap_err();

        match &err {
            JudgeError::Llm { model, source } => {
                assert_eq!(model, DEFAULT_MODEL);
                assert!(matches!(source, LlmError::ApiError { code: 503, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains(DEFAULT_MODEL));
    }

    #[test]
    fn test_clip_middle() {
        assert_eq!(clip_middle("short", 10), "short");

        let clipped = clip_middle("abcdefghij", 4);
        assert_eq!(clipped, format!("ab{}ij", TRUNCATION_MARKER));

        // Multi-byte characters are never split.
        let clipped = clip_middle("ééééé", 2);
        assert_eq!(clipped, format!("é{}é", TRUNCATION_MARKER));
    }
}
