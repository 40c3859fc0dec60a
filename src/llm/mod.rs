//! LLM integration for r2r.
//!
//! Provides an OpenAI-compatible chat client used by the qualitative judge.
//!
//! ```ignore
//! use r2r::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message,
    DEFAULT_MODEL,
};
