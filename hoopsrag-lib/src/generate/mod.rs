//! External text generation
//!
//! The generation service is an opaque, rate-limited remote call:
//! `generate(system, context, question) -> text`. Two HTTP backends
//! implement [`Generator`]:
//! - [`OpenAiGenerator`]: chat completions on any OpenAI-compatible endpoint
//! - [`AnthropicGenerator`]: the messages API
//!
//! Failures map onto the generation error kinds:
//!
//! | Condition                      | Error                              |
//! |--------------------------------|------------------------------------|
//! | HTTP 429                       | [`Error::GenerationQuotaExceeded`] |
//! | client timeout                 | [`Error::GenerationTimeout`]       |
//! | unparsable or empty body       | [`Error::GenerationMalformed`]     |
//! | any other failure              | [`Error::Generation`]              |
//!
//! Nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;

use crate::config::{GenerationConfig, ProviderKind};
use crate::{Error, Result};

/// Everything one generation call needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// Policy instructions
    pub system: String,
    /// Assembled context with citation markers
    pub context: String,
    pub question: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl GenerationRequest {
    /// User turn sent to the model: the context followed by the question.
    #[must_use]
    pub fn user_prompt(&self) -> String {
        format!(
            "Context:\n{}\n\nQuestion: {}",
            self.context.trim(),
            self.question.trim()
        )
    }
}

/// A remote text generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Box<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        (**self).generate(request).await
    }
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        (**self).generate(request).await
    }
}

/// Build the configured provider. The API key is passed in, never read here.
pub fn build_generator(config: &GenerationConfig, api_key: String) -> Result<Box<dyn Generator>> {
    let base_url = config.base_url.as_deref();
    let timeout = config.timeout();
    Ok(match config.provider {
        ProviderKind::OpenAi => Box::new(OpenAiGenerator::new(api_key, base_url, timeout)?),
        ProviderKind::Anthropic => Box::new(AnthropicGenerator::new(api_key, base_url, timeout)?),
    })
}

fn http_client(provider: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Generation(format!("failed to build {provider} HTTP client: {e}")))
}

fn send_error(provider: &str, timeout: Duration, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::GenerationTimeout(timeout.as_secs())
    } else {
        Error::Generation(format!("failed to call {provider}: {err}"))
    }
}

/// Maps non-success statuses to errors and returns the body text otherwise.
async fn read_body(provider: &str, timeout: Duration, resp: Response) -> Result<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| send_error(provider, timeout, e))?;

    match status {
        s if s.is_success() => Ok(body),
        StatusCode::TOO_MANY_REQUESTS => Err(Error::GenerationQuotaExceeded(format!(
            "{provider} returned {status}: {}",
            body.trim()
        ))),
        _ => Err(Error::Generation(format!(
            "{provider} returned {status}: {}",
            body.trim()
        ))),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(provider: &str, body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::GenerationMalformed(format!("failed to parse {provider} response: {e}")))
}

mod anthropic;
mod openai;

pub use anthropic::*;
pub use openai::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_layout() {
        let request = GenerationRequest {
            system: "sys".into(),
            context: "[1] doc\nPlayer X 10.2 assists\n".into(),
            question: " How many assists? ".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            max_tokens: 100,
        };
        assert_eq!(
            request.user_prompt(),
            "Context:\n[1] doc\nPlayer X 10.2 assists\n\nQuestion: How many assists?"
        );
    }

    #[test]
    fn test_build_generator_by_provider() {
        let mut config = GenerationConfig::default();
        assert_eq!(build_generator(&config, "k".into()).unwrap().name(), "openai");

        config.provider = ProviderKind::Anthropic;
        assert_eq!(build_generator(&config, "k".into()).unwrap().name(), "anthropic");
    }
}
