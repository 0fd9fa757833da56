use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationRequest, Generator, http_client, parse_body, read_body, send_error};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";

/// Messages API client.
pub struct AnthropicGenerator {
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl AnthropicGenerator {
    pub fn new(api_key: String, base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout,
            client: http_client(PROVIDER, timeout)?,
        })
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let prompt = request.user_prompt();
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: vec![ContentBlock {
                    kind: "text",
                    text: &prompt,
                }],
            }],
        };

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.trim())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(PROVIDER, self.timeout, e))?;

        let text = read_body(PROVIDER, self.timeout, resp).await?;
        let parsed: MessagesResponse = parse_body(PROVIDER, &text)?;
        debug!(model = %request.model, blocks = parsed.content.len(), "anthropic response");

        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::GenerationMalformed(
                "Anthropic response missing text content".to_string(),
            ));
        }
        Ok(answer.to_string())
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "Answer only from the context.".into(),
            context: "[1] stats\nPlayer X averaged 10.2 assists".into(),
            question: "How many assists?".into(),
            model: "claude-3-5-haiku-latest".into(),
            temperature: 0.0,
            max_tokens: 200,
        }
    }

    fn generator(server: &MockServer) -> AnthropicGenerator {
        AnthropicGenerator::new("test-key".into(), Some(&server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({ "system": "Answer only from the context." })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "text", "text": "Player X averages 10.2 assists [1]." },
                    { "type": "tool_use", "id": "t", "name": "n", "input": {} }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = generator(&server).generate(&request()).await.unwrap();
        assert_eq!(answer, "Player X averages 10.2 assists [1].");
    }

    #[tokio::test]
    async fn test_rate_limit_is_quota_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, Error::GenerationQuotaExceeded(_)));
    }

    #[tokio::test]
    async fn test_no_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": [] })))
            .mount(&server)
            .await;

        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, Error::GenerationMalformed(_)));
    }
}
