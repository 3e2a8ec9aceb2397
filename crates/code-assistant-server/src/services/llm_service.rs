use crate::config::LlmConfig;
use crate::utils::error::LlmError;
use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::chat::ChatMessage;
use crate::services::conversation::manager::CompletionProvider;

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Non-streaming client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Single attempt; the client timeout bounds the whole call.
    pub async fn generate_chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        debug!(
            "Starting chat generation with {} messages (model={})",
            messages.len(),
            self.config.model
        );

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No choices returned from LLM".to_string()))
    }
}

#[async_trait::async_trait]
impl CompletionProvider for LlmService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.generate_chat(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: "sk-test".to_string(),
            model: "deepseek-reasoner".to_string(),
            temperature: 0.3,
            max_tokens: 2048,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_sends_bearer_and_payload_and_extracts_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "deepseek-reasoner",
                "max_tokens": 2048,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "write a loop"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "here is code"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = LlmService::new(config(server.uri())).unwrap();
        let reply = service
            .complete(&[ChatMessage::system("sys"), ChatMessage::user("write a loop")])
            .await
            .unwrap();

        assert_eq!(reply, "here is code");
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let service = LlmService::new(config(server.uri())).unwrap();
        let err = service.complete(&[ChatMessage::user("hi")]).await.unwrap_err();

        match err {
            LlmError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let service = LlmService::new(config(server.uri())).unwrap();
        let err = service.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.timeout_seconds = 1;
        let service = LlmService::new(cfg).unwrap();
        let err = service.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout));
    }
}
