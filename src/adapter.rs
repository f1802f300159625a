use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("invalid response format")]
    InvalidResponse,
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        AdapterError::Request(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Text and image generation boundary.
#[async_trait]
pub trait ConversationAdapter: Send + Sync {
    async fn generate_reply(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        timeout: Duration,
    ) -> Result<String, AdapterError>;

    /// Returns the URL of the generated image.
    async fn generate_image(&self, prompt: &str, timeout: Duration) -> Result<String, AdapterError>;
}

pub struct OpenAiAdapter {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    image_model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>, image_model: impl Into<String>) -> Self {
        OpenAiAdapter {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            image_model: image_model.into(),
        }
    }

    async fn post_json(&self, path: &str, body: serde_json::Value, timeout: Duration) -> Result<serde_json::Value, AdapterError> {
        let url = format!("{}{}", self.base_url, path);
        let request = async {
            let response = self
                .http_client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AdapterError::Api { status: status.as_u16(), body });
            }

            Ok(response.json::<serde_json::Value>().await?)
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| AdapterError::Timeout(timeout))?
    }
}

#[async_trait]
impl ConversationAdapter for OpenAiAdapter {
    async fn generate_reply(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        timeout: Duration,
    ) -> Result<String, AdapterError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().cloned());

        let request_body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": 400,
            "temperature": 0.9
        });

        let response_json = self.post_json("/v1/chat/completions", request_body, timeout).await?;
        response_json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(AdapterError::InvalidResponse)
    }

    async fn generate_image(&self, prompt: &str, timeout: Duration) -> Result<String, AdapterError> {
        let request_body = serde_json::json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024"
        });

        let response_json = self.post_json("/v1/images/generations", request_body, timeout).await?;
        response_json["data"][0]["url"]
            .as_str()
            .map(str::to_string)
            .ok_or(AdapterError::InvalidResponse)
    }
}

/// Canned replies for offline runs.
pub struct ScriptedAdapter {
    pub reply: String,
    pub image_url: String,
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        ScriptedAdapter {
            reply: "Sebastian responds elegantly and cruelly.".to_string(),
            image_url: "https://example.com/image.png".to_string(),
        }
    }
}

#[async_trait]
impl ConversationAdapter for ScriptedAdapter {
    async fn generate_reply(&self, _system_prompt: &str, _history: &[ChatMessage], _timeout: Duration) -> Result<String, AdapterError> {
        Ok(self.reply.clone())
    }

    async fn generate_image(&self, _prompt: &str, _timeout: Duration) -> Result<String, AdapterError> {
        Ok(self.image_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn adapter(server: &MockServer) -> OpenAiAdapter {
        OpenAiAdapter::new("sk-test", server.base_url(), "gpt-4o-mini", "dall-e-3")
    }

    #[tokio::test]
    async fn test_generate_reply_sends_system_prompt() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("Authorization", "Bearer sk-test")
                    .body_contains("Be a butler.");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "  Yes, my lord.  "}}]
                }));
            })
            .await;

        let reply = adapter(&server)
            .generate_reply("Be a butler.", &[ChatMessage::user("Tea?")], Duration::from_secs(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply, "Yes, my lord.");
    }

    #[tokio::test]
    async fn test_generate_image_returns_url() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/images/generations");
                then.status(200).json_body(json!({"data": [{"url": "https://img.example/ball.png"}]}));
            })
            .await;

        let url = adapter(&server)
            .generate_image("a ball", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(url, "https://img.example/ball.png");
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let err = adapter(&server)
            .generate_reply("prompt", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            AdapterError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .json_body(json!({"choices": [{"message": {"content": "late"}}]}));
            })
            .await;

        let err = adapter(&server)
            .generate_reply("prompt", &[], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/images/generations");
                then.status(200).json_body(json!({"data": []}));
            })
            .await;

        let err = adapter(&server)
            .generate_image("prompt", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidResponse));
    }
}
