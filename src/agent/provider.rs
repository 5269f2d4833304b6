//! AI completion providers
//!
//! Thin clients over the two supported provider wire formats: an
//! OpenAI-style chat completions endpoint and an Anthropic-style
//! messages endpoint. Both expose plain completion and a chunked
//! streaming variant over SSE.

use crate::config::ProviderEndpoint;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const ANTHROPIC_DEFAULT_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const MAX_COMPLETION_TOKENS: u32 = 2048;

/// One completion call's inputs.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_message: String,
}

/// Lazily produced, finite sequence of text chunks.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Capability the decision pipeline consumes; provider auth and model
/// selection stay behind this boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Single-shot completion returning the full response text
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Streaming completion; dropping the stream cancels generation
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Split SSE framing into `data:` payloads, dropping keep-alives.
fn sse_data_lines(buf: &mut String, chunk: &str) -> Vec<String> {
    buf.push_str(chunk);
    let mut out = Vec::new();

    while let Some(pos) = buf.find('\n') {
        let line: String = buf.drain(..=pos).collect();
        let line = line.trim();
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if !data.is_empty() {
                out.push(data.to_string());
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// OpenAI-style chat completions
// ---------------------------------------------------------------------------

pub struct OpenAiProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: endpoint
                .base_url
                .as_deref()
                .unwrap_or(OPENAI_DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: endpoint.api_key.clone(),
        })
    }

    fn body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_message},
            ],
            "stream": stream,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request, false))
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!("{}: {}", status, text.trim())));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::Provider("empty completion response".into()))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request, true))
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!("{}: {}", status, text.trim())));
        }

        let stream = resp
            .bytes_stream()
            .scan(String::new(), |buf, chunk| {
                let lines = match chunk {
                    Ok(bytes) => sse_data_lines(buf, &String::from_utf8_lossy(&bytes)),
                    Err(e) => {
                        return futures_util::future::ready(Some(vec![Err(
                            GatewayError::Provider(e.to_string()),
                        )]))
                    }
                };

                let texts = lines
                    .into_iter()
                    .filter(|data| data != "[DONE]")
                    .filter_map(|data| {
                        let value: serde_json::Value = serde_json::from_str(&data).ok()?;
                        value["choices"][0]["delta"]["content"]
                            .as_str()
                            .map(|s| Ok(s.to_string()))
                    })
                    .collect::<Vec<_>>();
                futures_util::future::ready(Some(texts))
            })
            .flat_map(futures_util::stream::iter);

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ---------------------------------------------------------------------------
// Anthropic-style messages
// ---------------------------------------------------------------------------

pub struct AnthropicProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(endpoint.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: endpoint
                .base_url
                .as_deref()
                .unwrap_or(ANTHROPIC_DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: endpoint.api_key.clone(),
        })
    }

    fn body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "system": request.system_prompt,
            "messages": [
                {"role": "user", "content": request.user_message},
            ],
            "stream": stream,
        })
    }

    fn request(&self, request: &CompletionRequest, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/messages", self.base_url);
        self.http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(request, stream))
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let resp = self
            .request(request, false)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!("{}: {}", status, text.trim())));
        }

        let messages: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;
        let text = messages
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<String>();
        if text.is_empty() {
            return Err(GatewayError::Provider("empty completion response".into()));
        }
        Ok(text)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let resp = self
            .request(request, true)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!("{}: {}", status, text.trim())));
        }

        let stream = resp
            .bytes_stream()
            .scan(String::new(), |buf, chunk| {
                let lines = match chunk {
                    Ok(bytes) => sse_data_lines(buf, &String::from_utf8_lossy(&bytes)),
                    Err(e) => {
                        return futures_util::future::ready(Some(vec![Err(
                            GatewayError::Provider(e.to_string()),
                        )]))
                    }
                };

                let texts = lines
                    .into_iter()
                    .filter_map(|data| {
                        let value: serde_json::Value = serde_json::from_str(&data).ok()?;
                        if value["type"] != "content_block_delta" {
                            return None;
                        }
                        value["delta"]["text"].as_str().map(|s| Ok(s.to_string()))
                    })
                    .collect::<Vec<_>>();
                futures_util::future::ready(Some(texts))
            })
            .flat_map(futures_util::stream::iter);

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_lines_split_across_chunks() {
        let mut buf = String::new();

        let first = sse_data_lines(&mut buf, "data: {\"a\":");
        assert!(first.is_empty(), "incomplete line must stay buffered");

        let second = sse_data_lines(&mut buf, "1}\n\ndata: [DONE]\n");
        assert_eq!(second, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn sse_ignores_comments_and_events() {
        let mut buf = String::new();
        let lines = sse_data_lines(
            &mut buf,
            ": keep-alive\nevent: message_start\ndata: {\"x\":2}\n",
        );
        assert_eq!(lines, vec!["{\"x\":2}".to_string()]);
    }
}
