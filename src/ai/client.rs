//! OpenAI-compatible chat completion client.
//!
//! Talks to `<base_url>/chat/completions` with a bearer token. Plain requests
//! return `choices[0].message.content`; streaming requests are decoded frame
//! by frame with [`SseDecoder`].

use crate::ai::config::AiConfig;
use crate::error::{AiError, AiResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(config: &'a AiConfig, messages: &'a [ChatMessage], stream: bool) -> Self {
        Self {
            model: &config.model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

fn extract_text_response(response: ChatCompletionResponse) -> AiResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .map(|message| message.content.unwrap_or_default())
        .ok_or_else(|| AiError::unexpected_response("response has no choices"))
}

/// A decoded upstream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A non-empty `choices[0].delta.content` fragment
    Data(String),
    /// The literal `data: [DONE]` terminator
    Done,
}

/// Incremental decoder for `data: <json>` lines.
///
/// Bytes may arrive split at arbitrary points, including inside a UTF-8
/// sequence; only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = parse_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Option<SseFrame> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseFrame::Done);
    }
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(SseFrame::Data),
        Err(e) => {
            debug!(error = %e, "Skipping malformed stream frame");
            None
        }
    }
}

/// Event forwarded from a streaming completion to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Error(String),
    Done,
}

/// HTTP client for OpenAI-compatible providers.
#[derive(Clone)]
pub struct AiClient {
    http: Client,
    request_timeout: Duration,
}

impl AiClient {
    /// `request_timeout` bounds non-streaming calls; streams are bounded by
    /// the idle timeout given to [`AiClient::stream`].
    pub fn new(request_timeout: Duration) -> AiResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AiError::request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            request_timeout,
        })
    }

    /// Send a chat completion and return the reply text.
    pub async fn complete(&self, config: &AiConfig, messages: &[ChatMessage]) -> AiResult<String> {
        config.ensure_usable()?;
        let body = ChatCompletionRequest::new(config, messages, false);

        debug!(
            config_id = %config.id,
            model = %config.model,
            messages = messages.len(),
            "Sending chat completion"
        );

        let response = self
            .http
            .post(config.completions_url())
            .bearer_auth(&config.api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "AI service returned an error");
            return Err(AiError::from_status(status.as_u16(), body_text));
        }

        let text = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| AiError::unexpected_response(e.to_string()))?;

        extract_text_response(parsed)
    }

    /// Send a streaming chat completion and forward fragments to `tx`.
    ///
    /// Returns once the upstream sends `[DONE]`, closes the body, stays idle
    /// for longer than `idle_timeout`, or the receiver goes away. Does not
    /// send the final [`StreamEvent::Done`]; that is left to the caller.
    pub async fn stream(
        &self,
        config: &AiConfig,
        messages: &[ChatMessage],
        idle_timeout: Duration,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> AiResult<()> {
        config.ensure_usable()?;
        let body = ChatCompletionRequest::new(config, messages, true);

        debug!(
            config_id = %config.id,
            model = %config.model,
            messages = messages.len(),
            "Opening chat stream"
        );

        let mut response = self
            .http
            .post(config.completions_url())
            .bearer_auth(&config.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AiError::from_status(status.as_u16(), body_text));
        }

        let mut decoder = SseDecoder::new();
        let mut fragments = 0usize;
        loop {
            let chunk = match tokio::time::timeout(idle_timeout, response.chunk()).await {
                Ok(chunk) => chunk?,
                Err(_) => {
                    info!(
                        idle_secs = idle_timeout.as_secs(),
                        "Chat stream idle, completing"
                    );
                    return Ok(());
                }
            };

            let Some(bytes) = chunk else {
                if let Some(SseFrame::Data(content)) = decoder.finish() {
                    let _ = tx.send(StreamEvent::Chunk(content)).await;
                }
                debug!(fragments, "Chat stream body ended without terminator");
                return Ok(());
            };

            for frame in decoder.push(&bytes) {
                match frame {
                    SseFrame::Data(content) => {
                        fragments += 1;
                        if tx.send(StreamEvent::Chunk(content)).await.is_err() {
                            debug!("Stream consumer went away");
                            return Ok(());
                        }
                    }
                    SseFrame::Done => {
                        debug!(fragments, "Chat stream finished");
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_frames() {
        let mut decoder = SseDecoder::new();
        let first = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(first.is_empty());

        let second = decoder.push(b"lo\"}}]}\n\ndata: [DONE]\n");
        assert_eq!(
            second,
            vec![SseFrame::Data("Hello".to_string()), SseFrame::Done]
        );
    }

    #[test]
    fn test_decoder_skips_malformed_and_empty_frames() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(
            b"data: not json\n: keep-alive\ndata: {\"choices\":[{\"delta\":{}}]}\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        );
        assert_eq!(frames, vec![SseFrame::Data("ok".to_string())]);
    }

    #[test]
    fn test_decoder_keeps_multibyte_characters_intact() {
        let text = "data: {\"choices\":[{\"delta\":{\"content\":\"数据\"}}]}\n".as_bytes();
        let (head, tail) = text.split_at(text.len() - 8);
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec![SseFrame::Data("数据".to_string())]);
    }

    #[test]
    fn test_decoder_finish_flushes_last_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(SseFrame::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_request_serialization() {
        let config = AiConfig::new("c", "http://x", "m", "k");
        let messages = vec![ChatMessage::user("hi")];

        let plain = serde_json::to_value(ChatCompletionRequest::new(&config, &messages, false))
            .unwrap();
        assert!(plain.get("stream").is_none());
        assert_eq!(plain["max_tokens"], 4000);
        assert_eq!(plain["messages"][0]["role"], "user");

        let streaming =
            serde_json::to_value(ChatCompletionRequest::new(&config, &messages, true)).unwrap();
        assert_eq!(streaming["stream"], true);
    }

    #[test]
    fn test_extract_text_response() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"SELECT 1"}}]}"#).unwrap();
        assert_eq!(extract_text_response(parsed).unwrap(), "SELECT 1");

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            extract_text_response(empty),
            Err(AiError::UnexpectedResponse { .. })
        ));
    }
}
