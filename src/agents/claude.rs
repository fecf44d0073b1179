use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::db::Language;
use crate::service::ReviewGenerator;

const TECHNICAL_PERSONA: &str = "You are a senior backend engineer and code reviewer. \
Be concise, specific, and pragmatic. \
Return actionable bullet points. \
When suggesting fixes, include minimal, correct code snippets.";

const CLAUDE_MODEL: &str = "claude-3-5-sonnet-20240620";
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: u32 = 1024;

/// Sentinel feedback for degraded provider conditions. The caller always
/// gets something to persist or emit.
pub const RATE_LIMIT_MESSAGE: &str =
    "Too many requests to the review service right now. Please try again in a moment.";
pub const UNAVAILABLE_MESSAGE: &str =
    "The review service is temporarily unreachable. Please try again later.";
pub const STREAM_ERROR_MESSAGE: &str = "AI service error: the review could not be completed.";

const END_OF_REVIEW_MARKER: &str = "\n\n--- End of review ---";

fn build_prompt(language: Language) -> String {
    format!(
        "Act as a senior backend engineer. \
         Analyze this {} code for backend issues. \
         Format response as:\n\n\
         1. Brief summary (1 sentence)\n\
         2. Key findings (bulleted list)\n\
         3. Most critical recommendation\n\
         Avoid markdown. Be technical but concise.",
        language
    )
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    text: Option<String>,
}

/// Extract the text fragment carried by one SSE line of a streamed Messages
/// API response. Lines that are not `content_block_delta` data yield nothing.
fn delta_text(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    let event: StreamEvent = serde_json::from_str(data).ok()?;
    if event.kind == "content_block_delta" {
        event.delta?.text
    } else {
        None
    }
}

#[derive(Clone)]
pub struct ClaudeAgent {
    client: Client,
    api_key: String,
}

impl ClaudeAgent {
    pub fn new(api_key: String) -> Result<Self, reqwest::Error> {
        // Bounded timeout so a stalled provider never suspends a request
        // indefinitely.
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self { client, api_key })
    }

    fn request_body(language: Language, code: &str, stream: bool) -> ClaudeRequest {
        ClaudeRequest {
            model: CLAUDE_MODEL.to_string(),
            max_tokens: MAX_TOKENS,
            system: TECHNICAL_PERSONA.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: format!("{}\n\n{}", build_prompt(language), code),
            }],
            stream,
        }
    }

    async fn send(&self, body: &ClaudeRequest) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
    }

    /// One-shot review generation.
    ///
    /// Transient provider conditions (rate limiting, connectivity) degrade to
    /// a sentinel sentence; anything else comes back as `None` so the caller
    /// can substitute an empty review.
    pub async fn generate(&self, language: Language, code: &str) -> Option<String> {
        let body = Self::request_body(language, code, false);
        info!(language = %language, code_len = code.len(), "requesting review");

        let response = match self.send(&body).await {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() => {
                warn!("review provider unreachable: {}", e);
                return Some(UNAVAILABLE_MESSAGE.to_string());
            }
            Err(e) => {
                warn!("review request failed: {}", e);
                return None;
            }
        };

        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 529 {
            warn!(%status, "review provider overloaded");
            return Some(RATE_LIMIT_MESSAGE.to_string());
        }

        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!("review response read failed: {}", e);
                return None;
            }
        };

        if !status.is_success() {
            warn!(%status, body = %text, "review request rejected");
            return None;
        }

        let parsed: ClaudeResponse = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!("review response parse failed: {}", e);
                return None;
            }
        };

        parsed.content.into_iter().find_map(|block| block.text)
    }

    /// Streamed review: text fragments as they arrive from the provider,
    /// terminated by a fixed end-of-review marker. Provider failures yield a
    /// single sentinel chunk instead of failing the response; dropping the
    /// stream cancels consumption with nothing to clean up.
    pub fn stream_review(
        &self,
        language: Language,
        code: String,
    ) -> impl Stream<Item = Bytes> + Send + 'static {
        let agent = self.clone();

        stream! {
            let body = ClaudeAgent::request_body(language, &code, true);

            let response = match agent.send(&body).await {
                Ok(r) => r,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!("review provider unreachable: {}", e);
                    yield Bytes::from_static(UNAVAILABLE_MESSAGE.as_bytes());
                    yield Bytes::from_static(END_OF_REVIEW_MARKER.as_bytes());
                    return;
                }
                Err(e) => {
                    warn!("streamed review request failed: {}", e);
                    yield Bytes::from_static(STREAM_ERROR_MESSAGE.as_bytes());
                    yield Bytes::from_static(END_OF_REVIEW_MARKER.as_bytes());
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                warn!(%status, "streamed review request rejected");
                let sentinel = if status.as_u16() == 429 || status.as_u16() == 529 {
                    RATE_LIMIT_MESSAGE
                } else {
                    STREAM_ERROR_MESSAGE
                };
                yield Bytes::from_static(sentinel.as_bytes());
                yield Bytes::from_static(END_OF_REVIEW_MARKER.as_bytes());
                return;
            }

            // SSE lines may be split across network chunks; buffer and cut
            // on newlines.
            let mut buf = String::new();
            let mut chunks = response.bytes_stream();

            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("review stream interrupted: {}", e);
                        break;
                    }
                };

                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    if let Some(text) = delta_text(line.trim()) {
                        yield Bytes::from(text);
                    }
                }
            }

            yield Bytes::from_static(END_OF_REVIEW_MARKER.as_bytes());
        }
    }
}

impl ReviewGenerator for ClaudeAgent {
    async fn generate(&self, language: Language, code: &str) -> Option<String> {
        ClaudeAgent::generate(self, language, code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_text_extracts_content_fragments() {
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello "}}"#;
        assert_eq!(delta_text(line), Some("Hello ".to_string()));
    }

    #[test]
    fn delta_text_ignores_other_events() {
        assert_eq!(delta_text("event: content_block_delta"), None);
        assert_eq!(
            delta_text(r#"data: {"type":"message_start","message":{}}"#),
            None
        );
        assert_eq!(delta_text(r#"data: {"type":"message_stop"}"#), None);
        assert_eq!(delta_text(""), None);
    }

    #[test]
    fn prompt_names_the_submission_language() {
        let prompt = build_prompt(Language::JavaScript);
        assert!(prompt.contains("JavaScript"));
        assert!(prompt.contains("Key findings"));
    }
}
