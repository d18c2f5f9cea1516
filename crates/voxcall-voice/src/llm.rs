//! Single-turn reply generation against a chat-completion API.
//!
//! Every call is independent: the request carries the operator directive as
//! the system message and the caller's utterance as the only user message.
//! No earlier turns are sent.

use crate::config::LlmConfig;
use crate::error::{status_error, Upstream, VoiceError};
use serde::{Deserialize, Serialize};

/// Longest utterance forwarded to the model, in bytes.
const MAX_UTTERANCE_BYTES: usize = 4 * 1024;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the completion endpoint.
#[derive(Debug, Clone)]
pub struct ResponseGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ResponseGenerator {
    /// # Errors
    ///
    /// Returns `VoiceError::Config` if the HTTP client cannot be built or the
    /// token ceiling is zero.
    pub fn new(config: LlmConfig) -> Result<Self, VoiceError> {
        if config.max_tokens == 0 {
            return Err(VoiceError::Config("llm.max_tokens must be positive".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build llm client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// The configured completion token ceiling.
    pub fn max_tokens(&self) -> u32 {
        self.config.max_tokens
    }

    /// Generates a reply to `utterance` framed by `directive`.
    ///
    /// The reply is trimmed and never longer than `max_tokens`
    /// whitespace-separated words.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError::InvalidInput` for an empty or oversized utterance,
    /// and an upstream-class error (`Timeout`, `Unreachable`, `Status`,
    /// `InvalidResponse`) when the provider fails or returns no text.
    pub async fn generate(
        &self,
        api_key: &str,
        utterance: &str,
        directive: &str,
    ) -> Result<String, VoiceError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(VoiceError::InvalidInput("utterance is empty".to_string()));
        }
        if utterance.len() > MAX_UTTERANCE_BYTES {
            return Err(VoiceError::InvalidInput(format!(
                "utterance exceeds maximum size: {} bytes (limit: {} bytes)",
                utterance.len(),
                MAX_UTTERANCE_BYTES
            )));
        }

        let mut messages = Vec::with_capacity(2);
        let directive = directive.trim();
        if !directive.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: directive,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: utterance,
        });

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let timeout_ms = self.config.timeout_ms;
        let service = Upstream::LanguageModel;

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::from_reqwest(service, timeout_ms, e))?;

        if !response.status().is_success() {
            return Err(status_error(service, response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::from_reqwest(service, timeout_ms, e))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| cap_words(content.trim(), self.config.max_tokens as usize))
            .unwrap_or_default();

        if text.is_empty() {
            return Err(VoiceError::InvalidResponse {
                service,
                reason: "completion contained no text".to_string(),
            });
        }

        tracing::debug!(
            model = %self.config.model,
            words = text.split_whitespace().count(),
            "reply generated"
        );
        Ok(text)
    }
}

/// Truncates `text` to at most `max_words` whitespace-separated words.
///
/// Every word costs at least one token, so the result stays within a token
/// ceiling of `max_words` even if the provider overshoots.
pub fn cap_words(text: &str, max_words: usize) -> String {
    let mut words = text.split_whitespace();
    let capped: Vec<&str> = words.by_ref().take(max_words).collect();
    if words.next().is_none() {
        text.trim().to_string()
    } else {
        capped.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_words_keeps_short_text_verbatim() {
        assert_eq!(cap_words("  We open at nine.\n", 10), "We open at nine.");
    }

    #[test]
    fn cap_words_truncates_long_text() {
        assert_eq!(cap_words("one two three four", 2), "one two");
    }

    #[test]
    fn zero_token_ceiling_is_rejected() {
        let config = LlmConfig {
            max_tokens: 0,
            ..LlmConfig::default()
        };
        assert!(matches!(
            ResponseGenerator::new(config),
            Err(VoiceError::Config(_))
        ));
    }
}
