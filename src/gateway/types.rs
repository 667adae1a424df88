//! Core types for the chat gateway.

use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for usage tracking and debugging.
///
/// Every request through the gateway carries attribution so we know which
/// ranking run made it and which code path triggered it.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Ranking run this request is part of.
    pub run_id: Option<Uuid>,
    /// Which code path made this call, e.g. "oracle::compare".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling options forwarded to the model server with every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingOptions {
    pub repeat_penalty: f32,
    /// -1 means the whole context window.
    pub repeat_last_n: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            repeat_penalty: 1.6,
            repeat_last_n: -1,
            num_ctx: None,
            temperature: None,
        }
    }
}

/// Request for chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model tag on the server, e.g. "qwen3:4b".
    pub model: String,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling options.
    pub options: SamplingOptions,
    /// Attribution for usage tracking.
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model: model.into(),
            messages,
            options: SamplingOptions::default(),
            attribution,
        }
    }

    pub fn options(mut self, options: SamplingOptions) -> Self {
        self.options = options;
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Load,
    Unload,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("load") => FinishReason::Load,
            Some("unload") => FinishReason::Unload,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated content.
    pub content: String,
    /// Prompt tokens evaluated by the server.
    pub input_tokens: u32,
    /// Tokens generated.
    pub output_tokens: u32,
    /// Wall-clock latency of the call.
    pub latency: Duration,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    pub fn empty() -> Self {
        Self {
            content: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::Unknown("error".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_options_skip_unset_fields() {
        let json = serde_json::to_value(SamplingOptions::default()).unwrap();
        assert_eq!(json["repeat_last_n"], -1);
        assert!(json.get("num_ctx").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn finish_reason_from_server_string() {
        assert_eq!(FinishReason::from(Some("stop".into())), FinishReason::Stop);
        assert_eq!(
            FinishReason::from(None),
            FinishReason::Unknown("none".into())
        );
    }
}
