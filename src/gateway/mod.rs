//! Provider gateway for chat completions against a local model server.

pub mod error;
pub mod ollama;
pub mod types;
pub mod usage;

use std::sync::Arc;

use ollama::{ChatProvider, OllamaAdapter};
use usage::{CallStatus, ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use error::{ErrorContext, ProviderError};
pub use types::*;
pub use usage::{NoopUsageSink, UsageSink, UsageTally, UsageTotals};

/// The seam the oracle talks to. Single-shot: no retries.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Warm the model before a run.
    async fn prepare(&self, _model: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Release the model after a run.
    async fn release(&self, _model: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Context window the server reports for `model`, if known.
    async fn context_length(&self, _model: &str) -> Result<Option<u32>, ProviderError> {
        Ok(None)
    }
}

pub struct ProviderGateway<U: UsageSinkTrait> {
    ollama: OllamaAdapter,
    usage_sink: Arc<U>,
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> ChatGateway for ProviderGateway<U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }

    async fn prepare(&self, model: &str) -> Result<(), ProviderError> {
        self.ollama.load_model(model).await
    }

    async fn release(&self, model: &str) -> Result<(), ProviderError> {
        self.ollama.unload_model(model).await
    }

    async fn context_length(&self, model: &str) -> Result<Option<u32>, ProviderError> {
        self.ollama.context_length(model).await
    }
}

impl<U: UsageSinkTrait> ProviderGateway<U> {
    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let ollama = OllamaAdapter::from_env()?;
        Ok(Self { ollama, usage_sink })
    }

    pub fn with_adapter(ollama: OllamaAdapter, usage_sink: Arc<U>) -> Self {
        Self { ollama, usage_sink }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        match self.ollama.chat(&req).await {
            Ok(resp) => {
                self.record_usage(&req, &resp, CallStatus::Success, None)
                    .await;
                Ok(resp)
            }
            Err(err) => {
                let code = err.code().to_string();
                self.record_usage(&req, &ChatResponse::empty(), CallStatus::Error, Some(code))
                    .await;
                Err(err)
            }
        }
    }

    async fn record_usage(
        &self,
        req: &ChatRequest,
        resp: &ChatResponse,
        status: CallStatus,
        error_code: Option<String>,
    ) {
        let record = ProviderCallRecord::new("ollama", "api/chat", &req.model, req.attribution.caller)
            .tokens(resp.input_tokens, resp.output_tokens)
            .run(req.attribution.run_id)
            .latency(resp.latency.as_millis() as u64);

        let record = if status == CallStatus::Error {
            record.error(error_code.unwrap_or_else(|| "provider_error".to_string()))
        } else {
            record
        };

        self.usage_sink.record(record).await;
    }
}
