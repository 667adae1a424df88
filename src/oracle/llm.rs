//! Oracle backed by a chat model.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gateway::{
    Attribution, ChatGateway, ChatRequest, Message, ProviderError, SamplingOptions,
};
use crate::item::Work;
use crate::prompts::{PromptInstance, PromptTemplate, COMPARE_V1, SCORE_V1};

use super::conversation::Conversation;
use super::parse::{parse_comparison, parse_scores};
use super::tiebreak::TieBreaker;
use super::{Oracle, OracleError, DEFAULT_SCORE};

pub const DEFAULT_MODEL: &str = "goekdenizguelmez/JOSIEFIED-Qwen3:4b";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub model: String,
    /// Upper bound on a single call, including queueing on the server.
    pub timeout: Duration,
    /// Calls in flight at once within a batch.
    pub concurrency: usize,
    pub sampling: SamplingOptions,
    /// Prior exchanges replayed into each sequential call, per caller.
    /// Calls inside a concurrent batch never share history. Zero keeps every
    /// call independent of the others.
    pub max_history_pairs: usize,
    pub compare_prompt: PromptTemplate,
    pub score_prompt: PromptTemplate,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            sampling: SamplingOptions::default(),
            max_history_pairs: 0,
            compare_prompt: COMPARE_V1,
            score_prompt: SCORE_V1,
        }
    }
}

impl OracleConfig {
    /// Defaults overridden by `FICRANK_MODEL` and `OLLAMA_TIMEOUT_SECONDS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("FICRANK_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Some(secs) = std::env::var("OLLAMA_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_history(mut self, max_history_pairs: usize) -> Self {
        self.max_history_pairs = max_history_pairs;
        self
    }
}

/// Whether a call may see, and extend, the running conversation for its
/// caller. Calls in a concurrent batch never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum History {
    Shared,
    Isolated,
}

pub struct LlmOracle<G: ChatGateway> {
    gateway: Arc<G>,
    config: OracleConfig,
    tiebreak: TieBreaker,
    run_id: Option<Uuid>,
    /// One bounded conversation per caller, fed by sequential calls.
    conversations: Mutex<HashMap<&'static str, Conversation>>,
}

impl<G: ChatGateway> LlmOracle<G> {
    pub fn new(gateway: Arc<G>, config: OracleConfig, tiebreak: TieBreaker) -> Self {
        Self {
            gateway,
            config,
            tiebreak,
            run_id: None,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Tag every call with a run id for usage records.
    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Load the model and size its context window from the server.
    ///
    /// A failed load is an error. An unknown context length is not: the
    /// server default applies.
    pub async fn prepare(&mut self) -> Result<(), ProviderError> {
        let model = self.config.model.clone();
        self.gateway.prepare(&model).await?;
        if self.config.sampling.num_ctx.is_none() {
            match self.gateway.context_length(&model).await {
                Ok(Some(ctx)) => {
                    info!(model = %model, num_ctx = ctx, "Using server context window");
                    self.config.sampling.num_ctx = Some(ctx);
                }
                Ok(None) => debug!(model = %model, "Server reported no context length"),
                Err(e) => warn!(model = %model, error = %e, "Context length lookup failed"),
            }
        }
        Ok(())
    }

    fn attribution(&self, caller: &'static str) -> Attribution {
        let attribution = Attribution::new(caller);
        match self.run_id {
            Some(id) => attribution.with_run(id),
            None => attribution,
        }
    }

    fn messages(
        &self,
        caller: &'static str,
        prompt: &PromptInstance,
        history: History,
    ) -> Vec<Message> {
        if history == History::Isolated || self.config.max_history_pairs == 0 {
            return Conversation::from_prompt(prompt, 0).messages_for(&prompt.user);
        }
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        conversations
            .entry(caller)
            .or_insert_with(|| Conversation::from_prompt(prompt, self.config.max_history_pairs))
            .messages_for(&prompt.user)
    }

    fn remember(&self, caller: &'static str, prompt: &PromptInstance, reply: &str) {
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conversation) = conversations.get_mut(caller) {
            conversation.push_exchange(prompt.user.clone(), reply);
        }
    }

    async fn ask(
        &self,
        caller: &'static str,
        prompt: PromptInstance,
        history: History,
    ) -> Result<String, OracleError> {
        let req = ChatRequest::new(
            self.config.model.clone(),
            self.messages(caller, &prompt, history),
            self.attribution(caller),
        )
        .options(self.config.sampling.clone());

        let resp = tokio::time::timeout(self.config.timeout, self.gateway.chat(req))
            .await
            .map_err(|_| OracleError::Timeout(self.config.timeout))??;

        debug!(
            caller,
            template = prompt.template_slug,
            input_tokens = resp.input_tokens,
            output_tokens = resp.output_tokens,
            reply = %resp.content,
            "Oracle reply"
        );
        if history == History::Shared && self.config.max_history_pairs > 0 {
            self.remember(caller, &prompt, &resp.content);
        }
        Ok(resp.content)
    }

    /// Comparison without the fallback; errors say why it would fall back.
    pub async fn try_compare(&self, a: &Work, b: &Work, preference: &str) -> Result<bool, OracleError> {
        self.compare_with(a, b, preference, History::Shared).await
    }

    /// Score without the fallback.
    pub async fn try_score(&self, work: &Work, preference: &str) -> Result<u32, OracleError> {
        self.score_with(work, preference, History::Shared).await
    }

    async fn compare_with(
        &self,
        a: &Work,
        b: &Work,
        preference: &str,
        history: History,
    ) -> Result<bool, OracleError> {
        let prompt = self.config.compare_prompt.render_pair(preference, a, b);
        let raw = self.ask("oracle::compare", prompt, history).await?;
        parse_comparison(&raw)
    }

    async fn score_with(
        &self,
        work: &Work,
        preference: &str,
        history: History,
    ) -> Result<u32, OracleError> {
        let prompt = self.config.score_prompt.render_single(preference, work);
        let raw = self.ask("oracle::score", prompt, history).await?;
        Ok(parse_scores(&raw)?.total())
    }

    async fn resolve_compare(
        &self,
        a: &Work,
        b: &Work,
        preference: &str,
        history: History,
    ) -> bool {
        match self.compare_with(a, b, preference, history).await {
            Ok(a_wins) => a_wins,
            Err(err) => {
                let a_wins = self.tiebreak.flip();
                let picked = if a_wins { "Fic 1" } else { "Fic 2" };
                if err.is_transport() {
                    warn!(
                        error = %err,
                        a = %a.title,
                        b = %b.title,
                        picked,
                        "Model unreachable; picked at random"
                    );
                } else {
                    warn!(
                        error = %err,
                        a = %a.title,
                        b = %b.title,
                        picked,
                        "Comparison unresolved; picked at random"
                    );
                }
                a_wins
            }
        }
    }

    async fn resolve_score(&self, work: &Work, preference: &str, history: History) -> u32 {
        match self.score_with(work, preference, history).await {
            Ok(total) => total,
            Err(err) if err.is_transport() => {
                warn!(
                    error = %err,
                    title = %work.title,
                    default = DEFAULT_SCORE,
                    "Model unreachable; using default score"
                );
                DEFAULT_SCORE
            }
            Err(err) => {
                warn!(
                    error = %err,
                    title = %work.title,
                    default = DEFAULT_SCORE,
                    "Failed to parse score; using default"
                );
                DEFAULT_SCORE
            }
        }
    }

    /// A batch of one is a sequential call and keeps the conversation.
    fn batch_history(len: usize) -> History {
        if len == 1 {
            History::Shared
        } else {
            History::Isolated
        }
    }
}

#[async_trait]
impl<G: ChatGateway> Oracle for LlmOracle<G> {
    async fn compare(&self, a: &Work, b: &Work, preference: &str) -> bool {
        self.resolve_compare(a, b, preference, History::Shared).await
    }

    async fn score(&self, work: &Work, preference: &str) -> u32 {
        self.resolve_score(work, preference, History::Shared).await
    }

    async fn compare_batch(&self, pairs: &[(&Work, &Work)], preference: &str) -> Vec<bool> {
        let history = Self::batch_history(pairs.len());
        let calls: Vec<_> = pairs
            .iter()
            .map(|&(a, b)| self.resolve_compare(a, b, preference, history))
            .collect();
        stream::iter(calls)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn score_batch(&self, works: &[&Work], preference: &str) -> Vec<u32> {
        let history = Self::batch_history(works.len());
        let calls: Vec<_> = works
            .iter()
            .map(|&work| self.resolve_score(work, preference, history))
            .collect();
        stream::iter(calls)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn teardown(&self) {
        if let Err(e) = self.gateway.release(&self.config.model).await {
            warn!(model = %self.config.model, error = %e, "Failed to unload model");
        }
    }
}
