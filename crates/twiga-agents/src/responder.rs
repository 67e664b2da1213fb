use std::sync::Arc;

use tracing::{error, info, warn};
use twiga_common::{InboundMessage, MessageRole, Result, UserState};
use twiga_db::{ChunkField, ChunkFilter, NewMessage, TwigaStore, User};

use crate::embeddings::EmbeddingProvider;
use crate::knowledge::{format_context, vector_search};
use crate::llm::{ChatMessage, LlmProvider, LlmRequest};

pub const SYSTEM_PROMPT: &str = "You are Twiga 🦒, a friendly teaching assistant on WhatsApp that helps \
secondary school teachers in Tanzania prepare lessons and exercises. Answer concisely and \
ground your answers in the provided textbook excerpts when they are relevant. If you do not \
know the answer, say so.";

#[derive(Debug, Clone)]
pub struct ResponderSettings {
    /// Number of past messages sent to the model.
    pub history_limit: usize,
    /// Number of chunks retrieved per question.
    pub search_results: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            history_limit: 10,
            search_results: 5,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Answers active users with the LLM, grounded in their classes' resources.
pub struct Responder {
    store: Arc<TwigaStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    settings: ResponderSettings,
}

impl Responder {
    pub fn new(
        store: Arc<TwigaStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        settings: ResponderSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            settings,
        }
    }

    /// Produce the assistant's raw (unformatted) answer to `inbound`.
    ///
    /// The user is marked `has_pending_message` while the answer is generated
    /// and is returned to `active` afterwards, whether or not it succeeded.
    /// A state set by someone else in the meantime (e.g. `blocked`) is kept.
    pub async fn respond(&self, user: &User, inbound: &InboundMessage) -> Result<String> {
        let mut pending = user.clone();
        pending.state = UserState::HasPendingMessage;
        let pending = self.store.update_user(&pending).await?;

        let result = self.generate(&pending, inbound).await;

        match self.store.release_pending(pending.id).await {
            Ok(true) => {}
            Ok(false) => info!("state of {} changed while answering, leaving it", pending.wa_id),
            Err(e) => error!("failed to restore active state for {}: {e}", pending.wa_id),
        }

        result
    }

    async fn generate(&self, user: &User, inbound: &InboundMessage) -> Result<String> {
        self.store
            .create_new_message(NewMessage::new(user.id, MessageRole::User, &inbound.text))
            .await?;

        let history = self
            .store
            .get_user_message_history(user.id, self.settings.history_limit)
            .await?;

        let context = self.retrieve_context(user, &inbound.text).await?;
        let system = match context {
            Some(context) => format!(
                "{SYSTEM_PROMPT}\n\nRelevant textbook excerpts:\n\n{context}"
            ),
            None => SYSTEM_PROMPT.to_string(),
        };

        let request = LlmRequest {
            model: String::new(),
            messages: history
                .into_iter()
                .map(|m| ChatMessage::new(m.role, m.content))
                .collect(),
            system: Some(system),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let response = self.llm.complete(&request).await?;
        info!(
            "llm answered {} with {} chars (model {})",
            user.wa_id,
            response.content.len(),
            response.model
        );

        self.store
            .create_new_message(NewMessage::new(
                user.id,
                MessageRole::Assistant,
                &response.content,
            ))
            .await?;

        Ok(response.content)
    }

    /// Search the resources linked to the user's classes. `None` when the
    /// user has no resources or nothing relevant is found.
    async fn retrieve_context(&self, user: &User, query: &str) -> Result<Option<String>> {
        let class_ids: Vec<i64> = self
            .store
            .get_teacher_classes(user.id)
            .await?
            .iter()
            .map(|c| c.id)
            .collect();
        if class_ids.is_empty() {
            return Ok(None);
        }

        let resource_ids = self.store.get_class_resource_ids(&class_ids).await?;
        if resource_ids.is_empty() {
            return Ok(None);
        }

        let filter = ChunkFilter::new().with(ChunkField::ResourceId, resource_ids);
        match vector_search(
            self.embedder.as_ref(),
            &self.store,
            query,
            self.settings.search_results,
            &filter,
        )
        .await
        {
            Ok(hits) if hits.is_empty() => Ok(None),
            Ok(hits) => Ok(Some(format_context(&hits))),
            Err(e) => {
                warn!("answering {} without retrieved context: {e}", user.wa_id);
                Ok(None)
            }
        }
    }
}
