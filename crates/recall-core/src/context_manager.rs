//! Context manager
//!
//! Thin façade over a [`ContextStorage`] backend chosen at construction time.
//! The backend owns the eviction policy; this layer adds logging and the
//! transcript rendering used when composing prompts.

use std::fmt::Write as _;
use std::sync::Arc;

use recall_state::{ContextStorage, DialogContext, NewMessage, StorageResult, UserId};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ContextManager {
    store: Arc<dyn ContextStorage>,
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager").finish_non_exhaustive()
    }
}

impl ContextManager {
    pub fn new(store: Arc<dyn ContextStorage>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: UserId) -> StorageResult<Option<DialogContext>> {
        let ctx = self.store.get_context(user_id).await?;
        if let Some(ctx) = &ctx {
            debug!(
                user_id = %user_id,
                messages = ctx.messages.len(),
                tokens = ctx.total_tokens,
                "loaded dialog context"
            );
        }
        Ok(ctx)
    }

    pub async fn append(&self, user_id: UserId, message: NewMessage) -> StorageResult<()> {
        let is_user = message.is_user;
        self.store
            .append_message(user_id, message)
            .await
            .inspect_err(|e| warn!(user_id = %user_id, is_user, error = %e, "append failed"))
    }

    pub async fn set_topic(&self, user_id: UserId, topic: &str) -> StorageResult<()> {
        self.store
            .set_topic(user_id, topic)
            .await
            .inspect_err(|e| warn!(user_id = %user_id, error = %e, "set topic failed"))
    }

    pub async fn clear(&self, user_id: UserId) -> StorageResult<()> {
        self.store.clear_context(user_id).await?;
        debug!(user_id = %user_id, "dialog context cleared");
        Ok(())
    }

    pub async fn close(&self) -> StorageResult<()> {
        self.store.close().await
    }
}

/// Render a context as a transcript, oldest message first.
///
/// ```text
/// Subject: <topic>
/// Previous messages of you as Assistant and me as User:
/// User: ...
/// Assistant: ...
/// ```
///
/// The subject line is omitted when no topic is set.
pub fn render_history(ctx: &DialogContext) -> String {
    let mut out = String::new();
    if let Some(topic) = ctx.topic.as_deref().filter(|t| !t.is_empty()) {
        let _ = writeln!(out, "Subject: {topic}");
    }
    out.push_str("Previous messages of you as Assistant and me as User:");
    for message in &ctx.messages {
        let speaker = if message.is_user { "User" } else { "Assistant" };
        let _ = write!(out, "\n{speaker}: {}", message.text);
    }
    out
}
