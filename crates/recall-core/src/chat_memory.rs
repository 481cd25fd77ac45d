//! Chat memory
//!
//! Glue between the chat layer and the two stores. Every operation is best
//! effort: storage failures are logged and swallowed so a hiccup in the
//! memory layer never blocks a reply.

use std::sync::Arc;

use recall_state::{NewMessage, PreferencesStorage, UserId, UserPreferences};
use tracing::{instrument, warn};

use crate::context_manager::{render_history, ContextManager};

#[derive(Clone)]
pub struct ChatMemory {
    contexts: ContextManager,
    preferences: Arc<dyn PreferencesStorage>,
}

impl std::fmt::Debug for ChatMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatMemory")
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}

impl ChatMemory {
    pub fn new(contexts: ContextManager, preferences: Arc<dyn PreferencesStorage>) -> Self {
        Self {
            contexts,
            preferences,
        }
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    /// Record an inbound user message and bump its `last_message_at`.
    #[instrument(skip(self, text), fields(user_id = %user_id))]
    pub async fn record_user_message(&self, user_id: UserId, text: &str) {
        // append already logs its own failure
        let _ = self.contexts.append(user_id, NewMessage::user(text)).await;
        if let Err(e) = self.preferences.update_last_message_time(user_id).await {
            warn!(error = %e, "failed to update last message time");
        }
    }

    /// Record the assistant's reply.
    pub async fn record_reply(&self, user_id: UserId, text: &str) {
        let _ = self.contexts.append(user_id, NewMessage::assistant(text)).await;
    }

    /// Analysed preferences, if any.
    pub async fn preferences(&self, user_id: UserId) -> Option<UserPreferences> {
        match self.preferences.get_user_preferences(user_id).await {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "failed to load preferences");
                None
            }
        }
    }

    /// Prompt for the completion service: history, preference hint, then the
    /// new question.
    pub async fn compose_prompt(&self, user_id: UserId, question: &str) -> String {
        let mut sections = Vec::new();

        match self.contexts.get(user_id).await {
            Ok(Some(ctx)) => sections.push(render_history(&ctx)),
            Ok(None) => {}
            Err(e) => warn!(user_id = %user_id, error = %e, "failed to load dialog context"),
        }

        if let Some(prefs) = self.preferences(user_id).await {
            let hint = prefs.prompt_hint();
            if !hint.is_empty() {
                sections.push(hint);
            }
        }

        sections.push(format!("My next question is: {question}"));
        sections.join("\n\n")
    }

    pub async fn set_topic(&self, user_id: UserId, topic: &str) {
        let _ = self.contexts.set_topic(user_id, topic).await;
    }

    pub async fn clear(&self, user_id: UserId) {
        if let Err(e) = self.contexts.clear(user_id).await {
            warn!(user_id = %user_id, error = %e, "failed to clear dialog context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recall_state::{Formality, MemoryContextStore, MemoryPreferencesStore};

    fn memory() -> (ChatMemory, Arc<MemoryPreferencesStore>) {
        let prefs = Arc::new(MemoryPreferencesStore::new());
        let contexts = ContextManager::new(Arc::new(MemoryContextStore::new()));
        (ChatMemory::new(contexts, prefs.clone()), prefs)
    }

    #[tokio::test]
    async fn user_message_updates_last_message_time() {
        let (memory, prefs) = memory();
        memory.record_user_message(UserId(1), "hello").await;
        memory.record_reply(UserId(1), "hi there").await;

        let stored = prefs.get_user_preferences(UserId(1)).await.unwrap().unwrap();
        assert!(stored.last_message_at.is_some());
        assert!(stored.last_analysis_at.is_none());

        let ctx = memory.contexts().get(UserId(1)).await.unwrap().unwrap();
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.user_message_count(), 1);
    }

    #[tokio::test]
    async fn compose_prompt_for_new_user_is_just_the_question() {
        let (memory, _) = memory();
        assert_eq!(
            memory.compose_prompt(UserId(3), "what time is it?").await,
            "My next question is: what time is it?"
        );
    }

    #[tokio::test]
    async fn compose_prompt_includes_history_and_hint() {
        let (memory, prefs) = memory();
        let user = UserId(4);
        memory.set_topic(user, "travel").await;
        memory.record_user_message(user, "best time to visit Lviv?").await;

        let mut analysed = UserPreferences::new(user);
        analysed.formality = Formality::Informal;
        analysed.last_analysis_at = Some(Utc::now());
        prefs.save_user_preferences(analysed).await.unwrap();

        let prompt = memory.compose_prompt(user, "and Odesa?").await;
        assert!(prompt.starts_with("Subject: travel\n"));
        assert!(prompt.contains("User: best time to visit Lviv?"));
        assert!(prompt.contains("- Formality: informal"));
        assert!(prompt.ends_with("My next question is: and Odesa?"));
    }

    #[tokio::test]
    async fn clear_forgets_history() {
        let (memory, _) = memory();
        memory.record_user_message(UserId(5), "remember me").await;
        memory.clear(UserId(5)).await;
        assert!(!memory
            .compose_prompt(UserId(5), "do you?")
            .await
            .contains("remember me"));
    }
}
