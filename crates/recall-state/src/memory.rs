//! Volatile storage backends
//!
//! Provides `MemoryContextStore` and `MemoryPreferencesStore`, which satisfy
//! the trait contracts without any external dependencies. They are used in
//! tests and as the fallback when the durable store is unavailable.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::{DialogContext, NewMessage, UserId, UserPreferences, DEFAULT_TOKEN_LIMIT};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryContextStore
// ---------------------------------------------------------------------------

/// In-memory context store backed by a `HashMap<UserId, DialogContext>`.
///
/// Reads share the lock; every mutation takes the write lock for its whole
/// read-modify-write, which serializes appends per store.
#[derive(Debug)]
pub struct MemoryContextStore {
    contexts: RwLock<HashMap<UserId, DialogContext>>,
    token_limit: usize,
}

impl Default for MemoryContextStore {
    fn default() -> Self {
        Self::with_token_limit(DEFAULT_TOKEN_LIMIT)
    }
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a custom eviction ceiling.
    pub fn with_token_limit(token_limit: usize) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            token_limit,
        }
    }

}

#[async_trait]
impl ContextStorage for MemoryContextStore {
    async fn get_context(&self, user_id: UserId) -> StorageResult<Option<DialogContext>> {
        let contexts = self.contexts.read().await;
        Ok(contexts.get(&user_id).cloned())
    }

    async fn append_message(&self, user_id: UserId, message: NewMessage) -> StorageResult<()> {
        let mut contexts = self.contexts.write().await;
        let message = message.into_message();
        match contexts.get_mut(&user_id) {
            Some(ctx) => {
                let evicted = ctx.push(message, self.token_limit);
                if evicted > 0 {
                    debug!(user_id = %user_id, evicted, total_tokens = ctx.total_tokens, "evicted messages from context");
                }
            }
            None => {
                contexts.insert(user_id, DialogContext::with_message(user_id, message));
            }
        }
        Ok(())
    }

    async fn set_topic(&self, user_id: UserId, topic: &str) -> StorageResult<()> {
        let mut contexts = self.contexts.write().await;
        let ctx = contexts
            .entry(user_id)
            .or_insert_with(|| DialogContext::empty(user_id));
        ctx.set_topic(topic);
        Ok(())
    }

    async fn clear_context(&self, user_id: UserId) -> StorageResult<()> {
        let mut contexts = self.contexts.write().await;
        contexts.remove(&user_id);
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPreferencesStore
// ---------------------------------------------------------------------------

/// In-memory preferences store backed by a `HashMap<UserId, UserPreferences>`.
#[derive(Debug, Default)]
pub struct MemoryPreferencesStore {
    preferences: RwLock<HashMap<UserId, UserPreferences>>,
}

impl MemoryPreferencesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferencesStorage for MemoryPreferencesStore {
    async fn get_user_preferences(
        &self,
        user_id: UserId,
    ) -> StorageResult<Option<UserPreferences>> {
        let preferences = self.preferences.read().await;
        Ok(preferences.get(&user_id).cloned())
    }

    async fn save_user_preferences(&self, prefs: UserPreferences) -> StorageResult<()> {
        let user_id = prefs.user_id;
        let mut preferences = self.preferences.write().await;
        let merged = prefs.merged_onto(preferences.get(&user_id), Utc::now());
        preferences.insert(merged.user_id, merged);
        Ok(())
    }

    async fn update_last_message_time(&self, user_id: UserId) -> StorageResult<()> {
        let now = Utc::now();
        let mut preferences = self.preferences.write().await;
        let prefs = preferences
            .entry(user_id)
            .or_insert_with(|| UserPreferences::new(user_id));
        prefs.last_message_at = Some(now);
        prefs.updated_at = now;
        Ok(())
    }

    async fn get_users_needing_analysis(&self, cutoff: Duration) -> StorageResult<Vec<UserId>> {
        let now = Utc::now();
        let preferences = self.preferences.read().await;
        let mut users: Vec<UserId> = preferences
            .values()
            .filter(|p| p.needs_analysis(now, cutoff))
            .map(|p| p.user_id)
            .collect();
        users.sort();
        Ok(users)
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
