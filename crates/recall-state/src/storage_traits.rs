//! Storage trait definitions for Recall
//!
//! These traits define the two storage capability sets:
//! - `ContextStorage`: per-user dialog history with token-bounded eviction
//! - `PreferencesStorage`: per-user preference records and analysis timestamps
//!
//! All traits are async and backend-agnostic. Volatile implementations live in
//! the `memory` module; durable ones are backed by SurrealDB.

use async_trait::async_trait;
use chrono::Duration;

use crate::error::StorageError;
use crate::model::{DialogContext, NewMessage, UserId, UserPreferences};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContextStorage: dialog history
// ---------------------------------------------------------------------------

/// Per-user dialog context store.
///
/// Guarantees:
/// - `get_context` returns `Ok(None)` for unknown users; absence is not an error.
/// - `append_message` is atomic per user: concurrent appends for one user are
///   applied one after another, in arrival order.
/// - After every append, `total_tokens <= token_limit` or exactly one message
///   remains.
/// - `clear_context` removes the record entirely and is a no-op when absent.
/// - `close` is idempotent.
#[async_trait]
pub trait ContextStorage: Send + Sync {
    /// Snapshot of the user's context, if any.
    async fn get_context(&self, user_id: UserId) -> StorageResult<Option<DialogContext>>;

    /// Stamp `message`, append it and apply the eviction policy.
    async fn append_message(&self, user_id: UserId, message: NewMessage) -> StorageResult<()>;

    /// Upsert the topic, creating an empty context when none exists.
    async fn set_topic(&self, user_id: UserId, topic: &str) -> StorageResult<()>;

    /// Remove the user's context.
    async fn clear_context(&self, user_id: UserId) -> StorageResult<()>;

    /// Release the underlying connection.
    async fn close(&self) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// PreferencesStorage: derived user preferences
// ---------------------------------------------------------------------------

/// Per-user preferences store.
///
/// Guarantees:
/// - `save_user_preferences` preserves the stored `created_at` and never moves
///   `last_message_at` / `last_analysis_at` backwards; an unset incoming
///   `last_message_at` keeps the stored one.
/// - `update_last_message_time` upserts, creating a blank record if needed.
/// - `get_users_needing_analysis` returns each eligible user at most once per
///   call, using [`UserPreferences::needs_analysis`] semantics.
#[async_trait]
pub trait PreferencesStorage: Send + Sync {
    /// Snapshot of the user's preferences, if any.
    async fn get_user_preferences(&self, user_id: UserId)
        -> StorageResult<Option<UserPreferences>>;

    /// Create or update a preference record.
    async fn save_user_preferences(&self, prefs: UserPreferences) -> StorageResult<()>;

    /// Record that the user just sent a message.
    async fn update_last_message_time(&self, user_id: UserId) -> StorageResult<()>;

    /// Users with new messages whose last analysis is missing or older than `cutoff`.
    async fn get_users_needing_analysis(&self, cutoff: Duration) -> StorageResult<Vec<UserId>>;

    /// Release the underlying connection.
    async fn close(&self) -> StorageResult<()>;
}
