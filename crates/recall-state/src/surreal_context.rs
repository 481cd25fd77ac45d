//! SurrealDB-backed ContextStorage implementation
//!
//! Uses `schema::DialogContextRecord` for persistence, converting to/from the
//! `model` types at the boundary. Each user's context is the single record
//! `dialog_contexts:<user_id>`.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::model::{DialogContext, NewMessage, UserId, DEFAULT_TOKEN_LIMIT};
use crate::schema::{DialogContextRecord, CONTEXTS_TABLE};
use crate::storage_traits::{ContextStorage, StorageResult};

/// SurrealDB-backed implementation of [`ContextStorage`].
///
/// Mutations run read-modify-write under a store-wide write lock, so appends
/// never interleave. Reads do not take the lock.
pub struct SurrealContextStore {
    db: Surreal<Any>,
    token_limit: usize,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl SurrealContextStore {
    /// Create a store on a shared handle with the default token ceiling.
    pub fn new(handle: &SurrealHandle) -> Self {
        Self::with_token_limit(handle, DEFAULT_TOKEN_LIMIT)
    }

    /// Create a store on a shared handle with a custom token ceiling.
    pub fn with_token_limit(handle: &SurrealHandle, token_limit: usize) -> Self {
        Self {
            db: handle.db().clone(),
            token_limit,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let handle = SurrealHandle::setup_db().await?;
        Ok(Self::new(&handle))
    }

    // -- private helpers -----------------------------------------------------

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    /// Fetch the context row for a user, if present.
    #[instrument(skip(self))]
    async fn fetch(&self, user_id: UserId) -> StorageResult<Option<DialogContext>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing($tb, $uid)")
            .bind(("tb", CONTEXTS_TABLE))
            .bind(("uid", user_id.0))
            .await?;

        let rows: Vec<DialogContextRecord> = res.take(0)?;
        Ok(rows.into_iter().next().map(DialogContext::from))
    }

    /// Replace the user's context row.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id, messages = ctx.messages.len()))]
    async fn store(&self, ctx: &DialogContext) -> StorageResult<()> {
        let row = DialogContextRecord::from(ctx);
        self.db
            .query("UPSERT type::thing($tb, $uid) CONTENT $row")
            .bind(("tb", CONTEXTS_TABLE))
            .bind(("uid", ctx.user_id.0))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl ContextStorage for SurrealContextStore {
    async fn get_context(&self, user_id: UserId) -> StorageResult<Option<DialogContext>> {
        self.ensure_open()?;
        self.fetch(user_id).await
    }

    async fn append_message(&self, user_id: UserId, message: NewMessage) -> StorageResult<()> {
        self.ensure_open()?;

        let _guard = self.write_lock.lock().await;
        let message = message.into_message();
        let ctx = match self.fetch(user_id).await? {
            Some(mut ctx) => {
                let evicted = ctx.push(message, self.token_limit);
                if evicted > 0 {
                    debug!(user_id = %user_id, evicted, total_tokens = ctx.total_tokens, "evicted messages from context");
                }
                ctx
            }
            None => DialogContext::with_message(user_id, message),
        };
        self.store(&ctx).await
    }

    async fn set_topic(&self, user_id: UserId, topic: &str) -> StorageResult<()> {
        self.ensure_open()?;

        let _guard = self.write_lock.lock().await;
        let mut ctx = self
            .fetch(user_id)
            .await?
            .unwrap_or_else(|| DialogContext::empty(user_id));
        ctx.set_topic(topic);
        self.store(&ctx).await
    }

    async fn clear_context(&self, user_id: UserId) -> StorageResult<()> {
        self.ensure_open()?;

        let _guard = self.write_lock.lock().await;
        self.db
            .query("DELETE type::thing($tb, $uid)")
            .bind(("tb", CONTEXTS_TABLE))
            .bind(("uid", user_id.0))
            .await?
            .check()?;
        debug!(user_id = %user_id, "context cleared");
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("SurrealContextStore closed");
        }
        Ok(())
    }
}
