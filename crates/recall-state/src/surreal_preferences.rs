//! SurrealDB-backed PreferencesStorage implementation

use async_trait::async_trait;
use chrono::{Duration, Utc};
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::handle::SurrealHandle;
use crate::model::{UserId, UserPreferences};
use crate::schema::{UserIdRow, UserPreferencesRecord, PREFERENCES_TABLE};
use crate::storage_traits::{PreferencesStorage, StorageResult};

/// Eligibility predicate, mirroring [`UserPreferences::needs_analysis`].
const USERS_NEEDING_ANALYSIS: &str = r#"
    SELECT user_id FROM user_preferences
    WHERE last_message_at != NONE
      AND last_message_at != NULL
      AND (
        last_analysis_at = NONE
        OR last_analysis_at = NULL
        OR ($cutoff != NONE AND last_message_at > last_analysis_at AND last_analysis_at < $cutoff)
      )
    ORDER BY user_id ASC
"#;

/// SurrealDB-backed implementation of [`PreferencesStorage`].
///
/// Shares the connection with the context store; `close` leaves the shared
/// connection open.
pub struct SurrealPreferencesStore {
    db: Surreal<Any>,
    write_lock: Mutex<()>,
}

impl SurrealPreferencesStore {
    pub fn new(handle: &SurrealHandle) -> Self {
        Self {
            db: handle.db().clone(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let handle = SurrealHandle::setup_db().await?;
        Ok(Self::new(&handle))
    }

    #[instrument(skip(self))]
    async fn fetch(&self, user_id: UserId) -> StorageResult<Option<UserPreferences>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing($tb, $uid)")
            .bind(("tb", PREFERENCES_TABLE))
            .bind(("uid", user_id.0))
            .await?;

        let rows: Vec<UserPreferencesRecord> = res.take(0)?;
        Ok(rows.into_iter().next().map(UserPreferences::from))
    }

    #[instrument(skip(self, prefs), fields(user_id = %prefs.user_id))]
    async fn store(&self, prefs: &UserPreferences) -> StorageResult<()> {
        let row = UserPreferencesRecord::from(prefs);
        self.db
            .query("UPSERT type::thing($tb, $uid) CONTENT $row")
            .bind(("tb", PREFERENCES_TABLE))
            .bind(("uid", prefs.user_id.0))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl PreferencesStorage for SurrealPreferencesStore {
    async fn get_user_preferences(
        &self,
        user_id: UserId,
    ) -> StorageResult<Option<UserPreferences>> {
        self.fetch(user_id).await
    }

    async fn save_user_preferences(&self, prefs: UserPreferences) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let existing = self.fetch(prefs.user_id).await?;
        let merged = prefs.merged_onto(existing.as_ref(), Utc::now());
        self.store(&merged).await
    }

    async fn update_last_message_time(&self, user_id: UserId) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut prefs = self
            .fetch(user_id)
            .await?
            .unwrap_or_else(|| UserPreferences::new(user_id));
        prefs.last_message_at = Some(now);
        prefs.updated_at = now;
        self.store(&prefs).await
    }

    async fn get_users_needing_analysis(&self, cutoff: Duration) -> StorageResult<Vec<UserId>> {
        // A cutoff reaching past the representable range excludes every
        // analysed user.
        let cutoff_time = Utc::now()
            .checked_sub_signed(cutoff)
            .map(SurrealDatetime::from);
        let mut res = self
            .db
            .query(USERS_NEEDING_ANALYSIS)
            .bind(("cutoff", cutoff_time))
            .await?;

        let rows: Vec<UserIdRow> = res.take(0)?;
        debug!(count = rows.len(), "users needing analysis");
        Ok(rows.into_iter().map(|r| UserId(r.user_id)).collect())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
