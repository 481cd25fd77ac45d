//! SurrealDB schema migrations and initialization
//!
//! Sets up the two Recall tables with their unique user indexes.

use crate::schema::{CONTEXTS_TABLE, PREFERENCES_TABLE};
use crate::{Result, StateError};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Recall tables in SurrealDB
///
/// Safe to call multiple times (every definition is `IF NOT EXISTS`).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Recall SurrealDB schema");

    init_contexts_table(db).await?;
    init_preferences_table(db).await?;

    info!("Recall schema initialization complete");
    Ok(())
}

/// Initialize `dialog_contexts` table
///
/// Schema:
/// ```text
/// TABLE dialog_contexts {
///   user_id:       INT (unique)
///   topic:         STRING?
///   messages:      ARRAY<{ is_user, text, token_count, timestamp }>
///   total_tokens:  INT
///   updated_at:    DATETIME
/// }
/// ```
async fn init_contexts_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing {} table", CONTEXTS_TABLE);

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS dialog_contexts SCHEMALESS;

        -- One context per user
        DEFINE INDEX IF NOT EXISTS idx_context_user_id ON TABLE dialog_contexts COLUMNS user_id UNIQUE;
    "#;

    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    info!("✓ {} table initialized", CONTEXTS_TABLE);
    Ok(())
}

/// Initialize `user_preferences` table
///
/// Schema:
/// ```text
/// TABLE user_preferences {
///   user_id:             INT (unique)
///   preferred_language:  STRING
///   formality:           STRING (formal | informal | neutral | unknown)
///   verbosity:           STRING (verbose | concise | balanced | unknown)
///   favorite_topics:     ARRAY<STRING>
///   technical_level:     STRING (beginner | intermediate | expert | unknown)
///   humor_preference:    STRING (none | occasional | frequent | unknown)
///   response_length:     STRING (short | medium | long | unknown)
///   last_analysis_at:    DATETIME?
///   last_message_at:     DATETIME? (indexed)
///   created_at:          DATETIME
///   updated_at:          DATETIME
/// }
/// ```
async fn init_preferences_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing {} table", PREFERENCES_TABLE);

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS user_preferences SCHEMALESS;

        -- One preference record per user
        DEFINE INDEX IF NOT EXISTS idx_prefs_user_id ON TABLE user_preferences COLUMNS user_id UNIQUE;

        -- Narrows the eligibility scan
        DEFINE INDEX IF NOT EXISTS idx_prefs_last_message_at ON TABLE user_preferences COLUMNS last_message_at;
    "#;

    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    info!("✓ {} table initialized", PREFERENCES_TABLE);
    Ok(())
}
