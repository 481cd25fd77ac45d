//! Schema definitions for Recall SurrealDB tables
//!
//! Tables:
//! - dialog_contexts: one record per user, keyed `dialog_contexts:<user_id>`
//! - user_preferences: one record per user, keyed `user_preferences:<user_id>`
//!
//! Records here are the persisted shape; they convert to and from the
//! `model` types at the backend boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    DialogContext, Formality, HumorPreference, Message, ResponseLength, TechnicalLevel, UserId,
    UserPreferences, Verbosity,
};

pub(crate) const CONTEXTS_TABLE: &str = "dialog_contexts";
pub(crate) const PREFERENCES_TABLE: &str = "user_preferences";

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

// ---------------------------------------------------------------------------
// Dialog contexts
// ---------------------------------------------------------------------------

/// Persisted message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub is_user: bool,
    pub text: String,
    pub token_count: u64,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

/// Persisted dialog context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogContextRecord {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub user_id: i64,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    pub total_tokens: u64,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Message> for MessageRecord {
    fn from(msg: &Message) -> Self {
        MessageRecord {
            is_user: msg.is_user,
            text: msg.text.clone(),
            token_count: msg.token_count as u64,
            timestamp: msg.timestamp,
        }
    }
}

impl From<MessageRecord> for Message {
    fn from(rec: MessageRecord) -> Self {
        Message {
            is_user: rec.is_user,
            text: rec.text,
            token_count: rec.token_count as usize,
            timestamp: rec.timestamp,
        }
    }
}

impl From<&DialogContext> for DialogContextRecord {
    fn from(ctx: &DialogContext) -> Self {
        DialogContextRecord {
            id: None,
            user_id: ctx.user_id.0,
            topic: ctx.topic.clone(),
            messages: ctx.messages.iter().map(MessageRecord::from).collect(),
            total_tokens: ctx.total_tokens as u64,
            updated_at: ctx.updated_at,
        }
    }
}

impl From<DialogContextRecord> for DialogContext {
    fn from(rec: DialogContextRecord) -> Self {
        DialogContext {
            user_id: UserId(rec.user_id),
            topic: rec.topic,
            messages: rec.messages.into_iter().map(Message::from).collect(),
            total_tokens: rec.total_tokens as usize,
            updated_at: rec.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// User preferences
// ---------------------------------------------------------------------------

/// Persisted preference record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferencesRecord {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub user_id: i64,
    #[serde(default)]
    pub preferred_language: String,
    #[serde(default)]
    pub formality: Formality,
    #[serde(default)]
    pub verbosity: Verbosity,
    #[serde(default)]
    pub favorite_topics: Vec<String>,
    #[serde(default)]
    pub technical_level: TechnicalLevel,
    #[serde(default)]
    pub humor_preference: HumorPreference,
    #[serde(default)]
    pub response_length: ResponseLength,
    #[serde(default, with = "surreal_datetime_opt")]
    pub last_analysis_at: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&UserPreferences> for UserPreferencesRecord {
    fn from(p: &UserPreferences) -> Self {
        UserPreferencesRecord {
            id: None,
            user_id: p.user_id.0,
            preferred_language: p.preferred_language.clone(),
            formality: p.formality,
            verbosity: p.verbosity,
            favorite_topics: p.favorite_topics.clone(),
            technical_level: p.technical_level,
            humor_preference: p.humor_preference,
            response_length: p.response_length,
            last_analysis_at: p.last_analysis_at,
            last_message_at: p.last_message_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<UserPreferencesRecord> for UserPreferences {
    fn from(rec: UserPreferencesRecord) -> Self {
        UserPreferences {
            user_id: UserId(rec.user_id),
            preferred_language: rec.preferred_language,
            formality: rec.formality,
            verbosity: rec.verbosity,
            favorite_topics: rec.favorite_topics,
            technical_level: rec.technical_level,
            humor_preference: rec.humor_preference,
            response_length: rec.response_length,
            last_analysis_at: rec.last_analysis_at,
            last_message_at: rec.last_message_at,
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        }
    }
}

/// Projection used by the eligibility query
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserIdRow {
    pub user_id: i64,
}
