//! Data model shared by every storage backend
//!
//! - `DialogContext`: token-bounded message history for one user
//! - `UserPreferences`: preference attributes derived by analysis
//!
//! Records handed out by a store are snapshots; mutating them has no effect
//! on the store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default ceiling on `DialogContext::total_tokens`.
pub const DEFAULT_TOKEN_LIMIT: usize = 20_000;

/// Chat platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

// ---------------------------------------------------------------------------
// Messages and dialog context
// ---------------------------------------------------------------------------

/// A message as submitted by a caller, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub is_user: bool,
    pub text: String,
}

impl NewMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            is_user: true,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            is_user: false,
            text: text.into(),
        }
    }

    /// Stamp the message: count its token-units and set the timestamp.
    pub fn into_message(self) -> Message {
        Message {
            token_count: count_tokens(&self.text),
            is_user: self.is_user,
            text: self.text,
            timestamp: Utc::now(),
        }
    }
}

/// Length-based token proxy: one unit per Unicode scalar value.
pub fn count_tokens(text: &str) -> usize {
    text.chars().count()
}

/// A stored message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub is_user: bool,
    pub text: String,
    pub token_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Per-user conversation history, oldest message first.
///
/// Invariant: `total_tokens` equals the sum of `token_count` over `messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogContext {
    pub user_id: UserId,
    pub topic: Option<String>,
    pub messages: Vec<Message>,
    pub total_tokens: usize,
    pub updated_at: DateTime<Utc>,
}

impl DialogContext {
    /// An empty context, as created by `set_topic` on an unknown user.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            topic: None,
            messages: Vec::new(),
            total_tokens: 0,
            updated_at: Utc::now(),
        }
    }

    /// A context holding exactly one message.
    pub fn with_message(user_id: UserId, message: Message) -> Self {
        Self {
            user_id,
            topic: None,
            total_tokens: message.token_count,
            messages: vec![message],
            updated_at: Utc::now(),
        }
    }

    /// Append `message`, then evict the oldest messages while the total
    /// exceeds `token_limit` and more than one message remains.
    ///
    /// Each eviction subtracts the token count of the message it removes.
    /// Returns the number of evicted messages.
    pub fn push(&mut self, message: Message, token_limit: usize) -> usize {
        self.total_tokens += message.token_count;
        self.messages.push(message);

        let mut evicted = 0;
        while self.total_tokens > token_limit && self.messages.len() - evicted > 1 {
            self.total_tokens -= self.messages[evicted].token_count;
            evicted += 1;
        }
        self.messages.drain(..evicted);
        self.updated_at = Utc::now();
        evicted
    }

    /// Set the topic. A blank topic clears it.
    pub fn set_topic(&mut self, topic: &str) {
        let topic = topic.trim();
        self.topic = (!topic.is_empty()).then(|| topic.to_string());
        self.updated_at = Utc::now();
    }

    /// Number of user-authored messages.
    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user).count()
    }

    /// Texts of user-authored messages, oldest first.
    pub fn user_texts(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.is_user)
            .map(|m| m.text.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Preference attributes
// ---------------------------------------------------------------------------

/// Declares a closed preference vocabulary with an `Unknown` fallback.
///
/// Labels are parsed case-insensitively; anything outside the vocabulary
/// maps to `Unknown` rather than failing.
macro_rules! preference_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant,)+
            #[default]
            #[serde(other)]
            Unknown,
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                    $name::Unknown => "unknown",
                }
            }

            pub fn from_label(label: &str) -> Self {
                match label.trim().to_ascii_lowercase().as_str() {
                    $($label => $name::$variant,)+
                    _ => $name::Unknown,
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, $name::Unknown)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

preference_enum!(
    /// How formally the user writes.
    Formality { Formal => "formal", Informal => "informal", Neutral => "neutral" }
);

preference_enum!(
    /// How much detail the user puts into messages.
    Verbosity { Verbose => "verbose", Concise => "concise", Balanced => "balanced" }
);

preference_enum!(
    /// Technical vocabulary level.
    TechnicalLevel { Beginner => "beginner", Intermediate => "intermediate", Expert => "expert" }
);

preference_enum!(
    /// How much humor the user uses.
    HumorPreference { None => "none", Occasional => "occasional", Frequent => "frequent" }
);

preference_enum!(
    /// Expected length of replies.
    ResponseLength { Short => "short", Medium => "medium", Long => "long" }
);

/// The seven-field object returned by the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesAnalysis {
    pub preferred_language: String,
    pub formality: String,
    pub verbosity: String,
    pub favorite_topics: Vec<String>,
    pub technical_level: String,
    pub humor_preference: String,
    pub response_length: String,
}

/// Preference record for one user.
///
/// `created_at` is set once. `last_message_at` and `last_analysis_at` only
/// move forward; stores enforce both on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: UserId,
    pub preferred_language: String,
    pub formality: Formality,
    pub verbosity: Verbosity,
    pub favorite_topics: Vec<String>,
    pub technical_level: TechnicalLevel,
    pub humor_preference: HumorPreference,
    pub response_length: ResponseLength,
    pub last_analysis_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    /// A blank record with no analysed attributes.
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            preferred_language: String::new(),
            formality: Formality::Unknown,
            verbosity: Verbosity::Unknown,
            favorite_topics: Vec::new(),
            technical_level: TechnicalLevel::Unknown,
            humor_preference: HumorPreference::Unknown,
            response_length: ResponseLength::Unknown,
            last_analysis_at: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the analysed attributes from a completion result.
    pub fn apply_analysis(&mut self, analysis: PreferencesAnalysis) {
        self.preferred_language = analysis.preferred_language.trim().to_string();
        self.formality = Formality::from_label(&analysis.formality);
        self.verbosity = Verbosity::from_label(&analysis.verbosity);
        self.favorite_topics = analysis
            .favorite_topics
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self.technical_level = TechnicalLevel::from_label(&analysis.technical_level);
        self.humor_preference = HumorPreference::from_label(&analysis.humor_preference);
        self.response_length = ResponseLength::from_label(&analysis.response_length);
    }

    /// Re-analysis eligibility.
    ///
    /// True iff there is a message newer than the last analysis and either
    /// no analysis has run yet or the last one is older than `cutoff`.
    pub fn needs_analysis(&self, now: DateTime<Utc>, cutoff: Duration) -> bool {
        let Some(last_message) = self.last_message_at else {
            return false;
        };
        match self.last_analysis_at {
            None => true,
            Some(last_analysis) => last_message > last_analysis && now - last_analysis > cutoff,
        }
    }

    /// Fold an incoming record onto the stored one, applying the save rules:
    /// keep `created_at`, never move timestamps backwards, bump `updated_at`.
    pub fn merged_onto(mut self, existing: Option<&UserPreferences>, now: DateTime<Utc>) -> Self {
        if let Some(existing) = existing {
            self.created_at = existing.created_at;
            self.last_message_at = latest(self.last_message_at, existing.last_message_at);
            self.last_analysis_at = latest(self.last_analysis_at, existing.last_analysis_at);
        } else {
            self.created_at = now;
        }
        self.updated_at = now;
        self
    }

    /// Short instruction block describing the analysed preferences.
    ///
    /// Empty until the first successful analysis.
    pub fn prompt_hint(&self) -> String {
        if self.last_analysis_at.is_none() {
            return String::new();
        }

        let mut lines = Vec::new();
        if !self.preferred_language.is_empty() {
            lines.push(format!("- Preferred language: {}", self.preferred_language));
        }
        if self.formality.is_known() {
            lines.push(format!("- Formality: {}", self.formality));
        }
        if self.verbosity.is_known() {
            lines.push(format!("- Verbosity: {}", self.verbosity));
        }
        if !self.favorite_topics.is_empty() {
            lines.push(format!("- Favorite topics: {}", self.favorite_topics.join(", ")));
        }
        if self.technical_level.is_known() {
            lines.push(format!("- Technical level: {}", self.technical_level));
        }
        if self.humor_preference.is_known() {
            lines.push(format!("- Humor: {}", self.humor_preference));
        }
        if self.response_length.is_known() {
            lines.push(format!("- Response length: {}", self.response_length));
        }

        if lines.is_empty() {
            return String::new();
        }
        format!(
            "User preferences (adapt your reply accordingly):\n{}",
            lines.join("\n")
        )
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_tokens(n: usize) -> Message {
        NewMessage::user("x".repeat(n)).into_message()
    }

    #[test]
    fn token_count_uses_unicode_scalars() {
        let msg = NewMessage::user("привіт").into_message();
        assert_eq!(msg.token_count, 6);
        assert!(msg.is_user);
    }

    #[test]
    fn eviction_subtracts_removed_message_tokens() {
        let user = UserId(1);
        let mut ctx = DialogContext::with_message(user, message_with_tokens(5));
        ctx.push(message_with_tokens(10), 20);
        let evicted = ctx.push(message_with_tokens(8), 20);

        assert_eq!(evicted, 1);
        let counts: Vec<usize> = ctx.messages.iter().map(|m| m.token_count).collect();
        assert_eq!(counts, vec![10, 8]);
        assert_eq!(ctx.total_tokens, 18);
    }

    #[test]
    fn single_oversized_message_is_kept() {
        let user = UserId(1);
        let mut ctx = DialogContext::with_message(user, message_with_tokens(3));
        let evicted = ctx.push(message_with_tokens(50), 20);

        assert_eq!(evicted, 1);
        assert_eq!(ctx.messages.len(), 1);
        assert_eq!(ctx.total_tokens, 50);
    }

    #[test]
    fn eviction_bound_holds_for_mixed_sizes() {
        let user = UserId(7);
        let sizes = [4, 19, 1, 30, 2, 2, 2, 15, 6, 21, 0, 9];
        let mut ctx = DialogContext::empty(user);
        for size in sizes {
            ctx.push(message_with_tokens(size), 20);
            let sum: usize = ctx.messages.iter().map(|m| m.token_count).sum();
            assert_eq!(ctx.total_tokens, sum);
            assert!(ctx.total_tokens <= 20 || ctx.messages.len() == 1);
        }
    }

    #[test]
    fn user_texts_skip_assistant_messages() {
        let user = UserId(3);
        let mut ctx = DialogContext::with_message(user, NewMessage::user("hi").into_message());
        ctx.push(NewMessage::assistant("hello!").into_message(), 100);
        ctx.push(NewMessage::user("how are you").into_message(), 100);

        assert_eq!(ctx.user_message_count(), 2);
        assert_eq!(ctx.user_texts(), vec!["hi", "how are you"]);
    }

    #[test]
    fn blank_topic_clears_it() {
        let mut ctx = DialogContext::empty(UserId(5));
        ctx.set_topic(" travel ");
        assert_eq!(ctx.topic.as_deref(), Some("travel"));
        ctx.set_topic("  ");
        assert!(ctx.topic.is_none());
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(Formality::from_label(" Informal "), Formality::Informal);
        assert_eq!(HumorPreference::from_label("none"), HumorPreference::None);
        assert_eq!(ResponseLength::from_label("epic"), ResponseLength::Unknown);
    }

    #[test]
    fn unknown_wire_value_deserializes_to_unknown() {
        let v: Verbosity = serde_json::from_str("\"rambling\"").unwrap();
        assert_eq!(v, Verbosity::Unknown);
        assert_eq!(serde_json::to_string(&Verbosity::Concise).unwrap(), "\"concise\"");
    }

    #[test]
    fn eligibility_predicate() {
        let now = Utc::now();
        let cutoff = Duration::hours(24);
        let mut prefs = UserPreferences::new(UserId(9));
        prefs.last_message_at = Some(now);

        prefs.last_analysis_at = Some(now - Duration::hours(25));
        assert!(prefs.needs_analysis(now, cutoff));

        prefs.last_analysis_at = Some(now - Duration::hours(1));
        assert!(!prefs.needs_analysis(now, cutoff));

        prefs.last_analysis_at = None;
        prefs.last_message_at = Some(now - Duration::days(30));
        assert!(prefs.needs_analysis(now, cutoff));
    }

    #[test]
    fn no_new_messages_means_not_eligible() {
        let now = Utc::now();
        let mut prefs = UserPreferences::new(UserId(9));
        assert!(!prefs.needs_analysis(now, Duration::hours(24)));

        prefs.last_analysis_at = Some(now - Duration::hours(48));
        prefs.last_message_at = Some(now - Duration::hours(49));
        assert!(!prefs.needs_analysis(now, Duration::hours(24)));
    }

    #[test]
    fn merge_keeps_created_at_and_newest_timestamps() {
        let now = Utc::now();
        let mut existing = UserPreferences::new(UserId(2));
        existing.created_at = now - Duration::days(10);
        existing.last_message_at = Some(now - Duration::minutes(1));

        let mut incoming = UserPreferences::new(UserId(2));
        incoming.last_message_at = Some(now - Duration::hours(2));
        incoming.last_analysis_at = Some(now);

        let merged = incoming.merged_onto(Some(&existing), now);
        assert_eq!(merged.created_at, existing.created_at);
        assert_eq!(merged.last_message_at, existing.last_message_at);
        assert_eq!(merged.last_analysis_at, Some(now));
        assert_eq!(merged.updated_at, now);
    }

    #[test]
    fn prompt_hint_empty_until_analysed() {
        let mut prefs = UserPreferences::new(UserId(4));
        assert!(prefs.prompt_hint().is_empty());

        prefs.apply_analysis(PreferencesAnalysis {
            preferred_language: "Ukrainian".into(),
            formality: "informal".into(),
            verbosity: "concise".into(),
            favorite_topics: vec!["rust".into(), " ".into()],
            technical_level: "expert".into(),
            humor_preference: "occasional".into(),
            response_length: "whatever".into(),
        });
        prefs.last_analysis_at = Some(Utc::now());

        let hint = prefs.prompt_hint();
        assert!(hint.contains("Preferred language: Ukrainian"));
        assert!(hint.contains("Favorite topics: rust"));
        assert!(!hint.contains("Response length"));
    }
}
