//! Recall-State: Conversation and Preference Storage
//!
//! This crate provides the persistence layer for Recall. It owns the per-user
//! dialog context (a token-bounded message history) and the per-user
//! preference records derived from it.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: per-user atomicity, the eviction invariant, and backend parity.
//!
//! ## Key Components
//!
//! - `ContextStorage` / `PreferencesStorage`: backend-agnostic async traits
//! - `MemoryContextStore` / `MemoryPreferencesStore`: volatile backends
//! - `SurrealHandle`: shared SurrealDB connection for the durable backends
//! - `SurrealContextStore` / `SurrealPreferencesStore`: durable backends

mod error;
mod handle;
pub mod memory;
mod migrations;
pub mod model;
mod schema;
pub mod storage_traits;
pub mod surreal_context;
pub mod surreal_preferences;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, SurrealHandle};
pub use memory::{MemoryContextStore, MemoryPreferencesStore};
pub use model::{
    DialogContext, Formality, HumorPreference, Message, NewMessage, PreferencesAnalysis,
    ResponseLength, TechnicalLevel, UserId, UserPreferences, Verbosity, DEFAULT_TOKEN_LIMIT,
};
pub use schema::{DialogContextRecord, MessageRecord, UserPreferencesRecord};
pub use storage_traits::{ContextStorage, PreferencesStorage, StorageResult};
pub use surreal_context::SurrealContextStore;
pub use surreal_preferences::SurrealPreferencesStore;

/// Result type for connection-level operations
pub type Result<T> = std::result::Result<T, StateError>;
