//! Recall Core Library
//!
//! Conversation memory and preference analysis on top of `recall-state`:
//!
//! - [`ContextManager`]: façade over a `ContextStorage` backend
//! - [`ChatMemory`]: records inbound/outbound messages and composes prompts
//! - [`PreferenceAnalyzer`]: background scheduler deriving `UserPreferences`
//!   from dialog history through a [`CompletionService`]

pub mod analysis;
pub mod analyzer;
pub mod chat_memory;
pub mod completion;
pub mod context_manager;
pub mod error;
pub mod inflight;
pub mod telemetry;

pub use analysis::{build_analysis_prompt, parse_analysis, strip_code_fence};
pub use analyzer::{AnalysisOutcome, AnalyzerConfig, PreferenceAnalyzer};
pub use chat_memory::ChatMemory;
pub use completion::{
    ApiError, ChatCompletion, ChatMessage, ChatRequest, CompletionConfig, CompletionService,
    OpenAiClient,
};
pub use context_manager::{render_history, ContextManager};
pub use error::{AnalysisError, CompletionError, ConfigError};
pub use inflight::{InFlightGuard, InFlightSet};

pub use recall_state::{
    ContextStorage, DialogContext, NewMessage, PreferencesStorage, UserId, UserPreferences,
};
