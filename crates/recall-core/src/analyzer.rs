//! Preference analyzer
//!
//! Background scheduler that periodically asks the preferences store for
//! eligible users and, for each one, runs a single analysis:
//!
//! 1. load the dialog context and check there is enough user input
//! 2. build the prompt from user-authored texts only
//! 3. call the completion service under a per-call timeout
//! 4. parse the (optionally fenced) JSON answer
//! 5. merge onto the stored preferences with `last_analysis_at = now`
//!
//! A user is analysed by at most one task at a time ([`InFlightSet`]).
//! Concurrent analyses are capped by a semaphore. Failures leave the stored
//! record untouched, so the user stays eligible and is retried on a later
//! poll.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use recall_state::{ContextStorage, PreferencesStorage, UserId, UserPreferences};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::analysis::{build_analysis_prompt, parse_analysis};
use crate::completion::CompletionService;
use crate::error::{AnalysisError, CompletionError, ConfigError};
use crate::inflight::InFlightSet;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Time between poll cycles
    pub poll_interval: Duration,
    /// Minimum age of the last analysis before a user is eligible again
    pub cutoff: chrono::Duration,
    /// Minimum total and user-authored messages before analysing
    pub min_messages: usize,
    /// Upper bound on simultaneously running analyses
    pub max_concurrent: usize,
    /// Timeout for a single completion call
    pub completion_timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60 * 60),
            cutoff: chrono::Duration::hours(24),
            min_messages: 3,
            max_concurrent: 4,
            completion_timeout: Duration::from_secs(90),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cutoff = self
            .cutoff
            .to_std()
            .map_err(|_| ConfigError::Invalid("analysis cutoff must be positive".into()))?;
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll interval must be non-zero".into()));
        }
        if self.poll_interval >= cutoff {
            return Err(ConfigError::Invalid(format!(
                "poll interval ({:?}) must be shorter than the analysis cutoff ({:?})",
                self.poll_interval, cutoff
            )));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max concurrent analyses must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a per-user analysis that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// Preferences were written.
    Updated(Box<UserPreferences>),
    /// Too few messages; nothing was called or written.
    InsufficientData {
        messages: usize,
        user_messages: usize,
    },
    /// The user has no dialog context.
    NoContext,
}

pub struct PreferenceAnalyzer {
    inner: Arc<Inner>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    contexts: Arc<dyn ContextStorage>,
    preferences: Arc<dyn PreferencesStorage>,
    completion: Arc<dyn CompletionService>,
    config: AnalyzerConfig,
    in_flight: Arc<InFlightSet>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl std::fmt::Debug for PreferenceAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceAnalyzer")
            .field("config", &self.inner.config)
            .field("in_flight", &self.inner.in_flight.len())
            .field("stopped", &self.inner.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PreferenceAnalyzer {
    pub fn new(
        contexts: Arc<dyn ContextStorage>,
        preferences: Arc<dyn PreferencesStorage>,
        completion: Arc<dyn CompletionService>,
        config: AnalyzerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Ok(Self {
            inner: Arc::new(Inner {
                contexts,
                preferences,
                completion,
                config,
                in_flight: InFlightSet::new(),
                permits,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
            poller: Mutex::new(None),
        })
    }

    /// Number of users currently being analysed.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Start the periodic poll loop. The first cycle runs one interval after
    /// start. Calling `start` again while running is a no-op.
    pub fn start(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(|e| e.into_inner());
        if poller.is_some() || self.inner.shutdown.is_cancelled() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let period = inner.config.poll_interval;
        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?period, "background analysis started");

            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        inner.poll_once().await;
                    }
                }
            }
            info!("background analysis stopped");
        }));
    }

    /// Run one poll cycle. Returns the number of analyses dispatched.
    pub async fn poll_once(&self) -> usize {
        self.inner.poll_once().await
    }

    /// Dispatch an analysis for `user_id` unless one is already in flight or
    /// the analyzer is stopped. Returns whether a task was spawned.
    pub fn trigger(&self, user_id: UserId) -> bool {
        self.inner.trigger(user_id)
    }

    /// Run the analysis for one user inline, outside the in-flight guard.
    pub async fn analyze_user(&self, user_id: UserId) -> Result<AnalysisOutcome, AnalysisError> {
        self.inner.analyze_user(user_id).await
    }

    /// Stop polling and wait for every dispatched analysis to finish.
    ///
    /// In-flight calls are not aborted; each is bounded by the completion
    /// timeout. Safe to call more than once.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();

        let poller = self
            .poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = poller {
            if let Err(e) = handle.await {
                error!(error = %e, "analysis poller terminated abnormally");
            }
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        debug!("all analyses drained");
    }
}

impl Inner {
    async fn poll_once(self: &Arc<Self>) -> usize {
        let users = match self
            .preferences
            .get_users_needing_analysis(self.config.cutoff)
            .await
        {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "failed to list users needing analysis");
                return 0;
            }
        };

        if !users.is_empty() {
            info!(count = users.len(), "users needing analysis");
        }
        users.into_iter().filter(|&u| self.trigger(u)).count()
    }

    fn trigger(self: &Arc<Self>, user_id: UserId) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let Some(guard) = self.in_flight.try_acquire(user_id) else {
            debug!(user_id = %user_id, "analysis already in flight");
            return false;
        };

        let inner = Arc::clone(self);
        self.tasks.spawn(async move {
            let _guard = guard;
            // Only fails if the semaphore is closed, which never happens.
            let Ok(_permit) = inner.permits.acquire().await else {
                return;
            };

            match inner.analyze_user(user_id).await {
                Ok(AnalysisOutcome::Updated(prefs)) => info!(
                    user_id = %user_id,
                    language = %prefs.preferred_language,
                    formality = %prefs.formality,
                    "preferences analysis completed"
                ),
                Ok(AnalysisOutcome::InsufficientData {
                    messages,
                    user_messages,
                }) => debug!(
                    user_id = %user_id,
                    messages,
                    user_messages,
                    "not enough messages to analyse"
                ),
                Ok(AnalysisOutcome::NoContext) => {
                    debug!(user_id = %user_id, "no dialog context to analyse")
                }
                Err(e) => error!(user_id = %user_id, error = %e, "preferences analysis failed"),
            }
        });
        true
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn analyze_user(&self, user_id: UserId) -> Result<AnalysisOutcome, AnalysisError> {
        let Some(ctx) = self.contexts.get_context(user_id).await? else {
            return Ok(AnalysisOutcome::NoContext);
        };

        let user_texts = ctx.user_texts();
        let min = self.config.min_messages;
        if ctx.messages.len() < min || user_texts.len() < min {
            return Ok(AnalysisOutcome::InsufficientData {
                messages: ctx.messages.len(),
                user_messages: user_texts.len(),
            });
        }

        info!(messages = user_texts.len(), "starting preferences analysis");
        let prompt = build_analysis_prompt(&user_texts);

        let raw = tokio::time::timeout(
            self.config.completion_timeout,
            self.completion.complete(&prompt),
        )
        .await
        .map_err(|_| CompletionError::Timeout)??;

        let analysis = parse_analysis(&raw).inspect_err(|_| {
            warn!(response_len = raw.len(), "completion returned unparseable analysis");
        })?;

        let mut prefs = self
            .preferences
            .get_user_preferences(user_id)
            .await?
            .unwrap_or_else(|| UserPreferences::new(user_id));
        prefs.apply_analysis(analysis);
        prefs.last_analysis_at = Some(Utc::now());

        self.preferences.save_user_preferences(prefs.clone()).await?;
        Ok(AnalysisOutcome::Updated(Box::new(prefs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AnalyzerConfig::default().validate().unwrap();
    }

    #[test]
    fn poll_interval_must_be_shorter_than_cutoff() {
        let config = AnalyzerConfig {
            poll_interval: Duration::from_secs(48 * 3600),
            ..AnalyzerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = AnalyzerConfig {
            max_concurrent: 0,
            ..AnalyzerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_cutoff_is_rejected() {
        let config = AnalyzerConfig {
            cutoff: chrono::Duration::hours(-1),
            ..AnalyzerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
