//! Entry point for playback-start notifications
//!
//! `on_playback_start` evaluates the event and, when the user is over their
//! limit, runs the escalator to completion. Nothing escapes to the caller:
//! decisions, failures and outcomes are reported through the diagnostics sink.

use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{error, Instrument};

use crate::collaborators::{ConfigurationStore, MediaSourceRegistry, SessionRegistry};
use crate::config::EnforcementConfig;
use crate::diagnostics::{DiagnosticsSink, RunId, RunLog, RunSequence};
use crate::enforcement::EnforcementEscalator;
use crate::limits::{
    spawn_limit_reload, ActiveStreamCounter, DecisionReason, LimitDecision, SharedLimitTable,
};
use crate::models::{EnforcementOutcome, PlaybackStartEvent, UserId};

pub struct EventDispatcher {
    decision: LimitDecision,
    escalator: EnforcementEscalator,
    diagnostics: Arc<dyn DiagnosticsSink>,
    runs: RunSequence,
    /// Present only when runs for one user are serialized
    user_locks: Option<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl EventDispatcher {
    pub fn new(
        limits: Arc<SharedLimitTable>,
        sessions: Arc<dyn SessionRegistry>,
        media_sources: Arc<dyn MediaSourceRegistry>,
        settings: Arc<dyn ConfigurationStore>,
        config: EnforcementConfig,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let user_locks = config.serialize_per_user.then(DashMap::new);
        let counter = ActiveStreamCounter::new(sessions.clone(), config.call_timeout);
        let decision = LimitDecision::new(limits, counter);
        let escalator = EnforcementEscalator::new(sessions, media_sources, settings, config);

        Self {
            decision,
            escalator,
            diagnostics,
            runs: RunSequence::new(),
            user_locks,
        }
    }

    /// Wire a dispatcher to a configuration store
    ///
    /// Returns the dispatcher and the task that keeps its limit table in sync
    /// with the store.
    pub fn start<S>(
        store: Arc<S>,
        sessions: Arc<dyn SessionRegistry>,
        media_sources: Arc<dyn MediaSourceRegistry>,
        config: EnforcementConfig,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        S: ConfigurationStore + 'static,
    {
        let limits = Arc::new(SharedLimitTable::default());
        let reload = spawn_limit_reload(store.clone(), limits.clone());

        let dispatcher = Self::new(limits, sessions, media_sources, store, config, diagnostics);
        (Arc::new(dispatcher), reload)
    }

    /// Handle one playback-start notification. Never fails.
    pub async fn on_playback_start(&self, event: PlaybackStartEvent) {
        let _ = self.handle(&event).await;
    }

    /// Fire-and-forget variant for event sources that do not await handlers
    pub fn spawn_playback_start(self: &Arc<Self>, event: PlaybackStartEvent) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.on_playback_start(event).await })
    }

    /// Handle an event and return the enforcement outcome, if a run happened
    pub async fn handle(&self, event: &PlaybackStartEvent) -> Option<EnforcementOutcome> {
        let run = self.runs.next_id();
        let span =
            tracing::info_span!("playback_start", run = run.0, session_id = %event.session_id);

        let result = AssertUnwindSafe(self.handle_run(run, event).instrument(span))
            .catch_unwind()
            .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    run = run.0,
                    session_id = %event.session_id,
                    "Playback-start handler panicked"
                );
                None
            }
        }
    }

    /// Users with a serialized run in flight or queued
    pub fn tracked_users(&self) -> usize {
        self.user_locks.as_ref().map_or(0, DashMap::len)
    }

    async fn handle_run(&self, run: RunId, event: &PlaybackStartEvent) -> Option<EnforcementOutcome> {
        let log = RunLog::new(run, self.diagnostics.as_ref());

        let _user_guard = self.lock_user(event).await;
        self.evaluate_and_enforce(event, log).await
    }

    async fn lock_user(&self, event: &PlaybackStartEvent) -> Option<UserLockGuard<'_>> {
        let locks = self.user_locks.as_ref()?;
        let user_id = event.primary_user().ok()?;
        let lock = locks.entry(user_id.clone()).or_default().clone();
        let held = lock.lock_owned().await;

        Some(UserLockGuard {
            locks,
            user_id,
            held: Some(held),
        })
    }

    async fn evaluate_and_enforce(
        &self,
        event: &PlaybackStartEvent,
        log: RunLog<'_>,
    ) -> Option<EnforcementOutcome> {
        let decision = self.decision.evaluate(event).await;
        let user = decision
            .user_id
            .as_ref()
            .map(UserId::to_string)
            .unwrap_or_else(|| "-".to_string());

        if !decision.proceed {
            let message = format!(
                "No enforcement for user {} on session {}: {} (active {}, limit {})",
                user, event.session_id, decision.reason, decision.active, decision.limit
            );
            match decision.reason {
                DecisionReason::InvalidEvent(_) | DecisionReason::CountUnavailable(_) => {
                    log.warn(None, message)
                }
                _ => log.debug(None, message),
            }
            return None;
        }

        log.info(
            None,
            format!(
                "User {} over stream limit: {} active, limit {}",
                user, decision.active, decision.limit
            ),
        );

        let outcome = self.escalator.run(event, log).await;
        log.outcome(&outcome);
        Some(outcome)
    }
}

/// Holds a user's run lock; releases it and prunes the map entry on drop,
/// including when the run unwinds.
struct UserLockGuard<'a> {
    locks: &'a DashMap<UserId, Arc<Mutex<()>>>,
    user_id: UserId,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        // Only the map still holds it: nobody is waiting
        self.locks.remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
