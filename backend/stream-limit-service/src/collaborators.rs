//! Interfaces the engine consumes from the host platform
//!
//! The session registry and media-source registry belong to the host; the
//! engine only needs the handful of calls below. [`WatchConfigurationStore`]
//! is a ready-made configuration store for hosts that push settings in.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::PluginSettings;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::models::{LiveStreamInfo, SessionSnapshot};

/// In-band stop command sent to a session's player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCommand {
    /// User on whose behalf the command is issued
    pub controlling_user_id: String,
    /// Seek position to leave the player at, in 100ns ticks
    pub seek_position_ticks: i64,
}

impl StopCommand {
    pub fn reset_to_start(controlling_user_id: impl Into<String>) -> Self {
        Self {
            controlling_user_id: controlling_user_id.into(),
            seek_position_ticks: 0,
        }
    }
}

/// User-facing notification shown on the session's client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCommand {
    pub header: String,
    pub text: String,
    pub timeout: Duration,
}

/// Host session registry
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn list_active_sessions(&self) -> CollaboratorResult<Vec<SessionSnapshot>>;

    async fn send_stop_command(
        &self,
        controlling_session_id: &str,
        target_session_id: &str,
        command: StopCommand,
    ) -> CollaboratorResult<()>;

    async fn send_message_command(
        &self,
        controlling_session_id: &str,
        target_session_id: &str,
        message: MessageCommand,
    ) -> CollaboratorResult<()>;

    async fn end_session(&self, session_id: &str) -> CollaboratorResult<()>;

    async fn logout(&self, session_id: &str) -> CollaboratorResult<()>;
}

/// Host media-source manager owning transport-level live streams
#[async_trait]
pub trait MediaSourceRegistry: Send + Sync {
    async fn close_live_stream(&self, live_stream_id: &str) -> CollaboratorResult<()>;

    /// Fails with [`CollaboratorError::NotFound`]
    /// when the media source has no live stream (direct play).
    async fn find_live_stream_info(&self, media_source_id: &str)
        -> CollaboratorResult<LiveStreamInfo>;
}

/// Run a collaborator call with an upper time bound
pub async fn bounded<F, T>(limit: Duration, call: F) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::TimedOut(limit)),
    }
}

/// Source of [`PluginSettings`] with change notification
pub trait ConfigurationStore: Send + Sync {
    fn current(&self) -> PluginSettings;

    /// Receiver that observes every published change
    fn subscribe(&self) -> watch::Receiver<PluginSettings>;
}

/// Configuration store backed by a tokio `watch` channel
#[derive(Debug)]
pub struct WatchConfigurationStore {
    tx: watch::Sender<PluginSettings>,
}

impl WatchConfigurationStore {
    pub fn new(initial: PluginSettings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the settings and notify subscribers
    pub fn publish(&self, settings: PluginSettings) {
        self.tx.send_replace(settings);
    }
}

impl ConfigurationStore for WatchConfigurationStore {
    fn current(&self) -> PluginSettings {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<PluginSettings> {
        self.tx.subscribe()
    }
}
