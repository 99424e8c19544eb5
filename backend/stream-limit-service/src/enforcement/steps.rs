//! Building blocks for escalation stages
//!
//! Stages never raise. Each returns a status value and the escalator
//! branches on it.

use crate::error::{CollaboratorError, CollaboratorResult};
use crate::models::{PlaybackStartEvent, SessionSnapshot};

/// How the transport-level stream for a session is found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveStreamTarget {
    NoLiveStream,
    LiveStreamById(String),
    LiveStreamByMediaSource(String),
}

impl LiveStreamTarget {
    /// Prefer the ids carried by the event, then the session snapshot
    pub fn resolve(event: &PlaybackStartEvent, snapshot: Option<&SessionSnapshot>) -> Self {
        let live_stream_id = non_empty(event.live_stream_id.as_deref())
            .or_else(|| snapshot.and_then(|s| non_empty(s.live_stream_id.as_deref())));
        if let Some(id) = live_stream_id {
            return LiveStreamTarget::LiveStreamById(id.to_string());
        }

        let media_source_id = non_empty(event.media_source_id.as_deref())
            .or_else(|| snapshot.and_then(|s| non_empty(s.media_source_id.as_deref())));
        match media_source_id {
            Some(id) => LiveStreamTarget::LiveStreamByMediaSource(id.to_string()),
            None => LiveStreamTarget::NoLiveStream,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Result of one best-effort stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    /// Nothing to do for this session
    Skipped(&'static str),
    Failed(CollaboratorError),
}

impl StepStatus {
    pub fn from_result(result: CollaboratorResult<()>) -> Self {
        match result {
            Ok(()) => StepStatus::Done,
            Err(e) => StepStatus::Failed(e),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Done => "done",
            StepStatus::Skipped(_) => "skipped",
            StepStatus::Failed(_) => "failed",
        }
    }
}

/// Observed session state after a settling delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Gone from the registry, or idle with nothing playing
    Stopped,
    StillPlaying,
    /// The registry could not be read; treated as not stopped
    Inconclusive(CollaboratorError),
}

impl Verification {
    pub fn from_sessions(
        session_id: &str,
        sessions: CollaboratorResult<Vec<SessionSnapshot>>,
    ) -> Self {
        match sessions {
            Ok(sessions) => match sessions.iter().find(|s| s.session_id == session_id) {
                None => Verification::Stopped,
                Some(s) if !s.has_now_playing_item && !s.is_active => Verification::Stopped,
                Some(_) => Verification::StillPlaying,
            },
            Err(e) => Verification::Inconclusive(e),
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Verification::Stopped)
    }
}
