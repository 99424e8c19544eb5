//! Domain models shared by the decision and enforcement layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EventError;

/// Normalized user identifier
///
/// Host platforms hand out user ids in several spellings (`3F2504E0-4F89-...`,
/// `{3f2504e0-...}`, `3f2504e04f89...`). All of them normalize to the same
/// lowercase form with separators removed, which is also the key form used by
/// the serialized limit table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn normalize(raw: &str) -> Self {
        let normalized = raw
            .chars()
            .filter(|c| !matches!(c, '-' | '{' | '}') && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Playback-start notification delivered by the host platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStartEvent {
    /// Users attached to the session; the first one is authoritative
    pub users: Vec<String>,
    pub session_id: String,
    #[serde(default)]
    pub play_session_id: Option<String>,
    #[serde(default)]
    pub media_source_id: Option<String>,
    #[serde(default)]
    pub live_stream_id: Option<String>,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub client: String,
}

impl PlaybackStartEvent {
    /// Check the event shape and return the normalized primary user
    pub fn primary_user(&self) -> Result<UserId, EventError> {
        if self.session_id.trim().is_empty() {
            return Err(EventError::MissingSessionId);
        }

        let first = self.users.first().ok_or(EventError::NoUsers)?;
        let user_id = UserId::normalize(first);
        if user_id.is_empty() {
            return Err(EventError::EmptyUserId);
        }

        Ok(user_id)
    }
}

/// Point-in-time view of one session in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub user_id: String,
    pub is_active: bool,
    pub has_now_playing_item: bool,
    #[serde(default)]
    pub live_stream_id: Option<String>,
    #[serde(default)]
    pub media_source_id: Option<String>,
}

impl SessionSnapshot {
    /// Counts toward a user's concurrent-stream total
    pub fn is_streaming(&self) -> bool {
        self.is_active && self.has_now_playing_item
    }

    pub fn belongs_to(&self, user_id: &UserId) -> bool {
        UserId::normalize(&self.user_id) == *user_id
    }
}

/// Live stream resolved from a media source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamInfo {
    pub id: String,
    #[serde(default)]
    pub media_source_id: Option<String>,
}

/// Ordered stages of an enforcement run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementStage {
    CutTransportStream,
    SendStopCommand,
    VerifyStopped,
    RetryLoop,
    ShowMessage,
    ForceLogout,
    FinalVerify,
}

impl EnforcementStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementStage::CutTransportStream => "cut_transport_stream",
            EnforcementStage::SendStopCommand => "send_stop_command",
            EnforcementStage::VerifyStopped => "verify_stopped",
            EnforcementStage::RetryLoop => "retry_loop",
            EnforcementStage::ShowMessage => "show_message",
            EnforcementStage::ForceLogout => "force_logout",
            EnforcementStage::FinalVerify => "final_verify",
        }
    }
}

impl fmt::Display for EnforcementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    /// Every stage ran but the session could not be confirmed stopped
    Partial,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => f.write_str("SUCCESS"),
            OutcomeStatus::Partial => f.write_str("PARTIAL"),
        }
    }
}

/// Result of one enforcement run, reported to diagnostics only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementOutcome {
    pub session_id: String,
    /// Stage where the stop was first confirmed (`VerifyStopped` or
    /// `RetryLoop`); `FinalVerify` when no stop attempt was confirmed
    pub stage: EnforcementStage,
    pub success: bool,
    /// Stop commands attempted, including ones whose send failed
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
}

impl EnforcementOutcome {
    pub fn status(&self) -> OutcomeStatus {
        if self.success {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::Partial
        }
    }
}
