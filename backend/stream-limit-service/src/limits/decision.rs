//! Whether a newly started playback session breaks its user's limit

use std::fmt;
use std::sync::Arc;

use super::counter::ActiveStreamCounter;
use super::table::SharedLimitTable;
use crate::models::{PlaybackStartEvent, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    InvalidEvent(String),
    Unlimited,
    WithinLimit,
    OverLimit,
    /// The registry could not be listed, so nothing is enforced
    CountUnavailable(String),
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::InvalidEvent(_) => "invalid-event",
            DecisionReason::Unlimited => "unlimited",
            DecisionReason::WithinLimit => "within-limit",
            DecisionReason::OverLimit => "over-limit",
            DecisionReason::CountUnavailable(_) => "count-unavailable",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::InvalidEvent(detail) | DecisionReason::CountUnavailable(detail) => {
                write!(f, "{}: {}", self.as_str(), detail)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub proceed: bool,
    pub reason: DecisionReason,
    /// Normalized primary user, absent for invalid events
    pub user_id: Option<UserId>,
    pub active: u32,
    pub limit: u32,
}

impl Decision {
    fn skip(reason: DecisionReason, user_id: Option<UserId>, active: u32, limit: u32) -> Self {
        Self {
            proceed: false,
            reason,
            user_id,
            active,
            limit,
        }
    }
}

/// Enforcement is needed iff the user has a limit and is strictly above it.
///
/// The session that just started is already counted as active, so a user with
/// limit 2 is cut at the third concurrent stream, not the second.
pub fn exceeds_limit(active: u32, limit: u32) -> bool {
    limit > 0 && active > limit
}

#[derive(Clone)]
pub struct LimitDecision {
    limits: Arc<SharedLimitTable>,
    counter: ActiveStreamCounter,
}

impl LimitDecision {
    pub fn new(limits: Arc<SharedLimitTable>, counter: ActiveStreamCounter) -> Self {
        Self { limits, counter }
    }

    pub async fn evaluate(&self, event: &PlaybackStartEvent) -> Decision {
        let user_id = match event.primary_user() {
            Ok(user_id) => user_id,
            Err(e) => return Decision::skip(DecisionReason::InvalidEvent(e.to_string()), None, 0, 0),
        };

        let limit = self.limits.lookup(&user_id);
        if limit == 0 {
            return Decision::skip(DecisionReason::Unlimited, Some(user_id), 0, 0);
        }

        let active = match self.counter.count(&user_id).await {
            Ok(active) => active,
            Err(e) => {
                return Decision::skip(
                    DecisionReason::CountUnavailable(e.to_string()),
                    Some(user_id),
                    0,
                    limit,
                )
            }
        };

        if exceeds_limit(active, limit) {
            Decision {
                proceed: true,
                reason: DecisionReason::OverLimit,
                user_id: Some(user_id),
                active,
                limit,
            }
        } else {
            Decision::skip(DecisionReason::WithinLimit, Some(user_id), active, limit)
        }
    }
}
