//! Point-in-time count of a user's concurrent streams

use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{bounded, SessionRegistry};
use crate::error::CollaboratorResult;
use crate::models::UserId;

/// Counts a user's active, playing sessions in the registry
///
/// Each call is a fresh point-in-time read; the registry may change while it
/// is being scanned. A listing that outlives `call_timeout` fails with
/// `TimedOut`.
#[derive(Clone)]
pub struct ActiveStreamCounter {
    registry: Arc<dyn SessionRegistry>,
    call_timeout: Duration,
}

impl ActiveStreamCounter {
    pub fn new(registry: Arc<dyn SessionRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    pub async fn count(&self, user_id: &UserId) -> CollaboratorResult<u32> {
        let sessions = bounded(self.call_timeout, self.registry.list_active_sessions()).await?;

        let active = sessions
            .iter()
            .filter(|s| s.is_streaming() && s.belongs_to(user_id))
            .count();

        Ok(u32::try_from(active).unwrap_or(u32::MAX))
    }
}
