//! Escalating, verified termination of one playback session
//!
//! Stage order:
//! 1. CutTransportStream - close the live stream feeding the session
//! 2. SendStopCommand    - in-band stop, seek reset to zero
//! 3. VerifyStopped      - settle, then re-read the registry
//! 4. RetryLoop          - more stop attempts until verified or exhausted
//! 5. ShowMessage        - tell the user why playback ended
//! 6. ForceLogout        - end the session, then log it out
//! 7. FinalVerify        - settle, then re-read; decides success
//!
//! Every stage runs even when earlier ones fail. Only a verified stop inside
//! the retry loop ends the stop attempts early.

use chrono::Utc;
use std::sync::Arc;

use super::steps::{LiveStreamTarget, StepStatus, Verification};
use crate::collaborators::{
    bounded, ConfigurationStore, MediaSourceRegistry, MessageCommand, SessionRegistry, StopCommand,
};
use crate::config::EnforcementConfig;
use crate::diagnostics::RunLog;
use crate::models::{EnforcementOutcome, EnforcementStage, PlaybackStartEvent, SessionSnapshot};

use crate::models::EnforcementStage::*;

pub struct EnforcementEscalator {
    sessions: Arc<dyn SessionRegistry>,
    media_sources: Arc<dyn MediaSourceRegistry>,
    settings: Arc<dyn ConfigurationStore>,
    config: EnforcementConfig,
}

impl EnforcementEscalator {
    pub fn new(
        sessions: Arc<dyn SessionRegistry>,
        media_sources: Arc<dyn MediaSourceRegistry>,
        settings: Arc<dyn ConfigurationStore>,
        config: EnforcementConfig,
    ) -> Self {
        Self {
            sessions,
            media_sources,
            settings,
            config,
        }
    }

    /// Terminate the session that `event` started
    pub async fn run(&self, event: &PlaybackStartEvent, log: RunLog<'_>) -> EnforcementOutcome {
        let session_id = event.session_id.as_str();
        let controlling_user = event.users.first().cloned().unwrap_or_default();

        log.info(
            None,
            format!(
                "Enforcing stream limit on session {} (device {} / {}, client {})",
                session_id, event.device_name, event.device_id, event.client
            ),
        );

        let target = self.resolve_live_stream(event, log).await;
        let transport = self.cut_transport_stream(&target, log).await;

        let mut attempts: u32 = 1;
        let mut confirmed_at = None;

        match self
            .send_stop(session_id, &controlling_user, SendStopCommand, log)
            .await
        {
            StepStatus::Failed(e) => {
                log.error(
                    Some(SendStopCommand),
                    format!("Initial stop command failed, aborting attempt 1: {}", e),
                );
            }
            _ => {
                if self.verify(session_id, VerifyStopped, log).await {
                    confirmed_at = Some(VerifyStopped);
                }
            }
        }

        let total_attempts = self.config.max_stop_retries.saturating_add(1);
        let mut retry = 0;
        while confirmed_at.is_none() && retry < self.config.max_stop_retries {
            retry += 1;
            attempts = attempts.saturating_add(1);
            tokio::time::sleep(self.config.retry_delay).await;

            log.info(
                Some(RetryLoop),
                format!(
                    "Session still playing, stop attempt {}/{}",
                    attempts, total_attempts
                ),
            );

            if let StepStatus::Failed(e) = self
                .send_stop(session_id, &controlling_user, RetryLoop, log)
                .await
            {
                log.warn(
                    Some(RetryLoop),
                    format!("Stop command for attempt {} failed: {}", attempts, e),
                );
            }

            if self.verify(session_id, RetryLoop, log).await {
                confirmed_at = Some(RetryLoop);
            }
        }

        if confirmed_at.is_none() {
            log.warn(
                Some(RetryLoop),
                format!("Session still playing after {} stop attempts", attempts),
            );
        }

        let message = self.show_message(session_id, log).await;
        let (ended, logged_out) = self.force_logout(session_id, log).await;

        tokio::time::sleep(self.config.final_settle_delay).await;
        let success = self.is_stopped(session_id, FinalVerify, log).await;

        log.info(
            Some(FinalVerify),
            format!(
                "Session {}: cut_transport_stream={}, show_message={}, end_session={}, logout={}, stopped={}",
                session_id,
                transport.label(),
                message.label(),
                ended.label(),
                logged_out.label(),
                success
            ),
        );

        EnforcementOutcome {
            session_id: session_id.to_string(),
            stage: confirmed_at.unwrap_or(FinalVerify),
            success,
            attempts,
            finished_at: Utc::now(),
        }
    }

    async fn resolve_live_stream(
        &self,
        event: &PlaybackStartEvent,
        log: RunLog<'_>,
    ) -> LiveStreamTarget {
        match LiveStreamTarget::resolve(event, None) {
            LiveStreamTarget::NoLiveStream => {
                let snapshot = self.fetch_snapshot(&event.session_id, log).await;
                LiveStreamTarget::resolve(event, snapshot.as_ref())
            }
            target => target,
        }
    }

    async fn fetch_snapshot(&self, session_id: &str, log: RunLog<'_>) -> Option<SessionSnapshot> {
        match bounded(self.config.call_timeout, self.sessions.list_active_sessions()).await {
            Ok(sessions) => sessions.into_iter().find(|s| s.session_id == session_id),
            Err(e) => {
                log.debug(
                    Some(CutTransportStream),
                    format!("Could not read session {} for live stream ids: {}", session_id, e),
                );
                None
            }
        }
    }

    async fn cut_transport_stream(&self, target: &LiveStreamTarget, log: RunLog<'_>) -> StepStatus {
        let timeout = self.config.call_timeout;

        let live_stream_id = match target {
            LiveStreamTarget::NoLiveStream => {
                log.debug(Some(CutTransportStream), "No live stream attached to session");
                return StepStatus::Skipped("no live stream");
            }
            LiveStreamTarget::LiveStreamById(id) => id.clone(),
            LiveStreamTarget::LiveStreamByMediaSource(media_source_id) => {
                match bounded(
                    timeout,
                    self.media_sources.find_live_stream_info(media_source_id),
                )
                .await
                {
                    Ok(info) => info.id,
                    Err(e) if e.is_not_found() => {
                        log.debug(
                            Some(CutTransportStream),
                            format!(
                                "Media source {} has no live stream (direct play)",
                                media_source_id
                            ),
                        );
                        return StepStatus::Skipped("direct play");
                    }
                    Err(e) => {
                        log.warn(
                            Some(CutTransportStream),
                            format!(
                                "Failed to look up live stream for media source {}: {}",
                                media_source_id, e
                            ),
                        );
                        return StepStatus::Failed(e);
                    }
                }
            }
        };

        let status = StepStatus::from_result(
            bounded(timeout, self.media_sources.close_live_stream(&live_stream_id)).await,
        );
        match &status {
            StepStatus::Failed(e) => log.warn(
                Some(CutTransportStream),
                format!("Failed to close live stream {}: {}", live_stream_id, e),
            ),
            _ => log.info(
                Some(CutTransportStream),
                format!("Closed live stream {}", live_stream_id),
            ),
        }
        status
    }

    async fn send_stop(
        &self,
        session_id: &str,
        controlling_user: &str,
        stage: EnforcementStage,
        log: RunLog<'_>,
    ) -> StepStatus {
        let command = StopCommand::reset_to_start(controlling_user);
        let status = StepStatus::from_result(
            bounded(
                self.config.call_timeout,
                self.sessions.send_stop_command(session_id, session_id, command),
            )
            .await,
        );

        if !status.is_failed() {
            log.debug(Some(stage), format!("Stop command sent to session {}", session_id));
        }
        status
    }

    /// Settle, then check the registry
    async fn verify(&self, session_id: &str, stage: EnforcementStage, log: RunLog<'_>) -> bool {
        tokio::time::sleep(self.config.settle_delay).await;
        self.is_stopped(session_id, stage, log).await
    }

    async fn is_stopped(&self, session_id: &str, stage: EnforcementStage, log: RunLog<'_>) -> bool {
        let sessions =
            bounded(self.config.call_timeout, self.sessions.list_active_sessions()).await;

        match Verification::from_sessions(session_id, sessions) {
            Verification::Stopped => {
                log.info(Some(stage), format!("Session {} verified stopped", session_id));
                true
            }
            Verification::StillPlaying => {
                log.debug(Some(stage), format!("Session {} still playing", session_id));
                false
            }
            Verification::Inconclusive(e) => {
                log.warn(
                    Some(stage),
                    format!(
                        "Could not verify session {}, assuming still playing: {}",
                        session_id, e
                    ),
                );
                false
            }
        }
    }

    async fn show_message(&self, session_id: &str, log: RunLog<'_>) -> StepStatus {
        let settings = self.settings.current();
        let message = MessageCommand {
            header: settings.message_title().to_string(),
            text: settings.message_text().to_string(),
            timeout: self.config.message_timeout,
        };

        let status = StepStatus::from_result(
            bounded(
                self.config.call_timeout,
                self.sessions.send_message_command(session_id, session_id, message),
            )
            .await,
        );
        match &status {
            StepStatus::Failed(e) => log.warn(
                Some(ShowMessage),
                format!("Failed to send limit message to session {}: {}", session_id, e),
            ),
            _ => log.debug(Some(ShowMessage), "Limit message sent"),
        }
        status
    }

    /// End the session and log it out; each call is attempted regardless of the other
    async fn force_logout(&self, session_id: &str, log: RunLog<'_>) -> (StepStatus, StepStatus) {
        let timeout = self.config.call_timeout;

        let ended =
            StepStatus::from_result(bounded(timeout, self.sessions.end_session(session_id)).await);
        if let StepStatus::Failed(e) = &ended {
            log.warn(
                Some(ForceLogout),
                format!("Failed to end session {}: {}", session_id, e),
            );
        }

        let logged_out =
            StepStatus::from_result(bounded(timeout, self.sessions.logout(session_id)).await);
        if let StepStatus::Failed(e) = &logged_out {
            log.warn(
                Some(ForceLogout),
                format!("Failed to log out session {}: {}", session_id, e),
            );
        }

        if !ended.is_failed() || !logged_out.is_failed() {
            log.info(Some(ForceLogout), format!("Forced logout of session {}", session_id));
        }
        (ended, logged_out)
    }
}
