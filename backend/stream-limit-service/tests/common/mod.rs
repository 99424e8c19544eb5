//! In-memory host collaborators for enforcement tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use stream_limit_service::diagnostics::Severity;
use stream_limit_service::{
    CollaboratorError, CollaboratorResult, DiagnosticLine, DiagnosticsSink, EnforcementOutcome,
    LiveStreamInfo, MediaSourceRegistry, MessageCommand, PlaybackStartEvent, RunId,
    SessionRegistry, SessionSnapshot, StopCommand,
};

/// What a session does when it receives stop commands
#[derive(Debug, Clone, Copy)]
pub enum StopRule {
    /// Keeps playing no matter what
    Never,
    /// Disappears from the registry after this many delivered stop commands
    RemovedAfter(u32),
    /// Stays registered but goes idle after this many delivered stop commands
    IdleAfter(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Stop {
        target: String,
        command: StopCommand,
    },
    Message {
        target: String,
        header: String,
        text: String,
    },
    EndSession(String),
    Logout(String),
}

#[derive(Default)]
struct RegistryState {
    sessions: Vec<SessionSnapshot>,
    rules: HashMap<String, StopRule>,
    delivered_stops: HashMap<String, u32>,
    calls: Vec<Call>,
    failing_stop_calls: u32,
    fail_list: bool,
    hang_list: bool,
    hang_stops: bool,
    fail_message: bool,
    fail_end_session: bool,
    fail_logout: bool,
}

#[derive(Default)]
pub struct FakeSessionRegistry {
    state: Mutex<RegistryState>,
}

impl FakeSessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_session(&self, session_id: &str, user_id: &str, rule: StopRule) {
        let mut state = self.state.lock();
        state.sessions.push(playing_session(session_id, user_id));
        state.rules.insert(session_id.to_string(), rule);
    }

    pub fn add_snapshot(&self, snapshot: SessionSnapshot, rule: StopRule) {
        let mut state = self.state.lock();
        state.rules.insert(snapshot.session_id.clone(), rule);
        state.sessions.push(snapshot);
    }

    /// The next `n` stop commands fail without reaching the session
    pub fn fail_next_stops(&self, n: u32) {
        self.state.lock().failing_stop_calls = n;
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().fail_list = fail;
    }

    /// Listing never returns
    pub fn hang_listing(&self) {
        self.state.lock().hang_list = true;
    }

    /// Stop commands are recorded but never return
    pub fn hang_stops(&self) {
        self.state.lock().hang_stops = true;
    }

    pub fn fail_message(&self) {
        self.state.lock().fail_message = true;
    }

    pub fn fail_end_session(&self) {
        self.state.lock().fail_end_session = true;
    }

    pub fn fail_logout(&self) {
        self.state.lock().fail_logout = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Stop { .. }))
    }

    pub fn message_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Message { .. }))
    }

    pub fn end_session_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::EndSession(_)))
    }

    pub fn logout_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Logout(_)))
    }

    pub fn list_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::List))
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.state
            .lock()
            .sessions
            .iter()
            .any(|s| s.session_id == session_id)
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl SessionRegistry for FakeSessionRegistry {
    async fn list_active_sessions(&self) -> CollaboratorResult<Vec<SessionSnapshot>> {
        let listed = {
            let mut state = self.state.lock();
            state.calls.push(Call::List);
            if state.fail_list {
                return Err(CollaboratorError::Unavailable("registry offline".into()));
            }
            (!state.hang_list).then(|| state.sessions.clone())
        };

        match listed {
            Some(sessions) => Ok(sessions),
            None => std::future::pending().await,
        }
    }

    async fn send_stop_command(
        &self,
        _controlling_session_id: &str,
        target_session_id: &str,
        command: StopCommand,
    ) -> CollaboratorResult<()> {
        let hang = {
            let mut state = self.state.lock();
            state.calls.push(Call::Stop {
                target: target_session_id.to_string(),
                command,
            });
            state.hang_stops
        };
        if hang {
            return std::future::pending().await;
        }

        let mut state = self.state.lock();

        if state.failing_stop_calls > 0 {
            state.failing_stop_calls -= 1;
            return Err(CollaboratorError::Unavailable("session socket closed".into()));
        }

        let delivered = {
            let count = state
                .delivered_stops
                .entry(target_session_id.to_string())
                .or_insert(0);
            *count += 1;
            *count
        };

        match state.rules.get(target_session_id).copied() {
            Some(StopRule::RemovedAfter(n)) if delivered >= n => {
                state.sessions.retain(|s| s.session_id != target_session_id);
            }
            Some(StopRule::IdleAfter(n)) if delivered >= n => {
                if let Some(s) = state
                    .sessions
                    .iter_mut()
                    .find(|s| s.session_id == target_session_id)
                {
                    s.is_active = false;
                    s.has_now_playing_item = false;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn send_message_command(
        &self,
        _controlling_session_id: &str,
        target_session_id: &str,
        message: MessageCommand,
    ) -> CollaboratorResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Message {
            target: target_session_id.to_string(),
            header: message.header,
            text: message.text,
        });
        if state.fail_message {
            return Err(CollaboratorError::Rejected("client cannot display messages".into()));
        }
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> CollaboratorResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::EndSession(session_id.to_string()));
        if state.fail_end_session {
            return Err(CollaboratorError::Unavailable("session manager busy".into()));
        }
        Ok(())
    }

    async fn logout(&self, session_id: &str) -> CollaboratorResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Logout(session_id.to_string()));
        if state.fail_logout {
            return Err(CollaboratorError::Unavailable("auth store offline".into()));
        }
        Ok(())
    }
}

/// Media-source registry with no live streams at all
#[derive(Default)]
pub struct NoLiveStreams;

#[async_trait]
impl MediaSourceRegistry for NoLiveStreams {
    async fn close_live_stream(&self, live_stream_id: &str) -> CollaboratorResult<()> {
        Err(CollaboratorError::NotFound(live_stream_id.to_string()))
    }

    async fn find_live_stream_info(
        &self,
        media_source_id: &str,
    ) -> CollaboratorResult<LiveStreamInfo> {
        Err(CollaboratorError::NotFound(media_source_id.to_string()))
    }
}

/// Diagnostics sink that keeps everything it receives
#[derive(Default)]
pub struct RecordingDiagnostics {
    lines: Mutex<Vec<DiagnosticLine>>,
    outcomes: Mutex<Vec<(RunId, EnforcementOutcome)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<DiagnosticLine> {
        self.lines.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<(RunId, EnforcementOutcome)> {
        self.outcomes.lock().clone()
    }

    pub fn has_line(&self, severity: Severity, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|l| l.severity == severity && l.message.contains(needle))
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn record(&self, line: DiagnosticLine) {
        self.lines.lock().push(line);
    }

    fn outcome(&self, run: RunId, outcome: &EnforcementOutcome) {
        self.outcomes.lock().push((run, outcome.clone()));
    }
}

pub fn playing_session(session_id: &str, user_id: &str) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session_id.to_string(),
        user_id: user_id.to_string(),
        is_active: true,
        has_now_playing_item: true,
        live_stream_id: None,
        media_source_id: None,
    }
}

pub fn start_event(user_id: &str, session_id: &str) -> PlaybackStartEvent {
    PlaybackStartEvent {
        users: vec![user_id.to_string()],
        session_id: session_id.to_string(),
        play_session_id: Some(format!("play-{}", session_id)),
        media_source_id: None,
        live_stream_id: None,
        device_name: "Living Room TV".to_string(),
        device_id: format!("device-{}", session_id),
        client: "Infuse".to_string(),
    }
}
