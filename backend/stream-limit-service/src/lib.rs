//! Per-user concurrent stream limit enforcement
//!
//! When a playback session pushes a user above their configured number of
//! concurrent streams, the newly started session is terminated through an
//! escalating sequence of stop actions, each verified against the host's
//! session registry.
//!
//! ```text
//! playback start ──► EventDispatcher ──► LimitDecision ──► EnforcementEscalator
//!                          │              LimitTable         SessionRegistry
//!                          ▼              ActiveStreamCounter MediaSourceRegistry
//!                    DiagnosticsSink
//! ```

pub mod collaborators;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod enforcement;
pub mod error;
pub mod limits;
pub mod logging;
pub mod models;

pub use collaborators::{
    ConfigurationStore, MediaSourceRegistry, MessageCommand, SessionRegistry, StopCommand,
    WatchConfigurationStore,
};
pub use config::{Config, EnforcementConfig, PluginSettings};
pub use diagnostics::{DiagnosticLine, DiagnosticsSink, RunId, RunSequence, TracingDiagnostics};
pub use dispatcher::EventDispatcher;
pub use enforcement::EnforcementEscalator;
pub use error::{CollaboratorError, CollaboratorResult, ConfigError, EventError};
pub use limits::{
    ActiveStreamCounter, Decision, DecisionReason, LimitDecision, LimitTable, SharedLimitTable,
};
pub use models::{
    EnforcementOutcome, EnforcementStage, LiveStreamInfo, OutcomeStatus, PlaybackStartEvent,
    SessionSnapshot, UserId,
};
