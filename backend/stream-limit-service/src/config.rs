//! Configuration for the stream limit engine
//!
//! Engine tuning (delays, retry count, timeouts) is read once from
//! `STREAM_LIMIT_*` environment variables. The user-editable part
//! ([`PluginSettings`]) is published through a
//! [`ConfigurationStore`](crate::collaborators::ConfigurationStore) and may
//! change at runtime.

use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MESSAGE_TITLE: &str = "Stream limit reached";
pub const DEFAULT_MESSAGE_TEXT: &str =
    "You have reached the maximum number of simultaneous streams allowed on your account.";

/// Settings an administrator edits; replaced wholesale on every change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    /// Serialized `{ "<user id>": <max streams> }` mapping
    pub user_limits: String,
    pub message_title: String,
    pub message_text: String,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            user_limits: "{}".to_string(),
            message_title: DEFAULT_MESSAGE_TITLE.to_string(),
            message_text: DEFAULT_MESSAGE_TEXT.to_string(),
        }
    }
}

impl PluginSettings {
    /// Title shown to the user, falling back to the default when blank
    pub fn message_title(&self) -> &str {
        non_blank_or(&self.message_title, DEFAULT_MESSAGE_TITLE)
    }

    /// Body shown to the user, falling back to the default when blank
    pub fn message_text(&self) -> &str {
        non_blank_or(&self.message_text, DEFAULT_MESSAGE_TEXT)
    }
}

fn non_blank_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Timing and retry knobs for the escalator
#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    /// Wait before each verification after a stop command
    pub settle_delay: Duration,
    /// Wait before the final verification after logout
    pub final_settle_delay: Duration,
    /// Pause before each retried stop command
    pub retry_delay: Duration,
    /// Stop attempts after the first one
    pub max_stop_retries: u32,
    /// Upper bound on any single registry or media-source call
    pub call_timeout: Duration,
    /// How long clients should display the limit message
    pub message_timeout: Duration,
    /// Hold a per-user lock across decision and escalation
    pub serialize_per_user: bool,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            final_settle_delay: Duration::from_millis(500),
            retry_delay: Duration::from_millis(250),
            max_stop_retries: 3,
            call_timeout: Duration::from_secs(5),
            message_timeout: Duration::from_secs(10),
            serialize_per_user: false,
        }
    }
}

impl EnforcementConfig {
    /// Zero delays, for tests and tools that drive fakes
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            final_settle_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..Default::default()
        }
    }
}

/// Raw `STREAM_LIMIT_*` variables
#[derive(Debug, Deserialize)]
struct EnvSettings {
    #[serde(default = "default_settle_delay_ms")]
    settle_delay_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    final_settle_delay_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    retry_delay_ms: u64,
    #[serde(default = "default_max_stop_retries")]
    max_stop_retries: u32,
    #[serde(default = "default_call_timeout_ms")]
    call_timeout_ms: u64,
    #[serde(default = "default_message_timeout_ms")]
    message_timeout_ms: u64,
    #[serde(default)]
    serialize_per_user: bool,
    #[serde(default = "default_user_limits")]
    user_limits: String,
    #[serde(default)]
    message_title: Option<String>,
    #[serde(default)]
    message_text: Option<String>,
    #[serde(default)]
    log_json: bool,
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_max_stop_retries() -> u32 {
    3
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

fn default_message_timeout_ms() -> u64 {
    10_000
}

fn default_user_limits() -> String {
    "{}".to_string()
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub enforcement: EnforcementConfig,
    /// Settings published before the first configuration change arrives
    pub initial_settings: PluginSettings,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let raw: EnvSettings = envy::prefixed("STREAM_LIMIT_")
            .from_env()
            .map_err(ConfigError::from)
            .context("failed to read STREAM_LIMIT_* environment")?;

        Ok(Self::from_env_settings(raw))
    }

    fn from_env_settings(raw: EnvSettings) -> Self {
        let defaults = PluginSettings::default();

        Config {
            enforcement: EnforcementConfig {
                settle_delay: Duration::from_millis(raw.settle_delay_ms),
                final_settle_delay: Duration::from_millis(raw.final_settle_delay_ms),
                retry_delay: Duration::from_millis(raw.retry_delay_ms),
                max_stop_retries: raw.max_stop_retries,
                call_timeout: Duration::from_millis(raw.call_timeout_ms),
                message_timeout: Duration::from_millis(raw.message_timeout_ms),
                serialize_per_user: raw.serialize_per_user,
            },
            initial_settings: PluginSettings {
                user_limits: raw.user_limits,
                message_title: raw.message_title.unwrap_or(defaults.message_title),
                message_text: raw.message_text.unwrap_or(defaults.message_text),
            },
            log_json: raw.log_json,
        }
    }
}
