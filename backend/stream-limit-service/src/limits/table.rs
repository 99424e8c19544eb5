//! Per-user concurrent-stream limits
//!
//! A [`LimitTable`] is immutable once parsed. [`SharedLimitTable`] swaps whole
//! tables behind an `Arc`, so a lookup sees either the old table or the new
//! one, never a mix.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collaborators::ConfigurationStore;
use crate::error::ConfigError;
use crate::models::UserId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitTable {
    limits: HashMap<UserId, u32>,
}

impl LimitTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a serialized `{ "<user id>": <limit> }` mapping
    ///
    /// Entries that are not integers (or integer strings) are skipped and the
    /// user stays unlimited. Negative limits clamp to 0.
    pub fn parse(serialized: &str) -> Result<Self, ConfigError> {
        if serialized.trim().is_empty() {
            return Ok(Self::empty());
        }

        let value: Value = serde_json::from_str(serialized)?;
        let entries = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::empty()),
            other => return Err(ConfigError::WrongShape(json_kind(&other))),
        };

        let mut limits = HashMap::with_capacity(entries.len());
        for (raw_user, raw_limit) in entries {
            let user_id = UserId::normalize(&raw_user);
            if user_id.is_empty() {
                warn!(user = %raw_user, "Skipping limit entry with empty user id");
                continue;
            }

            match limit_value(&raw_limit) {
                Some(0) => {}
                Some(limit) => {
                    limits.insert(user_id, limit);
                }
                None => {
                    warn!(
                        user_id = %user_id,
                        value = %raw_limit,
                        "Ignoring non-integer stream limit, user stays unlimited"
                    );
                }
            }
        }

        Ok(Self { limits })
    }

    /// Maximum concurrent streams; 0 means unlimited
    pub fn lookup(&self, user_id: &UserId) -> u32 {
        self.limits.get(user_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

fn limit_value(value: &Value) -> Option<u32> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;

    Some(parsed.clamp(0, i64::from(u32::MAX)) as u32)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Limit table shared between the configuration reloader and event handlers
#[derive(Debug, Default)]
pub struct SharedLimitTable {
    current: RwLock<Arc<LimitTable>>,
}

impl SharedLimitTable {
    pub fn new(table: LimitTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Current table; the lock is released before this returns
    pub fn snapshot(&self) -> Arc<LimitTable> {
        self.current.read().clone()
    }

    pub fn lookup(&self, user_id: &UserId) -> u32 {
        self.snapshot().lookup(user_id)
    }

    /// Install a new table
    pub fn replace(&self, table: LimitTable) {
        let table = Arc::new(table);
        *self.current.write() = table;
    }

    /// Parse and install `serialized`, keeping the previous table on failure
    ///
    /// Failures are logged, never returned: callers only learn whether the
    /// table changed.
    pub fn reload(&self, serialized: &str) -> bool {
        match LimitTable::parse(serialized) {
            Ok(table) => {
                let entries = table.len();
                self.replace(table);
                info!(entries, "User stream limits reloaded");
                true
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retained_entries = self.snapshot().len(),
                    "Failed to parse user stream limits, keeping previous table"
                );
                false
            }
        }
    }
}

/// Reload `table` on every configuration change
///
/// The task loads the store's current settings first and exits once the
/// store's sender is dropped.
pub fn spawn_limit_reload<S>(store: Arc<S>, table: Arc<SharedLimitTable>) -> JoinHandle<()>
where
    S: ConfigurationStore + ?Sized + 'static,
{
    let mut rx = store.subscribe();
    table.reload(&rx.borrow_and_update().user_limits);

    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let serialized = rx.borrow_and_update().user_limits.clone();
            table.reload(&serialized);
        }
        debug!("Configuration store closed, limit reload task exiting");
    })
}
