//! Limit table and the over-limit decision

pub mod counter;
pub mod decision;
pub mod table;

pub use counter::ActiveStreamCounter;
pub use decision::{exceeds_limit, Decision, DecisionReason, LimitDecision};
pub use table::{spawn_limit_reload, LimitTable, SharedLimitTable};
