//! Verified, escalating termination of over-limit sessions

pub mod escalator;
pub mod steps;

pub use escalator::EnforcementEscalator;
pub use steps::{LiveStreamTarget, StepStatus, Verification};
