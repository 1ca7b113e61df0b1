//! CLI commands

pub mod deploy;
pub mod format;
pub mod subscriptions;
