//! Subcommand implementations

pub mod contract;
pub mod fit;
pub mod health;
pub mod predict;
