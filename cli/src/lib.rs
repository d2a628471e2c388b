//! Shipwatch CLI - run the watch engine or inspect a configuration.

pub mod commands;
pub mod config;
pub mod logging;
pub mod output;
