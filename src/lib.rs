//! pollbot library
//!
//! Mattermost slash commands for creating, voting on and closing polls whose
//! state lives in Tarantool stored procedures.

pub mod app;
pub mod channels;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod polls;
pub mod server;
pub mod store;
