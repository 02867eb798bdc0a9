#![forbid(unsafe_code)]

//! `agent-conductor` drives ACP coding-agent subprocesses for chat
//! conversations and keeps each engine's skill directory in sync with a
//! managed skill library.

pub mod acp;
pub mod adapter;
pub mod bus;
pub mod config;
pub mod driver;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod skills;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
