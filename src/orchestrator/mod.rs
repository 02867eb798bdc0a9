//! Session orchestration modules.
//!
//! Covers launch parameter resolution, first-message preamble, the busy
//! guard, scheduling directives, and the per-conversation session manager.

pub mod busy_guard;
pub mod directives;
pub mod launch;
pub mod preamble;
pub mod session_manager;
