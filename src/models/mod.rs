//! Domain model module declarations.

pub mod conversation;
pub mod engine;
pub mod message;
pub mod permission;
pub mod tool_call;
