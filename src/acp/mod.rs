//! Agent Client Protocol (ACP) client side.
//!
//! An agent is a child process speaking JSON-RPC 2.0 as newline-delimited
//! JSON over its stdio. Each connection owns a reader task and a writer task
//! on the agent's stdout and stdin, plus a router that matches responses to
//! outstanding requests and turns agent notifications and requests into
//! [`AgentEvent`](crate::driver::AgentEvent)s.
//!
//! - `codec`: line framing with a maximum message size.
//! - `protocol`: method names, wire types, and update parsing.
//! - `reader` / `writer`: stream tasks.
//! - `connection`: request/response correlation and routing.
//! - `spawner`: process launch and exit supervision.

pub mod codec;
pub mod connection;
pub mod protocol;
pub mod reader;
pub mod spawner;
pub mod writer;
