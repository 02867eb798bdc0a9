//! Agent driver abstraction.
//!
//! The session manager talks to agents only through [`AgentLauncher`] and
//! [`AgentDriver`]. The ACP implementation lives in [`acp_driver`]; tests
//! substitute scripted drivers.

pub mod acp_driver;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::acp::protocol::SessionUpdate;
use crate::acp::spawner::LaunchSpec;
use crate::models::permission::PermissionRequest;
use crate::Result;

/// Boxed future returned by driver methods.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Events a running agent feeds into its conversation's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A `session/update` notification.
    SessionUpdate(SessionUpdate),
    /// The agent asks permission to run a tool.
    PermissionRequested(PermissionRequest),
    /// A prompt turn ended.
    TurnFinished {
        /// Stop reason reported by the agent.
        stop_reason: String,
    },
    /// The agent's stream ended.
    Terminated {
        /// Why the stream ended.
        reason: String,
    },
}

/// Everything needed to bring up one agent session.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Owning conversation.
    pub conversation_id: String,
    /// Resolved process parameters.
    pub spec: LaunchSpec,
    /// Stored session token to offer for resume.
    pub resume_session_id: Option<String>,
    /// Deadline for spawn plus handshake plus session setup.
    pub startup_timeout: Duration,
}

/// A running agent session.
pub trait AgentDriver: Send + Sync {
    /// Engine session id currently in use.
    fn session_id(&self) -> String;

    /// Run one prompt turn; resolves with the stop reason once the turn ends.
    ///
    /// Implementations emit [`AgentEvent::TurnFinished`] on the event channel
    /// after every update belonging to the turn.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`](crate::AppError::Acp) if the agent rejects
    /// the prompt or the stream ends mid-turn.
    fn prompt(&self, text: String, files: Vec<PathBuf>) -> DriverFuture<'_, String>;

    /// Answer a pending permission request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if no
    /// request is open for `call_id`.
    fn resolve_permission(&self, call_id: &str, option_id: &str) -> DriverFuture<'_, ()>;

    /// Abandon the current turn.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`](crate::AppError::Acp) if the stream is gone.
    fn cancel_turn(&self) -> DriverFuture<'_, ()>;

    /// Cooperative shutdown; resolves once the agent has gone away.
    ///
    /// # Errors
    ///
    /// Implementation specific; callers log and continue.
    fn stop(&self) -> DriverFuture<'_, ()>;

    /// Immediate termination. Idempotent.
    fn force_kill(&self);
}

/// Starts agents for conversations.
pub trait AgentLauncher: Send + Sync {
    /// Spawn, handshake, and open or resume a session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Launch`](crate::AppError::Launch) or
    /// [`AppError::Acp`](crate::AppError::Acp) when any step fails.
    fn launch(
        &self,
        request: LaunchRequest,
        events: mpsc::Sender<AgentEvent>,
    ) -> DriverFuture<'_, Arc<dyn AgentDriver>>;
}
