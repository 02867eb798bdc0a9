//! ACP implementation of [`AgentLauncher`] and [`AgentDriver`].
//!
//! # Bootstrap
//!
//! 1. Spawn the agent process and start its exit monitor.
//! 2. `initialize`.
//! 3. `session/load` with the stored token, falling back to `session/new`
//!    when the agent rejects it or no token is stored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};

use crate::acp::connection::AcpConnection;
use crate::acp::spawner::{monitor_exit, spawn_agent, ProcessControl};
use crate::driver::{AgentDriver, AgentEvent, AgentLauncher, DriverFuture, LaunchRequest};
use crate::{AppError, Result};

/// Launches real agent subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcpLauncher;

impl AgentLauncher for AcpLauncher {
    fn launch(
        &self,
        request: LaunchRequest,
        events: mpsc::Sender<AgentEvent>,
    ) -> DriverFuture<'_, Arc<dyn AgentDriver>> {
        let span = info_span!(
            "acp_launch",
            conversation_id = request.conversation_id.as_str(),
            program = request.spec.program.as_str()
        );
        Box::pin(
            async move {
                let process = spawn_agent(&request.spec, &request.conversation_id)?;
                let control = monitor_exit(request.conversation_id.clone(), process.child);

                let bootstrap = AcpDriver::establish(
                    &request.conversation_id,
                    process.stdout,
                    process.stdin,
                    Some(control.clone()),
                    events,
                    request.resume_session_id.as_deref(),
                    &request.spec.cwd,
                );

                match tokio::time::timeout(request.startup_timeout, bootstrap).await {
                    Ok(Ok(driver)) => Ok(Arc::new(driver) as Arc<dyn AgentDriver>),
                    Ok(Err(err)) => {
                        control.force_kill();
                        Err(err)
                    }
                    Err(_) => {
                        control.force_kill();
                        Err(AppError::Launch(format!(
                            "agent did not finish startup within {:?}",
                            request.startup_timeout
                        )))
                    }
                }
            }
            .instrument(span),
        )
    }
}

/// A live ACP agent session.
#[derive(Debug)]
pub struct AcpDriver {
    conversation_id: String,
    session_id: String,
    connection: AcpConnection,
    process: Option<ProcessControl>,
    events: mpsc::Sender<AgentEvent>,
}

impl AcpDriver {
    /// Handshake over already-connected streams and open or resume a session.
    ///
    /// `process` is `None` when the agent is not a child process (tests).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` if `initialize` or `session/new` fails.
    pub async fn establish<R, W>(
        conversation_id: &str,
        stdout: R,
        stdin: W,
        process: Option<ProcessControl>,
        events: mpsc::Sender<AgentEvent>,
        resume_session_id: Option<&str>,
        cwd: &Path,
    ) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let connection = AcpConnection::start(conversation_id, stdout, stdin, events.clone());
        connection.initialize().await?;

        let session_id = match resume_session_id {
            Some(stored) => match connection.load_session(stored, cwd).await {
                Ok(()) => {
                    info!(conversation_id, session_id = stored, "acp session resumed");
                    stored.to_owned()
                }
                Err(err) => {
                    warn!(conversation_id, %err, "session resume rejected, opening a new session");
                    connection.new_session(cwd).await?
                }
            },
            None => connection.new_session(cwd).await?,
        };
        info!(conversation_id, session_id, "acp session ready");

        Ok(Self {
            conversation_id: conversation_id.to_owned(),
            session_id,
            connection,
            process,
            events,
        })
    }
}

impl AgentDriver for AcpDriver {
    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    fn prompt(&self, text: String, files: Vec<PathBuf>) -> DriverFuture<'_, String> {
        Box::pin(async move {
            let stop_reason = self
                .connection
                .prompt(&self.session_id, &text, &files)
                .await?;
            let event = AgentEvent::TurnFinished {
                stop_reason: stop_reason.clone(),
            };
            if self.events.send(event).await.is_err() {
                warn!(
                    conversation_id = self.conversation_id,
                    "event loop gone before turn finish"
                );
            }
            Ok(stop_reason)
        })
    }

    fn resolve_permission(&self, call_id: &str, option_id: &str) -> DriverFuture<'_, ()> {
        let call_id = call_id.to_owned();
        let option_id = option_id.to_owned();
        Box::pin(async move {
            self.connection
                .respond_permission(&call_id, &option_id)
                .await
        })
    }

    fn cancel_turn(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move { self.connection.cancel(&self.session_id).await })
    }

    fn stop(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            self.connection.close();
            if let Some(process) = &self.process {
                process.terminate();
                process.wait_exited().await;
            }
            Ok(())
        })
    }

    fn force_kill(&self) {
        if let Some(process) = &self.process {
            process.force_kill();
        }
        self.connection.close();
    }
}
