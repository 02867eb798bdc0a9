//! Per-conversation agent session lifecycle.
//!
//! A [`SessionManager`] owns at most one running agent for its conversation.
//! It starts (or resumes) the agent on first use, forwards user messages,
//! normalizes the agent's event stream into stored and broadcast messages,
//! brokers permission confirmations, runs scheduling directives found in a
//! finished turn, and stops or kills the agent on request.
//!
//! States: `uninitialized -> starting -> ready -> (streaming <->
//! awaiting_confirmation) -> stopped`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::acp::protocol::SessionUpdate;
use crate::adapter::ProtocolAdapter;
use crate::bus::{PresentationBus, ResponseEvent};
use crate::config::GlobalConfig;
use crate::driver::{AgentDriver, AgentEvent, AgentLauncher, LaunchRequest};
use crate::models::conversation::Conversation;
use crate::models::message::{Message, MessageBody, MessagePosition, TipKind};
use crate::models::permission::{Confirmation, PermissionRequest};
use crate::persistence::ConversationStore;
use crate::skills::distributor::SkillDistributor;
use crate::skills::library::SkillLibrary;
use crate::skills::SkillEngine;
use crate::{AppError, Result};

use super::busy_guard::BusyGuard;
use super::directives::{has_directives, parse_directives, CronRegistry, DirectiveExecutor};
use super::launch::resolve_launch_spec;
use super::preamble::{prepare_first_message, strip_files_marker};

/// Prefix of the follow-up message carrying directive results.
pub const SYSTEM_RESPONSE_PREFIX: &str = "[System Response]\n";

/// Capacity of the agent event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type Bootstrap = Shared<BoxFuture<'static, Result<Arc<dyn AgentDriver>>>>;

/// Lifecycle state of a conversation's agent.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No agent started yet.
    Uninitialized,
    /// Spawn and handshake in progress.
    Starting,
    /// Agent idle and ready for a prompt.
    Ready,
    /// A turn is running.
    Streaming,
    /// A turn is blocked on a permission confirmation.
    AwaitingConfirmation,
    /// Agent gone; the next send starts a new one.
    Stopped,
}

/// A message to send to the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    /// Message text as typed.
    pub content: String,
    /// Files attached as resource links.
    pub files: Vec<PathBuf>,
    /// Merge key of the user message. `None` marks an internal follow-up
    /// that is neither stored nor echoed.
    pub msg_id: Option<String>,
}

impl SendRequest {
    /// A user message with a fresh merge key.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            files: Vec::new(),
            msg_id: Some(Uuid::new_v4().to_string()),
        }
    }

    /// An internal follow-up message.
    #[must_use]
    pub fn follow_up(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            files: Vec::new(),
            msg_id: None,
        }
    }

    /// Attach files.
    #[must_use]
    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }
}

/// Collaborators shared by every session manager.
#[derive(Clone)]
pub struct ManagerDeps {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Conversation and message storage.
    pub store: Arc<dyn ConversationStore>,
    /// Presentation sink.
    pub bus: Arc<dyn PresentationBus>,
    /// Agent launcher.
    pub launcher: Arc<dyn AgentLauncher>,
    /// Busy flags consulted by background jobs.
    pub busy: BusyGuard,
    /// Executor for directives found in agent replies.
    pub directives: Arc<dyn DirectiveExecutor>,
    /// Skill distributor over the configured library.
    pub skills: SkillDistributor,
}

impl ManagerDeps {
    /// Dependencies with a fresh busy guard, an in-memory cron registry, and
    /// the library at `config.skills_dir`.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        store: Arc<dyn ConversationStore>,
        bus: Arc<dyn PresentationBus>,
        launcher: Arc<dyn AgentLauncher>,
    ) -> Self {
        let skills = SkillDistributor::new(SkillLibrary::new(config.skills_dir.clone()));
        Self {
            config,
            store,
            bus,
            launcher,
            busy: BusyGuard::new(),
            directives: Arc::new(CronRegistry::new()),
            skills,
        }
    }
}

struct Inner {
    conversation_id: String,
    conversation: Mutex<Conversation>,
    deps: ManagerDeps,
    bootstrap: Mutex<Option<Bootstrap>>,
    driver: Mutex<Option<Arc<dyn AgentDriver>>>,
    generation: AtomicU64,
    first_message: AtomicBool,
    state: watch::Sender<SessionState>,
    confirmations: Mutex<HashMap<String, Confirmation>>,
    distribution: tokio::sync::Mutex<()>,
    token_writes: tokio::sync::Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one conversation's agent session; cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("conversation_id", &self.inner.conversation_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Manager for an existing conversation record.
    #[must_use]
    pub fn new(conversation: Conversation, deps: ManagerDeps) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                conversation_id: conversation.id.clone(),
                conversation: Mutex::new(conversation),
                deps,
                bootstrap: Mutex::new(None),
                driver: Mutex::new(None),
                generation: AtomicU64::new(0),
                first_message: AtomicBool::new(true),
                state,
                confirmations: Mutex::new(HashMap::new()),
                distribution: tokio::sync::Mutex::new(()),
                token_writes: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Manager for the stored conversation `conversation_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the conversation is not stored, or
    /// `AppError::Db` if the lookup fails.
    pub async fn load(conversation_id: &str, deps: ManagerDeps) -> Result<Self> {
        let conversation = deps
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("conversation {conversation_id}")))?;
        Ok(Self::new(conversation, deps))
    }

    /// Conversation this manager serves.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    /// Snapshot of the conversation record.
    #[must_use]
    pub fn conversation(&self) -> Conversation {
        lock(&self.inner.conversation).clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Engine session id of the running agent.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.current_driver().map(|d| d.session_id())
    }

    /// Pending confirmations, in no particular order.
    #[must_use]
    pub fn confirmations(&self) -> Vec<Confirmation> {
        lock(&self.inner.confirmations).values().cloned().collect()
    }

    /// Whether the conversation is marked busy.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.deps.busy.is_processing(&self.inner.conversation_id)
    }

    /// Start the agent, or join a start already in flight.
    ///
    /// # Errors
    ///
    /// Returns the launch or handshake error; the next call retries.
    pub async fn start(&self) -> Result<Arc<dyn AgentDriver>> {
        let bootstrap = {
            let mut slot = lock(&self.inner.bootstrap);
            if let Some(existing) = slot.as_ref() {
                existing.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let fresh = Inner::bootstrap(inner).boxed().shared();
                *slot = Some(fresh.clone());
                fresh
            }
        };

        let result = bootstrap.clone().await;
        if result.is_err() {
            let mut slot = lock(&self.inner.bootstrap);
            if slot.as_ref().is_some_and(|cached| cached.ptr_eq(&bootstrap)) {
                *slot = None;
            }
        }
        result
    }

    /// Send a message to the agent and wait for the turn to end.
    ///
    /// Failures are also stored and broadcast as an error tips message.
    ///
    /// # Errors
    ///
    /// Returns the launch, protocol, or session error that stopped the send.
    pub async fn send(&self, request: SendRequest) -> Result<()> {
        let conversation_id = self.inner.conversation_id.clone();
        let span = info_span!("send_message", conversation_id = conversation_id.as_str());

        self.inner.deps.busy.set_processing(&conversation_id, true);
        match self.try_send(&request).instrument(span).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.inner.deps.busy.set_processing(&conversation_id, false);
                let msg_id = Uuid::new_v4().to_string();
                let message = Message::tips(&conversation_id, &msg_id, TipKind::Error, err.to_string());
                self.inner.persist(&message).await;
                self.inner.deps.bus.emit(ResponseEvent::Error {
                    conversation_id,
                    msg_id,
                    content: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn try_send(&self, request: &SendRequest) -> Result<()> {
        self.inner.distribute_skills().await;
        let driver = self.start().await?;
        self.inner.set_state(SessionState::Streaming);

        let user_msg_id = request.msg_id.as_deref().filter(|_| !request.content.is_empty());
        let Some(msg_id) = user_msg_id else {
            driver
                .prompt(request.content.clone(), request.files.clone())
                .await?;
            return Ok(());
        };

        let conversation = self.conversation();
        let mut content = strip_files_marker(&request.content).to_owned();
        let first = self.inner.first_message.load(Ordering::SeqCst);
        if first {
            content = prepare_first_message(
                &content,
                conversation.extra.preset_context.as_deref(),
                &conversation.workspace,
                &conversation.extra.additional_dirs,
            );
        }

        let mut user_message = Message::text(
            &self.inner.conversation_id,
            msg_id,
            MessagePosition::Right,
            request.content.clone(),
        );
        msg_id.clone_into(&mut user_message.id);
        if let Err(err) = self.inner.deps.store.add_message(&user_message).await {
            warn!(conversation_id = self.inner.conversation_id, %err, "failed to store user message");
        }
        self.inner.deps.bus.emit(ResponseEvent::UserContent {
            conversation_id: self.inner.conversation_id.clone(),
            msg_id: msg_id.to_owned(),
            content: request.content.clone(),
        });

        driver.prompt(content, request.files.clone()).await?;
        if first {
            self.inner.first_message.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Answer a pending confirmation with `option_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no confirmation is pending for
    /// `call_id`, or `AppError::Session` if the agent is not running.
    pub async fn confirm(&self, call_id: &str, option_id: &str) -> Result<()> {
        let confirmation = lock(&self.inner.confirmations).remove(call_id);
        if confirmation.is_none() {
            return Err(AppError::NotFound(format!("confirmation {call_id}")));
        }
        let driver = self
            .inner
            .current_driver()
            .ok_or_else(|| AppError::Session("agent is not running".into()))?;

        driver.resolve_permission(call_id, option_id).await?;
        info!(conversation_id = self.inner.conversation_id, call_id, option_id, "permission resolved");
        self.inner.deps.bus.emit(ResponseEvent::ConfirmationResolved {
            conversation_id: self.inner.conversation_id.clone(),
            call_id: call_id.to_owned(),
        });
        if lock(&self.inner.confirmations).is_empty() {
            self.inner.set_state(SessionState::Streaming);
        }
        Ok(())
    }

    /// Abandon the running turn; open confirmations are withdrawn.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the agent is not running, or the
    /// protocol error from the cancel notification.
    pub async fn cancel(&self) -> Result<()> {
        let driver = self
            .inner
            .current_driver()
            .ok_or_else(|| AppError::Session("agent is not running".into()))?;
        driver.cancel_turn().await?;
        self.inner.withdraw_confirmations();
        self.inner
            .deps
            .busy
            .set_processing(&self.inner.conversation_id, false);
        info!(conversation_id = self.inner.conversation_id, "turn cancelled");
        Ok(())
    }

    /// Cooperative stop. The stored session token is cleared so the next
    /// send opens a fresh session.
    pub async fn stop(&self) {
        let span = info_span!("stop_session", conversation_id = self.inner.conversation_id.as_str());
        async {
            if let Some(driver) = self.inner.detach() {
                if let Err(err) = driver.stop().await {
                    warn!(%err, "agent stop failed");
                }
            }
            self.inner.clear_session_token().await;
            self.inner.first_message.store(true, Ordering::SeqCst);
            info!("session stopped");
        }
        .instrument(span)
        .await;
    }

    /// Stop cooperatively, wait the grace period, then force-terminate. A
    /// concurrent hard deadline force-terminates even if the cooperative
    /// path is still running.
    pub async fn kill(&self) {
        let span = info_span!("kill_session", conversation_id = self.inner.conversation_id.as_str());
        async {
            let Some(driver) = self.inner.detach() else {
                return;
            };
            let timeouts = &self.inner.deps.config.timeouts;
            let soft = async {
                if let Err(err) = driver.stop().await {
                    warn!(%err, "cooperative stop failed");
                }
                tokio::time::sleep(timeouts.kill_grace()).await;
            };
            tokio::select! {
                () = soft => debug!("cooperative stop finished within the grace period"),
                () = tokio::time::sleep(timeouts.kill_hard()) => {
                    warn!("hard kill deadline reached");
                }
            }
            driver.force_kill();
            info!("session killed");
        }
        .instrument(span)
        .await;
    }
}

impl Inner {
    async fn bootstrap(inner: Arc<Self>) -> Result<Arc<dyn AgentDriver>> {
        let span = info_span!("bootstrap_session", conversation_id = inner.conversation_id.as_str());
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = Self::launch(&inner, generation).instrument(span).await;
        if let Err(err) = &result {
            warn!(conversation_id = inner.conversation_id, %err, "agent bootstrap failed");
            if inner.is_current(generation) {
                inner.set_state(SessionState::Stopped);
            }
        }
        result
    }

    async fn launch(inner: &Arc<Self>, generation: u64) -> Result<Arc<dyn AgentDriver>> {
        inner.set_state(SessionState::Starting);

        let conversation = match inner.deps.store.get_conversation(&inner.conversation_id).await {
            Ok(Some(stored)) => {
                *lock(&inner.conversation) = stored.clone();
                stored
            }
            Ok(None) => lock(&inner.conversation).clone(),
            Err(err) => {
                warn!(%err, "failed to reload conversation, using cached copy");
                lock(&inner.conversation).clone()
            }
        };

        let spec = resolve_launch_spec(&conversation, &inner.deps.config)?;
        inner.distribute_skills().await;

        if !inner.is_current(generation) {
            return Err(AppError::Session("start superseded by stop".into()));
        }
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_event_loop(Arc::clone(inner), generation, events_rx));

        let request = LaunchRequest {
            conversation_id: inner.conversation_id.clone(),
            spec,
            resume_session_id: conversation.extra.acp_session_id.clone(),
            startup_timeout: inner.deps.config.timeouts.startup(),
        };
        let launcher = Arc::clone(&inner.deps.launcher);
        let driver = launcher.launch(request, events_tx).await?;
        let session_id = driver.session_id();

        {
            let _token = inner.token_writes.lock().await;
            if !inner.is_current(generation) {
                return Err(inner.abandon(&driver, &session_id));
            }
            if conversation.extra.acp_session_id.as_deref() != Some(session_id.as_str()) {
                inner.save_session_token(&session_id).await;
            }
        }

        {
            let mut slot = lock(&inner.driver);
            if inner.generation.load(Ordering::SeqCst) != generation {
                drop(slot);
                return Err(inner.abandon(&driver, &session_id));
            }
            *slot = Some(Arc::clone(&driver));
        }
        inner.set_state(SessionState::Ready);
        info!(session_id, "agent ready");
        Ok(driver)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Terminate an agent whose start was overtaken by a stop or kill.
    fn abandon(&self, driver: &Arc<dyn AgentDriver>, session_id: &str) -> AppError {
        warn!(conversation_id = self.conversation_id, session_id, "start superseded, terminating agent");
        driver.force_kill();
        AppError::Session("start superseded by stop".into())
    }

    fn current_driver(&self) -> Option<Arc<dyn AgentDriver>> {
        lock(&self.driver).clone()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Take the driver out and forget the cached bootstrap. A start still
    /// in flight is superseded and terminates its agent on arrival.
    fn detach(&self) -> Option<Arc<dyn AgentDriver>> {
        *lock(&self.bootstrap) = None;
        let driver = {
            let mut slot = lock(&self.driver);
            self.generation.fetch_add(1, Ordering::SeqCst);
            slot.take()
        };
        self.withdraw_confirmations();
        self.deps.busy.set_processing(&self.conversation_id, false);
        self.set_state(SessionState::Stopped);
        driver
    }

    fn withdraw_confirmations(&self) {
        let withdrawn: Vec<String> = lock(&self.confirmations).drain().map(|(k, _)| k).collect();
        for call_id in withdrawn {
            self.deps.bus.emit(ResponseEvent::ConfirmationResolved {
                conversation_id: self.conversation_id.clone(),
                call_id,
            });
        }
    }

    async fn persist(&self, message: &Message) {
        if let Err(err) = self.deps.store.add_or_update_message(message).await {
            warn!(conversation_id = self.conversation_id, msg_id = message.msg_id, %err, "failed to store message");
        }
    }

    async fn save_session_token(&self, session_id: &str) {
        lock(&self.conversation).set_session_token(session_id);
        let mut patch = Map::new();
        patch.insert("acp_session_id".into(), json!(session_id));
        patch.insert("acp_session_updated_at".into(), json!(Utc::now()));
        if let Err(err) = self.deps.store.merge_extra(&self.conversation_id, patch).await {
            warn!(conversation_id = self.conversation_id, %err, "failed to persist session token");
        }
    }

    async fn clear_session_token(&self) {
        let _token = self.token_writes.lock().await;
        lock(&self.conversation).clear_session_token();
        let mut patch = Map::new();
        patch.insert("acp_session_id".into(), Value::Null);
        patch.insert("acp_session_updated_at".into(), Value::Null);
        if let Err(err) = self.deps.store.merge_extra(&self.conversation_id, patch).await {
            warn!(conversation_id = self.conversation_id, %err, "failed to clear session token");
        }
    }

    async fn distribute_skills(&self) {
        let (engine, workspace, enabled) = {
            let conversation = lock(&self.conversation);
            (
                SkillEngine::for_engine(conversation.engine),
                conversation.workspace.clone(),
                conversation.extra.enabled_skills.clone(),
            )
        };
        let Some(engine) = engine else {
            return;
        };

        let _serial = self.distribution.lock().await;
        let distributor = self.deps.skills.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            distributor.distribute_for(engine, &workspace, enabled.as_deref())
        })
        .await;
        match outcome {
            Ok(Ok(report)) => debug!(
                conversation_id = self.conversation_id,
                placed = report.placed().len(),
                "skills reconciled"
            ),
            Ok(Err(err)) => warn!(conversation_id = self.conversation_id, %err, "skill distribution failed"),
            Err(err) => warn!(conversation_id = self.conversation_id, %err, "skill distribution task failed"),
        }
    }

    fn is_yolo(&self) -> bool {
        let conversation = lock(&self.conversation);
        conversation.extra.yolo_mode.unwrap_or_else(|| {
            self.deps
                .config
                .engine(conversation.engine)
                .is_some_and(|e| e.yolo_mode)
        })
    }

    async fn handle_permission(&self, request: PermissionRequest) {
        if self.is_yolo() {
            if let (Some(option), Some(driver)) = (request.first_allow_option(), self.current_driver()) {
                match driver.resolve_permission(&request.call_id, &option.option_id).await {
                    Ok(()) => {
                        info!(
                            conversation_id = self.conversation_id,
                            call_id = request.call_id,
                            option_id = option.option_id,
                            "permission auto-approved"
                        );
                        return;
                    }
                    Err(err) => warn!(call_id = request.call_id, %err, "auto-approve failed"),
                }
            }
        }

        let confirmation = Confirmation::from_request(&self.conversation_id, &request);
        lock(&self.confirmations).insert(confirmation.call_id.clone(), confirmation.clone());
        self.set_state(SessionState::AwaitingConfirmation);
        self.deps.bus.emit(ResponseEvent::Confirmation { confirmation });
    }

    async fn finish_turn(self: &Arc<Self>, stop_reason: String, turn_text: String) {
        self.deps.busy.set_processing(&self.conversation_id, false);
        if self.current_driver().is_some() {
            self.set_state(SessionState::Ready);
        }

        if !turn_text.is_empty() && has_directives(&turn_text) {
            let mut results = Vec::new();
            for directive in parse_directives(&turn_text) {
                let result = self
                    .deps
                    .directives
                    .execute(&self.conversation_id, &directive)
                    .await;
                self.deps.bus.emit(ResponseEvent::System {
                    conversation_id: self.conversation_id.clone(),
                    msg_id: Uuid::new_v4().to_string(),
                    content: result.clone(),
                });
                results.push(result);
            }
            if !results.is_empty() {
                let content = format!("{SYSTEM_RESPONSE_PREFIX}{}", results.join("\n"));
                let manager = SessionManager {
                    inner: Arc::clone(self),
                };
                tokio::spawn(follow_up(manager, content));
            }
        }

        self.deps.bus.emit(ResponseEvent::Finish {
            conversation_id: self.conversation_id.clone(),
            stop_reason,
        });
    }

    fn handle_terminated(&self, generation: u64, reason: &str) {
        if !self.is_current(generation) {
            debug!(conversation_id = self.conversation_id, reason, "stale agent stream ended");
            return;
        }
        warn!(conversation_id = self.conversation_id, reason, "agent stream ended");
        self.detach();
    }
}

/// Re-inject directive results; boxed so the spawned send has a nameable type.
fn follow_up(manager: SessionManager, content: String) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(err) = manager.send(SendRequest::follow_up(content)).await {
            warn!(conversation_id = manager.conversation_id(), %err, "system response follow-up failed");
        }
    })
}

/// Text of the entry currently streaming; a new merge key starts over.
#[derive(Debug, Default)]
struct TurnText {
    msg_id: Option<String>,
    text: String,
}

impl TurnText {
    fn push(&mut self, msg_id: &str, chunk: &str) {
        if self.msg_id.as_deref() != Some(msg_id) {
            self.text.clear();
            self.msg_id = Some(msg_id.to_owned());
        }
        self.text.push_str(chunk);
    }

    fn take(&mut self) -> String {
        self.msg_id = None;
        std::mem::take(&mut self.text)
    }
}

async fn run_event_loop(inner: Arc<Inner>, generation: u64, mut events: mpsc::Receiver<AgentEvent>) {
    let mut adapter = ProtocolAdapter::with_eviction_delay(
        &inner.conversation_id,
        inner.deps.config.timeouts.tool_call_eviction(),
    );
    let mut turn_text = TurnText::default();

    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::SessionUpdate(update) => {
                if matches!(update, SessionUpdate::Plan { .. }) {
                    if let Some(driver) = inner.current_driver() {
                        adapter.set_session_id(&driver.session_id());
                    }
                }
                for message in adapter.convert(update) {
                    if let (MessagePosition::Left, MessageBody::Text { content }) =
                        (message.position, &message.body)
                    {
                        turn_text.push(&message.msg_id, content);
                    }
                    inner.persist(&message).await;
                    inner.deps.bus.emit(ResponseEvent::Message { message });
                }
            }
            AgentEvent::PermissionRequested(request) => inner.handle_permission(request).await,
            AgentEvent::TurnFinished { stop_reason } => {
                adapter.reset_msg_id();
                inner.finish_turn(stop_reason, turn_text.take()).await;
            }
            AgentEvent::Terminated { reason } => {
                inner.handle_terminated(generation, &reason);
                break;
            }
        }
    }
    debug!(conversation_id = inner.conversation_id, generation, "event loop finished");
}
