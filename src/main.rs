#![forbid(unsafe_code)]

//! `agent-conductor` — ACP agent session driver and skill distributor.
//!
//! `chat` runs one conversation against an agent engine, reading user input
//! from stdin and writing presentation events to stdout as JSON lines.
//! `skills` reconciles and inspects engine skill directories. `engines`
//! lists selectable engines.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_conductor::bus::{BroadcastBus, PresentationBus};
use agent_conductor::driver::acp_driver::AcpLauncher;
use agent_conductor::models::conversation::Conversation;
use agent_conductor::models::engine::EngineKind;
use agent_conductor::orchestrator::preamble::normalize_additional_dirs;
use agent_conductor::orchestrator::session_manager::{ManagerDeps, SendRequest, SessionManager};
use agent_conductor::persistence::{db, ConversationStore, SqliteStore};
use agent_conductor::skills::detect::{detect_engine_native_skills, detect_global_skills};
use agent_conductor::skills::distributor::SkillDistributor;
use agent_conductor::skills::library::SkillLibrary;
use agent_conductor::skills::SkillEngine;
use agent_conductor::{AppError, GlobalConfig, Result};

/// Database file used when the configuration names none.
const DEFAULT_DATABASE: &str = "agent-conductor.db";

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum SkillTarget {
    Claude,
    Codex,
    Gemini,
}

impl From<SkillTarget> for SkillEngine {
    fn from(target: SkillTarget) -> Self {
        match target {
            SkillTarget::Claude => Self::Claude,
            SkillTarget::Codex => Self::Codex,
            SkillTarget::Gemini => Self::Gemini,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "agent-conductor", about = "ACP agent session driver", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chat with an agent; one stdin line per message.
    Chat {
        /// Workspace root the agent runs in.
        #[arg(long)]
        workspace: PathBuf,
        /// Engine id (`claude`, `codex`, `gemini`, ... or `custom`).
        #[arg(long, default_value = "claude")]
        engine: String,
        /// Custom engine id when `--engine custom`.
        #[arg(long)]
        custom_engine: Option<String>,
        /// Extra directory the agent may access; repeatable.
        #[arg(long = "add-dir")]
        additional_dirs: Vec<String>,
        /// Auto-approve permission requests.
        #[arg(long)]
        yolo: bool,
        /// Continue a stored conversation instead of creating one.
        #[arg(long)]
        resume: Option<String>,
    },
    /// Skill directory maintenance.
    Skills {
        #[command(subcommand)]
        action: SkillsAction,
    },
    /// List engines available for selection.
    Engines,
}

#[derive(Debug, Subcommand)]
enum SkillsAction {
    /// Reconcile one engine's skill directory in a workspace.
    Distribute {
        /// Workspace root.
        #[arg(long)]
        workspace: PathBuf,
        /// Target engine directory.
        #[arg(long, value_enum)]
        engine: SkillTarget,
        /// Optional skills to enable; all when omitted.
        #[arg(long, value_delimiter = ',')]
        enabled: Vec<String>,
    },
    /// List engine-native skills in a workspace.
    Native {
        /// Workspace root.
        #[arg(long)]
        workspace: PathBuf,
    },
    /// List skills installed in the home directory.
    Global,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let config = Arc::new(config);
    info!("configuration loaded");

    match args.command {
        Command::Chat {
            workspace,
            engine,
            custom_engine,
            additional_dirs,
            yolo,
            resume,
        } => {
            let options = ChatOptions {
                workspace,
                engine,
                custom_engine,
                additional_dirs,
                yolo,
                resume,
            };
            run_chat(config, options).await
        }
        Command::Skills { action } => run_skills(&config, action),
        Command::Engines => {
            for id in config.available_engines() {
                println!("{id}");
            }
            Ok(())
        }
    }
}

struct ChatOptions {
    workspace: PathBuf,
    engine: String,
    custom_engine: Option<String>,
    additional_dirs: Vec<String>,
    yolo: bool,
    resume: Option<String>,
}

async fn run_chat(config: Arc<GlobalConfig>, options: ChatOptions) -> Result<()> {
    // ── Initialize database ─────────────────────────────
    let db_path = config
        .database_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
    let database = Arc::new(db::connect(&db_path).await?);
    let store: Arc<dyn ConversationStore> = Arc::new(SqliteStore::new(database));
    info!(path = %db_path.display(), "database connected");

    let conversation = match options.resume {
        Some(id) => store
            .get_conversation(&id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?,
        None => {
            let conversation = new_conversation(&config, &options)?;
            store.create_conversation(&conversation).await?;
            conversation
        }
    };
    info!(conversation_id = conversation.id, engine = %conversation.engine, "conversation ready");

    // ── Wire the session manager ────────────────────────
    let bus = Arc::new(BroadcastBus::new());
    let mut events = bus.subscribe();
    let deps = ManagerDeps::new(
        Arc::clone(&config),
        store,
        Arc::clone(&bus) as Arc<dyn PresentationBus>,
        Arc::new(AcpLauncher),
    );
    let manager = SessionManager::new(conversation, deps);

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(%err, "failed to render event"),
            }
        }
    });

    // ── Read user input ─────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = shutdown_signal() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !handle_chat_line(&manager, line).await {
            break;
        }
    }

    manager.kill().await;
    printer.abort();
    info!("chat finished");
    Ok(())
}

/// Handle one input line; `false` ends the chat.
async fn handle_chat_line(manager: &SessionManager, line: &str) -> bool {
    match line.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["/quit"] => return false,
        ["/stop"] => manager.stop().await,
        ["/cancel"] => {
            if let Err(err) = manager.cancel().await {
                warn!(%err, "cancel failed");
            }
        }
        ["/confirm", call_id, option_id] => {
            if let Err(err) = manager.confirm(call_id, option_id).await {
                warn!(%err, "confirmation failed");
            }
        }
        _ => {
            let manager = manager.clone();
            let request = SendRequest::user(line);
            tokio::spawn(async move {
                if let Err(err) = manager.send(request).await {
                    error!(%err, "send failed");
                }
            });
        }
    }
    true
}

fn new_conversation(config: &GlobalConfig, options: &ChatOptions) -> Result<Conversation> {
    let engine = EngineKind::from_id(&options.engine)
        .ok_or_else(|| AppError::Config(format!("unknown engine '{}'", options.engine)))?;
    let selected = options.custom_engine.as_deref().unwrap_or(&options.engine);
    if config.is_disabled(selected) {
        return Err(AppError::Config(format!("engine '{selected}' is disabled")));
    }

    let workspace = options
        .workspace
        .canonicalize()
        .map_err(|err| AppError::Config(format!("invalid workspace: {err}")))?;
    let mut conversation = Conversation::new(&workspace, engine);
    conversation.extra.custom_engine_id.clone_from(&options.custom_engine);
    conversation.extra.additional_dirs = normalize_additional_dirs(&workspace, &options.additional_dirs);
    if options.yolo {
        conversation.extra.yolo_mode = Some(true);
    }
    Ok(conversation)
}

fn run_skills(config: &GlobalConfig, action: SkillsAction) -> Result<()> {
    let library = SkillLibrary::new(config.skills_dir.clone());
    match action {
        SkillsAction::Distribute {
            workspace,
            engine,
            enabled,
        } => {
            let distributor = SkillDistributor::new(library);
            let enabled = (!enabled.is_empty()).then_some(enabled);
            let report = distributor.distribute_for(engine.into(), &workspace, enabled.as_deref())?;
            println!("{}", report_line(&report.target_dir, "copied", &report.copied));
            println!("{}", report_line(&report.target_dir, "unchanged", &report.unchanged));
            println!("{}", report_line(&report.target_dir, "skipped", &report.skipped));
            println!("{}", report_line(&report.target_dir, "removed", &report.removed));
        }
        SkillsAction::Native { workspace } => {
            for skill in detect_engine_native_skills(&workspace, &library) {
                println!("{}", serde_json::to_string(&skill)?);
            }
        }
        SkillsAction::Global => {
            let home = config
                .home_dir()
                .ok_or_else(|| AppError::Config("home directory is unknown".into()))?;
            for skill in detect_global_skills(&home) {
                println!("{}", serde_json::to_string(&skill)?);
            }
        }
    }
    Ok(())
}

fn report_line(target: &Path, label: &str, names: &[String]) -> String {
    format!("{} {label}: {}", target.display(), names.join(", "))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
