//! Resolution of a conversation's agent launch parameters.
//!
//! Precedence for every field: per-conversation override, then stored
//! engine configuration, then the built-in default.

use std::collections::HashMap;

use crate::acp::spawner::LaunchSpec;
use crate::config::GlobalConfig;
use crate::models::conversation::Conversation;
use crate::{AppError, Result};

/// Resolve how to launch the agent for `conversation`.
///
/// # Errors
///
/// Returns `AppError::Launch` if the engine is disabled, a custom engine id
/// is missing or unknown, or the resolved command is empty.
pub fn resolve_launch_spec(conversation: &Conversation, config: &GlobalConfig) -> Result<LaunchSpec> {
    let overrides = &conversation.extra.overrides;

    let (program, args, mut env) = match conversation.engine.defaults() {
        Some(defaults) => {
            let kind = conversation.engine;
            if config.is_disabled(kind.id()) {
                return Err(AppError::Launch(format!("engine '{kind}' is disabled")));
            }
            let stored = config.engine(kind);

            let program = overrides
                .cli_path
                .clone()
                .or_else(|| stored.and_then(|s| s.cli_path.clone()))
                .unwrap_or_else(|| defaults.cli_command.to_owned());
            let args = overrides
                .args
                .clone()
                .or_else(|| stored.and_then(|s| s.args.clone()))
                .unwrap_or_else(|| defaults.acp_args.iter().map(|a| (*a).to_owned()).collect());
            let env = stored.map(|s| s.env.clone()).unwrap_or_default();
            (program, args, env)
        }
        None => resolve_custom(conversation, config)?,
    };

    if program.trim().is_empty() {
        return Err(AppError::Launch(format!(
            "no command configured for engine '{}'",
            conversation.engine
        )));
    }

    env.extend(overrides.env.clone());

    Ok(LaunchSpec {
        program,
        args,
        env,
        cwd: conversation.workspace.clone(),
    })
}

fn resolve_custom(
    conversation: &Conversation,
    config: &GlobalConfig,
) -> Result<(String, Vec<String>, HashMap<String, String>)> {
    let id = conversation
        .extra
        .custom_engine_id
        .as_deref()
        .ok_or_else(|| AppError::Launch("custom engine id is not set".into()))?;
    if config.is_disabled(id) {
        return Err(AppError::Launch(format!("engine '{id}' is disabled")));
    }
    let custom = config
        .custom_engine(id)
        .ok_or_else(|| AppError::Launch(format!("unknown custom engine '{id}'")))?;

    let overrides = &conversation.extra.overrides;
    let command_line = overrides
        .cli_path
        .as_deref()
        .unwrap_or(&custom.default_cli_path);
    let (program, parsed_args) = split_command_line(command_line)
        .ok_or_else(|| AppError::Launch(format!("custom engine '{id}' has an empty command")))?;

    let args = overrides
        .args
        .clone()
        .or_else(|| custom.acp_args.clone())
        .unwrap_or(parsed_args);

    Ok((program, args, custom.env.clone()))
}

/// Split `"cmd arg1 arg2"` on whitespace into the program and its arguments.
#[must_use]
pub fn split_command_line(command_line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command_line.split_whitespace().map(str::to_owned);
    let program = parts.next()?;
    Some((program, parts.collect()))
}
