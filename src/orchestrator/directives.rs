//! Scheduling directives embedded in agent replies.
//!
//! Agents manage scheduled tasks by writing directives into their reply:
//!
//! ```text
//! [CRON_CREATE]
//! name: Daily summary
//! schedule: 0 9 * * *
//! schedule_description: Every day at 09:00
//! message: Summarize yesterday's commits
//! [/CRON_CREATE]
//!
//! [CRON_LIST]
//! [CRON_DELETE: <id>]
//! ```
//!
//! Directives are collected from the full text of a finished turn and run in
//! the order they appear.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::busy_guard::BusyGuard;

#[allow(clippy::expect_used)]
static CREATE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[CRON_CREATE\](.*?)\[/CRON_CREATE\]").expect("create block regex")
});

#[allow(clippy::expect_used)]
static LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[CRON_LIST\]").expect("list regex"));

#[allow(clippy::expect_used)]
static DELETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[CRON_DELETE:\s*([^\]]*?)\s*\]").expect("delete regex")
});

/// Fields of a `[CRON_CREATE]` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSpec {
    /// Job name.
    pub name: String,
    /// Cron expression or `@daily`-style macro.
    pub schedule: String,
    /// Human description of the schedule.
    pub schedule_description: Option<String>,
    /// Message sent to the agent when the job fires.
    pub message: String,
}

/// One directive found in agent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Create a scheduled job.
    Create(CronSpec),
    /// List this conversation's jobs.
    List,
    /// Delete a job by id.
    Delete {
        /// Job id.
        id: String,
    },
    /// A directive that could not be parsed; reported back to the agent.
    Malformed {
        /// What was wrong.
        reason: String,
    },
}

/// Whether `text` contains any directive.
#[must_use]
pub fn has_directives(text: &str) -> bool {
    CREATE_BLOCK.is_match(text) || LIST.is_match(text) || DELETE.is_match(text)
}

/// Every directive in `text`, in order of appearance.
#[must_use]
pub fn parse_directives(text: &str) -> Vec<Directive> {
    let mut found: Vec<(usize, Directive)> = Vec::new();

    for caps in CREATE_BLOCK.captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        found.push((whole.start(), parse_create_body(body.as_str())));
    }
    for m in LIST.find_iter(text) {
        found.push((m.start(), Directive::List));
    }
    for caps in DELETE.captures_iter(text) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let id = id.as_str().trim();
        let directive = if id.is_empty() {
            Directive::Malformed {
                reason: "CRON_DELETE requires a job id".into(),
            }
        } else {
            Directive::Delete { id: id.to_owned() }
        };
        found.push((whole.start(), directive));
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, d)| d).collect()
}

fn parse_create_body(body: &str) -> Directive {
    let mut name = None;
    let mut schedule = None;
    let mut description = None;
    let mut message: Option<String> = None;

    for line in body.lines() {
        let trimmed = line.trim();
        if let Some(rest) = message.as_mut() {
            rest.push('\n');
            rest.push_str(line);
            continue;
        }
        if let Some(value) = trimmed.strip_prefix("name:") {
            name = Some(value.trim().to_owned());
        } else if let Some(value) = trimmed.strip_prefix("schedule_description:") {
            description = Some(value.trim().to_owned());
        } else if let Some(value) = trimmed.strip_prefix("schedule:") {
            schedule = Some(value.trim().to_owned());
        } else if let Some(value) = trimmed.strip_prefix("message:") {
            message = Some(value.trim().to_owned());
        }
    }

    let message = message.map(|m| m.trim().to_owned());
    match (name, schedule, message) {
        (Some(name), Some(schedule), Some(message))
            if !name.is_empty() && !schedule.is_empty() && !message.is_empty() =>
        {
            Directive::Create(CronSpec {
                name,
                schedule,
                schedule_description: description.filter(|d| !d.is_empty()),
                message,
            })
        }
        _ => Directive::Malformed {
            reason: "CRON_CREATE requires name, schedule and message".into(),
        },
    }
}

/// Boxed future returned by [`DirectiveExecutor::execute`].
pub type DirectiveFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// Runs directives and reports the outcome as text for the agent.
pub trait DirectiveExecutor: Send + Sync {
    /// Execute `directive` on behalf of `conversation_id`.
    fn execute<'a>(&'a self, conversation_id: &'a str, directive: &'a Directive)
        -> DirectiveFuture<'a>;
}

/// A scheduled job.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CronJob {
    /// Job id.
    pub id: String,
    /// Conversation the job sends into.
    pub conversation_id: String,
    /// Job name.
    pub name: String,
    /// Schedule expression.
    pub schedule: String,
    /// Human description of the schedule.
    pub schedule_description: Option<String>,
    /// Message to send.
    pub message: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// In-memory job registry.
#[derive(Debug, Clone, Default)]
pub struct CronRegistry {
    jobs: Arc<Mutex<HashMap<String, CronJob>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether `schedule` looks like a cron expression or a supported macro.
#[must_use]
pub fn is_valid_schedule(schedule: &str) -> bool {
    const MACROS: [&str; 6] = ["@yearly", "@annually", "@monthly", "@weekly", "@daily", "@hourly"];
    if schedule.starts_with('@') {
        return MACROS.contains(&schedule);
    }
    matches!(schedule.split_whitespace().count(), 5 | 6)
}

impl CronRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs of one conversation, oldest first.
    #[must_use]
    pub fn jobs_for(&self, conversation_id: &str) -> Vec<CronJob> {
        let mut jobs: Vec<CronJob> = lock(&self.jobs)
            .values()
            .filter(|j| j.conversation_id == conversation_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Look up a job.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<CronJob> {
        lock(&self.jobs).get(id).cloned()
    }

    /// Wait until the job's conversation is idle, then return the job so the
    /// caller can send its message. `None` if the job is gone or the
    /// conversation stays busy past `wait`.
    pub async fn ready_to_fire(&self, id: &str, guard: &BusyGuard, wait: Duration) -> Option<CronJob> {
        let job = self.get(id)?;
        if guard.wait_for_idle(&job.conversation_id, wait).await {
            Some(job)
        } else {
            info!(job_id = id, conversation_id = job.conversation_id, "conversation busy, job deferred");
            None
        }
    }

    fn create(&self, conversation_id: &str, spec: &CronSpec) -> String {
        if !is_valid_schedule(&spec.schedule) {
            warn!(conversation_id, schedule = spec.schedule, "rejected cron schedule");
            return format!("Error: invalid schedule '{}'", spec.schedule);
        }
        let job = CronJob {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_owned(),
            name: spec.name.clone(),
            schedule: spec.schedule.clone(),
            schedule_description: spec.schedule_description.clone(),
            message: spec.message.clone(),
            created_at: Utc::now(),
        };
        let reply = format!(
            "Scheduled task created: {} (id: {}, schedule: {})",
            job.name, job.id, job.schedule
        );
        info!(conversation_id, job_id = job.id, name = job.name, "cron job created");
        lock(&self.jobs).insert(job.id.clone(), job);
        reply
    }

    fn list(&self, conversation_id: &str) -> String {
        let jobs = self.jobs_for(conversation_id);
        if jobs.is_empty() {
            return "No scheduled tasks.".to_owned();
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|j| {
                let when = j.schedule_description.as_deref().unwrap_or(&j.schedule);
                format!("- {}: {} ({when})", j.id, j.name)
            })
            .collect();
        format!("Scheduled tasks:\n{}", lines.join("\n"))
    }

    fn delete(&self, conversation_id: &str, id: &str) -> String {
        let mut jobs = lock(&self.jobs);
        match jobs.get(id) {
            Some(job) if job.conversation_id == conversation_id => {
                jobs.remove(id);
                info!(conversation_id, job_id = id, "cron job deleted");
                format!("Scheduled task {id} deleted.")
            }
            _ => format!("Error: no scheduled task with id {id}"),
        }
    }
}

impl DirectiveExecutor for CronRegistry {
    fn execute<'a>(
        &'a self,
        conversation_id: &'a str,
        directive: &'a Directive,
    ) -> DirectiveFuture<'a> {
        Box::pin(async move {
            match directive {
                Directive::Create(spec) => self.create(conversation_id, spec),
                Directive::List => self.list(conversation_id),
                Directive::Delete { id } => self.delete(conversation_id, id),
                Directive::Malformed { reason } => format!("Error: {reason}"),
            }
        })
    }
}
