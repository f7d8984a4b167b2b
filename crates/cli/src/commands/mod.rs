pub mod config;
pub mod decide;
pub mod doctor;
pub mod migrate;
pub mod seed;
pub mod token;

use std::future::Future;

use imprest_core::audit::AuditEvent;
use imprest_core::config::{AppConfig, LoadOptions};
use imprest_db::{connection::connect_with_config, migrations, DbPool};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    audit: Option<AuditEvent>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::outcome(command, None, message.into(), 0, None)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::outcome(command, Some(error_class), message.into(), exit_code, None)
    }

    /// Outcome of a step that emitted `event`, which is attached to the
    /// payload whether the step succeeded or was refused.
    pub(crate) fn audited(
        command: &str,
        result: Result<String, StepFailure>,
        event: AuditEvent,
    ) -> Self {
        match result {
            Ok(message) => Self::outcome(command, None, message, 0, Some(event)),
            Err((error_class, message, exit_code)) => {
                Self::outcome(command, Some(error_class), message, exit_code, Some(event))
            }
        }
    }

    fn outcome(
        command: &str,
        error_class: Option<&str>,
        message: String,
        exit_code: u8,
        audit: Option<AuditEvent>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: if error_class.is_some() { "error" } else { "ok" }.to_string(),
            error_class: error_class.map(str::to_string),
            message,
            audit,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// `(error_class, message, exit_code)` reported by a failing database step.
pub(crate) type StepFailure = (&'static str, String, u8);

/// Loads configuration, opens a migrated pool on a current-thread runtime and
/// runs `work` against it. The pool is closed before returning.
///
/// Exit codes: 2 config, 3 runtime, 4 connectivity, 5 migration; `work`
/// chooses its own.
pub(crate) fn with_migrated_pool<T, F, Fut>(command: &str, work: F) -> Result<T, CommandResult>
where
    F: FnOnce(AppConfig, DbPool) -> Fut,
    Fut: Future<Output = Result<T, StepFailure>>,
{
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let outcome = work(config.clone(), pool.clone()).await;
        pool.close().await;
        outcome
    });

    result.map_err(|(error_class, message, exit_code)| {
        CommandResult::failure(command, error_class, message, exit_code)
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\
             \"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
