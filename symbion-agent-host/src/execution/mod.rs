//! Optimization action execution for Symbion agents
//!
//! Maps engine action types (`force_gc`, `throttle_requests`,
//! `enable_query_cache`, custom names) to operator-configured shell hooks:
//! - Unmapped actions report `Unavailable`
//! - Commands run through the platform shell with a timeout
//! - Non-zero exits and timeouts report `Failed`

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use symbion_perf::{ActionError, ActionExecutor, ActionOutcome, ActionType};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

/// Command execution result
#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u128,
}

/// Runs configured shell hooks for optimization actions
pub struct ShellActionExecutor {
    commands: BTreeMap<String, String>,
    timeout: Duration,
}

impl ShellActionExecutor {
    pub fn new(commands: BTreeMap<String, String>, timeout: Duration) -> Self {
        Self { commands, timeout }
    }

    pub fn configured_actions(&self) -> Vec<ActionType> {
        self.commands.keys().map(|name| ActionType::from(name.as_str())).collect()
    }

    /// Execute shell command with timeout
    pub async fn execute_shell_command(command: &str, timeout: Duration) -> ExecutionResult {
        let start_time = Instant::now();
        debug!("Executing shell command: {} (timeout: {:?})", command, timeout);

        let result = if cfg!(target_os = "windows") {
            Self::run_with_timeout(AsyncCommand::new("cmd").args(["/C", command]), timeout).await
        } else {
            Self::run_with_timeout(AsyncCommand::new("sh").arg("-c").arg(command), timeout).await
        };

        let execution_time = start_time.elapsed().as_millis();

        match result {
            Ok((output, exit_code)) => ExecutionResult {
                success: exit_code == 0,
                output,
                error: None,
                exit_code: Some(exit_code),
                execution_time_ms: execution_time,
            },
            Err(e) => ExecutionResult {
                success: false,
                output: String::new(),
                error: Some(format!("{e:#}")),
                exit_code: None,
                execution_time_ms: execution_time,
            },
        }
    }

    async fn run_with_timeout(command: &mut AsyncCommand, timeout: Duration) -> Result<(String, i32)> {
        let output = tokio::time::timeout(
            timeout,
            command
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("Command timed out")?
        .context("Failed to execute command")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined_output = if stderr.is_empty() {
            stdout.trim_end().to_string()
        } else {
            format!("{}\nSTDERR:\n{}", stdout.trim_end(), stderr.trim_end())
        };

        Ok((combined_output, output.status.code().unwrap_or(-1)))
    }
}

impl ActionExecutor for ShellActionExecutor {
    async fn invoke(&self, action: &ActionType) -> ActionOutcome {
        let Some(command) = self.commands.get(action.as_str()) else {
            return ActionOutcome::unavailable(format!("no command configured for {action}"));
        };

        info!("Running {} hook: {}", action, command);
        let result = Self::execute_shell_command(command, self.timeout).await;

        if result.success {
            ActionOutcome::applied(format!("{action}: `{command}` ({} ms)", result.execution_time_ms))
        } else {
            let reason = result
                .error
                .unwrap_or_else(|| format!("exit code {:?}: {}", result.exit_code, result.output));
            ActionOutcome::Failed(ActionError::Failed(reason))
        }
    }
}
