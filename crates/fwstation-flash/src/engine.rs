//! The retry-flash engine

use crate::command::FlashCommand;
use crate::error::{FlashAttemptError, FlashError};
use crate::policy::{RetryDecision, RetryPolicy, decide};
use async_trait::async_trait;
use fwstation_config::FirmwareConfig;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const STDERR_TAIL_LINES: usize = 5;

/// Outcome of a whole attempt sequence
#[derive(Debug, Clone, PartialEq)]
pub struct FlashOutcome {
    /// Whether an attempt succeeded
    pub ok: bool,
    /// Operator-facing reason; the last attempt error on failure
    pub reason: String,
    /// Wall time of the sequence, settle and retry delays included
    pub elapsed_seconds: f64,
    /// Attempts that ran
    pub attempts_used: u32,
}

/// Flashes a firmware image onto the device behind a serial port
#[async_trait]
pub trait FirmwareFlasher: Send + Sync {
    /// Flash `firmware` through `port`
    async fn flash(&self, port: &str, firmware: &Path) -> FlashOutcome;
}

/// Engine parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSettings {
    /// Command template with `{port}`, `{firmware}` and `{baudrate}`
    pub command_template: String,
    /// Baud rate substituted into the template
    pub baudrate: u32,
    /// Hard limit per attempt
    pub attempt_timeout: Duration,
    /// Wait before the first attempt
    pub settle_delay: Duration,
    /// Retry behavior
    pub retry: RetryPolicy,
}

impl FlashSettings {
    /// Settings from the `firmware` configuration section
    pub fn from_config(firmware: &FirmwareConfig) -> Self {
        Self {
            command_template: firmware.command.clone(),
            baudrate: firmware.baudrate,
            attempt_timeout: firmware.timeout(),
            settle_delay: firmware.settle_delay(),
            retry: RetryPolicy {
                max_attempts: firmware.retry_count.max(1),
                retry_delay: firmware.retry_delay(),
                abort_on_missing_tool: firmware.abort_on_missing_tool,
            },
        }
    }
}

/// Runs the external flashing tool under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct FlashEngine {
    settings: FlashSettings,
}

impl FlashEngine {
    /// Create an engine
    pub fn new(settings: FlashSettings) -> Self {
        Self { settings }
    }

    /// Engine parameters
    pub fn settings(&self) -> &FlashSettings {
        &self.settings
    }

    /// Run `<tool> --version` to check the flashing tool can be started.
    ///
    /// Returns the first line the tool printed.
    pub async fn tool_version(&self) -> Result<String, FlashError> {
        let program = FlashCommand::program_of(&self.settings.command_template)
            .ok_or(FlashError::EmptyTemplate)?;

        let output = timeout(
            VERSION_TIMEOUT,
            Command::new(program)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_elapsed| FlashError::ToolUnavailable(format!("{program} --version timed out")))?
        .map_err(|e| FlashError::ToolUnavailable(format!("{program}: {e}")))?;

        // Some tools (avrdude) print their banner on stderr and exit non-zero for --version.
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn run_attempt(&self, command: &FlashCommand) -> Result<(), FlashAttemptError> {
        let limit = self.settings.attempt_timeout;
        let mut child = Command::new(&command.program);
        child
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(limit, child.output()).await {
            Err(_elapsed) => return Err(FlashAttemptError::Timeout(limit.as_secs())),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(FlashAttemptError::ToolNotFound(command.program.clone()));
            }
            Ok(Err(e)) => return Err(FlashAttemptError::Spawn(e.to_string())),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(stdout = %stdout.trim(), stderr = %stderr.trim(), "Flash tool output");

        if output.status.success() {
            return Ok(());
        }

        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines
            .get(lines.len().saturating_sub(STDERR_TAIL_LINES)..)
            .unwrap_or_default()
            .join("\n");
        if !tail.is_empty() {
            warn!(stderr = %tail, "Flash tool reported errors");
        }

        match output.status.code() {
            Some(code) => Err(FlashAttemptError::ExitCode(code)),
            None => Err(FlashAttemptError::Terminated),
        }
    }
}

#[async_trait]
impl FirmwareFlasher for FlashEngine {
    async fn flash(&self, port: &str, firmware: &Path) -> FlashOutcome {
        let started = Instant::now();
        let settings = &self.settings;
        let max_attempts = settings.retry.max_attempts.max(1);

        let command = match FlashCommand::from_template(
            &settings.command_template,
            port,
            firmware,
            settings.baudrate,
        ) {
            Ok(command) => command,
            Err(e) => {
                return FlashOutcome {
                    ok: false,
                    reason: e.to_string(),
                    elapsed_seconds: started.elapsed().as_secs_f64(),
                    attempts_used: 0,
                };
            }
        };

        info!(port, firmware = %firmware.display(), "Starting flash");
        debug!(command = %command.display_line(), "Flash command");
        sleep(settings.settle_delay).await;

        let mut attempt = 1;
        loop {
            info!(attempt, max_attempts, port, "Flash attempt");
            let error = match self.run_attempt(&command).await {
                Ok(()) => {
                    let elapsed_seconds = started.elapsed().as_secs_f64();
                    info!(attempt, elapsed_seconds, "Flash succeeded");
                    return FlashOutcome {
                        ok: true,
                        reason: "flash completed successfully".to_string(),
                        elapsed_seconds,
                        attempts_used: attempt,
                    };
                }
                Err(error) => error,
            };
            warn!(attempt, max_attempts, error = %error, "Flash attempt failed");

            match decide(attempt, &error, &settings.retry) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(?delay, "Waiting before next flash attempt");
                    sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp { reason } => {
                    let elapsed_seconds = started.elapsed().as_secs_f64();
                    warn!(attempts = attempt, %reason, "Flash failed");
                    return FlashOutcome {
                        ok: false,
                        reason,
                        elapsed_seconds,
                        attempts_used: attempt,
                    };
                }
            }
        }
    }
}
