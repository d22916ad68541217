//! Wrapper around the ToolHive CLI (`thv`) and `docker` for the operations
//! that have no control-plane endpoint: running and removing workloads,
//! registry catalog queries and container log retrieval.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use toolhive_mcp_core::ThvError;

/// Deadline for commands that pull images and start containers.
const RUN_TIMEOUT: Duration = Duration::from_secs(60);
/// Deadline for read-only queries: search, registry lookups, log retrieval.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured outcome of one CLI invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CliOutput {
    /// Exit code; -1 when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// The invocation as a display string, for result payloads and logs.
    pub command: String,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Promote a non-zero exit into a process error carrying stderr.
    pub fn into_result(self) -> Result<CliOutput, ThvError> {
        if self.success() {
            Ok(self)
        } else {
            let detail = if self.stderr.trim().is_empty() {
                self.stdout.trim().to_string()
            } else {
                self.stderr.trim().to_string()
            };
            Err(ThvError::process(format!(
                "`{}` exited with code {}: {detail}",
                self.command, self.exit_code
            )))
        }
    }
}

/// Flags accepted by `thv run`, mirroring the CLI's own flag names.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunOptions {
    pub name: Option<String>,
    pub transport: Option<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub target_port: Option<u16>,
    pub target_host: Option<String>,
    pub permission_profile: Option<String>,
    pub env_vars: Vec<String>,
    pub volumes: Vec<String>,
    pub secrets: Vec<String>,
    pub foreground: bool,
    pub detach: bool,
    pub args: Vec<String>,
}

impl RunOptions {
    /// Argument vector for `thv run`, excluding the executable itself.
    pub fn command_line(&self, target: &str) -> Vec<String> {
        let mut argv = vec!["run".to_string()];
        if let Some(name) = &self.name {
            argv.push("--name".to_string());
            argv.push(name.clone());
        }
        if let Some(transport) = &self.transport {
            argv.push("--transport".to_string());
            argv.push(transport.clone());
        }
        if let Some(port) = self.port {
            argv.push("--port".to_string());
            argv.push(port.to_string());
        }
        if let Some(host) = &self.host {
            argv.push("--host".to_string());
            argv.push(host.clone());
        }
        if let Some(target_port) = self.target_port {
            argv.push("--target-port".to_string());
            argv.push(target_port.to_string());
        }
        if let Some(target_host) = &self.target_host {
            argv.push("--target-host".to_string());
            argv.push(target_host.clone());
        }
        if let Some(profile) = &self.permission_profile {
            argv.push("--permission-profile".to_string());
            argv.push(profile.clone());
        }
        for var in &self.env_vars {
            argv.push("-e".to_string());
            argv.push(var.clone());
        }
        for volume in &self.volumes {
            argv.push("-v".to_string());
            argv.push(volume.clone());
        }
        for secret in &self.secrets {
            argv.push("--secret".to_string());
            argv.push(secret.clone());
        }
        if self.foreground {
            argv.push("--foreground".to_string());
        }
        if self.detach {
            argv.push("--detach".to_string());
        }
        argv.push(target.to_string());
        if !self.args.is_empty() {
            argv.push("--".to_string());
            argv.extend(self.args.iter().cloned());
        }
        argv
    }
}

/// CLI-backed operations, trait-bounded for test substitution.
#[async_trait]
pub trait CliBackend: Send + Sync {
    async fn run_server(&self, target: &str, options: &RunOptions) -> Result<CliOutput, ThvError>;
    async fn remove_server(&self, name: &str, force: bool) -> Result<CliOutput, ThvError>;
    async fn search(&self, query: &str, format: &str) -> Result<CliOutput, ThvError>;
    async fn registry_catalog(&self) -> Result<CliOutput, ThvError>;
    async fn registry_info(&self, name: &str) -> Result<CliOutput, ThvError>;
    async fn container_logs(&self, name: &str, lines: u64) -> Result<CliOutput, ThvError>;
}

/// Real `thv` invoker via `tokio::process`.
#[derive(Debug, Clone)]
pub struct ThvCli {
    cli_path: String,
}

impl ThvCli {
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    async fn exec(
        &self,
        program: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CliOutput, ThvError> {
        let command = format!("{program} {}", argv.join(" "));
        debug!(%command, "running CLI command");
        let fut = Command::new(program)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| ThvError::timeout(format!("`{command}` did not finish in time")))?
            .map_err(|e| ThvError::process(format!("failed to run `{program}`: {e}")))?;
        Ok(CliOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            command,
        })
    }

    async fn thv(&self, argv: Vec<String>, timeout: Duration) -> Result<CliOutput, ThvError> {
        self.exec(self.cli_path.as_str(), &argv, timeout).await
    }
}

#[async_trait]
impl CliBackend for ThvCli {
    async fn run_server(&self, target: &str, options: &RunOptions) -> Result<CliOutput, ThvError> {
        self.thv(options.command_line(target), RUN_TIMEOUT).await
    }

    async fn remove_server(&self, name: &str, force: bool) -> Result<CliOutput, ThvError> {
        let mut argv = vec!["rm".to_string(), name.to_string()];
        if force {
            argv.push("--force".to_string());
        }
        self.thv(argv, RUN_TIMEOUT).await
    }

    async fn search(&self, query: &str, format: &str) -> Result<CliOutput, ThvError> {
        self.thv(
            vec![
                "search".to_string(),
                query.to_string(),
                "--format".to_string(),
                format.to_string(),
            ],
            QUERY_TIMEOUT,
        )
        .await
    }

    async fn registry_catalog(&self) -> Result<CliOutput, ThvError> {
        self.thv(
            vec![
                "registry".to_string(),
                "list".to_string(),
                "--format".to_string(),
                "json".to_string(),
            ],
            QUERY_TIMEOUT,
        )
        .await
    }

    async fn registry_info(&self, name: &str) -> Result<CliOutput, ThvError> {
        self.thv(
            vec![
                "registry".to_string(),
                "info".to_string(),
                name.to_string(),
                "--format".to_string(),
                "json".to_string(),
            ],
            QUERY_TIMEOUT,
        )
        .await
    }

    async fn container_logs(&self, name: &str, lines: u64) -> Result<CliOutput, ThvError> {
        self.exec(
            "docker",
            &[
                "logs".to_string(),
                "--tail".to_string(),
                lines.to_string(),
                name.to_string(),
            ],
            QUERY_TIMEOUT,
        )
        .await
    }
}
