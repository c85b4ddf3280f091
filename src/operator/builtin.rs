// src/operator/builtin.rs

//! Operators available out of the box.

use std::process::Stdio;

use anyhow::{Context, anyhow, bail};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::dataflow::ExecutionResult;
use crate::operator::{Operator, OperatorConfig, OperatorContext, block_on_worker};

/// Result key used by [`LogOperator`].
pub const EXECUTION_LOG_KEY: &str = "";

/// Result key used by [`CommandOperator`].
pub const STDOUT_KEY: &str = "stdout";

/// Appends its node name to the union of its predecessors' execution logs.
///
/// Names already seen upstream are kept once, in first-seen order, so for a
/// diamond the result is a linearization of every path that reached it.
#[derive(Debug, Default)]
pub struct LogOperator;

impl Operator for LogOperator {
    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        info!(node = %ctx.identifier(), "running node");

        let mut log: Vec<String> = Vec::new();
        for (_, parent) in ctx.sorted_inputs() {
            let Some(entries) = parent
                .get(EXECUTION_LOG_KEY)
                .and_then(|r| r.value().as_array())
            else {
                continue;
            };
            for name in entries.iter().filter_map(Value::as_str) {
                if !log.iter().any(|seen| seen == name) {
                    log.push(name.to_string());
                }
            }
        }
        log.push(ctx.identifier().name().to_string());

        Ok(ExecutionResult::new(EXECUTION_LOG_KEY, log))
    }
}

/// Always fails. Optional `message` parameter.
#[derive(Debug, Default)]
pub struct FailOperator {
    message: Option<String>,
}

impl Operator for FailOperator {
    fn initialize(&mut self, config: &OperatorConfig) -> anyhow::Result<()> {
        self.message = config.param_str("message").map(str::to_string);
        Ok(())
    }

    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        let message = self.message.as_deref().unwrap_or("failed on purpose");
        Err(anyhow!("{message} (node '{}')", ctx.identifier()))
    }
}

/// Runs `params.cmd` through the platform shell.
///
/// The result is the command's trimmed stdout under [`STDOUT_KEY`]. A
/// non-zero exit is an operator failure. If the run is cancelled while the
/// command is running, the child is killed.
#[derive(Debug, Default)]
pub struct CommandOperator {
    cmd: String,
}

impl CommandOperator {
    async fn run_process(&self, ctx: &OperatorContext) -> anyhow::Result<String> {
        let node = ctx.identifier();
        info!(node = %node, cmd = %self.cmd, "starting command");

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.env("RUNDAG_NODE", node.name())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for node '{node}'"))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout of node '{node}' was not captured"))?;
        let stdout_reader = tokio::spawn(async move {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        });

        // Always consume stderr so buffers don't fill; log at debug.
        if let Some(stderr) = child.stderr.take() {
            let node = node.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(node = %node, "stderr: {}", line);
                }
            });
        }

        let cancelled = ctx.cancellation_token();
        let status = tokio::select! {
            status_res = child.wait() => {
                status_res.with_context(|| format!("waiting for process of node '{node}'"))?
            }

            _ = cancelled.cancelled() => {
                warn!(node = %node, "run cancelled; killing command");
                if let Err(e) = child.kill().await {
                    warn!(node = %node, error = %e, "failed to kill child process on cancellation");
                }
                stdout_reader.abort();
                bail!("command for node '{node}' cancelled");
            }
        };

        let code = status.code().unwrap_or(-1);
        info!(node = %node, exit_code = code, success = status.success(), "command exited");

        if !status.success() {
            bail!("command for node '{node}' exited with code {code}");
        }

        stdout_reader
            .await
            .with_context(|| format!("stdout reader for node '{node}' did not complete"))?
            .with_context(|| format!("reading stdout of node '{node}'"))
    }
}

impl Operator for CommandOperator {
    fn initialize(&mut self, config: &OperatorConfig) -> anyhow::Result<()> {
        self.cmd = config
            .param_str("cmd")
            .ok_or_else(|| anyhow!("node '{}': `command` operator needs a `cmd` parameter", config.node))?
            .to_string();
        Ok(())
    }

    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        let stdout = block_on_worker(self.run_process(ctx))??;

        Ok(ExecutionResult::new(STDOUT_KEY, stdout.trim_end().to_string()))
    }
}
