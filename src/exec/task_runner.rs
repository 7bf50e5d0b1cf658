// src/exec/task_runner.rs

//! Runs a function's command as a child process.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::exec::backend::{FunctionOutput, FunctionRunner, RunOutcome};
use crate::exec::directives::DirectiveParser;
use crate::triggers::invocation::InvocationRequest;
use crate::triggers::model::FunctionDefinition;

/// Environment variable carrying the invocation id.
pub const INVOCATION_ID_ENV: &str = "JOBHOST_INVOCATION_ID";
/// Environment variable carrying the function id.
pub const FUNCTION_ENV: &str = "JOBHOST_FUNCTION";
/// Prefix of the per-argument environment variables.
pub const ARG_ENV_PREFIX: &str = "JOBHOST_ARG_";

/// [`FunctionRunner`] that runs `sh -c <cmd>`.
///
/// Arguments are exposed as `JOBHOST_ARG_<NAME>` environment variables and
/// stdout lines are scanned for output directives. Exit status 0 means
/// success.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    directives: Arc<DirectiveParser>,
}

impl ProcessRunner {
    pub fn new() -> crate::errors::Result<Self> {
        Ok(Self {
            directives: Arc::new(DirectiveParser::new()?),
        })
    }
}

impl FunctionRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        function: &'a FunctionDefinition,
        request: &'a InvocationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RunOutcome>> + Send + 'a>> {
        Box::pin(run_process(self.directives.clone(), function, request))
    }
}

/// `JOBHOST_ARG_` plus the upper-cased name, non-alphanumerics as `_`.
pub fn arg_env_name(name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{ARG_ENV_PREFIX}{suffix}")
}

async fn run_process(
    directives: Arc<DirectiveParser>,
    function: &FunctionDefinition,
    request: &InvocationRequest,
) -> Result<RunOutcome> {
    let function_id = function.id();
    info!(
        invocation = %request.id,
        function = %function_id,
        cmd = %function.command,
        "starting function process"
    );

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&function.command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&function.command);
        c
    };

    cmd.env(INVOCATION_ID_ENV, request.id.to_string())
        .env(FUNCTION_ENV, &function_id);
    for (name, value) in &request.args {
        cmd.env(arg_env_name(name), value);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for function '{function_id}'"))?;

    let stdout_task = child.stdout.take().map(|stdout| {
        let invocation = request.id;
        tokio::spawn(async move {
            let mut outputs = Vec::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(%invocation, "stdout: {}", line);
                if let Some(output) = directives.parse(&line) {
                    outputs.push(output);
                }
            }
            outputs
        })
    });

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let invocation = request.id;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(%invocation, "stderr: {}", line);
            }
        });
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of function '{function_id}'"))?;

    let outputs: Vec<FunctionOutput> = match stdout_task {
        Some(task) => task
            .await
            .with_context(|| format!("reading stdout of function '{function_id}'"))?,
        None => Vec::new(),
    };

    let code = status.code();
    info!(
        invocation = %request.id,
        function = %function_id,
        exit_code = code.unwrap_or(-1),
        success = status.success(),
        outputs = outputs.len(),
        "function process exited"
    );

    if status.success() {
        Ok(RunOutcome {
            success: true,
            exit_code: code,
            outputs,
        })
    } else {
        Ok(RunOutcome::failed(code))
    }
}
