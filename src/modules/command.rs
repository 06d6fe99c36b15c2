//! Command module: run a local process.
//!
//! The command string is rendered through the template engine against the
//! host's scope, then split on whitespace and executed without a shell.
//! Args accept either a plain string or `{cmd: ..., chdir: ...}`.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tracing::debug;

use super::{ExecOptions, Module};
use crate::vars::template;

/// Module for executing commands on the control node.
pub struct CommandModule;

impl CommandModule {
    fn parse_args(args: &JsonValue) -> Result<(String, Option<String>), String> {
        match args {
            JsonValue::String(cmd) => Ok((cmd.clone(), None)),
            JsonValue::Object(map) => {
                let cmd = map
                    .get("cmd")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "command requires a 'cmd' argument".to_string())?;
                let chdir = map
                    .get("chdir")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                Ok((cmd.to_string(), chdir))
            }
            other => Err(format!("invalid command args: {}", other)),
        }
    }
}

#[async_trait]
impl Module for CommandModule {
    fn name(&self) -> &'static str {
        "command"
    }

    fn description(&self) -> &'static str {
        "Execute a command without going through a shell"
    }

    async fn invoke(&self, opts: ExecOptions<'_>) -> (String, String) {
        let (raw_cmd, chdir) = match Self::parse_args(opts.args) {
            Ok(parsed) => parsed,
            Err(err) => return (String::new(), err),
        };

        let scope = match opts.variables.get_all(opts.host) {
            Ok(scope) => scope,
            Err(err) => return (String::new(), err.to_string()),
        };
        let rendered = match template::render(&scope, &raw_cmd) {
            Ok(rendered) => rendered,
            Err(err) => return (String::new(), format!("render command: {}", err)),
        };

        let mut parts = rendered.split_whitespace();
        let Some(program) = parts.next() else {
            return (String::new(), "command is empty".to_string());
        };
        let mut command = Command::new(program);
        command.args(parts);
        if let Some(dir) = chdir {
            command.current_dir(dir);
        }

        debug!(host = opts.host, command = %rendered, "running command");
        match command.output().await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
                let mut stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
                if !output.status.success() && stderr.is_empty() {
                    stderr = format!("command exited with status {}", output.status);
                }
                (stdout, stderr)
            }
            Err(err) => (String::new(), format!("spawn '{}': {}", rendered, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::task::Task;
    use crate::vars::{Inventory, VariableStore};
    use serde_json::json;

    async fn run(args: JsonValue) -> (String, String) {
        let variables = VariableStore::new(Inventory::new(["web1"]));
        let task = Task::default();
        let pipeline = Pipeline::default();
        CommandModule
            .invoke(ExecOptions {
                args: &args,
                host: "web1",
                variables: &variables,
                task: &task,
                pipeline: &pipeline,
            })
            .await
    }

    #[tokio::test]
    async fn captures_stdout() {
        let (stdout, stderr) = run(json!("echo hi")).await;
        assert_eq!(stdout, "hi");
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_sets_stderr() {
        let (_, stderr) = run(json!({"cmd": "false"})).await;
        assert!(!stderr.is_empty());
    }

    #[tokio::test]
    async fn missing_cmd_argument() {
        let (_, stderr) = run(json!({"chdir": "/tmp"})).await;
        assert!(stderr.contains("cmd"));
    }

    #[tokio::test]
    async fn renders_template_in_command() {
        let (stdout, stderr) = run(json!("echo {{ inventory_hostname }}")).await;
        assert_eq!(stdout, "web1");
        assert!(stderr.is_empty());
    }
}
