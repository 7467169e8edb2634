// Subprocess sandbox for custom tool code. Parameters arrive as JSON on
// stdin; the code must print exactly one JSON object on stdout.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Result of a sandboxed tool execution.
#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl SandboxResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn to_json(&self) -> Value {
        match (&self.data, &self.error) {
            (Some(data), _) if self.success => serde_json::json!({"success": true, "data": data}),
            (_, Some(error)) => serde_json::json!({"success": false, "error": error}),
            _ => serde_json::json!({"success": self.success}),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    interpreter: String,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
        }
    }
}

impl SandboxExecutor {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Run `code` in a child process with a killable wall-clock timeout.
    /// Failures never propagate as errors; they come back as a structured
    /// result so the caller can feed them to the model.
    pub async fn execute(&self, code: &str, params: &Value, timeout: Duration) -> SandboxResult {
        let spawned = Command::new(&self.interpreter)
            .arg("-c")
            .arg(code)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return SandboxResult::failure(format!("failed to spawn sandbox: {e}")),
        };

        if let Some(mut stdin) = child.stdin.take() {
            let input = params.to_string();
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                return SandboxResult::failure(format!("failed to write sandbox stdin: {e}"));
            }
            drop(stdin);
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return SandboxResult::failure(format!("sandbox wait failed: {e}")),
            Err(_) => {
                return SandboxResult::failure(format!("Timeout after {}s", timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let error = if stderr.is_empty() {
                format!("Exit code {}", output.status.code().unwrap_or(-1))
            } else {
                stderr
            };
            return SandboxResult::failure(error);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return SandboxResult::failure("No output produced");
        }

        match serde_json::from_str::<Value>(&stdout) {
            Ok(data) => SandboxResult {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(_) => SandboxResult::failure(format!(
                "Output is not valid JSON: {}",
                &stdout[..stdout.len().min(200)]
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn echo_tool_round_trips_params() {
        let executor = SandboxExecutor::default();
        let code = "import json, sys\nparams = json.load(sys.stdin)\nprint(json.dumps({\"echo\": params[\"x\"]}))";
        let result = executor
            .execute(code, &json!({"x": 7}), Duration::from_secs(10))
            .await;
        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert_eq!(result.data.unwrap()["echo"], 7);
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let executor = SandboxExecutor::default();
        let code = "import time\ntime.sleep(30)";
        let result = executor
            .execute(code, &json!({}), Duration::from_millis(300))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_stderr() {
        let executor = SandboxExecutor::default();
        let code = "import sys\nsys.stderr.write(\"boom\")\nsys.exit(2)";
        let result = executor.execute(code, &json!({}), Duration::from_secs(10)).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn invalid_json_output_is_a_structured_failure() {
        let executor = SandboxExecutor::default();
        let code = "print(\"not json\")";
        let result = executor.execute(code, &json!({}), Duration::from_secs(10)).await;
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("not valid JSON"));
        assert_eq!(result.to_json()["success"], false);
    }
}
