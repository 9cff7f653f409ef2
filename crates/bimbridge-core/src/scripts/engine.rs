//! Script execution engines.
//!
//! `ScriptEngine` is the seam between the hot-loader and whatever actually
//! runs the script. The production implementation, `ProcessEngine`, spawns
//! a separate interpreter process and speaks a newline-delimited JSON
//! protocol over its stdio: the child sends capability calls, the engine
//! answers them through the gateway, and the child finishes with a single
//! `result` (or `error`) message. The child never receives host handles —
//! the gateway is its entire world.
//!
//! Wire protocol, one JSON object per line:
//!
//! engine → child (first line): the `ScriptExecutionContext`
//! child  → engine: `{"type":"capability","request":{"op":...}}`
//! engine → child: the `CapabilityResponse`
//! child  → engine (last line): `{"type":"result","value":...}`
//!                          or  `{"type":"error","message":"..."}`

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use bimbridge_host::ElementId;

use crate::domain::{EngineError, Result};
use crate::gateway::{CapabilityRequest, IsolationGateway};

/// What kind of source a script is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Python,
    Expression,
}

impl ScriptKind {
    /// Detect the kind from the script name's extension, falling back to
    /// content heuristics for extensionless generated sources.
    pub fn detect(name: &str, source: &str) -> Self {
        if name.ends_with(".py") {
            return ScriptKind::Python;
        }
        if source.contains("import ") || source.contains("def ") {
            return ScriptKind::Python;
        }
        ScriptKind::Expression
    }

    pub fn extension(self) -> &'static str {
        match self {
            ScriptKind::Python => "py",
            ScriptKind::Expression => "expr",
        }
    }
}

/// A script written to the cache directory, ready to execute.
#[derive(Debug, Clone)]
pub struct MaterializedScript {
    pub name: String,
    pub kind: ScriptKind,
    pub path: PathBuf,
    /// SHA-256 of the source, hex-encoded.
    pub content_digest: String,
}

/// Context passed to every script execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptExecutionContext {
    pub user_id: String,
    pub session_id: String,
    pub correlation_id: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub target_ids: Vec<ElementId>,
}

/// Runs a materialized script. All document access must go through the
/// gateway argument; implementations never receive host handles.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    async fn execute(
        &self,
        script: &MaterializedScript,
        ctx: &ScriptExecutionContext,
        gateway: Arc<IsolationGateway>,
    ) -> Result<serde_json::Value>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChildMessage {
    Capability { request: CapabilityRequest },
    Result { value: serde_json::Value },
    Error { message: String },
}

/// Production engine: one interpreter process per execution.
pub struct ProcessEngine {
    interpreter: String,
    timeout: Duration,
}

impl ProcessEngine {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl ScriptEngine for ProcessEngine {
    async fn execute(
        &self,
        script: &MaterializedScript,
        ctx: &ScriptExecutionContext,
        gateway: Arc<IsolationGateway>,
    ) -> Result<serde_json::Value> {
        let mut child = tokio::process::Command::new(&self.interpreter)
            .arg(&script.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Script("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Script("child stdout unavailable".into()))?;
        let mut lines = BufReader::new(stdout).lines();

        let conversation = async {
            let mut context_line = serde_json::to_string(ctx)?;
            context_line.push('\n');
            stdin.write_all(context_line.as_bytes()).await?;

            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                let message: ChildMessage = serde_json::from_str(&line)
                    .map_err(|e| EngineError::Script(format!("malformed script message: {e}")))?;
                match message {
                    ChildMessage::Capability { request } => {
                        let response = gateway.dispatch(request).await;
                        let mut reply = serde_json::to_string(&response)?;
                        reply.push('\n');
                        stdin.write_all(reply.as_bytes()).await?;
                    }
                    ChildMessage::Result { value } => return Ok(value),
                    ChildMessage::Error { message } => {
                        return Err(EngineError::Script(message));
                    }
                }
            }
            Err(EngineError::Script(
                "script exited without reporting a result".into(),
            ))
        };

        match tokio::time::timeout(self.timeout, conversation).await {
            Ok(result) => {
                let _ = child.wait().await;
                result
            }
            Err(_) => {
                child.kill().await.ok();
                Err(EngineError::Script(format!(
                    "script timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}
