//! Bridge protocol: the JSON contract between the AI orchestrator and the
//! execution engine.
//!
//! Every request carries a correlation id; every response echoes it. Both
//! the `id` and `commandId` spellings are accepted on ingestion — a
//! field-name mismatch between producer and consumer once caused false
//! timeouts, so both sides of the bridge treat the spellings as equivalent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use bimbridge_host::ElementId;

/// An inbound envelope from the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    /// Correlation id; `commandId` is accepted as an alias.
    #[serde(alias = "commandId")]
    pub id: String,
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default = "default_session")]
    pub session_id: String,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

fn default_user() -> String {
    "ai-agent".to_string()
}

fn default_session() -> String {
    "default".to_string()
}

/// The discriminated request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    /// A typed command for the command framework.
    Command {
        name: String,
        #[serde(default)]
        parameters: HashMap<String, serde_json::Value>,
    },
    /// A script invocation for the script bridge.
    Script {
        #[serde(default)]
        script_name: Option<String>,
        #[serde(default)]
        description: String,
        #[serde(default)]
        args: serde_json::Value,
        #[serde(default)]
        target_ids: Vec<ElementId>,
    },
    /// A read-only selection query.
    SelectionQuery {
        #[serde(default)]
        category: Option<String>,
    },
}

/// The outbound envelope echoing the correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    #[serde(alias = "commandId")]
    pub id: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl BridgeResponse {
    pub fn ok(id: impl Into<String>, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            message: message.into(),
            data,
            script_type: None,
            error_code: None,
        }
    }

    pub fn failure(
        id: impl Into<String>,
        message: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            success: false,
            message: message.into(),
            data: serde_json::Value::Null,
            script_type: None,
            error_code: Some(error_code.into()),
        }
    }

    pub fn with_script_type(mut self, script_type: impl Into<String>) -> Self {
        self.script_type = Some(script_type.into());
        self
    }
}
