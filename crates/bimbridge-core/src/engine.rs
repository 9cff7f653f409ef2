//! Top-level execution engine: wires the command framework, script bridge,
//! gateway, and event store behind the bridge protocol.
//!
//! All services are owned and constructor-injected; tests build an engine
//! around a `MemoryDocument` and an in-process script engine.

use std::collections::HashMap;
use std::sync::Arc;

use bimbridge_host::{HostDocument, ParamValue};

use crate::commands::{
    Command, CommandFramework, CreateWallCommand, DesignStandards, SetParameterCommand,
};
use crate::config::EngineConfig;
use crate::domain::{EngineError, Result};
use crate::events::EventStore;
use crate::gateway::IsolationGateway;
use crate::protocol::{BridgeRequest, BridgeResponse, RequestPayload};
use crate::scripts::{
    ScriptBridge, ScriptEngine, ScriptExecutionContext, ScriptHotLoader, ScriptInvocation,
    ScriptRegistry, ScriptSource, TemplateScriptSource,
};

/// Build a typed command from a bridge request's name and parameters.
pub fn build_command(
    name: &str,
    parameters: HashMap<String, ParamValue>,
) -> Result<Box<dyn Command>> {
    match name {
        "create_wall" => Ok(Box::new(CreateWallCommand::new(parameters))),
        "set_parameter" => Ok(Box::new(SetParameterCommand::new(parameters))),
        other => Err(EngineError::UnknownCommand(other.to_string())),
    }
}

/// The assembled engine serving bridge requests.
pub struct ExecutionEngine {
    document: Arc<dyn HostDocument>,
    events: Arc<EventStore>,
    framework: CommandFramework,
    bridge: ScriptBridge,
}

impl ExecutionEngine {
    /// Assemble an engine around a host document and script engine.
    pub fn new(
        document: Arc<dyn HostDocument>,
        script_engine: Arc<dyn ScriptEngine>,
        config: EngineConfig,
    ) -> Result<Self> {
        Self::with_script_source(
            document,
            script_engine,
            Arc::new(TemplateScriptSource),
            config,
        )
    }

    /// Assemble an engine with a custom script source (e.g. an AI provider).
    pub fn with_script_source(
        document: Arc<dyn HostDocument>,
        script_engine: Arc<dyn ScriptEngine>,
        script_source: Arc<dyn ScriptSource>,
        config: EngineConfig,
    ) -> Result<Self> {
        let events = Arc::new(EventStore::new());
        let standards = Arc::new(DesignStandards::default());
        let framework = CommandFramework::new(
            Arc::clone(&document),
            Arc::clone(&events),
            Arc::clone(&standards),
        )
        .with_ping_interval(config.ping_interval);

        let gateway = Arc::new(IsolationGateway::new(Arc::clone(&document)));
        let registry = Arc::new(ScriptRegistry::with_builtins(Arc::clone(&gateway)));
        let hot_loader = Arc::new(ScriptHotLoader::new(
            config.hot_loader,
            script_engine,
            gateway,
        )?);
        let bridge = ScriptBridge::new(registry, hot_loader, script_source);

        Ok(Self {
            document,
            events,
            framework,
            bridge,
        })
    }

    pub fn events(&self) -> &Arc<EventStore> {
        &self.events
    }

    pub fn framework(&self) -> &CommandFramework {
        &self.framework
    }

    pub fn script_bridge(&self) -> &ScriptBridge {
        &self.bridge
    }

    /// Serve one bridge request; every outcome is a response echoing the
    /// correlation id.
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        let id = request.id.clone();
        match request.payload {
            RequestPayload::Command { name, parameters } => {
                self.handle_command(&id, &request.user_id, &request.session_id, &name, parameters)
                    .await
            }
            RequestPayload::Script {
                script_name,
                description,
                args,
                target_ids,
            } => {
                let invocation = ScriptInvocation {
                    script_name,
                    description,
                    args: args.clone(),
                    target_ids: target_ids.clone(),
                };
                let ctx = ScriptExecutionContext {
                    user_id: request.user_id,
                    session_id: request.session_id,
                    correlation_id: id.clone(),
                    args,
                    target_ids,
                };
                let response = self.bridge.invoke(&invocation, &ctx).await;
                let data = serde_json::json!({
                    "result": response.data,
                    "executionTimeMs": response.execution_time_ms,
                });
                let mut out = if response.success {
                    BridgeResponse::ok(id, response.message, data)
                } else {
                    BridgeResponse::failure(id, response.message, "script_error")
                };
                out.script_type = Some(response.script_type);
                out
            }
            RequestPayload::SelectionQuery { category } => {
                let elements = match category {
                    Some(category) => self.document.elements_by_category(&category).await,
                    None => self.document.selected_elements().await,
                };
                match elements {
                    Ok(elements) => match serde_json::to_value(&elements) {
                        Ok(data) => BridgeResponse::ok(
                            id,
                            format!("{} element(s)", elements.len()),
                            data,
                        ),
                        Err(err) => BridgeResponse::failure(id, err.to_string(), "serialization"),
                    },
                    Err(err) => BridgeResponse::failure(id, err.to_string(), "query_failed"),
                }
            }
        }
    }

    async fn handle_command(
        &self,
        id: &str,
        user_id: &str,
        session_id: &str,
        name: &str,
        raw_parameters: HashMap<String, serde_json::Value>,
    ) -> BridgeResponse {
        // Checked conversion at the boundary: reject composite payloads here
        // rather than letting them coerce inside a command.
        let mut parameters = HashMap::with_capacity(raw_parameters.len());
        for (key, value) in raw_parameters {
            match ParamValue::from_json(&value) {
                Ok(value) => {
                    parameters.insert(key, value);
                }
                Err(err) => {
                    return BridgeResponse::failure(
                        id,
                        format!("parameter {key}: {err}"),
                        "invalid_parameter",
                    );
                }
            }
        }

        let ctx = self.framework.context(user_id, session_id, id);

        // Undo is addressed by the original command's id, not a new command.
        if name == "undo" {
            let Some(target) = parameters
                .get("command_id")
                .and_then(|v| v.as_text())
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
            else {
                return BridgeResponse::failure(
                    id,
                    "undo requires a command_id parameter",
                    "invalid_parameter",
                );
            };
            return match self.framework.undo(target, &ctx).await {
                Ok(result) => command_result_response(id, result),
                Err(err) => BridgeResponse::failure(id, err.to_string(), "execution_error"),
            };
        }

        let command = match build_command(name, parameters) {
            Ok(command) => command,
            Err(err) => {
                return BridgeResponse::failure(id, err.to_string(), "unknown_command");
            }
        };

        match self.framework.execute(command.as_ref(), &ctx).await {
            Ok(result) => {
                let mut response = command_result_response(id, result);
                if let Some(data) = response.data.as_object_mut() {
                    data.insert("commandId".into(), serde_json::json!(ctx.command_id));
                }
                response
            }
            Err(err) => BridgeResponse::failure(id, err.to_string(), "execution_error"),
        }
    }
}

fn command_result_response(id: &str, result: crate::commands::CommandResult) -> BridgeResponse {
    let data = serde_json::json!({
        "elementsAffected": result.elements_affected,
        "executionTimeMs": result.execution_time_ms,
        "data": result.data,
    });
    if result.success {
        BridgeResponse::ok(id, result.message, data)
    } else {
        let mut response = BridgeResponse::failure(
            id,
            result.message,
            result
                .error
                .as_deref()
                .map(|_| "execution_error")
                .unwrap_or("validation_failed"),
        );
        response.data = data;
        response
    }
}
