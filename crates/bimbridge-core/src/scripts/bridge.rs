//! Script bridge: route invocations to registered or generated scripts.
//!
//! A request naming a registered script runs it synchronously and is tagged
//! `existing_script`. Anything else falls through to generation: a
//! `ScriptSource` produces source text (bundled templates or an AI
//! provider), the hot-loader executes it atomically, and the response is
//! tagged `ai_generated_hotloaded`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use bimbridge_host::ElementId;

use crate::domain::{EngineError, Result};

use super::engine::ScriptExecutionContext;
use super::hotload::{ScriptGraduationCandidate, ScriptHotLoader};
use super::registry::ScriptRegistry;

/// Response tag for a registered script run.
pub const SCRIPT_TYPE_EXISTING: &str = "existing_script";
/// Response tag for a generated, hot-loaded script run.
pub const SCRIPT_TYPE_HOTLOADED: &str = "ai_generated_hotloaded";

/// An inbound script invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInvocation {
    /// Registered script to run; `None` (or an unknown name) falls through
    /// to generation.
    pub script_name: Option<String>,
    /// What the script should do; drives template/AI generation.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub target_ids: Vec<ElementId>,
}

/// Structured response from the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResponse {
    pub success: bool,
    pub message: String,
    pub script_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub execution_time_ms: u64,
}

/// Generated script source, ready for the hot-loader.
#[derive(Debug, Clone)]
pub struct GeneratedScript {
    pub name: String,
    pub source: String,
}

/// Produces script source for invocations with no registered match.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn generate(&self, request: &ScriptInvocation) -> Result<GeneratedScript>;
}

/// Bundled templates keyed on invocation description keywords.
///
/// Templates speak the engine's stdio capability protocol: read the context
/// line, emit capability calls, finish with a result line.
pub struct TemplateScriptSource;

const COUNT_TEMPLATE: &str = r#"import json, sys

ctx = json.loads(sys.stdin.readline())
category = (ctx.get("args") or {}).get("category", "Walls")
print(json.dumps({"type": "capability",
                  "request": {"op": "get_elements_by_category", "category": category}}))
sys.stdout.flush()
reply = json.loads(sys.stdin.readline())
if not reply["success"]:
    print(json.dumps({"type": "error", "message": reply["error"]}))
    sys.exit(0)
print(json.dumps({"type": "result",
                  "value": {"category": category, "count": len(reply["data"])}}))
"#;

const RELABEL_TEMPLATE: &str = r#"import json, sys

ctx = json.loads(sys.stdin.readline())
prefix = (ctx.get("args") or {}).get("prefix", "FLC")
print(json.dumps({"type": "capability", "request": {"op": "get_selected_elements"}}))
sys.stdout.flush()
reply = json.loads(sys.stdin.readline())
if not reply["success"]:
    print(json.dumps({"type": "error", "message": reply["error"]}))
    sys.exit(0)
count = 0
for index, element in enumerate(reply["data"]):
    label = "%s-%03d" % (prefix, index + 1)
    print(json.dumps({"type": "capability",
                      "request": {"op": "set_element_parameter",
                                  "element_id": element["id"],
                                  "name": "BIMSF_Label",
                                  "value": label}}))
    sys.stdout.flush()
    reply2 = json.loads(sys.stdin.readline())
    if not reply2["success"]:
        print(json.dumps({"type": "error", "message": reply2["error"]}))
        sys.exit(0)
    count += 1
print(json.dumps({"type": "result", "value": {"relabeled": count}}))
"#;

#[async_trait]
impl ScriptSource for TemplateScriptSource {
    async fn generate(&self, request: &ScriptInvocation) -> Result<GeneratedScript> {
        let description = request.description.to_lowercase();
        if description.contains("count") {
            return Ok(GeneratedScript {
                name: "generated_counter.py".into(),
                source: COUNT_TEMPLATE.into(),
            });
        }
        if description.contains("relabel") || description.contains("renumber") {
            return Ok(GeneratedScript {
                name: "generated_relabel.py".into(),
                source: RELABEL_TEMPLATE.into(),
            });
        }
        Err(EngineError::UnknownScript(format!(
            "no template matches request: {}",
            request.description
        )))
    }
}

/// Routes invocations between the registry and the hot-loader.
pub struct ScriptBridge {
    registry: Arc<ScriptRegistry>,
    hot_loader: Arc<ScriptHotLoader>,
    source: Arc<dyn ScriptSource>,
}

impl ScriptBridge {
    pub fn new(
        registry: Arc<ScriptRegistry>,
        hot_loader: Arc<ScriptHotLoader>,
        source: Arc<dyn ScriptSource>,
    ) -> Self {
        Self {
            registry,
            hot_loader,
            source,
        }
    }

    /// Handle one invocation; every outcome is a structured response.
    pub async fn invoke(
        &self,
        request: &ScriptInvocation,
        ctx: &ScriptExecutionContext,
    ) -> ScriptResponse {
        if let Some(name) = request
            .script_name
            .as_deref()
            .filter(|name| self.registry.contains(name))
        {
            let started = Instant::now();
            return match self.registry.invoke(name, ctx).await {
                Ok(value) => ScriptResponse {
                    success: true,
                    message: format!("script {name} executed"),
                    script_type: SCRIPT_TYPE_EXISTING.into(),
                    data: value,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                },
                Err(err) => ScriptResponse {
                    success: false,
                    message: format!("script {name} failed: {err}"),
                    script_type: SCRIPT_TYPE_EXISTING.into(),
                    data: serde_json::Value::Null,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                },
            };
        }

        let started = Instant::now();
        let generated = match self.source.generate(request).await {
            Ok(generated) => generated,
            Err(err) => {
                return ScriptResponse {
                    success: false,
                    message: format!("script generation failed: {err}"),
                    script_type: SCRIPT_TYPE_HOTLOADED.into(),
                    data: serde_json::Value::Null,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        match self
            .hot_loader
            .load_and_execute(&generated.source, &generated.name, ctx)
            .await
        {
            Ok(report) => ScriptResponse {
                success: true,
                message: format!("script {} hot-loaded and executed", report.name),
                script_type: SCRIPT_TYPE_HOTLOADED.into(),
                data: report.value,
                execution_time_ms: report.execution_time_ms,
            },
            Err(err) => ScriptResponse {
                success: false,
                message: format!("hot-loaded script failed: {err}"),
                script_type: SCRIPT_TYPE_HOTLOADED.into(),
                data: serde_json::Value::Null,
                execution_time_ms: started.elapsed().as_millis() as u64,
            },
        }
    }

    /// Graduation recommendations from the hot-loader cache.
    pub fn graduation_candidates(
        &self,
        min_execution_count: u32,
    ) -> Vec<ScriptGraduationCandidate> {
        self.hot_loader.graduation_candidates(min_execution_count)
    }

    /// Sweep stale registry entries and script artifacts.
    pub fn cleanup(&self, max_age: Duration) -> Result<u32> {
        let removed = self.registry.cleanup(max_age);
        let deleted = self.hot_loader.cleanup(max_age)?;
        Ok(removed + deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_template_source_selects_by_description() {
        let source = TemplateScriptSource;
        let request = ScriptInvocation {
            script_name: None,
            description: "count the walls on level 1".into(),
            args: serde_json::Value::Null,
            target_ids: vec![],
        };
        let generated = source.generate(&request).await.unwrap();
        assert_eq!(generated.name, "generated_counter.py");
        assert!(generated.source.contains("get_elements_by_category"));
    }

    #[tokio::test]
    async fn test_template_source_rejects_unmatched() {
        let source = TemplateScriptSource;
        let request = ScriptInvocation {
            script_name: None,
            description: "paint everything blue".into(),
            args: serde_json::Value::Null,
            target_ids: vec![],
        };
        assert!(source.generate(&request).await.is_err());
    }
}
