//! Registry of first-class, deterministic scripts.
//!
//! Registered scripts are trusted Rust implementations invoked
//! synchronously through the gateway. The registry records usage telemetry
//! on successful invocations; that telemetry is what hot-loaded scripts
//! graduate into. The registry is an owned, constructor-injected service —
//! there is no process-wide registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bimbridge_host::ParamValue;

use crate::domain::{EngineError, Result};
use crate::gateway::IsolationGateway;

use super::engine::ScriptExecutionContext;

/// Descriptive metadata for a registered script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub name: String,
    /// Source path for scripts materialized on disk; `None` for built-ins.
    pub path: Option<PathBuf>,
    pub description: String,
    /// Names of the arguments the script understands.
    pub parameters: Vec<String>,
    pub usage_count: u32,
    pub last_used: Option<DateTime<Utc>>,
}

impl ScriptMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            description: description.into(),
            parameters: Vec::new(),
            usage_count: 0,
            last_used: None,
        }
    }

    pub fn with_parameters(mut self, parameters: &[&str]) -> Self {
        self.parameters = parameters.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// A trusted, deterministic script implementation.
#[async_trait]
pub trait RegisteredScript: Send + Sync {
    async fn run(
        &self,
        gateway: &IsolationGateway,
        ctx: &ScriptExecutionContext,
    ) -> Result<serde_json::Value>;
}

struct RegistryEntry {
    metadata: ScriptMetadata,
    runner: Arc<dyn RegisteredScript>,
}

/// Named script registry with usage telemetry.
pub struct ScriptRegistry {
    gateway: Arc<IsolationGateway>,
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl ScriptRegistry {
    /// An empty registry.
    pub fn new(gateway: Arc<IsolationGateway>) -> Self {
        Self {
            gateway,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A registry pre-loaded with the bundled deterministic scripts.
    pub fn with_builtins(gateway: Arc<IsolationGateway>) -> Self {
        let registry = Self::new(gateway);
        registry.register(
            ScriptMetadata::new("element_counter", "Count elements in a category")
                .with_parameters(&["category"]),
            Arc::new(ElementCounterScript),
        );
        registry.register(
            ScriptMetadata::new(
                "renumber_panels",
                "Relabel the selected panels sequentially",
            )
            .with_parameters(&["prefix"]),
            Arc::new(RenumberPanelsScript),
        );
        registry
    }

    pub fn register(&self, metadata: ScriptMetadata, runner: Arc<dyn RegisteredScript>) {
        let mut entries = self.entries.lock().unwrap();
        tracing::debug!(script = %metadata.name, "script registered");
        entries.insert(metadata.name.clone(), RegistryEntry { metadata, runner });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().unwrap().contains_key(name)
    }

    pub fn metadata(&self, name: &str) -> Option<ScriptMetadata> {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|e| e.metadata.clone())
    }

    pub fn list(&self) -> Vec<ScriptMetadata> {
        let entries = self.entries.lock().unwrap();
        let mut all: Vec<ScriptMetadata> =
            entries.values().map(|e| e.metadata.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Invoke a registered script synchronously.
    ///
    /// Telemetry (usage count, last-used) is recorded only on success.
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &ScriptExecutionContext,
    ) -> Result<serde_json::Value> {
        let runner = {
            let entries = self.entries.lock().unwrap();
            entries
                .get(name)
                .map(|e| Arc::clone(&e.runner))
                .ok_or_else(|| EngineError::UnknownScript(name.to_string()))?
        };

        let value = runner.run(&self.gateway, ctx).await?;

        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(name) {
            entry.metadata.usage_count += 1;
            entry.metadata.last_used = Some(Utc::now());
        }
        tracing::debug!(script = name, "registered script invoked");
        Ok(value)
    }

    /// Remove materialized entries not used within `max_age`.
    ///
    /// Built-ins (no path) and never-invoked entries are kept.
    pub fn cleanup(&self, max_age: Duration) -> u32 {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::days(365));
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.metadata.path.is_none()
                || entry
                    .metadata
                    .last_used
                    .map(|used| used >= cutoff)
                    .unwrap_or(true)
        });
        (before - entries.len()) as u32
    }
}

// ---------------------------------------------------------------------------
// Built-in deterministic scripts
// ---------------------------------------------------------------------------

/// Count elements in one category; `args.category` defaults to "Walls".
struct ElementCounterScript;

#[async_trait]
impl RegisteredScript for ElementCounterScript {
    async fn run(
        &self,
        gateway: &IsolationGateway,
        ctx: &ScriptExecutionContext,
    ) -> Result<serde_json::Value> {
        let category = ctx
            .args
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("Walls")
            .to_string();
        let elements = gateway.elements_by_category(&category).await?;
        Ok(serde_json::json!({
            "category": category,
            "count": elements.len(),
        }))
    }
}

/// Relabel selected panels `PREFIX-001`, `PREFIX-002`, ... in selection order.
struct RenumberPanelsScript;

#[async_trait]
impl RegisteredScript for RenumberPanelsScript {
    async fn run(
        &self,
        gateway: &IsolationGateway,
        ctx: &ScriptExecutionContext,
    ) -> Result<serde_json::Value> {
        let prefix = ctx
            .args
            .get("prefix")
            .and_then(|v| v.as_str())
            .unwrap_or("FLC")
            .to_string();

        let selected = gateway.selected_elements().await?;
        let mut renumbered = Vec::new();
        for (index, element) in selected.iter().enumerate() {
            let label = format!("{prefix}-{:03}", index + 1);
            gateway
                .set_element_parameter(
                    element.id,
                    "BIMSF_Label",
                    ParamValue::Text(label.clone()),
                )
                .await?;
            renumbered.push(serde_json::json!({
                "element_id": element.id,
                "label": label,
            }));
        }

        Ok(serde_json::json!({
            "prefix": prefix,
            "renumbered": renumbered.len(),
            "labels": renumbered,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimbridge_host::{HostDocument, MemoryDocument, Parameter};

    fn registry_with_doc() -> (Arc<MemoryDocument>, ScriptRegistry) {
        let doc = Arc::new(MemoryDocument::new().with_catalog("Walls", &["FLC_Interior"]));
        let gateway = Arc::new(IsolationGateway::new(
            Arc::clone(&doc) as Arc<dyn HostDocument>
        ));
        (doc, ScriptRegistry::with_builtins(gateway))
    }

    #[tokio::test]
    async fn test_element_counter_counts_category() {
        let (doc, registry) = registry_with_doc();
        doc.seed_element("Walls", "FLC_Interior", "W1", vec![]);
        doc.seed_element("Walls", "FLC_Interior", "W2", vec![]);
        doc.seed_element("Panels", "FLC_Panel", "P1", vec![]);

        let ctx = ScriptExecutionContext {
            args: serde_json::json!({"category": "Walls"}),
            ..Default::default()
        };
        let value = registry.invoke("element_counter", &ctx).await.unwrap();
        assert_eq!(value["count"], 2);

        let metadata = registry.metadata("element_counter").unwrap();
        assert_eq!(metadata.usage_count, 1);
        assert!(metadata.last_used.is_some());
    }

    #[tokio::test]
    async fn test_renumber_panels_relabels_selection() {
        let (doc, registry) = registry_with_doc();
        let a = doc.seed_element(
            "Panels",
            "FLC_Panel",
            "P1",
            vec![Parameter::new("BIMSF_Label", ParamValue::Text("old".into()))],
        );
        let b = doc.seed_element(
            "Panels",
            "FLC_Panel",
            "P2",
            vec![Parameter::new("BIMSF_Label", ParamValue::Text("old".into()))],
        );
        doc.set_selection(vec![a, b]);

        let ctx = ScriptExecutionContext::default();
        let value = registry.invoke("renumber_panels", &ctx).await.unwrap();
        assert_eq!(value["renumbered"], 2);

        let params = doc.element_parameters(b).await.unwrap();
        let label = params.iter().find(|p| p.name == "BIMSF_Label").unwrap();
        assert_eq!(label.value.as_text(), Some("FLC-002"));
    }

    #[tokio::test]
    async fn test_unknown_script_is_typed_error() {
        let (_doc, registry) = registry_with_doc();
        let err = registry
            .invoke("does_not_exist", &ScriptExecutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownScript(_)));
    }

    #[test]
    fn test_cleanup_keeps_builtins() {
        let (_doc, registry) = registry_with_doc();
        let removed = registry.cleanup(Duration::from_secs(0));
        assert_eq!(removed, 0);
        assert!(registry.contains("element_counter"));
        assert!(registry.contains("renumber_panels"));
    }
}
