//! Scripts: registry, hot-loader, engines, and the bridge that routes
//! between them.
//!
//! # Modules
//!
//! - [`registry`] — first-class deterministic scripts + usage telemetry
//! - [`hotload`]  — materialize/execute generated scripts atomically,
//!   graduation scoring, artifact sweep
//! - [`engine`]   — `ScriptEngine` seam + `ProcessEngine` (separate
//!   interpreter process over stdio)
//! - [`bridge`]   — `ScriptBridge::invoke` routing and `ScriptSource`

pub mod bridge;
pub mod engine;
pub mod hotload;
pub mod registry;

pub use bridge::{
    GeneratedScript, ScriptBridge, ScriptInvocation, ScriptResponse, ScriptSource,
    TemplateScriptSource, SCRIPT_TYPE_EXISTING, SCRIPT_TYPE_HOTLOADED,
};
pub use engine::{
    MaterializedScript, ProcessEngine, ScriptEngine, ScriptExecutionContext, ScriptKind,
};
pub use hotload::{
    HotLoadedScript, ScriptGraduationCandidate, ScriptHotLoader, ScriptRunReport,
};
pub use registry::{RegisteredScript, ScriptMetadata, ScriptRegistry};
