//! bimbridge Core Library
//!
//! Command execution and script hot-loading engine for a live BIM host
//! document: three-phase command validation with transactional execution
//! and event-sourced undo, a script bridge with an isolated hot-loader,
//! and backoff/stream-recovery infrastructure for the transport.

pub mod commands;
pub mod config;
pub mod domain;
pub mod engine;
pub mod events;
pub mod gateway;
pub mod protocol;
pub mod recovery;
pub mod scripts;
pub mod telemetry;

pub use commands::{
    AbortFlag, Command, CommandContext, CommandFramework, CommandOutcome, CommandResult,
    CreateWallCommand, DesignStandards, SetParameterCommand, ValidationError, ValidationPhase,
    ValidationResult,
};

pub use config::{EngineConfig, HotLoaderConfig};

pub use domain::{EngineError, Result};

pub use engine::{build_command, ExecutionEngine};

pub use events::{DomainEvent, EventId, EventPayload, EventStore};

pub use gateway::{CapabilityRequest, CapabilityResponse, IsolationGateway};

pub use protocol::{BridgeRequest, BridgeResponse, RequestPayload};

pub use recovery::{
    BackoffPolicy, ConnectionSupervisor, RecoveryAttempt, RecoveryError, RecoveryNotification,
    RecoveryState, StreamError, StreamErrorKind, StreamRecovery,
};

pub use scripts::{
    HotLoadedScript, ProcessEngine, RegisteredScript, ScriptBridge, ScriptEngine,
    ScriptExecutionContext, ScriptGraduationCandidate, ScriptHotLoader, ScriptInvocation,
    ScriptKind, ScriptMetadata, ScriptRegistry, ScriptResponse, ScriptSource,
    TemplateScriptSource,
};

pub use telemetry::init_tracing;

/// bimbridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
