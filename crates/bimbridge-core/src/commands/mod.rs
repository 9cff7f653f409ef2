//! Command framework: validation, transactional execution, undo
//!
//! A `Command` is a typed, validated request to mutate the host document.
//! The `CommandFramework` runs the three validation phases in order,
//! executes the command body inside a single document transaction, records
//! domain events for every mutation, and rolls the transaction back on any
//! failure so no partial state is ever observable. Undo replays the inverse
//! of a command's recorded events inside its own transaction.
//!
//! Validation failures are returned to the caller and never retried here;
//! execution failures roll back and surface as failure results. Only the
//! infrastructure layer (`recovery`) retries anything.

pub mod create_wall;
pub mod set_parameter;
pub mod validation;

pub use create_wall::CreateWallCommand;
pub use set_parameter::SetParameterCommand;
pub use validation::{ValidationError, ValidationPhase, ValidationResult};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bimbridge_host::{ElementId, HostDocument, ParamValue};

use crate::domain::{EngineError, Result};
use crate::events::{EventPayload, EventStore};

/// Organization standards consulted by semantic validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignStandards {
    /// Wall heights (ft) allowed by the framing standard.
    pub standard_wall_heights_ft: Vec<f64>,
    /// Maximum wall length (ft) a single panel run may span.
    pub max_wall_length_ft: f64,
}

impl Default for DesignStandards {
    fn default() -> Self {
        Self {
            standard_wall_heights_ft: vec![8.0, 9.0, 10.0],
            max_wall_length_ft: 40.0,
        }
    }
}

/// Cooperative abort signal, checked between discrete steps.
///
/// Never preempts an in-flight host call.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-request execution context handed to every command.
#[derive(Clone)]
pub struct CommandContext {
    pub document: Arc<dyn HostDocument>,
    pub events: Arc<EventStore>,
    pub standards: Arc<DesignStandards>,
    pub command_id: Uuid,
    pub user_id: String,
    pub session_id: String,
    pub correlation_id: String,
    pub abort: AbortFlag,
}

impl CommandContext {
    /// Record a domain event under this command's identity.
    pub fn emit(&self, payload: EventPayload) -> u64 {
        self.events.append(
            self.command_id,
            &self.user_id,
            &self.session_id,
            &self.correlation_id,
            payload,
        )
    }

    /// Cooperative abort checkpoint; call between discrete steps.
    pub fn checkpoint(&self) -> Result<()> {
        if self.abort.is_aborted() {
            return Err(EngineError::Aborted);
        }
        Ok(())
    }
}

/// An element created during execution, with enough detail for undo.
#[derive(Debug, Clone)]
pub struct CreatedElement {
    pub element_id: ElementId,
    pub category: String,
    pub type_name: String,
}

/// A parameter modified during execution, with its previous value for undo.
#[derive(Debug, Clone)]
pub struct ModifiedParameter {
    pub element_id: ElementId,
    pub name: String,
    pub previous: ParamValue,
    pub current: ParamValue,
}

/// What a command body did (or, for preview, would do).
#[derive(Debug, Default)]
pub struct CommandOutcome {
    pub message: String,
    pub affected: Vec<ElementId>,
    pub created: Vec<CreatedElement>,
    pub modified: Vec<ModifiedParameter>,
    pub data: HashMap<String, serde_json::Value>,
}

/// Structured result of validate/preview/execute/undo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub elements_affected: u32,
    pub data: HashMap<String, serde_json::Value>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

impl CommandResult {
    fn succeeded(outcome: &CommandOutcome, started: Instant) -> Self {
        Self {
            success: true,
            message: outcome.message.clone(),
            elements_affected: outcome.affected.len() as u32,
            data: outcome.data.clone(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            error: None,
        }
    }

    fn failed(message: impl Into<String>, error: impl Into<String>, started: Instant) -> Self {
        Self {
            success: false,
            message: message.into(),
            elements_affected: 0,
            data: HashMap::new(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            error: Some(error.into()),
        }
    }

    fn rejected(validation: &ValidationResult, started: Instant) -> Self {
        let mut data = HashMap::new();
        if let Ok(value) = serde_json::to_value(validation) {
            data.insert("validation".to_string(), value);
        }
        Self {
            success: false,
            message: validation.summary(),
            elements_affected: 0,
            data,
            execution_time_ms: started.elapsed().as_millis() as u64,
            error: None,
        }
    }
}

/// A typed, validated request to mutate the host document.
///
/// Implementations provide the three validation phases and the mutating
/// body; the framework owns transactions, events, timeouts, and undo.
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unit-of-work cost estimate, for budget accounting upstream.
    fn estimated_budget(&self) -> u32 {
        1
    }

    /// Wall-clock budget; overruns abort and roll back.
    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Phase 1: schema/type/presence checks on parameters only.
    fn validate_static(&self) -> Vec<ValidationError>;

    /// Phase 2: checks against current document state.
    async fn validate_contextual(&self, ctx: &CommandContext) -> Result<Vec<ValidationError>>;

    /// Phase 3: business-rule checks; each violation carries a stable code.
    async fn validate_semantic(&self, ctx: &CommandContext) -> Result<Vec<ValidationError>>;

    /// Side-effect-free dry run describing what `run` would do.
    async fn preview(&self, ctx: &CommandContext) -> Result<CommandOutcome>;

    /// Mutating body; always invoked inside the framework's transaction.
    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutcome>;
}

/// Orchestrates validation, transactional execution, and undo.
pub struct CommandFramework {
    document: Arc<dyn HostDocument>,
    events: Arc<EventStore>,
    standards: Arc<DesignStandards>,
    ping_interval: Duration,
}

impl CommandFramework {
    pub fn new(
        document: Arc<dyn HostDocument>,
        events: Arc<EventStore>,
        standards: Arc<DesignStandards>,
    ) -> Self {
        Self {
            document,
            events,
            standards,
            ping_interval: Duration::from_secs(2),
        }
    }

    /// Override the liveness ping interval.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Build a fresh context for one request.
    pub fn context(&self, user_id: &str, session_id: &str, correlation_id: &str) -> CommandContext {
        CommandContext {
            document: Arc::clone(&self.document),
            events: Arc::clone(&self.events),
            standards: Arc::clone(&self.standards),
            command_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            correlation_id: correlation_id.to_string(),
            abort: AbortFlag::default(),
        }
    }

    /// Run the three phases in order, stopping at the first failure.
    pub async fn validate(
        &self,
        command: &dyn Command,
        ctx: &CommandContext,
    ) -> Result<ValidationResult> {
        let static_errors = command.validate_static();
        if !static_errors.is_empty() {
            return Ok(ValidationResult::failed(
                ValidationPhase::Static,
                static_errors,
            ));
        }
        ctx.checkpoint()?;

        let contextual_errors = command.validate_contextual(ctx).await?;
        if !contextual_errors.is_empty() {
            return Ok(ValidationResult::failed(
                ValidationPhase::Contextual,
                contextual_errors,
            ));
        }
        ctx.checkpoint()?;

        let semantic_errors = command.validate_semantic(ctx).await?;
        if !semantic_errors.is_empty() {
            return Ok(ValidationResult::failed(
                ValidationPhase::Semantic,
                semantic_errors,
            ));
        }

        Ok(ValidationResult::passed())
    }

    /// Validate and dry-run without touching the document.
    pub async fn preview(
        &self,
        command: &dyn Command,
        ctx: &CommandContext,
    ) -> Result<CommandResult> {
        let started = Instant::now();
        let validation = self.validate(command, ctx).await?;
        if !validation.is_valid {
            return Ok(CommandResult::rejected(&validation, started));
        }
        let outcome = command.preview(ctx).await?;
        Ok(CommandResult::succeeded(&outcome, started))
    }

    /// Validate, then execute inside a single atomic document transaction.
    ///
    /// Any error or execution-budget overrun rolls the transaction back and
    /// emits `TransactionRolledBack`; success emits per-mutation events and
    /// `TransactionCommitted` with the affected-element count.
    pub async fn execute(
        &self,
        command: &dyn Command,
        ctx: &CommandContext,
    ) -> Result<CommandResult> {
        let started = Instant::now();

        let validation = self.validate(command, ctx).await?;
        if !validation.is_valid {
            tracing::info!(
                command = command.name(),
                phase = %validation.failed_phase,
                "command rejected by validation"
            );
            return Ok(CommandResult::rejected(&validation, started));
        }

        ctx.emit(EventPayload::TransactionStarted {
            command_name: command.name().to_string(),
        });
        self.document.begin_transaction(command.name()).await?;

        let ping = spawn_liveness_ping(command.name(), self.ping_interval);
        let limit = command.max_execution_time();
        let body = tokio::time::timeout(limit, command.run(ctx)).await;
        ping.abort();

        match body {
            Ok(Ok(outcome)) => {
                self.document.commit_transaction().await?;
                for created in &outcome.created {
                    ctx.emit(EventPayload::ElementCreated {
                        element_id: created.element_id,
                        category: created.category.clone(),
                        type_name: created.type_name.clone(),
                    });
                }
                for modified in &outcome.modified {
                    ctx.emit(EventPayload::ParameterChanged {
                        element_id: modified.element_id,
                        name: modified.name.clone(),
                        previous: modified.previous.clone(),
                        current: modified.current.clone(),
                    });
                }
                ctx.emit(EventPayload::TransactionCommitted {
                    elements_affected: outcome.affected.len() as u32,
                });
                tracing::info!(
                    command = command.name(),
                    affected = outcome.affected.len(),
                    "command committed"
                );
                Ok(CommandResult::succeeded(&outcome, started))
            }
            Ok(Err(err)) => {
                self.document.rollback_transaction().await?;
                ctx.emit(EventPayload::TransactionRolledBack {
                    error: err.to_string(),
                });
                tracing::warn!(command = command.name(), error = %err, "command rolled back");
                Ok(CommandResult::failed(
                    format!("{} failed and was rolled back", command.name()),
                    err.to_string(),
                    started,
                ))
            }
            Err(_) => {
                ctx.abort.abort();
                self.document.rollback_transaction().await?;
                let err = EngineError::TimedOut {
                    limit_ms: limit.as_millis() as u64,
                };
                ctx.emit(EventPayload::TransactionRolledBack {
                    error: err.to_string(),
                });
                tracing::warn!(command = command.name(), "command exceeded execution budget");
                Ok(CommandResult::failed(
                    format!("{} exceeded its execution budget", command.name()),
                    err.to_string(),
                    started,
                ))
            }
        }
    }

    /// Replay the inverse of a command's recorded events, newest first,
    /// inside a fresh transaction.
    ///
    /// Best-effort per event type: creation is undone by deletion, parameter
    /// changes by restoring the previous value; other variants are skipped.
    pub async fn undo(&self, command_id: Uuid, ctx: &CommandContext) -> Result<CommandResult> {
        let started = Instant::now();
        let events = self.events.events_for_command(command_id);
        if events.is_empty() {
            return Ok(CommandResult::failed(
                "nothing to undo",
                format!("no events recorded for command {command_id}"),
                started,
            ));
        }

        self.document.begin_transaction("undo").await?;
        let mut reversed = 0u32;
        let mut inverse_events = Vec::new();

        let replay: Result<()> = async {
            for event in events.iter().rev() {
                ctx.checkpoint()?;
                match &event.payload {
                    EventPayload::ElementCreated { element_id, .. } => {
                        self.document.delete_element(*element_id).await?;
                        inverse_events.push(EventPayload::ElementDeleted {
                            element_id: *element_id,
                        });
                        reversed += 1;
                    }
                    EventPayload::ParameterChanged {
                        element_id,
                        name,
                        previous,
                        current,
                    } => {
                        self.document
                            .set_parameter(*element_id, name, previous.clone())
                            .await?;
                        inverse_events.push(EventPayload::ParameterChanged {
                            element_id: *element_id,
                            name: name.clone(),
                            previous: current.clone(),
                            current: previous.clone(),
                        });
                        reversed += 1;
                    }
                    // Lifecycle markers have no inverse.
                    _ => {}
                }
            }
            Ok(())
        }
        .await;

        match replay {
            Ok(()) => {
                self.document.commit_transaction().await?;
                for payload in inverse_events {
                    ctx.emit(payload);
                }
                ctx.emit(EventPayload::UndoApplied {
                    undone_command_id: command_id,
                    events_reversed: reversed,
                });
                let outcome = CommandOutcome {
                    message: format!("undid {reversed} change(s)"),
                    affected: Vec::new(),
                    ..Default::default()
                };
                let mut result = CommandResult::succeeded(&outcome, started);
                result.elements_affected = reversed;
                Ok(result)
            }
            Err(err) => {
                self.document.rollback_transaction().await?;
                ctx.emit(EventPayload::TransactionRolledBack {
                    error: err.to_string(),
                });
                Ok(CommandResult::failed(
                    "undo failed and was rolled back",
                    err.to_string(),
                    started,
                ))
            }
        }
    }
}

/// Emit periodic liveness pings while a command runs, so transport-level
/// timeouts are not tripped by long real work.
fn spawn_liveness_ping(command_name: &str, interval: Duration) -> tokio::task::JoinHandle<()> {
    let name = command_name.to_string();
    tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            tracing::debug!(
                command = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "command liveness ping"
            );
        }
    })
}

/// Fetch a required parameter, mapping absence to an execution error.
///
/// Post-validation this is unreachable for validated keys; the typed error
/// keeps the no-panic rule if a command skips validation in tests.
pub(crate) fn required_param<'a>(
    params: &'a HashMap<String, ParamValue>,
    key: &str,
) -> Result<&'a ParamValue> {
    params
        .get(key)
        .ok_or_else(|| EngineError::Execution(format!("missing parameter: {key}")))
}
