//! End-to-end command framework tests: phase ordering, transactional
//! execution, rollback equality, and event-sourced undo.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use bimbridge_core::commands::{
    Command, CommandContext, CommandFramework, CommandOutcome, CreateWallCommand,
    CreatedElement, DesignStandards, SetParameterCommand, ValidationError, ValidationPhase,
};
use bimbridge_core::events::{EventPayload, EventStore};
use bimbridge_core::{EngineError, Result};
use bimbridge_host::{
    ElementId, HostDocument, InstanceSpec, MemoryDocument, ParamValue, Parameter,
};

fn framing_document() -> Arc<MemoryDocument> {
    let doc = MemoryDocument::new().with_catalog("Walls", &["Generic - 6\"", "FLC_Interior"]);
    doc.seed_element("Levels", "Level", "Level 1", vec![]);
    Arc::new(doc)
}

fn framework(doc: &Arc<MemoryDocument>) -> CommandFramework {
    CommandFramework::new(
        Arc::clone(doc) as Arc<dyn HostDocument>,
        Arc::new(EventStore::new()),
        Arc::new(DesignStandards::default()),
    )
}

fn wall(height_ft: f64) -> CreateWallCommand {
    CreateWallCommand::from_points(
        [0.0, 0.0, 0.0],
        [20.0, 0.0, 0.0],
        height_ft,
        "FLC_Interior",
        "Level 1",
    )
}

// -------------------------------------------------------------------------
// Validation phase ordering
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_standard_wall_passes_all_phases_and_affects_one_element() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-1");

    let command = wall(9.0);
    let validation = framework.validate(&command, &ctx).await.unwrap();
    assert!(validation.is_valid);
    assert_eq!(validation.failed_phase, ValidationPhase::None);

    let result = framework.execute(&command, &ctx).await.unwrap();
    assert!(result.success, "{:?}", result);
    assert_eq!(result.elements_affected, 1);
    assert_eq!(doc.element_count(), 2); // level + wall
}

#[tokio::test]
async fn test_nonstandard_height_fails_semantic_with_stable_code() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-2");

    let validation = framework.validate(&wall(7.0), &ctx).await.unwrap();
    assert!(!validation.is_valid);
    // Static and Contextual passed; only the Semantic phase reported errors.
    assert_eq!(validation.failed_phase, ValidationPhase::Semantic);
    assert!(validation
        .errors
        .iter()
        .all(|e| e.phase == ValidationPhase::Semantic));
    assert_eq!(validation.errors[0].code, "FLC_HEIGHT_STANDARD");
}

#[tokio::test]
async fn test_static_failure_short_circuits_later_phases() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-3");

    // Missing every parameter: even contextual checks would also fail, but
    // they must never be evaluated.
    let command = CreateWallCommand::new(Default::default());
    let validation = framework.validate(&command, &ctx).await.unwrap();

    assert!(!validation.is_valid);
    assert_eq!(validation.failed_phase, ValidationPhase::Static);
    assert!(validation
        .errors
        .iter()
        .all(|e| e.phase == ValidationPhase::Static));
}

#[tokio::test]
async fn test_unresolved_wall_type_fails_contextual() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-4");

    let command = CreateWallCommand::from_points(
        [0.0, 0.0, 0.0],
        [20.0, 0.0, 0.0],
        9.0,
        "Imaginary_Type",
        "Level 1",
    );
    let validation = framework.validate(&command, &ctx).await.unwrap();
    assert_eq!(validation.failed_phase, ValidationPhase::Contextual);
    assert_eq!(validation.errors[0].code, "UNRESOLVED_WALL_TYPE");
}

#[tokio::test]
async fn test_overlong_wall_fails_semantic_length_rule() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-5");

    let command = CreateWallCommand::from_points(
        [0.0, 0.0, 0.0],
        [41.0, 0.0, 0.0],
        9.0,
        "FLC_Interior",
        "Level 1",
    );
    let validation = framework.validate(&command, &ctx).await.unwrap();
    assert_eq!(validation.failed_phase, ValidationPhase::Semantic);
    assert_eq!(validation.errors[0].code, "FLC_LENGTH_MAX");
}

#[tokio::test]
async fn test_validation_rejection_never_touches_the_document() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-6");
    let before = doc.state_digest().await.unwrap();

    let result = framework.execute(&wall(7.0), &ctx).await.unwrap();
    assert!(!result.success);
    assert_eq!(doc.state_digest().await.unwrap(), before);
    // No transaction events either: validation failures are local.
    assert!(ctx.events.events_for_command(ctx.command_id).is_empty());
}

// -------------------------------------------------------------------------
// Execution, rollback, events
// -------------------------------------------------------------------------

/// Creates a wall, then fails — the framework must roll everything back.
struct SabotagedCommand;

#[async_trait]
impl Command for SabotagedCommand {
    fn name(&self) -> &'static str {
        "sabotaged"
    }

    fn validate_static(&self) -> Vec<ValidationError> {
        Vec::new()
    }

    async fn validate_contextual(&self, _ctx: &CommandContext) -> Result<Vec<ValidationError>> {
        Ok(Vec::new())
    }

    async fn validate_semantic(&self, _ctx: &CommandContext) -> Result<Vec<ValidationError>> {
        Ok(Vec::new())
    }

    async fn preview(&self, _ctx: &CommandContext) -> Result<CommandOutcome> {
        Ok(CommandOutcome::default())
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutcome> {
        ctx.document
            .create_instance(InstanceSpec {
                category: "Walls".into(),
                type_name: "FLC_Interior".into(),
                name: "doomed".into(),
                parameters: vec![],
            })
            .await?;
        Err(EngineError::Execution("simulated mid-command failure".into()))
    }
}

#[tokio::test]
async fn test_failed_execution_restores_document_byte_for_byte() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-7");
    let before = doc.state_digest().await.unwrap();

    let result = framework.execute(&SabotagedCommand, &ctx).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("simulated"));
    assert_eq!(doc.state_digest().await.unwrap(), before);

    let events = ctx.events.events_for_command(ctx.command_id);
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::TransactionRolledBack { error } if error.contains("simulated")
    )));
    // No committed/created events leaked.
    assert!(!events
        .iter()
        .any(|e| matches!(e.payload, EventPayload::TransactionCommitted { .. })));
}

#[tokio::test]
async fn test_successful_execution_emits_ordered_events() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-8");

    framework.execute(&wall(9.0), &ctx).await.unwrap();

    let events = ctx.events.events_for_command(ctx.command_id);
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match &e.payload {
            EventPayload::TransactionStarted { .. } => "started",
            EventPayload::ElementCreated { .. } => "created",
            EventPayload::TransactionCommitted { .. } => "committed",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["started", "created", "committed"]);

    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));

    match &events[2].payload {
        EventPayload::TransactionCommitted { elements_affected } => {
            assert_eq!(*elements_affected, 1)
        }
        other => panic!("expected TransactionCommitted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_preview_is_side_effect_free() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-9");
    let before = doc.state_digest().await.unwrap();

    let result = framework.preview(&wall(9.0), &ctx).await.unwrap();
    assert!(result.success);
    assert!(result.message.contains("would create"));
    assert_eq!(doc.state_digest().await.unwrap(), before);
}

/// Sleeps far past its execution budget.
struct GlacialCommand;

#[async_trait]
impl Command for GlacialCommand {
    fn name(&self) -> &'static str {
        "glacial"
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_millis(50)
    }

    fn validate_static(&self) -> Vec<ValidationError> {
        Vec::new()
    }

    async fn validate_contextual(&self, _ctx: &CommandContext) -> Result<Vec<ValidationError>> {
        Ok(Vec::new())
    }

    async fn validate_semantic(&self, _ctx: &CommandContext) -> Result<Vec<ValidationError>> {
        Ok(Vec::new())
    }

    async fn preview(&self, _ctx: &CommandContext) -> Result<CommandOutcome> {
        Ok(CommandOutcome::default())
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutcome> {
        ctx.document
            .create_instance(InstanceSpec {
                category: "Walls".into(),
                type_name: "FLC_Interior".into(),
                name: "slow".into(),
                parameters: vec![],
            })
            .await?;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(CommandOutcome::default())
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_overrun_aborts_and_rolls_back() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-10");
    let before = doc.state_digest().await.unwrap();

    let result = framework.execute(&GlacialCommand, &ctx).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("execution budget"));
    assert!(ctx.abort.is_aborted());
    assert_eq!(doc.state_digest().await.unwrap(), before);
}

// -------------------------------------------------------------------------
// Undo
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_undo_deletes_created_wall_and_records_deletion() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-11");

    framework.execute(&wall(9.0), &ctx).await.unwrap();
    assert_eq!(doc.element_count(), 2);

    let undo_ctx = framework.context("ai", "s1", "undo-11");
    let result = framework.undo(ctx.command_id, &undo_ctx).await.unwrap();
    assert!(result.success);
    assert_eq!(result.elements_affected, 1);
    assert_eq!(doc.element_count(), 1); // only the level remains

    let undo_events = undo_ctx.events.events_for_command(undo_ctx.command_id);
    assert!(undo_events
        .iter()
        .any(|e| matches!(e.payload, EventPayload::ElementDeleted { .. })));
    assert!(undo_events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::UndoApplied { undone_command_id, .. } if *undone_command_id == ctx.command_id
    )));
}

#[tokio::test]
async fn test_undo_restores_previous_parameter_value() {
    let doc = framing_document();
    let target = doc.seed_element(
        "Panels",
        "FLC_Panel",
        "P1",
        vec![Parameter::new(
            "BIMSF_Label",
            ParamValue::Text("FLC-001".into()),
        )],
    );
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-12");

    let command =
        SetParameterCommand::from_fields(target, "BIMSF_Label", ParamValue::Text("FLC-099".into()));
    let result = framework.execute(&command, &ctx).await.unwrap();
    assert!(result.success, "{:?}", result);

    let undo_ctx = framework.context("ai", "s1", "undo-12");
    framework.undo(ctx.command_id, &undo_ctx).await.unwrap();

    let params = doc.element_parameters(target).await.unwrap();
    let label = params.iter().find(|p| p.name == "BIMSF_Label").unwrap();
    assert_eq!(label.value.as_text(), Some("FLC-001"));
}

#[tokio::test]
async fn test_undo_of_unknown_command_is_explicit_failure() {
    let doc = framing_document();
    let framework = framework(&doc);
    let ctx = framework.context("ai", "s1", "corr-13");

    let result = framework.undo(uuid::Uuid::new_v4(), &ctx).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.message, "nothing to undo");
}

// -------------------------------------------------------------------------
// Command metadata used by transport budgeting
// -------------------------------------------------------------------------

#[test]
fn test_created_element_detail_supports_inverse() {
    let created = CreatedElement {
        element_id: ElementId(5),
        category: "Walls".into(),
        type_name: "FLC_Interior".into(),
    };
    assert_eq!(created.element_id, ElementId(5));
}
