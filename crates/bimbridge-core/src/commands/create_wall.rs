//! Create a wall between two points.
//!
//! Semantic rules follow the framing standard: wall height must be one of
//! the organization's standard heights and the run length must not exceed
//! the maximum panelizable length.

use std::collections::HashMap;

use async_trait::async_trait;

use bimbridge_host::{InstanceSpec, ParamValue, Parameter};

use super::validation::{ValidationError, ValidationPhase};
use super::{required_param, Command, CommandContext, CommandOutcome, CreatedElement};
use crate::domain::Result;

const WALL_CATEGORY: &str = "Walls";
const LEVEL_CATEGORY: &str = "Levels";
const NUMERIC_KEYS: &[&str] = &["start_x", "start_y", "start_z", "end_x", "end_y", "end_z"];
const GEOMETRY_EPS: f64 = 1e-9;

/// Command parameters: `start_x/y/z`, `end_x/y/z`, `height_ft`,
/// `wall_type`, `level`.
pub struct CreateWallCommand {
    params: HashMap<String, ParamValue>,
}

impl CreateWallCommand {
    pub fn new(params: HashMap<String, ParamValue>) -> Self {
        Self { params }
    }

    /// Convenience constructor from typed fields.
    pub fn from_points(
        start: [f64; 3],
        end: [f64; 3],
        height_ft: f64,
        wall_type: &str,
        level: &str,
    ) -> Self {
        let mut params = HashMap::new();
        for (key, value) in NUMERIC_KEYS.iter().zip([
            start[0], start[1], start[2], end[0], end[1], end[2],
        ]) {
            params.insert(key.to_string(), ParamValue::Number(value));
        }
        params.insert("height_ft".into(), ParamValue::Number(height_ft));
        params.insert("wall_type".into(), ParamValue::Text(wall_type.into()));
        params.insert("level".into(), ParamValue::Text(level.into()));
        Self { params }
    }

    fn numeric(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(|v| v.coerce_f64().ok())
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_text())
    }

    fn length_ft(&self) -> Option<f64> {
        let dx = self.numeric("end_x")? - self.numeric("start_x")?;
        let dy = self.numeric("end_y")? - self.numeric("start_y")?;
        let dz = self.numeric("end_z")? - self.numeric("start_z")?;
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }
}

#[async_trait]
impl Command for CreateWallCommand {
    fn name(&self) -> &'static str {
        "create_wall"
    }

    fn validate_static(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for key in NUMERIC_KEYS.iter().chain(["height_ft"].iter()) {
            match self.params.get(*key) {
                None => errors.push(ValidationError::new(
                    ValidationPhase::Static,
                    *key,
                    format!("missing required parameter: {key}"),
                    "MISSING_PARAMETER",
                )),
                Some(value) if value.coerce_f64().is_err() => errors.push(ValidationError::new(
                    ValidationPhase::Static,
                    *key,
                    format!("parameter {key} must be numeric, got {value}"),
                    "PARAMETER_TYPE",
                )),
                Some(_) => {}
            }
        }

        for key in ["wall_type", "level"] {
            match self.params.get(key).and_then(|v| v.as_text()) {
                None => errors.push(ValidationError::new(
                    ValidationPhase::Static,
                    key,
                    format!("missing required text parameter: {key}"),
                    "MISSING_PARAMETER",
                )),
                Some("") => errors.push(ValidationError::new(
                    ValidationPhase::Static,
                    key,
                    format!("parameter {key} must not be empty"),
                    "EMPTY_PARAMETER",
                )),
                Some(_) => {}
            }
        }

        if let Some(height) = self.numeric("height_ft") {
            if height <= 0.0 {
                errors.push(ValidationError::new(
                    ValidationPhase::Static,
                    "height_ft",
                    format!("height must be positive, got {height}"),
                    "PARAMETER_RANGE",
                ));
            }
        }

        errors
    }

    async fn validate_contextual(&self, ctx: &CommandContext) -> Result<Vec<ValidationError>> {
        let mut errors = Vec::new();

        let wall_type = self.text("wall_type").unwrap_or_default();
        match ctx.document.catalog_types(WALL_CATEGORY).await {
            Ok(types) if types.iter().any(|t| t == wall_type) => {}
            Ok(_) => errors.push(ValidationError::new(
                ValidationPhase::Contextual,
                "wall_type",
                format!("wall type {wall_type} is not in the document catalog"),
                "UNRESOLVED_WALL_TYPE",
            )),
            Err(_) => errors.push(ValidationError::new(
                ValidationPhase::Contextual,
                "wall_type",
                "document has no wall catalog".to_string(),
                "UNRESOLVED_WALL_TYPE",
            )),
        }

        let level = self.text("level").unwrap_or_default();
        let levels = ctx
            .document
            .elements_by_category(LEVEL_CATEGORY)
            .await
            .unwrap_or_default();
        if !levels.iter().any(|l| l.name == level) {
            errors.push(ValidationError::new(
                ValidationPhase::Contextual,
                "level",
                format!("level {level} does not resolve in the document"),
                "UNRESOLVED_LEVEL",
            ));
        }

        if let Some(length) = self.length_ft() {
            if length < GEOMETRY_EPS {
                errors.push(ValidationError::new(
                    ValidationPhase::Contextual,
                    "end_x",
                    "wall is degenerate: start and end coincide".to_string(),
                    "DEGENERATE_GEOMETRY",
                ));
            }
        }

        Ok(errors)
    }

    async fn validate_semantic(&self, ctx: &CommandContext) -> Result<Vec<ValidationError>> {
        let mut errors = Vec::new();
        let standards = &ctx.standards;

        if let Some(height) = self.numeric("height_ft") {
            let is_standard = standards
                .standard_wall_heights_ft
                .iter()
                .any(|h| (h - height).abs() < 1e-6);
            if !is_standard {
                errors.push(ValidationError::new(
                    ValidationPhase::Semantic,
                    "height_ft",
                    format!(
                        "{height} ft is not a standard wall height ({:?})",
                        standards.standard_wall_heights_ft
                    ),
                    "FLC_HEIGHT_STANDARD",
                ));
            }
        }

        if let Some(length) = self.length_ft() {
            if length > standards.max_wall_length_ft {
                errors.push(ValidationError::new(
                    ValidationPhase::Semantic,
                    "end_x",
                    format!(
                        "wall length {length:.1} ft exceeds the {:.1} ft maximum",
                        standards.max_wall_length_ft
                    ),
                    "FLC_LENGTH_MAX",
                ));
            }
        }

        Ok(errors)
    }

    async fn preview(&self, _ctx: &CommandContext) -> Result<CommandOutcome> {
        let length = self.length_ft().unwrap_or_default();
        let height = self.numeric("height_ft").unwrap_or_default();
        let mut outcome = CommandOutcome {
            message: format!("would create 1 wall ({length:.1} ft x {height:.1} ft)"),
            ..Default::default()
        };
        outcome
            .data
            .insert("length_ft".into(), serde_json::json!(length));
        outcome
            .data
            .insert("height_ft".into(), serde_json::json!(height));
        Ok(outcome)
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutcome> {
        ctx.checkpoint()?;
        let wall_type = required_param(&self.params, "wall_type")?
            .as_text()
            .unwrap_or_default()
            .to_string();
        let level = required_param(&self.params, "level")?
            .as_text()
            .unwrap_or_default()
            .to_string();
        let height = required_param(&self.params, "height_ft")?.coerce_f64()?;
        let length = self.length_ft().unwrap_or_default();

        let spec = InstanceSpec {
            category: WALL_CATEGORY.to_string(),
            type_name: wall_type.clone(),
            name: format!("Wall {length:.1}ft @ {level}"),
            parameters: vec![
                Parameter::new("Length", ParamValue::Number(length)),
                Parameter::new("Unconnected Height", ParamValue::Number(height)),
                Parameter::new("Base Constraint", ParamValue::Text(level)),
            ],
        };
        let element_id = ctx.document.create_instance(spec).await?;

        let mut outcome = CommandOutcome {
            message: format!("created 1 wall ({length:.1} ft x {height:.1} ft)"),
            affected: vec![element_id],
            created: vec![CreatedElement {
                element_id,
                category: WALL_CATEGORY.to_string(),
                type_name: wall_type,
            }],
            ..Default::default()
        };
        outcome
            .data
            .insert("element_id".into(), serde_json::json!(element_id));
        Ok(outcome)
    }
}
