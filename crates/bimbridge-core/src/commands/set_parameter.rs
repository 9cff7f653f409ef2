//! Set a single parameter on an existing element.
//!
//! Records the previous value so the change can be undone by replaying the
//! inverse `ParameterChanged` event.

use std::collections::HashMap;

use async_trait::async_trait;

use bimbridge_host::{ElementId, ParamValue};

use super::validation::{ValidationError, ValidationPhase};
use super::{required_param, Command, CommandContext, CommandOutcome, ModifiedParameter};
use crate::domain::{EngineError, Result};

/// Panel label parameter governed by the framing label standard.
const LABEL_PARAMETER: &str = "BIMSF_Label";

/// Command parameters: `element_id` (integer), `name` (text), `value` (any).
pub struct SetParameterCommand {
    params: HashMap<String, ParamValue>,
}

impl SetParameterCommand {
    pub fn new(params: HashMap<String, ParamValue>) -> Self {
        Self { params }
    }

    pub fn from_fields(element: ElementId, name: &str, value: ParamValue) -> Self {
        let mut params = HashMap::new();
        params.insert("element_id".into(), ParamValue::Integer(element.0 as i64));
        params.insert("name".into(), ParamValue::Text(name.into()));
        params.insert("value".into(), value);
        Self { params }
    }

    fn element_id(&self) -> Option<ElementId> {
        let raw = self.params.get("element_id")?.as_integer()?;
        u64::try_from(raw).ok().map(ElementId)
    }

    fn parameter_name(&self) -> Option<&str> {
        self.params.get("name")?.as_text()
    }
}

/// A label is shop-floor friendly: uppercase letters, digits, and dashes.
fn is_standard_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

#[async_trait]
impl Command for SetParameterCommand {
    fn name(&self) -> &'static str {
        "set_parameter"
    }

    fn validate_static(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        match self.params.get("element_id") {
            None => errors.push(ValidationError::new(
                ValidationPhase::Static,
                "element_id",
                "missing required parameter: element_id",
                "MISSING_PARAMETER",
            )),
            Some(value) => {
                if value.as_integer().map(u64::try_from).and_then(|r| r.ok()).is_none() {
                    errors.push(ValidationError::new(
                        ValidationPhase::Static,
                        "element_id",
                        format!("element_id must be a non-negative integer, got {value}"),
                        "PARAMETER_TYPE",
                    ));
                }
            }
        }

        match self.parameter_name() {
            None => errors.push(ValidationError::new(
                ValidationPhase::Static,
                "name",
                "missing required text parameter: name",
                "MISSING_PARAMETER",
            )),
            Some("") => errors.push(ValidationError::new(
                ValidationPhase::Static,
                "name",
                "parameter name must not be empty",
                "EMPTY_PARAMETER",
            )),
            Some(_) => {}
        }

        if !self.params.contains_key("value") {
            errors.push(ValidationError::new(
                ValidationPhase::Static,
                "value",
                "missing required parameter: value",
                "MISSING_PARAMETER",
            ));
        }

        errors
    }

    async fn validate_contextual(&self, ctx: &CommandContext) -> Result<Vec<ValidationError>> {
        let mut errors = Vec::new();
        let Some(element) = self.element_id() else {
            return Ok(errors);
        };
        let name = self.parameter_name().unwrap_or_default();

        match ctx.document.element_parameters(element).await {
            Err(_) => errors.push(ValidationError::new(
                ValidationPhase::Contextual,
                "element_id",
                format!("element {element} does not exist"),
                "UNKNOWN_ELEMENT",
            )),
            Ok(parameters) => match parameters.iter().find(|p| p.name == name) {
                None => errors.push(ValidationError::new(
                    ValidationPhase::Contextual,
                    "name",
                    format!("element {element} has no parameter {name}"),
                    "UNKNOWN_PARAMETER",
                )),
                Some(parameter) if parameter.read_only => errors.push(ValidationError::new(
                    ValidationPhase::Contextual,
                    "name",
                    format!("parameter {name} on element {element} is read-only"),
                    "READ_ONLY_PARAMETER",
                )),
                Some(_) => {}
            },
        }

        Ok(errors)
    }

    async fn validate_semantic(&self, _ctx: &CommandContext) -> Result<Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.parameter_name() == Some(LABEL_PARAMETER) {
            let label = self
                .params
                .get("value")
                .and_then(|v| v.as_text())
                .unwrap_or_default();
            if !is_standard_label(label) {
                errors.push(ValidationError::new(
                    ValidationPhase::Semantic,
                    "value",
                    format!(
                        "label {label:?} does not match the panel label standard \
                         (uppercase letters, digits, dashes)"
                    ),
                    "FLC_LABEL_FORMAT",
                ));
            }
        }

        Ok(errors)
    }

    async fn preview(&self, ctx: &CommandContext) -> Result<CommandOutcome> {
        let element = self
            .element_id()
            .ok_or_else(|| EngineError::Execution("missing parameter: element_id".into()))?;
        let name = self.parameter_name().unwrap_or_default();
        let value = required_param(&self.params, "value")?;
        let parameters = ctx.document.element_parameters(element).await?;
        let previous = parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.clone());

        let mut outcome = CommandOutcome {
            message: format!("would set {name} on element {element} to {value}"),
            ..Default::default()
        };
        if let Some(previous) = previous {
            outcome
                .data
                .insert("previous".into(), serde_json::to_value(&previous)?);
        }
        Ok(outcome)
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutcome> {
        ctx.checkpoint()?;
        let element = self
            .element_id()
            .ok_or_else(|| EngineError::Execution("missing parameter: element_id".into()))?;
        let name = self
            .parameter_name()
            .ok_or_else(|| EngineError::Execution("missing parameter: name".into()))?
            .to_string();
        let value = required_param(&self.params, "value")?.clone();

        let parameters = ctx.document.element_parameters(element).await?;
        let previous = parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.clone())
            .ok_or_else(|| {
                EngineError::Execution(format!("element {element} has no parameter {name}"))
            })?;

        ctx.document
            .set_parameter(element, &name, value.clone())
            .await?;

        Ok(CommandOutcome {
            message: format!("set {name} on element {element}"),
            affected: vec![element],
            modified: vec![ModifiedParameter {
                element_id: element,
                name,
                previous,
                current: value,
            }],
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_standard() {
        assert!(is_standard_label("FLC-101"));
        assert!(is_standard_label("A1"));
        assert!(!is_standard_label(""));
        assert!(!is_standard_label("flc-101"));
        assert!(!is_standard_label("FLC 101"));
    }

    #[test]
    fn test_static_rejects_negative_element_id() {
        let mut params = HashMap::new();
        params.insert("element_id".into(), ParamValue::Integer(-4));
        params.insert("name".into(), ParamValue::Text("Comments".into()));
        params.insert("value".into(), ParamValue::Text("x".into()));
        let command = SetParameterCommand::new(params);

        let errors = command.validate_static();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "PARAMETER_TYPE");
    }

    #[test]
    fn test_static_passes_for_complete_parameters() {
        let command = SetParameterCommand::from_fields(
            ElementId(3),
            "Comments",
            ParamValue::Text("checked".into()),
        );
        assert!(command.validate_static().is_empty());
    }
}
