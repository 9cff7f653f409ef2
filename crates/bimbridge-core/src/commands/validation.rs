//! Three-phase command validation types.
//!
//! Phases run in fixed order Static → Contextual → Semantic and the runner
//! short-circuits at the first failing phase; errors from later phases are
//! never evaluated once an earlier phase fails.

use serde::{Deserialize, Serialize};

/// Which validation phase a check belongs to.
///
/// `None` marks a result that passed every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPhase {
    Static,
    Contextual,
    Semantic,
    None,
}

impl std::fmt::Display for ValidationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationPhase::Static => write!(f, "static"),
            ValidationPhase::Contextual => write!(f, "contextual"),
            ValidationPhase::Semantic => write!(f, "semantic"),
            ValidationPhase::None => write!(f, "none"),
        }
    }
}

/// One validation failure, tagged with its phase and a stable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub phase: ValidationPhase,
    /// The offending parameter or property.
    pub property: String,
    pub message: String,
    /// Stable machine-readable code (e.g. `FLC_HEIGHT_STANDARD`).
    pub code: String,
}

impl ValidationError {
    pub fn new(
        phase: ValidationPhase,
        property: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            property: property.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Outcome of running the validation pipeline.
///
/// Produced fresh per call; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub failed_phase: ValidationPhase,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// A result that passed every phase.
    pub fn passed() -> Self {
        Self {
            is_valid: true,
            failed_phase: ValidationPhase::None,
            errors: Vec::new(),
        }
    }

    /// A result that failed at `phase` with the given errors.
    pub fn failed(phase: ValidationPhase, errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: false,
            failed_phase: phase,
            errors,
        }
    }

    /// Summary line for logs and failure messages.
    pub fn summary(&self) -> String {
        if self.is_valid {
            return "validation passed".to_string();
        }
        let details: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect();
        format!(
            "validation failed in {} phase: {}",
            self.failed_phase,
            details.join("; ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_result_shape() {
        let result = ValidationResult::passed();
        assert!(result.is_valid);
        assert_eq!(result.failed_phase, ValidationPhase::None);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_failed_result_keeps_phase_and_codes() {
        let result = ValidationResult::failed(
            ValidationPhase::Semantic,
            vec![ValidationError::new(
                ValidationPhase::Semantic,
                "height_ft",
                "7 ft is not a standard height",
                "FLC_HEIGHT_STANDARD",
            )],
        );
        assert!(!result.is_valid);
        assert_eq!(result.failed_phase, ValidationPhase::Semantic);
        assert_eq!(result.errors[0].code, "FLC_HEIGHT_STANDARD");
        assert!(result.summary().contains("semantic"));
        assert!(result.summary().contains("FLC_HEIGHT_STANDARD"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let result = ValidationResult::failed(
            ValidationPhase::Static,
            vec![ValidationError::new(
                ValidationPhase::Static,
                "wall_type",
                "missing required parameter",
                "MISSING_PARAMETER",
            )],
        );
        let json = serde_json::to_string(&result).unwrap();
        let back: ValidationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.failed_phase, ValidationPhase::Static);
        assert_eq!(back.errors.len(), 1);
    }
}
