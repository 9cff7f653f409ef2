//! Element and parameter model shared by host adapters and the engine.
//!
//! `ParamValue` is the single value type crossing the AI↔host boundary.
//! Inbound JSON is converted with [`ParamValue::from_json`], which keeps
//! integer and floating payloads distinct instead of coercing dynamically —
//! cross-kind reads fail loudly rather than silently truncating.

use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};

/// Unique identifier of an element within the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lightweight reference to an element, as returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRef {
    pub id: ElementId,
    pub category: String,
    pub type_name: String,
    pub name: String,
}

/// A tagged parameter value.
///
/// JSON numbers that fit an `i64` become `Integer`; all other numbers become
/// `Number`. Accessors are kind-strict; use [`ParamValue::coerce_f64`] when a
/// numeric reading of either kind is explicitly wanted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Flag(bool),
    Element(ElementId),
}

impl ParamValue {
    /// Convert an inbound JSON value into a tagged value.
    ///
    /// # Errors
    ///
    /// `HostError::InvalidValue` for null, arrays, and objects — composite
    /// payloads must be decomposed by the caller before reaching the host.
    pub fn from_json(value: &serde_json::Value) -> HostResult<Self> {
        match value {
            serde_json::Value::String(s) => Ok(ParamValue::Text(s.clone())),
            serde_json::Value::Bool(b) => Ok(ParamValue::Flag(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ParamValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(ParamValue::Number(f))
                } else {
                    Err(HostError::InvalidValue(format!(
                        "number out of range: {n}"
                    )))
                }
            }
            other => Err(HostError::InvalidValue(format!(
                "unsupported parameter payload: {other}"
            ))),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ParamValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<ElementId> {
        match self {
            ParamValue::Element(id) => Some(*id),
            _ => None,
        }
    }

    /// Explicit numeric coercion: `Integer` widens losslessly, `Number`
    /// passes through, every other kind is refused.
    pub fn coerce_f64(&self) -> HostResult<f64> {
        match self {
            ParamValue::Number(f) => Ok(*f),
            ParamValue::Integer(i) => Ok(*i as f64),
            other => Err(HostError::InvalidValue(format!(
                "expected numeric value, got {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Text(s) => write!(f, "{s}"),
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Flag(b) => write!(f, "{b}"),
            ParamValue::Element(id) => write!(f, "element:{id}"),
        }
    }
}

/// A named parameter on an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    pub read_only: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
            read_only: false,
        }
    }

    pub fn read_only(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
            read_only: true,
        }
    }
}

/// Specification for creating a new element instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub category: String,
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// SHA-256 digest of the document's element state.
///
/// Two digests are equal iff the documents' element states are
/// byte-for-byte equal under canonical serialization — the substrate for
/// rollback and hot-load atomicity checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateDigest(String);

impl StateDigest {
    /// Compute the SHA-256 digest of the given canonical bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = sha2::Sha256::new();
        hasher.update(data);
        StateDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
