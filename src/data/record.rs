//! Experiment Record Module
//! Typed views over a parsed experiment file and numeric coercion of slider values.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const INITIALS_KEY: &str = "initials";
pub const SOLUTION_KEY: &str = "Solution_Experiment_Simulated";
pub const EMOTION_VALUE_KEY: &str = "emotion_value";
pub const HISTORY_KEY: &str = "History_Experiment_Simulated";
pub const VALENCE_KEY: &str = "sliderDissatisfiedSatisfied";
pub const AROUSAL_KEY: &str = "sliderBoredExcited";

/// User identifier used when a file carries no initials.
pub const UNKNOWN_USER: &str = "unknown";

/// A parsed input file: where it came from and its raw content.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    pub content: Value,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, content: Value) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }

    /// Base name of the source file.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Top-level mapping, if the document is an object.
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.content.as_object()
    }

    /// Name of the JSON type at the top level, for diagnostics.
    pub fn shape(&self) -> &'static str {
        json_type_name(&self.content)
    }
}

/// User identifier of a document, `"unknown"` when absent or null.
pub fn user_of(root: &Map<String, Value>) -> String {
    match root.get(INITIALS_KEY) {
        None | Some(Value::Null) => UNKNOWN_USER.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// One iteration's raw reading.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservationRecord {
    #[serde(rename = "sliderDissatisfiedSatisfied", default)]
    pub valence: Option<Value>,
    #[serde(rename = "sliderBoredExcited", default)]
    pub arousal: Option<Value>,
    #[serde(default)]
    pub time: Option<Value>,
    #[serde(default)]
    pub risk: Option<Value>,
    #[serde(default)]
    pub arrival: Option<Value>,
}

impl ObservationRecord {
    /// Read a record from a JSON object. Returns `None` for non-objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Outcome of converting an arbitrary JSON value to a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coercion {
    Number(f64),
    Missing,
    Invalid,
}

impl Coercion {
    /// The value as an optional float, treating invalid input as missing.
    pub fn lenient(self) -> Option<f64> {
        match self {
            Coercion::Number(v) => Some(v),
            Coercion::Missing | Coercion::Invalid => None,
        }
    }
}

/// Convert a JSON value to `f64`.
///
/// Numbers pass through, strings are trimmed and parsed, null is missing.
/// NaN counts as missing; everything else is invalid.
pub fn coerce_number(value: Option<&Value>) -> Coercion {
    let parsed = match value {
        None | Some(Value::Null) => return Coercion::Missing,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Coercion::Invalid;
            }
            trimmed.parse::<f64>().ok()
        }
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_nan() => Coercion::Missing,
        Some(v) => Coercion::Number(v),
        None => Coercion::Invalid,
    }
}

/// Text form of a passthrough value for tabular output.
pub fn passthrough_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
