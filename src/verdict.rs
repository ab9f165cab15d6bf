//! The structured verdict the reasoning engine must return
//!
//! A verdict is only ever built through validation: either from the engine's
//! raw answer with [`Verdict::parse`] or from typed values with [`Verdict::new`].

use crate::error::SchemaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Validated answer of one monitoring round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawVerdict")]
pub struct Verdict {
    temperature: f64,
    alert: bool,
    message: String,
}

/// Wire shape of a verdict before its invariants are checked
#[derive(Debug, Deserialize)]
struct RawVerdict {
    temperature: f64,
    alert: bool,
    message: String,
}

impl TryFrom<RawVerdict> for Verdict {
    type Error = SchemaError;

    fn try_from(raw: RawVerdict) -> Result<Self, Self::Error> {
        Verdict::new(raw.temperature, raw.alert, raw.message)
    }
}

impl Verdict {
    /// Name under which the schema is declared to the engine
    pub const SCHEMA_NAME: &'static str = "temperature_verdict";

    /// Build a verdict, rejecting non-finite readings and blank messages
    pub fn new(temperature: f64, alert: bool, message: String) -> Result<Self, SchemaError> {
        if !temperature.is_finite() {
            return Err(SchemaError::NonFiniteTemperature(temperature));
        }
        if message.trim().is_empty() {
            return Err(SchemaError::EmptyMessage);
        }
        Ok(Self {
            temperature,
            alert,
            message,
        })
    }

    /// Parse the engine's final answer into a verdict
    ///
    /// Models sometimes wrap the JSON object in markdown fences or prose, so
    /// the object is extracted first. Missing fields, wrong types and broken
    /// invariants all yield a [`SchemaError`]; no defaults are substituted.
    pub fn parse(response_text: &str) -> Result<Self, SchemaError> {
        let json_text = extract_json(response_text);
        serde_json::from_str::<RawVerdict>(json_text)
            .map_err(|e| {
                SchemaError::Malformed(format!("{}. Response was: {}", e, response_text.trim()))
            })
            .and_then(Verdict::try_from)
    }

    /// JSON schema declared to the reasoning engine
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "temperature": {
                    "type": "number",
                    "description": "The temperature reading the assessment is based on"
                },
                "alert": {
                    "type": "boolean",
                    "description": "True if the reading is concerning and an alert should be sent"
                },
                "message": {
                    "type": "string",
                    "description": "Concise human-readable assessment of the temperature status"
                }
            },
            "required": ["temperature", "alert", "message"],
            "additionalProperties": false
        })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn alert(&self) -> bool {
        self.alert
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Extract the JSON object from model output
///
/// Handles ```json fences, plain fences and objects embedded in text.
/// Falls back to the trimmed input so the parser reports the real error.
pub fn extract_json(response_text: &str) -> &str {
    let text = response_text.trim();

    if let Some(start) = text.find("```json") {
        let json_start = start + "```json".len();
        if let Some(end) = text[json_start..].find("```") {
            return text[json_start..json_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let json_start = start + 3;
        if let Some(end) = text[json_start..].find("```") {
            let candidate = text[json_start..json_start + end].trim();
            if candidate.starts_with('{') && candidate.ends_with('}') {
                return candidate;
            }
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }

    text
}
