pub mod chat;

use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("invalid invocation parameter '{name}': {reason}")]
pub struct InvalidParameter {
    pub name: &'static str,
    pub reason: String,
}

/// Model sampling settings declared by a prompt template.
///
/// The named fields are the ones the completion endpoint understands everywhere.
/// Anything else the template declares lands in `extra` and is forwarded to the
/// endpoint untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InvocationParameters {
    pub fn validate(&self) -> Result<(), InvalidParameter> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(InvalidParameter {
                    name: "temperature",
                    reason: format!("{} is outside 0.0..=2.0", t),
                });
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(InvalidParameter {
                    name: "top_p",
                    reason: format!("{} is outside 0.0..=1.0", p),
                });
            }
        }
        if self.max_tokens == Some(0) {
            return Err(InvalidParameter {
                name: "max_tokens",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (name, value) in [
            ("frequency_penalty", self.frequency_penalty),
            ("presence_penalty", self.presence_penalty),
        ] {
            if let Some(v) = value {
                if !(-2.0..=2.0).contains(&v) {
                    return Err(InvalidParameter {
                        name,
                        reason: format!("{} is outside -2.0..=2.0", v),
                    });
                }
            }
        }
        Ok(())
    }
}
