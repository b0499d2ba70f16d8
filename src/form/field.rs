use serde::Serialize;
use serde_json::Value;

/// Per-field record held by the [`ValueStore`](super::ValueStore).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldState {
    pub value: Value,
    pub error: Option<String>,
    /// Last value sent to the server validator and answered.
    pub server_value: Option<Value>,
    pub server_validated: bool,
    /// Detail returned by the server for `server_value`. `Value::Bool(true)` means no issue.
    pub server_validation: Option<Value>,
}

impl FieldState {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            error: None,
            server_value: None,
            server_validated: false,
            server_validation: None,
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|message| !message.is_empty())
    }

    /// True when the server has not yet answered for the current value.
    pub fn differs_from_server(&self) -> bool {
        self.server_value.as_ref() != Some(&self.value)
    }

    /// Server detail for the current value, if the server confirmed it and reported something.
    pub fn server_issue(&self) -> Option<&Value> {
        if !self.server_validated {
            return None;
        }
        self.server_validation
            .as_ref()
            .filter(|detail| **detail != Value::Bool(true))
    }
}

/// Loose truthiness used to interpret server validation details.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
