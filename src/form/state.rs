use serde::Serialize;
use serde_json::{Map, Value};

use crate::app::StatusMessage;

use super::{field::FieldState, store::ValueStore};

/// Loading progress of a form. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Lifecycle {
    Loading,
    LoadingWithNotice,
    Ready,
}

/// Snapshot of everything a form instance owns. Each mutation made through the
/// controller publishes a fresh copy to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormState {
    pub lifecycle: Lifecycle,
    pub validation_shown: bool,
    pub disabled: bool,
    pub status: StatusMessage,
    pub server_validation_running: bool,
    pub original_hash: Option<Value>,
    pub data: ValueStore,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::Loading,
            validation_shown: false,
            disabled: false,
            status: StatusMessage::default(),
            server_validation_running: false,
            original_hash: None,
            data: ValueStore::new(),
        }
    }
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `Loading` to `LoadingWithNotice`. No-op in any other state.
    pub fn promote_loading_notice(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Loading {
            self.lifecycle = Lifecycle::LoadingWithNotice;
            true
        } else {
            false
        }
    }

    /// Installs the initial record and flips to `Ready`. Returns false if the form was
    /// already populated; the field set never changes afterwards.
    pub fn populate(&mut self, record: Map<String, Value>) -> bool {
        if self.is_ready() {
            return false;
        }
        let (data, original_hash) = ValueStore::initialize(record);
        self.data = data;
        if original_hash.is_some() {
            self.original_hash = original_hash;
        }
        self.lifecycle = Lifecycle::Ready;
        true
    }

    pub fn is_loading(&self) -> bool {
        self.lifecycle < Lifecycle::Ready
    }

    pub fn is_with_loading_notice(&self) -> bool {
        self.lifecycle == Lifecycle::LoadingWithNotice
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    pub fn field(&self, name: &str) -> Option<&FieldState> {
        self.data.field(name)
    }

    /// Field error, but only once validation is shown.
    pub fn validation_message(&self, name: &str) -> Option<&str> {
        if self.validation_shown {
            self.data.get_error(name)
        } else {
            None
        }
    }

    /// Decorates a CSS-like class name with the field's validation state.
    pub fn validation_class(&self, base: &str, name: &str) -> String {
        if !self.validation_shown {
            return base.to_string();
        }
        let has_error = self.data.field(name).is_some_and(FieldState::has_error);
        if has_error {
            format!("{base} has-error")
        } else {
            format!("{base} has-success")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn lifecycle_never_regresses() {
        let mut state = FormState::new();
        assert!(state.promote_loading_notice());
        assert!(state.is_with_loading_notice());
        assert!(state.populate(record(json!({"name": "Alice"}))));
        assert!(!state.promote_loading_notice());
        assert!(state.is_ready());
    }

    #[test]
    fn populate_happens_once() {
        let mut state = FormState::new();
        assert!(state.populate(record(json!({"name": "Alice", "hash": "h1"}))));
        assert!(!state.populate(record(json!({"other": 1}))));
        assert_eq!(state.original_hash, Some(json!("h1")));
        assert!(state.data.contains("name"));
        assert!(!state.data.contains("other"));
    }

    #[test]
    fn validation_helpers_respect_visibility() {
        let mut state = FormState::new();
        state.populate(record(json!({"name": "", "age": 3})));
        state.data.set_error("name", Some("required".into()));
        assert_eq!(state.validation_message("name"), None);
        assert_eq!(state.validation_class("form-group", "name"), "form-group");

        state.validation_shown = true;
        assert_eq!(state.validation_message("name"), Some("required"));
        assert_eq!(
            state.validation_class("form-group", "name"),
            "form-group has-error"
        );
        assert_eq!(
            state.validation_class("form-group", "age"),
            "form-group has-success"
        );
    }
}
