use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use super::field::FieldState;

/// Record key carrying the optimistic-concurrency token.
pub const HASH_KEY: &str = "hash";
/// Name the hash is stored and re-sent under.
pub const ORIGINAL_HASH_KEY: &str = "originalHash";

/// Ordered mapping of field name to [`FieldState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValueStore {
    fields: IndexMap<String, FieldState>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the store from a flat record. The `hash` entry (or an already renamed
    /// `originalHash`) is split off and returned separately since it is metadata, not a field.
    pub fn initialize(record: Map<String, Value>) -> (Self, Option<Value>) {
        let mut hash = None;
        let mut renamed = None;
        let mut fields = IndexMap::with_capacity(record.len());
        for (key, value) in record {
            match key.as_str() {
                HASH_KEY => hash = Some(value),
                ORIGINAL_HASH_KEY => renamed = Some(value),
                _ => {
                    fields.insert(key, FieldState::new(value));
                }
            }
        }
        (Self { fields }, hash.or(renamed))
    }

    /// Replaces the value of an existing field. Returns false for unknown fields, which
    /// are left untouched since the field set is fixed after initialization.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.fields.get_mut(name) {
            Some(field) => {
                field.value = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(|field| &field.value)
    }

    pub fn get_all(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.value.clone()))
            .collect()
    }

    pub fn get_error(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|field| field.error.as_deref())
    }

    pub fn set_error(&mut self, name: &str, message: Option<String>) {
        if let Some(field) = self.fields.get_mut(name) {
            field.error = message;
        }
    }

    /// Records `message` unless the field already carries an error.
    pub fn add_error(&mut self, name: &str, message: impl Into<String>) {
        if let Some(field) = self.fields.get_mut(name) {
            if !field.has_error() {
                field.set_error(message);
            }
        }
    }

    pub fn clear_errors(&mut self) {
        for field in self.fields.values_mut() {
            field.clear_error();
        }
    }

    pub fn has_any_error(&self) -> bool {
        self.fields.values().any(FieldState::has_error)
    }

    pub fn error_count(&self) -> usize {
        self.fields.values().filter(|field| field.has_error()).count()
    }

    pub fn field(&self, name: &str) -> Option<&FieldState> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldState> {
        self.fields.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldState)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
