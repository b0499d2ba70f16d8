use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::form::{FieldState, ValueStore};

/// Caller-supplied local validation. Runs at the end of every validation pass, after all
/// errors have been cleared, and records verdicts with [`ValueStore::add_error`].
///
/// Validators run while the form state is being updated; they must not call back into the
/// controller.
pub trait LocalValidator: Send + Sync {
    fn validate(&self, fields: &mut ValueStore);
}

impl<F> LocalValidator for F
where
    F: Fn(&mut ValueStore) + Send + Sync,
{
    fn validate(&self, fields: &mut ValueStore) {
        self(fields)
    }
}

type Check = Arc<dyn Fn(&FieldState) -> Option<String> + Send + Sync>;

#[derive(Clone)]
enum Rule {
    Required(String),
    Pattern { regex: Regex, message: String },
    Check(Check),
}

impl Rule {
    fn verdict(&self, field: &FieldState) -> Option<String> {
        match self {
            Rule::Required(message) => is_blank(&field.value).then(|| message.clone()),
            Rule::Pattern { regex, message } => {
                let text = match &field.value {
                    Value::String(text) => text.clone(),
                    Value::Null => return None,
                    other => other.to_string(),
                };
                (!regex.is_match(&text)).then(|| message.clone())
            }
            Rule::Check(check) => check(field),
        }
    }
}

/// Declarative per-field rules. The first failing rule of a field wins.
#[derive(Clone, Default)]
pub struct FieldRules {
    rules: IndexMap<String, Vec<Rule>>,
}

impl std::fmt::Debug for FieldRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRules")
            .field("fields", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(field, Rule::Required(message.into()))
    }

    pub fn pattern(
        self,
        field: impl Into<String>,
        pattern: &str,
        message: impl Into<String>,
    ) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("invalid pattern {pattern:?} for local validation"))?;
        Ok(self.push(
            field,
            Rule::Pattern {
                regex,
                message: message.into(),
            },
        ))
    }

    /// Arbitrary verdict over the whole field state, e.g. to interpret server details.
    pub fn check<F>(self, field: impl Into<String>, check: F) -> Self
    where
        F: Fn(&FieldState) -> Option<String> + Send + Sync + 'static,
    {
        self.push(field, Rule::Check(Arc::new(check)))
    }

    /// Surfaces the server's confirmed detail for the current value as the field error.
    pub fn server_message(self, field: impl Into<String>) -> Self {
        self.check(field, |state| {
            state.server_issue().map(|detail| match detail {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
        })
    }

    /// Blocks the field with `message` until the server confirmed its current value.
    pub fn server_pending(self, field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        self.check(field, move |state| {
            (!state.server_validated).then(|| message.clone())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn push(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.rules.entry(field.into()).or_default().push(rule);
        self
    }
}

impl LocalValidator for FieldRules {
    fn validate(&self, fields: &mut ValueStore) {
        for (name, rules) in &self.rules {
            let Some(field) = fields.field(name) else {
                continue;
            };
            if let Some(message) = rules.iter().find_map(|rule| rule.verdict(field)) {
                fields.add_error(name, message);
            }
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(feature = "schema")]
pub use schema::SchemaValidator;

#[cfg(feature = "schema")]
mod schema {
    use anyhow::{Context, Result};
    use jsonschema::{Validator, validator_for};
    use serde_json::Value;

    use super::LocalValidator;
    use crate::form::ValueStore;

    /// Validates the value snapshot against a JSON Schema, mapping each error to the
    /// top-level field its instance path points into.
    ///
    /// Optional convenience behind the `schema` feature. It is one more
    /// [`LocalValidator`]; the controller never derives rules from a schema itself.
    pub struct SchemaValidator {
        validator: Validator,
    }

    impl std::fmt::Debug for SchemaValidator {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SchemaValidator").finish_non_exhaustive()
        }
    }

    impl SchemaValidator {
        pub fn new(schema: &Value) -> Result<Self> {
            let validator = validator_for(schema).context("failed to compile JSON schema")?;
            Ok(Self { validator })
        }
    }

    impl LocalValidator for SchemaValidator {
        fn validate(&self, fields: &mut ValueStore) {
            let value = Value::Object(fields.get_all());
            for error in self.validator.iter_errors(&value) {
                let pointer = error.instance_path.to_string();
                match field_of_pointer(&pointer) {
                    Some(name) if fields.contains(&name) => {
                        fields.add_error(&name, error.to_string());
                    }
                    _ => {
                        tracing::debug!(%pointer, %error, "schema error not attached to a field");
                    }
                }
            }
        }
    }

    fn field_of_pointer(pointer: &str) -> Option<String> {
        let segment = pointer.strip_prefix('/')?.split('/').next()?;
        Some(segment.replace("~1", "/").replace("~0", "~"))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(value: Value) -> ValueStore {
        ValueStore::initialize(value.as_object().cloned().unwrap_or_default()).0
    }

    #[test]
    fn first_failing_rule_wins() {
        let rules = FieldRules::new()
            .required("email", "Email must not be empty")
            .pattern("email", r"^[^@\s]+@[^@\s]+$", "Email is invalid")
            .expect("pattern");
        let mut fields = store(json!({"email": ""}));
        rules.validate(&mut fields);
        assert_eq!(fields.get_error("email"), Some("Email must not be empty"));

        fields.clear_errors();
        fields.set("email", json!("nope"));
        rules.validate(&mut fields);
        assert_eq!(fields.get_error("email"), Some("Email is invalid"));

        fields.clear_errors();
        fields.set("email", json!("a@x.com"));
        rules.validate(&mut fields);
        assert_eq!(fields.get_error("email"), None);
    }

    #[test]
    fn bad_pattern_is_reported() {
        assert!(FieldRules::new().pattern("x", "(", "bad").is_err());
    }

    #[test]
    fn server_message_only_for_confirmed_value() {
        let rules = FieldRules::new().server_message("email");
        let mut fields = store(json!({"email": "taken@x.com"}));
        if let Some(field) = fields.field_mut("email") {
            field.server_value = Some(json!("taken@x.com"));
            field.server_validation = Some(json!("already used"));
        }
        rules.validate(&mut fields);
        assert_eq!(fields.get_error("email"), None);

        if let Some(field) = fields.field_mut("email") {
            field.server_validated = true;
        }
        rules.validate(&mut fields);
        assert_eq!(fields.get_error("email"), Some("already used"));
    }

    #[test]
    fn closures_are_validators() {
        let validator = |fields: &mut ValueStore| {
            if fields.get("age").and_then(Value::as_i64).is_some_and(|age| age < 18) {
                fields.add_error("age", "too young");
            }
        };
        let mut fields = store(json!({"age": 12}));
        validator.validate(&mut fields);
        assert_eq!(fields.get_error("age"), Some("too young"));
    }
}
