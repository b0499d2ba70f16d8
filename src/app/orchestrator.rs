//! Validation pass: reconciles local values against the remote validator and re-runs the
//! local validators. Everything here is synchronous and runs inside a single state update,
//! so a pass always observes the latest values.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::form::{FormState, ValueStore, is_truthy};

use super::{options::ServerValidationConfig, transport::TransportError, validation::LocalValidator};

pub(crate) type Payload = Map<String, Value>;

#[derive(Debug, Default)]
pub(crate) struct PassOutcome {
    /// Mismatched attrs to send. Present only when this pass took the in-flight slot.
    pub request: Option<Payload>,
    /// No request in flight and nothing pending confirmation.
    pub reconciled: bool,
}

pub(crate) fn run_pass(
    state: &mut FormState,
    config: Option<&ServerValidationConfig>,
    validators: &[Arc<dyn LocalValidator>],
) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    match config {
        Some(config) => {
            // Mismatches are always demoted, even while a request is in flight, so a
            // confirmed flag never outlives the value it confirmed.
            let payload = collect_mismatches(&mut state.data, config);
            if !state.server_validation_running {
                if payload.is_empty() {
                    outcome.reconciled = is_server_validated(&state.data, config);
                } else {
                    state.server_validation_running = true;
                    outcome.request = Some(payload);
                }
            }
        }
        None => outcome.reconciled = true,
    }
    run_local_validators(&mut state.data, validators);
    outcome
}

/// Records the server's answer for `payload` and frees the in-flight slot.
pub(crate) fn apply_response(
    state: &mut FormState,
    payload: &Payload,
    response: Result<Value, TransportError>,
    validators: &[Arc<dyn LocalValidator>],
) {
    state.server_validation_running = false;
    match response {
        Ok(details) => {
            for (attr, sent) in payload {
                let Some(field) = state.data.field_mut(attr) else {
                    continue;
                };
                field.server_value = Some(sent.clone());
                if &field.value == sent {
                    let detail = details
                        .get(attr)
                        .filter(|detail| is_truthy(detail))
                        .cloned()
                        .unwrap_or(Value::Bool(true));
                    field.server_validated = true;
                    field.server_validation = Some(detail);
                } else {
                    tracing::debug!(%attr, "stale server validation response ignored");
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "ignoring failed server validation request");
        }
    }
    run_local_validators(&mut state.data, validators);
}

pub(crate) fn is_server_validated(data: &ValueStore, config: &ServerValidationConfig) -> bool {
    config.attrs.iter().all(|attr| {
        data.field(attr)
            .is_some_and(|field| field.server_validated)
    })
}

pub(crate) fn unknown_attrs(data: &ValueStore, config: &ServerValidationConfig) -> Vec<String> {
    config
        .attrs
        .iter()
        .filter(|attr| !data.contains(attr))
        .cloned()
        .collect()
}

fn collect_mismatches(data: &mut ValueStore, config: &ServerValidationConfig) -> Payload {
    let mut payload = Payload::new();
    for attr in &config.attrs {
        let Some(field) = data.field_mut(attr) else {
            continue;
        };
        if field.differs_from_server() || !field.server_validated {
            field.server_validated = false;
            payload.insert(attr.clone(), field.value.clone());
        }
    }
    payload
}

fn run_local_validators(data: &mut ValueStore, validators: &[Arc<dyn LocalValidator>]) {
    data.clear_errors();
    for validator in validators {
        validator.validate(data);
    }
}
