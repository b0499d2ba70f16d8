use serde_json::{Map, Value};

use crate::form::{FormResult, FormState, ORIGINAL_HASH_KEY};

use super::{controller::FormController, orchestrator, transport::SendMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The write request succeeded.
    Submitted,
    /// A field carries an error; validation is now shown and nothing was sent.
    Invalid,
    /// The record changed on the server since it was loaded; the form is disabled.
    Conflict,
}

impl SubmitOutcome {
    pub fn is_submitted(self) -> bool {
        self == SubmitOutcome::Submitted
    }
}

enum Gate {
    /// An edit landed between reconciliation and the snapshot.
    Pending,
    Blocked,
    Open(Map<String, Value>),
}

impl FormController {
    /// Reconciliation check and snapshot, taken from the same state.
    fn gate(&self, state: &FormState) -> Gate {
        if let Some(config) = self.server_validation()
            && !orchestrator::is_server_validated(&state.data, config)
        {
            return Gate::Pending;
        }
        if state.data.has_any_error() {
            return Gate::Blocked;
        }
        let mut payload = state.data.get_all();
        if let Some(hash) = &state.original_hash {
            payload.insert(ORIGINAL_HASH_KEY.to_string(), hash.clone());
        }
        Gate::Open(payload)
    }

    pub async fn submit(&self, method: SendMethod, url: &str) -> FormResult<SubmitOutcome> {
        self.submit_with(method, url, |_| {}).await
    }

    /// Waits for server reconciliation, then sends the value snapshot (plus
    /// `originalHash`, if the record had one) unless a field carries an error.
    pub async fn submit_with<F>(
        &self,
        method: SendMethod,
        url: &str,
        mutator: F,
    ) -> FormResult<SubmitOutcome>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut payload = loop {
            self.wait_for_server_validated().await?;
            match self.with_state(|state| self.gate(state)) {
                Gate::Pending => {
                    tracing::debug!(%url, "value changed after reconciliation; waiting again");
                }
                Gate::Blocked => {
                    tracing::debug!(%url, "submission blocked by field errors");
                    self.show_validation();
                    return Ok(SubmitOutcome::Invalid);
                }
                Gate::Open(payload) => break payload,
            }
        };
        mutator(&mut payload);
        tracing::debug!(%url, %method, "submitting form");
        self.shared
            .transport
            .send(method, url, &Value::Object(payload))
            .await?;
        Ok(SubmitOutcome::Submitted)
    }

    pub async fn on_submit(&self, method: SendMethod, url: &str) -> FormResult<SubmitOutcome> {
        self.on_submit_with(method, url, |_| {}).await
    }

    /// Submission as driven by the form's submit button: the form is disabled for the
    /// duration of the call. A concurrent-change conflict leaves it disabled with a
    /// status message asking the user to reload; other errors propagate.
    pub async fn on_submit_with<F>(
        &self,
        method: SendMethod,
        url: &str,
        mutator: F,
    ) -> FormResult<SubmitOutcome>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        self.disable();
        match self.submit_with(method, url, mutator).await {
            Err(err) if err.is_changed() => {
                tracing::warn!(%url, "record changed concurrently; form disabled");
                self.shared
                    .update(|state| state.status.changed_concurrently());
                Ok(SubmitOutcome::Conflict)
            }
            result => {
                self.enable();
                result
            }
        }
    }
}
