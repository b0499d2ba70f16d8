use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::form::{FormError, FormResult, FormState, HASH_KEY, ORIGINAL_HASH_KEY};

use super::{
    options::{FormOptions, ServerValidationConfig},
    orchestrator::{self, PassOutcome, Payload},
    status::{Severity, StatusMessage},
    transport::{SendMethod, Transport},
    validation::LocalValidator,
};

enum Command {
    /// Run a validation pass against the current values.
    Pass,
    /// Send a payload that already holds the in-flight slot.
    Validate(Payload),
}

pub(crate) struct Shared {
    state: watch::Sender<FormState>,
    options: FormOptions,
    validators: Vec<Arc<dyn LocalValidator>>,
    pub(crate) transport: Arc<dyn Transport>,
    waiter: Mutex<Option<oneshot::Sender<()>>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Shared {
    fn server_validation(&self) -> Option<&ServerValidationConfig> {
        self.options.server_validation.as_ref()
    }

    pub(crate) fn update<R: Default>(&self, apply: impl FnOnce(&mut FormState) -> R) -> R {
        let mut output = R::default();
        self.state.send_modify(|state| output = apply(state));
        output
    }

    /// Applies `apply` and a validation pass as one state update.
    fn update_and_validate<R: Default>(&self, apply: impl FnOnce(&mut FormState) -> R) -> R {
        let (output, outcome) = self.update(|state| {
            let output = apply(state);
            let outcome =
                orchestrator::run_pass(state, self.server_validation(), &self.validators);
            (output, outcome)
        });
        self.settle(outcome);
        output
    }

    fn settle(&self, outcome: PassOutcome) {
        if outcome.reconciled {
            self.release_waiter();
        }
        if let Some(payload) = outcome.request {
            if self.commands.send(Command::Validate(payload)).is_err() {
                tracing::debug!("validation worker stopped; dropping request");
            }
        }
    }

    fn request_pass(&self) {
        if self.commands.send(Command::Pass).is_err() {
            tracing::debug!("validation worker stopped; dropping pass");
        }
    }

    fn release_waiter(&self) {
        let waiter = self
            .waiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(waiter) = waiter {
            tracing::debug!("server validation reconciled; releasing waiter");
            let _ = waiter.send(());
        }
    }

    async fn round_trip(&self, payload: Payload) {
        let Some(config) = self.server_validation() else {
            return;
        };
        tracing::debug!(url = %config.url, attrs = ?payload.keys().collect::<Vec<_>>(), "server validation request");
        let body = Value::Object(payload.clone());
        let response = self.transport.send(SendMethod::Post, &config.url, &body).await;
        let failed = response.is_err();
        self.update(|state| {
            orchestrator::apply_response(state, &payload, response, &self.validators)
        });
        if failed && !self.options.failure_backoff.is_zero() {
            tokio::time::sleep(self.options.failure_backoff).await;
        }
        self.request_pass();
    }

    async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Pass => self.update_and_validate(|_| ()),
                Command::Validate(payload) => self.round_trip(payload).await,
            }
        }
    }
}

/// Owns the state of one form and exposes its operations. The UI holds a reference and
/// follows changes through [`FormController::subscribe`].
///
/// Must be built inside a tokio runtime. Dropping the controller stops its validation
/// worker and pending timers.
pub struct FormController {
    pub(crate) shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

pub struct FormControllerBuilder {
    transport: Arc<dyn Transport>,
    options: FormOptions,
    validators: Vec<Arc<dyn LocalValidator>>,
}

impl FormControllerBuilder {
    pub fn with_options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_server_validation(mut self, config: ServerValidationConfig) -> Self {
        self.options.server_validation = Some(config);
        self
    }

    pub fn with_validator(self, validator: impl LocalValidator + 'static) -> Self {
        self.with_shared_validator(Arc::new(validator))
    }

    pub fn with_shared_validator(mut self, validator: Arc<dyn LocalValidator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn build(self) -> FormController {
        let (state, _) = watch::channel(FormState::new());
        let (commands, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state,
            options: self.options,
            validators: self.validators,
            transport: self.transport,
            waiter: Mutex::new(None),
            commands,
        });
        let worker = tokio::spawn(Arc::clone(&shared).run(receiver));
        FormController {
            shared,
            tasks: Mutex::new(vec![worker]),
        }
    }
}

impl FormController {
    pub fn builder(transport: impl Transport + 'static) -> FormControllerBuilder {
        Self::builder_with(Arc::new(transport))
    }

    pub fn builder_with(transport: Arc<dyn Transport>) -> FormControllerBuilder {
        FormControllerBuilder {
            transport,
            options: FormOptions::default(),
            validators: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FormState> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> FormState {
        self.shared.state.borrow().clone()
    }

    /// Reads the current state without cloning it. Do not call back into the controller
    /// from `read`.
    pub fn with_state<R>(&self, read: impl FnOnce(&FormState) -> R) -> R {
        let state = self.shared.state.borrow();
        read(&state)
    }

    pub fn server_validation(&self) -> Option<&ServerValidationConfig> {
        self.shared.server_validation()
    }

    // -- loading ----------------------------------------------------------------

    pub async fn load_from_url(&self, url: &str) -> FormResult<()> {
        self.load_from_url_with(url, |_| {}).await
    }

    /// Fetches the initial record, renames its `hash` to `originalHash`, lets `mutator`
    /// adjust it and populates the form.
    pub async fn load_from_url_with<F>(&self, url: &str, mutator: F) -> FormResult<()>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        self.arm_loading_notice();
        let response = self.shared.transport.get(url).await?;
        let Value::Object(mut record) = response else {
            return Err(FormError::NotAnObject {
                url: url.to_string(),
            });
        };
        if let Some(hash) = record.shift_remove(HASH_KEY) {
            record.insert(ORIGINAL_HASH_KEY.to_string(), hash);
        }
        mutator(&mut record);
        self.populate(record)
    }

    /// Installs the initial field set and flips the form to ready. Only the first call wins.
    pub fn populate(&self, record: Map<String, Value>) -> FormResult<()> {
        let populated = self
            .shared
            .update_and_validate(|state| state.populate(record));
        if !populated {
            return Err(FormError::AlreadyLoaded);
        }
        if let Some(config) = self.shared.server_validation() {
            let unknown = self.with_state(|state| orchestrator::unknown_attrs(&state.data, config));
            if !unknown.is_empty() {
                tracing::error!(attrs = ?unknown, "server validation attrs missing from form data; submission stays blocked");
            }
        }
        Ok(())
    }

    fn arm_loading_notice(&self) {
        let shared = Arc::clone(&self.shared);
        let delay = shared.options.loading_notice_delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared
                .state
                .send_if_modified(FormState::promote_loading_notice);
        });
        self.track(timer);
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    // -- values -----------------------------------------------------------------

    /// Replaces a field value and runs a validation pass. Writes to fields outside the
    /// loaded record are ignored.
    pub fn set(&self, name: &str, value: Value) {
        let known = self
            .shared
            .update_and_validate(|state| state.data.set(name, value));
        if !known {
            tracing::warn!(field = %name, "ignoring write to unknown form field");
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.with_state(|state| state.data.get(name).cloned())
    }

    pub fn get_all(&self) -> Map<String, Value> {
        self.with_state(|state| state.data.get_all())
    }

    pub fn get_error(&self, name: &str) -> Option<String> {
        self.with_state(|state| state.data.get_error(name).map(str::to_string))
    }

    pub fn has_any_error(&self) -> bool {
        self.with_state(|state| state.data.has_any_error())
    }

    pub fn original_hash(&self) -> Option<Value> {
        self.with_state(|state| state.original_hash.clone())
    }

    pub fn validation_message(&self, name: &str) -> Option<String> {
        self.with_state(|state| state.validation_message(name).map(str::to_string))
    }

    pub fn validation_class(&self, base: &str, name: &str) -> String {
        self.with_state(|state| state.validation_class(base, name))
    }

    // -- lifecycle flags -----------------------------------------------------------

    pub fn is_loading(&self) -> bool {
        self.with_state(FormState::is_loading)
    }

    pub fn is_with_loading_notice(&self) -> bool {
        self.with_state(FormState::is_with_loading_notice)
    }

    pub fn is_ready(&self) -> bool {
        self.with_state(FormState::is_ready)
    }

    pub fn enable(&self) {
        self.shared.update(|state| state.disabled = false);
    }

    pub fn disable(&self) {
        self.shared.update(|state| state.disabled = true);
    }

    pub fn is_disabled(&self) -> bool {
        self.with_state(|state| state.disabled)
    }

    pub fn show_validation(&self) {
        self.shared.update(|state| state.validation_shown = true);
    }

    pub fn hide_validation(&self) {
        self.shared.update(|state| state.validation_shown = false);
    }

    pub fn is_validation_shown(&self) -> bool {
        self.with_state(|state| state.validation_shown)
    }

    // -- status -------------------------------------------------------------------

    pub fn set_status(&self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        self.shared.update(|state| state.status.set(severity, text));
    }

    pub fn status(&self) -> StatusMessage {
        self.with_state(|state| state.status.clone())
    }

    // -- server reconciliation -------------------------------------------------------

    pub fn is_server_validation_running(&self) -> bool {
        self.with_state(|state| state.server_validation_running)
    }

    /// True when every configured attr is confirmed for its current value. Vacuously true
    /// without server validation.
    pub fn is_server_validated(&self) -> bool {
        match self.shared.server_validation() {
            Some(config) => {
                self.with_state(|state| orchestrator::is_server_validated(&state.data, config))
            }
            None => true,
        }
    }

    /// Suspends until a pass finds nothing pending server confirmation.
    ///
    /// Only one waiter is honoured at a time: a newer call supersedes an older one, which
    /// then fails with [`FormError::WaitSuperseded`].
    pub async fn wait_for_server_validated(&self) -> FormResult<()> {
        let Some(config) = self.shared.server_validation() else {
            return Ok(());
        };
        let (ready, unknown) = self.with_state(|state| {
            (
                state.is_ready(),
                orchestrator::unknown_attrs(&state.data, config),
            )
        });
        if !ready {
            return Err(FormError::NotReady);
        }
        if !unknown.is_empty() {
            tracing::error!(attrs = ?unknown, "cannot reconcile server validation attrs missing from form data");
            return Err(FormError::UnknownServerAttrs(unknown));
        }
        if self.is_server_validated() {
            return Ok(());
        }

        let (sender, receiver) = oneshot::channel();
        let previous = self
            .shared
            .waiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(sender);
        if previous.is_some() {
            tracing::debug!("superseding earlier server validation waiter");
        }
        drop(previous);
        self.shared.request_pass();
        receiver.await.map_err(|_| FormError::WaitSuperseded)
    }
}

impl Drop for FormController {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for FormController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormController")
            .field("state", &*self.shared.state.borrow())
            .field("server_validation", &self.shared.server_validation())
            .finish_non_exhaustive()
    }
}
