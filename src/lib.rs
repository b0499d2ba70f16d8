#![deny(rust_2018_idioms)]
//! Client-side form state controller.
//!
//! A [`FormController`] owns the values of one form, runs local validators after every
//! edit, reconciles the fields that need server confirmation against a remote validator
//! (one request in flight at a time, stale answers detected by value comparison) and
//! gates submission until both agree.

mod app;
mod form;

pub use app::{
    CHANGED_DETAIL, CHANGED_ERROR_TYPE, CHANGED_TITLE, FieldRules, FormController,
    FormControllerBuilder, FormOptions, LocalValidator, SendMethod, ServerValidationConfig,
    Severity, StatusMessage, SubmitOutcome, Transport, TransportError,
};
#[cfg(feature = "http")]
pub use app::HttpTransport;
#[cfg(feature = "schema")]
pub use app::SchemaValidator;
pub use form::{
    FieldState, FormError, FormResult, FormState, HASH_KEY, Lifecycle, ORIGINAL_HASH_KEY,
    ValueStore,
};

pub mod prelude {
    pub use super::{
        FieldRules, FormController, FormOptions, SendMethod, ServerValidationConfig,
        SubmitOutcome, Transport,
    };
}
