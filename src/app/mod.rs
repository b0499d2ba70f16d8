mod controller;
mod options;
mod orchestrator;
mod status;
mod submit;
mod transport;
mod validation;

pub use controller::{FormController, FormControllerBuilder};
pub use options::{FormOptions, ServerValidationConfig};
pub use status::{CHANGED_DETAIL, CHANGED_TITLE, Severity, StatusMessage};
pub use submit::SubmitOutcome;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{CHANGED_ERROR_TYPE, SendMethod, Transport, TransportError};
#[cfg(feature = "schema")]
pub use validation::SchemaValidator;
pub use validation::{FieldRules, LocalValidator};
