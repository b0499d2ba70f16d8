mod error;
mod field;
mod state;
mod store;

pub use error::{FormError, FormResult};
pub(crate) use field::is_truthy;
pub use field::FieldState;
pub use state::{FormState, Lifecycle};
pub use store::{HASH_KEY, ORIGINAL_HASH_KEY, ValueStore};
