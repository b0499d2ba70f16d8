use thiserror::Error;

use crate::app::TransportError;

pub type FormResult<T> = Result<T, FormError>;

#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("record fetched from {url} is not a JSON object")]
    NotAnObject { url: String },
    #[error("form has already been populated")]
    AlreadyLoaded,
    #[error("form is still loading")]
    NotReady,
    #[error("server validation attrs are not form fields: {}", .0.join(", "))]
    UnknownServerAttrs(Vec<String>),
    #[error("another caller started waiting for server validation")]
    WaitSuperseded,
}

impl FormError {
    /// True for the optimistic-concurrency conflict raised by a submission.
    pub fn is_changed(&self) -> bool {
        matches!(self, FormError::Transport(TransportError::Changed { .. }))
    }
}
