use std::time::Duration;

use indexmap::IndexSet;

/// Remote validator endpoint and the fields that need its confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerValidationConfig {
    pub url: String,
    pub attrs: IndexSet<String>,
}

impl ServerValidationConfig {
    pub fn new<I, S>(url: impl Into<String>, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url: url.into(),
            attrs: attrs.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormOptions {
    pub loading_notice_delay: Duration,
    pub failure_backoff: Duration,
    pub server_validation: Option<ServerValidationConfig>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            loading_notice_delay: Duration::from_millis(500),
            failure_backoff: Duration::ZERO,
            server_validation: None,
        }
    }
}

impl FormOptions {
    pub fn with_loading_notice_delay(mut self, delay: Duration) -> Self {
        self.loading_notice_delay = delay;
        self
    }

    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    pub fn with_server_validation(mut self, config: ServerValidationConfig) -> Self {
        self.server_validation = Some(config);
        self
    }
}
