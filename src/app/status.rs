use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        };
        f.write_str(label)
    }
}

pub const CHANGED_TITLE: &str = "Your updates cannot be saved.";
pub const CHANGED_DETAIL: &str = "Someone else has introduced modification in the meantime. \
Refresh your page to start anew with fresh data. Please note that your changes will be lost.";

/// User-facing status line of a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusMessage {
    text: String,
    severity: Severity,
}

impl StatusMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, severity: Severity, text: impl Into<String>) {
        self.severity = severity;
        self.text = text.into();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.severity = Severity::Info;
    }

    pub fn changed_concurrently(&mut self) {
        self.set(Severity::Danger, format!("{CHANGED_TITLE} {CHANGED_DETAIL}"));
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
