use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// A toast-style message for the host to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Error)]
pub enum CommissionError {
    #[error("failed to load commission data: {0}")]
    Load(String),
    #[error("{0}")]
    Validation(String),
    #[error("{}", submission_text(.message, .partial_errors))]
    Submission {
        message: String,
        partial_errors: Vec<String>,
    },
    #[error("failed to delete existing commissions: {0}")]
    Delete(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CommissionError {
    pub fn notification(&self) -> Notification {
        let (title, severity) = match self {
            CommissionError::Load(_) => ("Error loading data", Severity::Error),
            CommissionError::Validation(_) => ("Validation error", Severity::Warning),
            CommissionError::Submission { .. } => ("Error saving commissions", Severity::Error),
            CommissionError::Delete(_) => ("Error deleting commissions", Severity::Error),
            CommissionError::Config(_) => ("Configuration error", Severity::Error),
        };
        Notification::new(title, self.to_string(), severity)
    }
}

/// Top-level message followed by each per-record failure, in order.
pub fn submission_text(message: &str, partial_errors: &[String]) -> String {
    if partial_errors.is_empty() {
        message.to_string()
    } else {
        format!("{message}: {}", partial_errors.join("; "))
    }
}
