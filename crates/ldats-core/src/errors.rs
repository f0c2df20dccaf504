//! Structured error types shared across LDATS crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`LdatsError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (column names, sizes, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the changepoint engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum LdatsError {
    /// Invalid run configuration, model specification or weights.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Malformed input dataset.
    #[error("data error: {0}")]
    Data(ErrorInfo),
    /// Numerical failures that cannot be absorbed by the sampler.
    #[error("numeric error: {0}")]
    Numeric(ErrorInfo),
    /// Serialization, schema and file-system errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl LdatsError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            LdatsError::Config(info)
            | LdatsError::Data(info)
            | LdatsError::Numeric(info)
            | LdatsError::Serde(info) => info,
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        LdatsError::Config(ErrorInfo::new(code, message))
    }

    /// Shorthand for a dataset error.
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        LdatsError::Data(ErrorInfo::new(code, message))
    }

    /// Returns true when the error was raised by configuration validation.
    pub fn is_config(&self) -> bool {
        matches!(self, LdatsError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_and_hint() {
        let err = LdatsError::Config(
            ErrorInfo::new("thin-zero", "thin must be positive")
                .with_context("thin", 0)
                .with_hint("use thin >= 1"),
        );
        let text = err.to_string();
        assert!(text.starts_with("config error: thin must be positive (code: thin-zero)"));
        assert!(text.contains("thin=0"));
        assert!(text.contains("hint: use thin >= 1"));
        assert!(err.is_config());
    }

    #[test]
    fn serializes_with_family_tag() {
        let err = LdatsError::data("unsorted-time", "times must increase");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"family\":\"Data\""));
        let back: LdatsError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
