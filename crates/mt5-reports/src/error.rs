//! Error taxonomy for a single report run
//!
//! Connection, validation and render failures abort the current run only.
//! Malformed deal rows are not errors; they are counted on `CategorizedDeals`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot reach database '{target}': {source}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("invalid filter criteria: {0}")]
    Validation(String),

    #[error("failed to render {artifact}: {reason}")]
    Render { artifact: String, reason: String },

    #[error("configuration store: {0}")]
    Store(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReportError {
    pub fn render(artifact: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Render {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the run never reached the database
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_message() {
        let err = ReportError::render("summary.xlsx", "disk full");
        assert_eq!(err.to_string(), "failed to render summary.xlsx: disk full");
        assert!(!err.is_connection());
    }

    #[test]
    fn test_connection_error_keeps_target() {
        let err = ReportError::Connection {
            target: "mt5gn_live".to_string(),
            source: sqlx::Error::PoolTimedOut,
        };
        assert!(err.is_connection());
        assert!(err.to_string().contains("mt5gn_live"));
    }
}
