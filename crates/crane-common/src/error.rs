//! Error types for the crane autoscaler
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the autoscaler or resource it is about so the
//! orchestrator can log and report it without extra bookkeeping.

use thiserror::Error;

/// Main error type for crane operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error (reads, creates, updates, conflicts)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a CranePodAutoscaler spec
    #[error("validation error for {autoscaler}: {message}")]
    Validation {
        /// Name of the autoscaler with invalid configuration
        autoscaler: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.hpa.minReplicas")
        field: Option<String>,
    },

    /// A child autoscaler could not be defined before any API call
    #[error("failed to define {kind} for {autoscaler}: {message}")]
    Definition {
        /// Name of the owning autoscaler
        autoscaler: String,
        /// Child kind (HPA or VPA)
        kind: String,
        /// Description of what failed
        message: String,
    },

    /// A resource quantity could not be parsed
    #[error("invalid quantity '{quantity}': {message}")]
    Quantity {
        /// The offending quantity string
        quantity: String,
        /// Description of what's wrong with it
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "telemetry", "startup")
        context: String,
    },
}

impl Error {
    /// Create a validation error with autoscaler context and field path
    pub fn validation_for_field(
        autoscaler: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            autoscaler: autoscaler.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a definition error for a child kind
    pub fn definition(
        autoscaler: impl Into<String>,
        kind: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Definition {
            autoscaler: autoscaler.into(),
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a quantity parse error
    pub fn quantity(quantity: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Quantity {
            quantity: quantity.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the API server rejected a write because of a stale resourceVersion
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// Stable short label for metrics and logs
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::Kube { .. } if self.is_conflict() => "conflict",
            Error::Kube { .. } => "store",
            Error::Validation { .. } => "validation",
            Error::Definition { .. } => "definition",
            Error::Quantity { .. } => "quantity",
            Error::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn validation_error_carries_field_and_autoscaler() {
        let err = Error::validation_for_field("web", "spec.hpa.minReplicas", "must be set");
        match &err {
            Error::Validation {
                autoscaler,
                field,
                message,
            } => {
                assert_eq!(autoscaler, "web");
                assert_eq!(field.as_deref(), Some("spec.hpa.minReplicas"));
                assert_eq!(message, "must be set");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(err.to_string(), "validation error for web: must be set");
    }

    #[test]
    fn conflict_is_detected_from_api_status() {
        let err = api_error(409, "Conflict");
        assert!(err.is_conflict());
        assert_eq!(err.kind_label(), "conflict");
    }

    #[test]
    fn other_api_failures_are_store_errors() {
        let err = api_error(404, "NotFound");
        assert!(!err.is_conflict());
        assert_eq!(err.kind_label(), "store");
    }

    #[test]
    fn definition_error_message_names_the_kind() {
        let err = Error::definition("web", "VPA", "parent has no uid");
        assert_eq!(err.to_string(), "failed to define VPA for web: parent has no uid");
        assert_eq!(err.kind_label(), "definition");
    }

    #[test]
    fn labels_are_distinct_per_variant() {
        let labels = [
            Error::validation_for_field("a", "spec", "x").kind_label(),
            Error::definition("a", "HPA", "x").kind_label(),
            Error::quantity("1Zi", "x").kind_label(),
            Error::internal_with_context("startup", "x").kind_label(),
        ];
        let mut unique = labels.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), labels.len());
    }
}
