//! Common types for the crane autoscaler: CRDs, conditions, errors and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod quantity;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every write issued by the controller
pub const FIELD_MANAGER: &str = "crane-controller";

/// Name reported on Kubernetes Events emitted by the controller
pub const CONTROLLER_NAME: &str = "crane-autoscaler-controller";

/// Standard Kubernetes label: managed-by
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label on children created by the controller
pub const LABEL_MANAGED_BY_CRANE: &str = "crane-autoscaler";

/// Condition type carrying the overall health of an autoscaler
pub const CONDITION_AVAILABLE: &str = "Available";

/// Condition type whose reason records the currently active strategy
pub const CONDITION_SCALING_DECISION: &str = "ScalingDecision";

/// Reason used on the `Available` condition
pub const REASON_RECONCILING: &str = "Reconciling";
