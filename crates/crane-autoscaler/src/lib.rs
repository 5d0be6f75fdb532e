//! HPA/VPA arbitration for CranePodAutoscaler
//!
//! This crate provides the Kubernetes controller for CranePodAutoscaler CRDs:
//! it owns one HorizontalPodAutoscaler and one VerticalPodAutoscaler per
//! autoscaler and keeps exactly one of them active at a time.
//!
//! Related crates:
//! - `crane-common`: CRD types, errors, telemetry
//! - `crane-operator`: binary wiring the controller to a cluster

#![deny(missing_docs)]

pub mod child;
pub mod controller;
pub mod decision;
pub mod store;
pub mod utilization;

#[cfg(test)]
mod test_fixtures;

pub use controller::{error_policy, reconcile, run_pass, Context, PassOutcome};
pub use decision::{decide, Decision, DecisionInput, DecisionReason, ScalingStrategy};
pub use store::{AutoscalerStore, KubeStore};
pub use utilization::{worst_utilization, Utilization, NO_CONTAINER};

pub use crane_common::{Error, Result};
