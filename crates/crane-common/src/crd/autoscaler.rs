//! CranePodAutoscaler CRD
//!
//! A CranePodAutoscaler embeds a full HPA spec and a full VPA spec for the same
//! workload. The controller keeps exactly one of them active at a time and
//! holds the other in a disabled shape.

use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscalerSpec;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Conditions;
use super::vpa::{PodUpdatePolicy, UpdateMode, VerticalPodAutoscalerSpec};
use crate::Error;

/// Threshold used when `behavior.vpaCapacityThresholdPercent` is omitted
pub const DEFAULT_VPA_CAPACITY_THRESHOLD_PERCENT: i32 = 80;

/// Replica floor assumed when an HPA spec carries no `minReplicas`
pub const DEFAULT_MIN_REPLICAS: i32 = 1;

/// CranePodAutoscaler arbitrates between horizontal and vertical scaling
/// for one workload.
///
/// Example:
/// ```yaml
/// apiVersion: autoscaling.phihos.github.io/v1alpha1
/// kind: CranePodAutoscaler
/// metadata:
///   name: web
/// spec:
///   hpa:
///     scaleTargetRef: {apiVersion: apps/v1, kind: Deployment, name: web}
///     minReplicas: 2
///     maxReplicas: 10
///   vpa:
///     targetRef: {apiVersion: apps/v1, kind: Deployment, name: web}
///     updatePolicy: {updateMode: Auto}
///   behavior:
///     vpaCapacityThresholdPercent: 80
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "autoscaling.phihos.github.io",
    version = "v1alpha1",
    kind = "CranePodAutoscaler",
    plural = "cranepodautoscalers",
    shortname = "cpa",
    namespaced,
    status = "CranePodAutoscalerStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Strategy","type":"string","jsonPath":".status.conditions[?(@.type==\"ScalingDecision\")].reason"}"#,
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CranePodAutoscalerSpec {
    /// HPA spec applied verbatim while horizontal scaling is active
    pub hpa: HorizontalPodAutoscalerSpec,

    /// VPA spec applied verbatim while vertical scaling is active
    pub vpa: VerticalPodAutoscalerSpec,

    /// Switching behavior
    #[serde(default)]
    pub behavior: CranePodAutoscalerBehavior,
}

/// Tunables for switching between strategies
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CranePodAutoscalerBehavior {
    /// Utilization (target / upperBound, in percent) above which vertical
    /// scaling hands control back to horizontal scaling
    #[serde(default = "default_vpa_capacity_threshold_percent")]
    pub vpa_capacity_threshold_percent: i32,
}

fn default_vpa_capacity_threshold_percent() -> i32 {
    DEFAULT_VPA_CAPACITY_THRESHOLD_PERCENT
}

impl Default for CranePodAutoscalerBehavior {
    fn default() -> Self {
        Self {
            vpa_capacity_threshold_percent: DEFAULT_VPA_CAPACITY_THRESHOLD_PERCENT,
        }
    }
}

/// CranePodAutoscaler status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CranePodAutoscalerStatus {
    /// Available and ScalingDecision conditions
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

impl CranePodAutoscaler {
    /// Check the invariants that admission and reconciliation rely on
    pub fn validate(&self) -> Result<(), Error> {
        let name = self.name_any();
        let spec = &self.spec;

        let Some(vpa_target) = spec.vpa.target_ref.as_ref() else {
            return Err(Error::validation_for_field(
                &name,
                "spec.vpa.targetRef",
                "spec.vpa.targetRef must be set",
            ));
        };
        let hpa_target = &spec.hpa.scale_target_ref;

        let mut diffs = Vec::new();
        if vpa_target.kind != hpa_target.kind {
            diffs.push(format!(
                "kind: {:?} != {:?}",
                vpa_target.kind, hpa_target.kind
            ));
        }
        if vpa_target.name != hpa_target.name {
            diffs.push(format!(
                "name: {:?} != {:?}",
                vpa_target.name, hpa_target.name
            ));
        }
        if vpa_target.api_version != hpa_target.api_version {
            diffs.push(format!(
                "apiVersion: {:?} != {:?}",
                vpa_target.api_version.as_deref().unwrap_or_default(),
                hpa_target.api_version.as_deref().unwrap_or_default()
            ));
        }
        if !diffs.is_empty() {
            return Err(Error::validation_for_field(
                &name,
                "spec.vpa.targetRef",
                format!(
                    "spec.vpa.targetRef does not match spec.hpa.scaleTargetRef: {}",
                    diffs.join(", ")
                ),
            ));
        }

        let Some(min_replicas) = spec.hpa.min_replicas else {
            return Err(Error::validation_for_field(
                &name,
                "spec.hpa.minReplicas",
                "spec.hpa.minReplicas must be set",
            ));
        };
        if min_replicas > spec.hpa.max_replicas {
            return Err(Error::validation_for_field(
                &name,
                "spec.hpa.minReplicas",
                format!(
                    "spec.hpa.minReplicas ({}) must not exceed spec.hpa.maxReplicas ({})",
                    min_replicas, spec.hpa.max_replicas
                ),
            ));
        }

        let threshold = spec.behavior.vpa_capacity_threshold_percent;
        if !(0..=100).contains(&threshold) {
            return Err(Error::validation_for_field(
                &name,
                "spec.behavior.vpaCapacityThresholdPercent",
                format!(
                    "spec.behavior.vpaCapacityThresholdPercent must be between 0 and 100, got {}",
                    threshold
                ),
            ));
        }

        Ok(())
    }

    /// Admission-time defaulting; nothing needs to be filled in beyond serde defaults
    pub fn apply_defaults(&mut self) {}

    /// Configured threshold as a ratio in [0, 1]
    pub fn threshold_ratio(&self) -> f64 {
        f64::from(self.spec.behavior.vpa_capacity_threshold_percent) / 100.0
    }

    /// Reason of the ScalingDecision condition, if a decision was recorded
    pub fn recorded_decision(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.get(crate::CONDITION_SCALING_DECISION))
            .map(|c| c.reason.as_str())
    }

    /// HPA spec for the given activity state
    pub fn hpa_spec(&self, active: bool) -> HorizontalPodAutoscalerSpec {
        if active {
            self.enabled_hpa_spec()
        } else {
            self.disabled_hpa_spec()
        }
    }

    /// VPA spec for the given activity state
    pub fn vpa_spec(&self, active: bool) -> VerticalPodAutoscalerSpec {
        if active {
            self.enabled_vpa_spec()
        } else {
            self.disabled_vpa_spec()
        }
    }

    /// The embedded HPA spec, unchanged
    pub fn enabled_hpa_spec(&self) -> HorizontalPodAutoscalerSpec {
        self.spec.hpa.clone()
    }

    /// The embedded HPA spec pinned to its floor: `maxReplicas = minReplicas`
    pub fn disabled_hpa_spec(&self) -> HorizontalPodAutoscalerSpec {
        let mut spec = self.spec.hpa.clone();
        spec.max_replicas = spec.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS);
        spec
    }

    /// The embedded VPA spec, unchanged
    pub fn enabled_vpa_spec(&self) -> VerticalPodAutoscalerSpec {
        self.spec.vpa.clone()
    }

    /// The embedded VPA spec with `updatePolicy.updateMode = Off`
    pub fn disabled_vpa_spec(&self) -> VerticalPodAutoscalerSpec {
        let mut spec = self.spec.vpa.clone();
        spec.update_policy
            .get_or_insert_with(PodUpdatePolicy::default)
            .update_mode = Some(UpdateMode::Off);
        spec
    }
}
