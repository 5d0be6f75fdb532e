//! VerticalPodAutoscaler client-side types
//!
//! The VPA kind is owned by the Kubernetes autoscaler project and installed
//! with it. Only the fields the controller reads or writes are modelled; the
//! CRD itself is never registered by crane.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::autoscaling::v1::CrossVersionObjectReference;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired behavior of a VerticalPodAutoscaler (`autoscaling.k8s.io/v1`)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "autoscaling.k8s.io",
    version = "v1",
    kind = "VerticalPodAutoscaler",
    plural = "verticalpodautoscalers",
    shortname = "vpa",
    namespaced,
    status = "VerticalPodAutoscalerStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VerticalPodAutoscalerSpec {
    /// Workload controller whose pods the VPA manages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<CrossVersionObjectReference>,

    /// Whether and how recommendations are applied to pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<PodUpdatePolicy>,

    /// Per-container bounds on recommendations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_policy: Option<PodResourcePolicy>,

    /// Recommenders responsible for this VPA; the default recommender when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommenders: Vec<VerticalPodAutoscalerRecommenderSelector>,
}

/// Update policy of a VPA
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodUpdatePolicy {
    /// How recommendations are applied; `Auto` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mode: Option<UpdateMode>,

    /// Minimal number of live replicas required before the updater evicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
}

/// VPA update modes
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum UpdateMode {
    /// Recommendations are computed but never applied
    Off,
    /// Recommendations are applied at pod creation only
    Initial,
    /// Pods are evicted and recreated with new resources
    Recreate,
    /// Currently equivalent to `Recreate`
    Auto,
}

/// Resource policy of a VPA
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodResourcePolicy {
    /// Per-container policies; `*` matches every container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_policies: Vec<ContainerResourcePolicy>,
}

/// Resource policy of a single container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourcePolicy {
    /// Container name, or `*` for the default policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    /// `Auto` or `Off`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Lower bounds for recommended resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_allowed: Option<BTreeMap<String, Quantity>>,

    /// Upper bounds for recommended resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_allowed: Option<BTreeMap<String, Quantity>>,

    /// Resources the recommender computes (cpu, memory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlled_resources: Option<Vec<String>>,

    /// `RequestsAndLimits` or `RequestsOnly`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlled_values: Option<String>,
}

/// Reference to a recommender by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct VerticalPodAutoscalerRecommenderSelector {
    /// Name of the recommender
    pub name: String,
}

/// Observed state of a VPA, written by the VPA recommender
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerticalPodAutoscalerStatus {
    /// Most recently computed resource recommendation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<RecommendedPodResources>,

    /// Conditions reported by the VPA components
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<VerticalPodAutoscalerCondition>,
}

impl VerticalPodAutoscalerStatus {
    /// Container recommendations, empty when none were published yet
    pub fn container_recommendations(&self) -> &[RecommendedContainerResources] {
        self.recommendation
            .as_ref()
            .map(|r| r.container_recommendations.as_slice())
            .unwrap_or_default()
    }
}

/// Recommendation for all containers of a pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedPodResources {
    /// One entry per container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_recommendations: Vec<RecommendedContainerResources>,
}

/// Recommendation for a single container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedContainerResources {
    /// Name of the container
    pub container_name: String,

    /// Recommended amount of resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target: BTreeMap<String, Quantity>,

    /// Minimum recommended amount of resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lower_bound: BTreeMap<String, Quantity>,

    /// Maximum recommended amount of resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub upper_bound: BTreeMap<String, Quantity>,

    /// Recommendation ignoring the resource policy bounds
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub uncapped_target: BTreeMap<String, Quantity>,
}

/// Condition reported on a VPA
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerticalPodAutoscalerCondition {
    /// Condition type (e.g. RecommendationProvided)
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    pub status: String,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_recommender_output() {
        let yaml = r#"
recommendation:
  containerRecommendations:
    - containerName: app
      target: {cpu: 250m, memory: 256Mi}
      lowerBound: {cpu: 100m, memory: 128Mi}
      upperBound: {cpu: "1", memory: 1Gi}
      uncappedTarget: {cpu: 250m, memory: 256Mi}
conditions:
  - type: RecommendationProvided
    status: "True"
    lastTransitionTime: "2024-05-01T10:00:00Z"
"#;
        let status: VerticalPodAutoscalerStatus = serde_yaml::from_str(yaml).unwrap();
        let recs = status.container_recommendations();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].container_name, "app");
        assert_eq!(recs[0].target["cpu"].0, "250m");
        assert_eq!(recs[0].upper_bound["memory"].0, "1Gi");
        assert_eq!(status.conditions[0].type_, "RecommendationProvided");
    }

    #[test]
    fn empty_status_has_no_recommendations() {
        let status = VerticalPodAutoscalerStatus::default();
        assert!(status.container_recommendations().is_empty());
    }

    #[test]
    fn update_mode_uses_upstream_spelling() {
        let policy = PodUpdatePolicy {
            update_mode: Some(UpdateMode::Off),
            min_replicas: None,
        };
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value, serde_json::json!({"updateMode": "Off"}));
    }

    #[test]
    fn spec_round_trips_target_ref() {
        let yaml = r#"
targetRef:
  apiVersion: apps/v1
  kind: Deployment
  name: web
updatePolicy:
  updateMode: Auto
resourcePolicy:
  containerPolicies:
    - containerName: "*"
      maxAllowed: {cpu: "2"}
"#;
        let spec: VerticalPodAutoscalerSpec = serde_yaml::from_str(yaml).unwrap();
        let target = spec.target_ref.as_ref().unwrap();
        assert_eq!(target.kind, "Deployment");
        assert_eq!(target.name, "web");
        assert_eq!(target.api_version.as_deref(), Some("apps/v1"));
        assert_eq!(
            spec.update_policy.as_ref().unwrap().update_mode,
            Some(UpdateMode::Auto)
        );
        let policies = &spec.resource_policy.as_ref().unwrap().container_policies;
        assert_eq!(policies[0].container_name.as_deref(), Some("*"));
    }
}
