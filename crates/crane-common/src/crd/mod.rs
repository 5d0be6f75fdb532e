//! Custom Resource Definitions used by crane
//!
//! `CranePodAutoscaler` is owned and registered by crane. `VerticalPodAutoscaler`
//! belongs to the VPA project and is only modelled client-side.

mod autoscaler;
mod types;
mod vpa;

pub use autoscaler::{
    CranePodAutoscaler, CranePodAutoscalerBehavior, CranePodAutoscalerSpec,
    CranePodAutoscalerStatus, DEFAULT_MIN_REPLICAS, DEFAULT_VPA_CAPACITY_THRESHOLD_PERCENT,
};
pub use types::{Condition, ConditionStatus, Conditions};
pub use vpa::{
    ContainerResourcePolicy, PodResourcePolicy, PodUpdatePolicy, RecommendedContainerResources,
    RecommendedPodResources, UpdateMode, VerticalPodAutoscaler, VerticalPodAutoscalerCondition,
    VerticalPodAutoscalerRecommenderSelector, VerticalPodAutoscalerSpec,
    VerticalPodAutoscalerStatus,
};
