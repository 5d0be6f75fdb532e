//! Sample objects shared by unit tests

use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscalerStatus;

use crane_common::crd::{CranePodAutoscaler, VerticalPodAutoscalerStatus};

/// A valid CranePodAutoscaler in `default` targeting Deployment `name`
pub fn autoscaler(name: &str, min_replicas: i32, max_replicas: i32) -> CranePodAutoscaler {
    let yaml = format!(
        r#"
apiVersion: autoscaling.phihos.github.io/v1alpha1
kind: CranePodAutoscaler
metadata:
  name: {name}
  namespace: default
  uid: uid-{name}
  generation: 1
  resourceVersion: "1"
spec:
  hpa:
    scaleTargetRef: {{apiVersion: apps/v1, kind: Deployment, name: {name}}}
    minReplicas: {min_replicas}
    maxReplicas: {max_replicas}
  vpa:
    targetRef: {{apiVersion: apps/v1, kind: Deployment, name: {name}}}
    updatePolicy: {{updateMode: Auto}}
  behavior:
    vpaCapacityThresholdPercent: 80
"#
    );
    serde_yaml::from_str(&yaml).expect("fixture parses")
}

/// HPA status reporting `desired` replicas
pub fn hpa_status(desired: i32) -> HorizontalPodAutoscalerStatus {
    HorizontalPodAutoscalerStatus {
        current_replicas: Some(desired),
        desired_replicas: desired,
        ..Default::default()
    }
}

/// VPA status with one `app` container recommending `target` out of `upper` CPU
pub fn vpa_status(target_cpu: &str, upper_cpu: &str) -> VerticalPodAutoscalerStatus {
    let yaml = format!(
        r#"
recommendation:
  containerRecommendations:
    - containerName: app
      target: {{cpu: "{target_cpu}"}}
      upperBound: {{cpu: "{upper_cpu}"}}
"#
    );
    serde_yaml::from_str(&yaml).expect("fixture parses")
}
