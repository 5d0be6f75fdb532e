//! Worst-case utilization across VPA container recommendations

use std::collections::BTreeMap;

use crane_common::crd::RecommendedContainerResources;
use crane_common::quantity;
use crane_common::Result;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Container name reported when no container produced a ratio
pub const NO_CONTAINER: &str = "NOCONTAINER";

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// The largest target/upperBound ratio and the container it came from
#[derive(Clone, Debug, PartialEq)]
pub struct Utilization {
    /// Container that produced the ratio, or [`NO_CONTAINER`]
    pub container: String,
    /// target / upperBound; 0 when nothing contributed
    pub ratio: f64,
}

impl Default for Utilization {
    fn default() -> Self {
        Self {
            container: NO_CONTAINER.to_string(),
            ratio: 0.0,
        }
    }
}

/// Compute the worst utilization over CPU (millis) and memory (bytes) of
/// every container.
///
/// A dimension whose upper bound is zero, missing or unparseable does not
/// contribute. Ties keep the first container that reached the maximum.
pub fn worst_utilization(recommendations: &[RecommendedContainerResources]) -> Utilization {
    let mut worst = Utilization::default();
    for rec in recommendations {
        let ratios = [
            dimension_ratio(&rec.target, &rec.upper_bound, CPU, quantity::milli_value),
            dimension_ratio(&rec.target, &rec.upper_bound, MEMORY, quantity::value),
        ];
        for ratio in ratios.into_iter().flatten() {
            if ratio > worst.ratio {
                worst.ratio = ratio;
                worst.container.clone_from(&rec.container_name);
            }
        }
    }
    worst
}

fn dimension_ratio(
    target: &BTreeMap<String, Quantity>,
    upper_bound: &BTreeMap<String, Quantity>,
    resource: &str,
    scale: fn(&Quantity) -> Result<i64>,
) -> Option<f64> {
    let upper = upper_bound.get(resource).and_then(|q| scale(q).ok())?;
    if upper <= 0 {
        return None;
    }
    // A missing target is zero usage
    let target = match target.get(resource) {
        Some(q) => scale(q).ok()?,
        None => 0,
    };
    Some(target as f64 / upper as f64)
}
