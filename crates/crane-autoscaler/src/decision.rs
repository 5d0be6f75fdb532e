//! Scaling decision engine
//!
//! A two-state machine choosing between horizontal and vertical scaling with
//! asymmetric switching conditions:
//!
//! - VPA hands back to HPA as soon as utilization exceeds the threshold.
//! - HPA hands over to VPA only when it sits at its replica floor *and*
//!   utilization is at or below the threshold.

use std::fmt;
use std::str::FromStr;

/// The autoscaler currently in control of the workload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalingStrategy {
    /// HorizontalPodAutoscaler adjusts replica count
    Horizontal,
    /// VerticalPodAutoscaler adjusts container resources
    Vertical,
}

impl ScalingStrategy {
    /// Value stored as the reason of the ScalingDecision condition
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Horizontal => "HPA",
            Self::Vertical => "VPA",
        }
    }
}

impl fmt::Display for ScalingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HPA" => Ok(Self::Horizontal),
            "VPA" => Ok(Self::Vertical),
            other => Err(format!("unknown scaling strategy: {}", other)),
        }
    }
}

/// Strategy chosen when there is no usable history
pub const BOOTSTRAP_STRATEGY: ScalingStrategy = ScalingStrategy::Horizontal;

/// Everything the engine looks at for one pass
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionInput {
    /// Whether the HPA or the VPA child was created during this pass
    pub just_created: bool,
    /// Decision recorded by the previous successful pass
    pub previous: Option<ScalingStrategy>,
    /// Worst target/upperBound ratio from the VPA recommendation
    pub worst_utilization: f64,
    /// Configured threshold percent divided by 100
    pub threshold_ratio: f64,
    /// `status.desiredReplicas` of the HPA; `None` before the HPA reported status
    pub desired_replicas: Option<i32>,
    /// `spec.minReplicas` of the HPA
    pub min_replicas: i32,
}

/// Which rule produced a decision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionReason {
    /// A child was created in this pass
    Bootstrap,
    /// No decision had been recorded yet
    NoPreviousDecision,
    /// VPA was active and utilization went above the threshold
    VerticalOverThreshold,
    /// VPA was active and utilization stayed within the threshold
    VerticalWithinThreshold,
    /// HPA was active, at its floor, and utilization is within the threshold
    HorizontalAtFloor,
    /// HPA was active and stays in control
    HorizontalActive,
}

impl DecisionReason {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::NoPreviousDecision => "no_previous_decision",
            Self::VerticalOverThreshold => "vertical_over_threshold",
            Self::VerticalWithinThreshold => "vertical_within_threshold",
            Self::HorizontalAtFloor => "horizontal_at_floor",
            Self::HorizontalActive => "horizontal_active",
        }
    }

    /// Human-readable explanation
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Bootstrap => "autoscalers were just created",
            Self::NoPreviousDecision => "no previous scaling decision was recorded",
            Self::VerticalOverThreshold => "VPA target capacity threshold reached",
            Self::VerticalWithinThreshold => "VPA utilization is within the capacity threshold",
            Self::HorizontalAtFloor => {
                "HPA replicas at minimum and VPA utilization is within the capacity threshold"
            }
            Self::HorizontalActive => "HPA is above its minimum or VPA utilization is over the threshold",
        }
    }
}

/// Outcome of the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Strategy to activate
    pub strategy: ScalingStrategy,
    /// Rule that fired
    pub reason: DecisionReason,
}

impl Decision {
    /// Message for the ScalingDecision condition; stable while the strategy holds
    pub fn message(&self) -> String {
        format!("Selected autoscaler is now {}", self.strategy)
    }

    /// Message including the rule that fired, for events and logs
    pub fn summary(&self) -> String {
        format!("{}: {}", self.message(), self.reason.describe())
    }
}

/// Decide which strategy is active for the next pass
pub fn decide(input: &DecisionInput) -> Decision {
    use DecisionReason::*;
    use ScalingStrategy::*;

    let decision = |strategy, reason| Decision { strategy, reason };

    if input.just_created {
        return decision(BOOTSTRAP_STRATEGY, Bootstrap);
    }
    let over_threshold = input.worst_utilization > input.threshold_ratio;
    match input.previous {
        None => decision(BOOTSTRAP_STRATEGY, NoPreviousDecision),
        Some(Vertical) if over_threshold => decision(Horizontal, VerticalOverThreshold),
        Some(Vertical) => decision(Vertical, VerticalWithinThreshold),
        Some(Horizontal) => {
            let at_floor = input
                .desired_replicas
                .is_some_and(|desired| desired <= input.min_replicas);
            if at_floor && !over_threshold {
                decision(Vertical, HorizontalAtFloor)
            } else {
                decision(Horizontal, HorizontalActive)
            }
        }
    }
}
