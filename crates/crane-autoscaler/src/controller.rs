//! CranePodAutoscaler reconciler
//!
//! One pass reads the autoscaler and its two children fresh, decides which
//! strategy is active, rewrites the children's specs to match and records the
//! decision in status. Nothing is kept in memory between passes; the
//! ScalingDecision condition is the only history.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crane_common::crd::{
    Condition, ConditionStatus, CranePodAutoscaler, CranePodAutoscalerStatus,
    VerticalPodAutoscaler, DEFAULT_MIN_REPLICAS,
};
use crane_common::events::{actions, reasons, EventPublisher};
use crane_common::metrics::{self, ReconcileTimer, WriteOperation};
use crane_common::{Error, CONDITION_AVAILABLE, CONDITION_SCALING_DECISION, REASON_RECONCILING};

use crate::child::{fetch_or_create, sync, ManagedChild, SyncOutcome};
use crate::decision::{decide, Decision, DecisionInput, ScalingStrategy};
use crate::store::AutoscalerStore;
use crate::utilization::worst_utilization;

/// Requeue interval after a successful pass
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue interval after a failed pass
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Shared state for all reconciliations
pub struct Context {
    /// API access for autoscalers and children
    pub store: Arc<dyn AutoscalerStore>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Requeue interval after success
    pub resync_interval: Duration,
    /// Requeue interval after failure
    pub error_requeue: Duration,
}

impl Context {
    /// Create a context with default requeue intervals
    pub fn new(store: Arc<dyn AutoscalerStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            events,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }

    /// Override the success requeue interval
    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Override the failure requeue interval
    pub fn with_error_requeue(mut self, interval: Duration) -> Self {
        self.error_requeue = interval;
        self
    }
}

/// How a pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The autoscaler no longer exists
    Deleted,
    /// Children and status reflect this decision
    Reconciled(Decision),
}

/// Reconcile a CranePodAutoscaler
///
/// The object handed in by the watcher only identifies the autoscaler; the
/// pass always re-reads it from the API server.
#[instrument(
    skip(autoscaler, ctx),
    fields(autoscaler = %autoscaler.name_any(), namespace = %autoscaler.namespace().unwrap_or_default())
)]
pub async fn reconcile(autoscaler: Arc<CranePodAutoscaler>, ctx: Arc<Context>) -> Result<Action, Error> {
    let timer = ReconcileTimer::start();
    let name = autoscaler.name_any();
    let Some(namespace) = autoscaler.namespace() else {
        let err = Error::internal_with_context("reconcile", format!("{} has no namespace", name));
        timer.error(err.kind_label());
        return Err(err);
    };

    match run_pass(&ctx, &namespace, &name).await {
        Ok(PassOutcome::Deleted) => {
            timer.success();
            Ok(Action::await_change())
        }
        Ok(PassOutcome::Reconciled(_)) => {
            timer.success();
            Ok(Action::requeue(ctx.resync_interval))
        }
        Err(e) => {
            timer.error(e.kind_label());
            Err(e)
        }
    }
}

/// Requeue policy for failed passes
pub fn error_policy(autoscaler: Arc<CranePodAutoscaler>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        debug!(
            autoscaler = %autoscaler.name_any(),
            "status conflict, retrying with a fresh read"
        );
    } else {
        error!(
            ?error,
            autoscaler = %autoscaler.name_any(),
            namespace = %autoscaler.namespace().unwrap_or_default(),
            "reconciliation failed"
        );
    }
    Action::requeue(ctx.error_requeue)
}

/// Run one reconciliation pass for `namespace/name`
pub async fn run_pass(ctx: &Context, namespace: &str, name: &str) -> Result<PassOutcome, Error> {
    let store = ctx.store.as_ref();

    let Some(mut autoscaler) = store.get_autoscaler(namespace, name).await? else {
        info!("autoscaler not found, assuming it was deleted");
        return Ok(PassOutcome::Deleted);
    };

    let uninitialized = autoscaler
        .status
        .as_ref()
        .map_or(true, |s| s.conditions.is_empty());
    if uninitialized {
        let mut status = CranePodAutoscalerStatus::default();
        status.conditions.set(available(
            &autoscaler,
            ConditionStatus::Unknown,
            "Starting reconciliation",
        ));
        write_status(store, &autoscaler, &status).await?;

        autoscaler = match store.get_autoscaler(namespace, name).await? {
            Some(fresh) => fresh,
            None => return Ok(PassOutcome::Deleted),
        };
    }
    let mut status = autoscaler.status.clone().unwrap_or_default();

    autoscaler.apply_defaults();
    if let Err(e) = autoscaler.validate() {
        warn!(error = %e, "validation failed");
        publish(
            ctx,
            &autoscaler,
            EventType::Warning,
            reasons::VALIDATION_FAILED,
            e.to_string(),
        )
        .await;
        return Err(fail(store, &autoscaler, &mut status, format!("Validation failed: {}", e), e).await);
    }

    let (vpa, vpa_created) = ensure_child::<VerticalPodAutoscaler>(store, &autoscaler, &mut status).await?;
    let (hpa, hpa_created) = ensure_child::<HorizontalPodAutoscaler>(store, &autoscaler, &mut status).await?;

    let utilization = worst_utilization(
        vpa.status
            .as_ref()
            .map(|s| s.container_recommendations())
            .unwrap_or_default(),
    );
    metrics::set_worst_utilization(utilization.ratio);

    let previous = autoscaler
        .recorded_decision()
        .and_then(|reason| reason.parse::<ScalingStrategy>().ok());
    let input = DecisionInput {
        just_created: vpa_created || hpa_created,
        previous,
        worst_utilization: utilization.ratio,
        threshold_ratio: autoscaler.threshold_ratio(),
        desired_replicas: hpa.status.as_ref().map(|s| s.desired_replicas),
        min_replicas: hpa
            .spec
            .as_ref()
            .and_then(|s| s.min_replicas)
            .unwrap_or(DEFAULT_MIN_REPLICAS),
    };
    let decision = decide(&input);
    metrics::record_scaling_decision(decision.strategy.as_str(), decision.reason.as_str());
    debug!(
        active = %decision.strategy,
        reason = decision.reason.as_str(),
        ratio = utilization.ratio,
        container = %utilization.container,
        threshold = input.threshold_ratio,
        "decided which autoscaler to activate"
    );

    status.conditions.set(
        Condition::new(
            CONDITION_SCALING_DECISION,
            ConditionStatus::True,
            decision.strategy.as_str(),
            decision.message(),
        )
        .with_observed_generation(autoscaler.metadata.generation),
    );

    // Passive child first: at most one autoscaler is ever enabled
    match decision.strategy {
        ScalingStrategy::Horizontal => {
            sync_child(store, &autoscaler, &mut status, &vpa, false).await?;
            sync_child(store, &autoscaler, &mut status, &hpa, true).await?;
        }
        ScalingStrategy::Vertical => {
            sync_child(store, &autoscaler, &mut status, &hpa, false).await?;
            sync_child(store, &autoscaler, &mut status, &vpa, true).await?;
        }
    }

    status.conditions.set(available(
        &autoscaler,
        ConditionStatus::True,
        "Reconciliation successful",
    ));
    if autoscaler.status.as_ref() != Some(&status) {
        write_status(store, &autoscaler, &status).await?;
    }

    if previous != Some(decision.strategy) {
        info!(
            previous = previous.map(|p| p.as_str()).unwrap_or("none"),
            active = %decision.strategy,
            reason = decision.reason.as_str(),
            "scaling decision changed"
        );
        publish(
            ctx,
            &autoscaler,
            EventType::Normal,
            reasons::SCALING_DECISION_CHANGED,
            decision.summary(),
        )
        .await;
    }

    Ok(PassOutcome::Reconciled(decision))
}

fn available(autoscaler: &CranePodAutoscaler, status: ConditionStatus, message: impl Into<String>) -> Condition {
    Condition::new(CONDITION_AVAILABLE, status, REASON_RECONCILING, message)
        .with_observed_generation(autoscaler.metadata.generation)
}

async fn write_status(
    store: &dyn AutoscalerStore,
    autoscaler: &CranePodAutoscaler,
    status: &CranePodAutoscalerStatus,
) -> Result<CranePodAutoscaler, Error> {
    store
        .patch_autoscaler_status(autoscaler, status)
        .await
        .inspect_err(|e| warn!(error = %e, "failed to update autoscaler status"))
}

/// Record `message` on the Available condition and hand back `err`.
///
/// A conflicting status write replaces `err` so the pass is retried as a
/// conflict; other write failures are only logged.
async fn fail(
    store: &dyn AutoscalerStore,
    autoscaler: &CranePodAutoscaler,
    status: &mut CranePodAutoscalerStatus,
    message: String,
    err: Error,
) -> Error {
    status
        .conditions
        .set(available(autoscaler, ConditionStatus::False, message));
    match write_status(store, autoscaler, status).await {
        Err(write_err) if write_err.is_conflict() => write_err,
        _ => err,
    }
}

/// Child-level failures: definition errors are reported in status, store
/// errors are only logged since a status write would hit the same store.
async fn child_failure<C: ManagedChild>(
    store: &dyn AutoscalerStore,
    autoscaler: &CranePodAutoscaler,
    status: &mut CranePodAutoscalerStatus,
    err: Error,
) -> Error {
    error!(
        error = %err,
        kind = C::KIND,
        namespace = %autoscaler.namespace().unwrap_or_default(),
        name = %autoscaler.name_any(),
        "failed to reconcile child autoscaler"
    );
    match err {
        Error::Definition { .. } => {
            let message = format!(
                "Failed to create {} for the custom resource ({}): ({})",
                C::KIND,
                autoscaler.name_any(),
                err
            );
            fail(store, autoscaler, status, message, err).await
        }
        other => other,
    }
}

async fn ensure_child<C: ManagedChild>(
    store: &dyn AutoscalerStore,
    autoscaler: &CranePodAutoscaler,
    status: &mut CranePodAutoscalerStatus,
) -> Result<(C, bool), Error> {
    match fetch_or_create::<C>(store, autoscaler).await {
        Ok((child, created)) => {
            if created {
                info!(kind = C::KIND, "created child autoscaler");
                metrics::record_child_write(C::KIND, WriteOperation::Create);
            }
            Ok((child, created))
        }
        Err(e) => Err(child_failure::<C>(store, autoscaler, status, e).await),
    }
}

async fn sync_child<C: ManagedChild>(
    store: &dyn AutoscalerStore,
    autoscaler: &CranePodAutoscaler,
    status: &mut CranePodAutoscalerStatus,
    live: &C,
    active: bool,
) -> Result<(), Error> {
    match sync(store, autoscaler, live, active).await {
        Ok(SyncOutcome::Updated) => {
            info!(kind = C::KIND, active, "updated child autoscaler");
            metrics::record_child_write(C::KIND, WriteOperation::Update);
            Ok(())
        }
        Ok(SyncOutcome::Unchanged) => Ok(()),
        Err(e) => Err(child_failure::<C>(store, autoscaler, status, e).await),
    }
}

async fn publish(
    ctx: &Context,
    autoscaler: &CranePodAutoscaler,
    type_: EventType,
    reason: &str,
    note: String,
) {
    ctx.events
        .publish(
            &autoscaler.object_ref(&()),
            type_,
            reason,
            actions::RECONCILE,
            Some(note),
        )
        .await;
}
