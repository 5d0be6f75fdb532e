//! Controller runner - wires the CranePodAutoscaler reconciler to the cluster

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use crane_autoscaler::{error_policy, reconcile, Context, KubeStore};
use crane_common::crd::{CranePodAutoscaler, VerticalPodAutoscaler};
use crane_common::events::KubeEventPublisher;
use crane_common::CONTROLLER_NAME;

use crate::config::OperatorConfig;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the reconciliation context from configuration
pub fn build_context(client: Client, config: &OperatorConfig) -> Arc<Context> {
    Arc::new(
        Context::new(
            Arc::new(KubeStore::new(client.clone())),
            Arc::new(KubeEventPublisher::new(
                client,
                CONTROLLER_NAME,
                config.pod_name.clone(),
            )),
        )
        .with_resync_interval(config.resync_interval)
        .with_error_requeue(config.error_requeue),
    )
}

/// Build the CranePodAutoscaler controller future
///
/// Changes to owned HPAs and VPAs requeue their parent through the
/// controller owner reference. Resolves once a shutdown signal was received
/// and in-flight passes finished.
pub fn build_autoscaler_controller(
    client: Client,
    config: &OperatorConfig,
) -> impl Future<Output = ()> + Send {
    let namespace = config.watch_namespace.as_deref();
    let autoscalers: Api<CranePodAutoscaler> = api(&client, namespace);
    let hpas: Api<HorizontalPodAutoscaler> = api(&client, namespace);
    let vpas: Api<VerticalPodAutoscaler> = api(&client, namespace);
    let ctx = build_context(client, config);

    match namespace {
        Some(ns) => tracing::info!(namespace = %ns, "- CranePodAutoscaler controller"),
        None => tracing::info!("- CranePodAutoscaler controller (all namespaces)"),
    }

    Controller::new(autoscalers, watcher_config())
        .owns(hpas, watcher_config())
        .owns(vpas, watcher_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("CranePodAutoscaler"))
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
