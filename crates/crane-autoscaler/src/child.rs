//! HPA and VPA children of a CranePodAutoscaler
//!
//! Both kinds go through the same lifecycle: created once with the bootstrap
//! template, then rewritten in place whenever the template for the current
//! decision differs from what is live. Only `spec` and owner references are
//! ever written; `status` belongs to the autoscaling subsystem.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::{HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crane_common::crd::{CranePodAutoscaler, VerticalPodAutoscaler, VerticalPodAutoscalerSpec};
use crane_common::{Error, LABEL_MANAGED_BY, LABEL_MANAGED_BY_CRANE};

use crate::decision::{ScalingStrategy, BOOTSTRAP_STRATEGY};
use crate::store::AutoscalerStore;

/// A child autoscaler kind managed on behalf of a CranePodAutoscaler
#[async_trait]
pub trait ManagedChild: Resource<DynamicType = ()> + Clone + Send + Sync + Sized + 'static {
    /// Spec type compared and replaced on every pass
    type Spec: Clone + PartialEq + Send + Sync;

    /// Short kind used in logs, metrics and condition messages
    const KIND: &'static str;

    /// Strategy this child implements
    const STRATEGY: ScalingStrategy;

    /// Template for this kind: enabled when `active`, disabled otherwise
    fn desired_spec(parent: &CranePodAutoscaler, active: bool) -> Self::Spec;

    /// Live spec, if any
    fn spec(&self) -> Option<&Self::Spec>;

    /// Overwrite the spec, leaving metadata and status alone
    fn set_spec(&mut self, spec: Self::Spec);

    /// Assemble a new object without status
    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self;

    /// Read the child; `None` when missing
    async fn fetch(
        store: &dyn AutoscalerStore,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, Error>;

    /// Create the child
    async fn create(store: &dyn AutoscalerStore, child: &Self) -> Result<Self, Error>;

    /// Replace the child's spec
    async fn replace(store: &dyn AutoscalerStore, child: &Self) -> Result<Self, Error>;
}

#[async_trait]
impl ManagedChild for HorizontalPodAutoscaler {
    type Spec = HorizontalPodAutoscalerSpec;
    const KIND: &'static str = "HPA";
    const STRATEGY: ScalingStrategy = ScalingStrategy::Horizontal;

    fn desired_spec(parent: &CranePodAutoscaler, active: bool) -> Self::Spec {
        parent.hpa_spec(active)
    }

    fn spec(&self) -> Option<&Self::Spec> {
        self.spec.as_ref()
    }

    fn set_spec(&mut self, spec: Self::Spec) {
        self.spec = Some(spec);
    }

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        HorizontalPodAutoscaler {
            metadata,
            spec: Some(spec),
            status: None,
        }
    }

    async fn fetch(
        store: &dyn AutoscalerStore,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, Error> {
        store.get_hpa(namespace, name).await
    }

    async fn create(store: &dyn AutoscalerStore, child: &Self) -> Result<Self, Error> {
        store.create_hpa(child).await
    }

    async fn replace(store: &dyn AutoscalerStore, child: &Self) -> Result<Self, Error> {
        store.replace_hpa(child).await
    }
}

#[async_trait]
impl ManagedChild for VerticalPodAutoscaler {
    type Spec = VerticalPodAutoscalerSpec;
    const KIND: &'static str = "VPA";
    const STRATEGY: ScalingStrategy = ScalingStrategy::Vertical;

    fn desired_spec(parent: &CranePodAutoscaler, active: bool) -> Self::Spec {
        parent.vpa_spec(active)
    }

    fn spec(&self) -> Option<&Self::Spec> {
        Some(&self.spec)
    }

    fn set_spec(&mut self, spec: Self::Spec) {
        self.spec = spec;
    }

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        VerticalPodAutoscaler {
            metadata,
            spec,
            status: None,
        }
    }

    async fn fetch(
        store: &dyn AutoscalerStore,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, Error> {
        store.get_vpa(namespace, name).await
    }

    async fn create(store: &dyn AutoscalerStore, child: &Self) -> Result<Self, Error> {
        store.create_vpa(child).await
    }

    async fn replace(store: &dyn AutoscalerStore, child: &Self) -> Result<Self, Error> {
        store.replace_vpa(child).await
    }
}

/// Result of [`sync`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Live child already matched; nothing was written
    Unchanged,
    /// Child spec was replaced
    Updated,
}

fn owner_reference<C: ManagedChild>(parent: &CranePodAutoscaler) -> Result<OwnerReference, Error> {
    let mut owner = parent.controller_owner_ref(&()).ok_or_else(|| {
        Error::definition(
            parent.name_any(),
            C::KIND,
            "autoscaler has no name or uid to reference as owner",
        )
    })?;
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

/// Whether the child template for `C` starts out active
pub fn bootstrap_active<C: ManagedChild>() -> bool {
    C::STRATEGY == BOOTSTRAP_STRATEGY
}

/// Desired child object named after `parent` and owned by it
pub fn build_child<C: ManagedChild>(parent: &CranePodAutoscaler, active: bool) -> Result<C, Error> {
    let owner = owner_reference::<C>(parent)?;
    let metadata = ObjectMeta {
        name: Some(parent.name_any()),
        namespace: parent.namespace(),
        labels: Some(BTreeMap::from([(
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_CRANE.to_string(),
        )])),
        owner_references: Some(vec![owner]),
        ..Default::default()
    };
    Ok(C::from_parts(metadata, C::desired_spec(parent, active)))
}

/// Compute the update needed to bring `live` in line with the template.
///
/// Returns `None` when the spec already matches and `parent` is the
/// controller owner. Otherwise returns `live` with its spec replaced and the
/// owner reference ensured; status is carried over untouched.
pub fn plan_update<C: ManagedChild>(
    parent: &CranePodAutoscaler,
    live: &C,
    active: bool,
) -> Result<Option<C>, Error> {
    let owner = owner_reference::<C>(parent)?;
    let desired = C::desired_spec(parent, active);
    let owned = live
        .owner_references()
        .iter()
        .any(|r| r.uid == owner.uid && r.controller == Some(true));

    if owned && live.spec() == Some(&desired) {
        return Ok(None);
    }

    let mut updated = live.clone();
    updated.set_spec(desired);
    if !owned {
        let refs = updated.meta_mut().owner_references.get_or_insert_with(Vec::new);
        refs.retain(|r| r.uid != owner.uid);
        refs.push(owner);
    }
    Ok(Some(updated))
}

/// Read the child named after `parent`, creating it from the bootstrap
/// template when missing. The flag is `true` when it was created.
pub async fn fetch_or_create<C: ManagedChild>(
    store: &dyn AutoscalerStore,
    parent: &CranePodAutoscaler,
) -> Result<(C, bool), Error> {
    let name = parent.name_any();
    let namespace = parent
        .namespace()
        .ok_or_else(|| Error::definition(&name, C::KIND, "autoscaler has no namespace"))?;

    if let Some(existing) = C::fetch(store, &namespace, &name).await? {
        return Ok((existing, false));
    }

    let child = build_child::<C>(parent, bootstrap_active::<C>())?;
    let created = C::create(store, &child).await?;
    Ok((created, true))
}

/// Apply the template for `active` to `live`, writing only on difference
pub async fn sync<C: ManagedChild>(
    store: &dyn AutoscalerStore,
    parent: &CranePodAutoscaler,
    live: &C,
    active: bool,
) -> Result<SyncOutcome, Error> {
    match plan_update(parent, live, active)? {
        None => Ok(SyncOutcome::Unchanged),
        Some(updated) => {
            C::replace(store, &updated).await?;
            Ok(SyncOutcome::Updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockAutoscalerStore;
    use crate::test_fixtures::{autoscaler, hpa_status};
    use crane_common::crd::UpdateMode;

    #[test]
    fn build_child_is_named_and_owned() {
        let parent = autoscaler("web", 2, 10);
        let hpa: HorizontalPodAutoscaler = build_child(&parent, true).unwrap();
        assert_eq!(hpa.name_any(), "web");
        assert_eq!(hpa.namespace().as_deref(), Some("default"));
        let owners = hpa.owner_references();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "CranePodAutoscaler");
        assert_eq!(owners[0].uid, "uid-web");
        assert_eq!(owners[0].controller, Some(true));
        assert_eq!(owners[0].block_owner_deletion, Some(true));
        assert_eq!(hpa.labels()[LABEL_MANAGED_BY], LABEL_MANAGED_BY_CRANE);
        assert_eq!(hpa.spec, Some(parent.spec.hpa.clone()));
        assert!(hpa.status.is_none());
    }

    #[test]
    fn build_child_without_uid_is_a_definition_error() {
        let mut parent = autoscaler("web", 2, 10);
        parent.metadata.uid = None;
        let err = build_child::<VerticalPodAutoscaler>(&parent, false).unwrap_err();
        match err {
            Error::Definition { kind, autoscaler, .. } => {
                assert_eq!(kind, "VPA");
                assert_eq!(autoscaler, "web");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bootstrap_templates_enable_hpa_and_disable_vpa() {
        assert!(bootstrap_active::<HorizontalPodAutoscaler>());
        assert!(!bootstrap_active::<VerticalPodAutoscaler>());
    }

    #[test]
    fn plan_update_is_none_when_already_matching() {
        let parent = autoscaler("web", 2, 10);
        let live: VerticalPodAutoscaler = build_child(&parent, false).unwrap();
        assert!(plan_update(&parent, &live, false).unwrap().is_none());
    }

    #[test]
    fn plan_update_replaces_spec_and_keeps_status() {
        let parent = autoscaler("web", 2, 10);
        let mut live: HorizontalPodAutoscaler = build_child(&parent, true).unwrap();
        live.metadata.resource_version = Some("7".to_string());
        live.status = Some(hpa_status(5));

        let updated = plan_update(&parent, &live, false).unwrap().unwrap();
        let spec = updated.spec.as_ref().unwrap();
        assert_eq!(spec.max_replicas, 2);
        assert_eq!(updated.status, live.status);
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(updated.owner_references().len(), 1);
    }

    #[test]
    fn plan_update_restores_missing_owner_reference() {
        let parent = autoscaler("web", 2, 10);
        let mut live: VerticalPodAutoscaler = build_child(&parent, true).unwrap();
        live.metadata.owner_references = None;

        let updated = plan_update(&parent, &live, true).unwrap().unwrap();
        assert_eq!(updated.spec, live.spec);
        assert_eq!(updated.owner_references()[0].uid, "uid-web");
    }

    #[test]
    fn plan_update_toggles_vpa_update_mode() {
        let parent = autoscaler("web", 2, 10);
        let live: VerticalPodAutoscaler = build_child(&parent, false).unwrap();
        let updated = plan_update(&parent, &live, true).unwrap().unwrap();
        assert_eq!(
            updated.spec.update_policy.unwrap().update_mode,
            Some(UpdateMode::Auto)
        );
    }

    #[tokio::test]
    async fn fetch_or_create_returns_existing_child() {
        let parent = autoscaler("web", 2, 10);
        let existing: HorizontalPodAutoscaler = build_child(&parent, false).unwrap();
        let mut store = MockAutoscalerStore::new();
        let returned = existing.clone();
        store
            .expect_get_hpa()
            .withf(|ns, name| ns == "default" && name == "web")
            .returning(move |_, _| Ok(Some(returned.clone())));
        store.expect_create_hpa().never();

        let (hpa, created) = fetch_or_create::<HorizontalPodAutoscaler>(&store, &parent)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(hpa, existing);
    }

    #[tokio::test]
    async fn fetch_or_create_creates_disabled_vpa() {
        let parent = autoscaler("web", 2, 10);
        let mut store = MockAutoscalerStore::new();
        store.expect_get_vpa().returning(|_, _| Ok(None));
        store
            .expect_create_vpa()
            .times(1)
            .withf(|vpa| {
                vpa.spec.update_policy.as_ref().and_then(|p| p.update_mode)
                    == Some(UpdateMode::Off)
            })
            .returning(|vpa| Ok(vpa.clone()));

        let (_, created) = fetch_or_create::<VerticalPodAutoscaler>(&store, &parent)
            .await
            .unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn fetch_or_create_propagates_create_failure() {
        let parent = autoscaler("web", 2, 10);
        let mut store = MockAutoscalerStore::new();
        store.expect_get_hpa().returning(|_, _| Ok(None));
        store
            .expect_create_hpa()
            .returning(|_| Err(Error::internal_with_context("test", "boom")));

        let err = fetch_or_create::<HorizontalPodAutoscaler>(&store, &parent)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn sync_writes_nothing_when_unchanged() {
        let parent = autoscaler("web", 2, 10);
        let live: HorizontalPodAutoscaler = build_child(&parent, true).unwrap();
        let mut store = MockAutoscalerStore::new();
        store.expect_replace_hpa().never();

        let outcome = sync(&store, &parent, &live, true).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn sync_replaces_on_difference() {
        let parent = autoscaler("web", 2, 10);
        let live: HorizontalPodAutoscaler = build_child(&parent, true).unwrap();
        let mut store = MockAutoscalerStore::new();
        store
            .expect_replace_hpa()
            .times(1)
            .withf(|hpa| hpa.spec.as_ref().map(|s| s.max_replicas) == Some(2))
            .returning(|hpa| Ok(hpa.clone()));

        let outcome = sync(&store, &parent, &live, false).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Updated);
    }
}
