//! Access to CranePodAutoscalers and their HPA/VPA children
//!
//! Every call is a single request against the API server. Nothing is cached
//! and nothing is retried here; failures go back to the reconciler.

use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crane_common::crd::{CranePodAutoscaler, CranePodAutoscalerStatus, VerticalPodAutoscaler};
use crane_common::{Error, FIELD_MANAGER};

/// Trait abstracting Kubernetes operations needed by the reconciler
///
/// Mocked in unit tests, backed by an in-memory store in scenario tests, and
/// by [`KubeStore`] in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AutoscalerStore: Send + Sync {
    /// Get a CranePodAutoscaler; `None` when it does not exist
    async fn get_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CranePodAutoscaler>, Error>;

    /// Write the status subresource.
    ///
    /// The write is conditional on the `resourceVersion` carried by
    /// `autoscaler`; a stale version fails with a 409 conflict.
    async fn patch_autoscaler_status(
        &self,
        autoscaler: &CranePodAutoscaler,
        status: &CranePodAutoscalerStatus,
    ) -> Result<CranePodAutoscaler, Error>;

    /// Get an HPA; `None` when it does not exist
    async fn get_hpa(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, Error>;

    /// Create an HPA
    async fn create_hpa(&self, hpa: &HorizontalPodAutoscaler)
        -> Result<HorizontalPodAutoscaler, Error>;

    /// Replace an existing HPA; status is ignored by the API server
    async fn replace_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error>;

    /// Get a VPA; `None` when it does not exist
    async fn get_vpa(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VerticalPodAutoscaler>, Error>;

    /// Create a VPA
    async fn create_vpa(&self, vpa: &VerticalPodAutoscaler)
        -> Result<VerticalPodAutoscaler, Error>;

    /// Replace an existing VPA; status is ignored by the API server
    async fn replace_vpa(&self, vpa: &VerticalPodAutoscaler)
        -> Result<VerticalPodAutoscaler, Error>;
}

/// [`AutoscalerStore`] backed by the Kubernetes API
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        match self.api::<K>(namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create<K>(&self, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + serde::Serialize
            + std::fmt::Debug,
    {
        let namespace = namespace_of(obj)?;
        debug!(kind = %K::kind(&()), namespace = %namespace, name = %obj.name_any(), "creating");
        Ok(self
            .api::<K>(&namespace)
            .create(&post_params(), obj)
            .await?)
    }

    async fn replace<K>(&self, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + serde::Serialize
            + std::fmt::Debug,
    {
        let namespace = namespace_of(obj)?;
        debug!(kind = %K::kind(&()), namespace = %namespace, name = %obj.name_any(), "replacing");
        Ok(self
            .api::<K>(&namespace)
            .replace(&obj.name_any(), &post_params(), obj)
            .await?)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

fn namespace_of<K: Resource>(obj: &K) -> Result<String, Error> {
    obj.meta().namespace.clone().ok_or_else(|| {
        Error::internal_with_context(
            "store",
            format!("{} has no namespace", obj.meta().name.as_deref().unwrap_or_default()),
        )
    })
}

/// Merge patch body writing `status` conditional on `resource_version`
pub fn status_patch(
    resource_version: Option<&str>,
    status: &CranePodAutoscalerStatus,
) -> serde_json::Value {
    serde_json::json!({
        "metadata": { "resourceVersion": resource_version },
        "status": status,
    })
}

#[async_trait]
impl AutoscalerStore for KubeStore {
    async fn get_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CranePodAutoscaler>, Error> {
        self.get_opt(namespace, name).await
    }

    async fn patch_autoscaler_status(
        &self,
        autoscaler: &CranePodAutoscaler,
        status: &CranePodAutoscalerStatus,
    ) -> Result<CranePodAutoscaler, Error> {
        let namespace = namespace_of(autoscaler)?;
        let patch = status_patch(autoscaler.resource_version().as_deref(), status);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self
            .api::<CranePodAutoscaler>(&namespace)
            .patch_status(&autoscaler.name_any(), &params, &Patch::Merge(&patch))
            .await?)
    }

    async fn get_hpa(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, Error> {
        self.get_opt(namespace, name).await
    }

    async fn create_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error> {
        self.create(hpa).await
    }

    async fn replace_hpa(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, Error> {
        self.replace(hpa).await
    }

    async fn get_vpa(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VerticalPodAutoscaler>, Error> {
        self.get_opt(namespace, name).await
    }

    async fn create_vpa(
        &self,
        vpa: &VerticalPodAutoscaler,
    ) -> Result<VerticalPodAutoscaler, Error> {
        self.create(vpa).await
    }

    async fn replace_vpa(
        &self,
        vpa: &VerticalPodAutoscaler,
    ) -> Result<VerticalPodAutoscaler, Error> {
        self.replace(vpa).await
    }
}
