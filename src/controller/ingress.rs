//! Ingress accessors
//!
//! The traffic routers never talk to the API server directly. They read the
//! live Ingress through `IngressReader` and write merge patches through
//! `IngressPatcher`, so tests can swap in `MockIngressStore`.

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, Patch, PatchParams};
use thiserror::Error;

/// Errors reported by Ingress accessors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ingress not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

/// Read access to Ingress snapshots
#[async_trait]
pub trait IngressReader: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError>;
}

/// Write access to Ingresses using JSON merge patches
#[async_trait]
pub trait IngressPatcher: Send + Sync {
    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Ingress accessor backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeIngressStore {
    client: kube::Client,
}

impl KubeIngressStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map API status codes onto accessor errors
fn classify(err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ref status) if status.code == 404 => StoreError::NotFound,
        kube::Error::Api(ref status) if status.code == 409 => {
            StoreError::Conflict(status.message.clone())
        }
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl IngressReader for KubeIngressStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError> {
        self.api(namespace).get(name).await.map_err(classify)
    }
}

#[async_trait]
impl IngressPatcher for KubeIngressStore {
    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

/// A merge patch received by `MockIngressStore`
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RecordedPatch {
    pub namespace: String,
    pub name: String,
    pub patch: serde_json::Value,
}

/// In-memory Ingress store for testing
///
/// Applies merge patches with RFC 7386 semantics, honours a
/// `metadata.resourceVersion` precondition and bumps the version on write.
#[cfg(test)]
pub struct MockIngressStore {
    ingresses: std::sync::Mutex<std::collections::BTreeMap<(String, String), Ingress>>,
    patches: std::sync::Mutex<Vec<RecordedPatch>>,
    reject_patches: std::sync::Mutex<Option<String>>,
}

#[cfg(test)]
impl Default for MockIngressStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockIngressStore {
    pub fn new() -> Self {
        MockIngressStore {
            ingresses: std::sync::Mutex::new(std::collections::BTreeMap::new()),
            patches: std::sync::Mutex::new(Vec::new()),
            reject_patches: std::sync::Mutex::new(None),
        }
    }

    pub fn insert(&self, ingress: Ingress) {
        let namespace = ingress.metadata.namespace.clone().unwrap_or_default();
        let name = ingress.metadata.name.clone().unwrap_or_default();
        self.ingresses
            .lock()
            .unwrap()
            .insert((namespace, name), ingress);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<Ingress> {
        self.ingresses
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn get_recorded_patches(&self) -> Vec<RecordedPatch> {
        self.patches.lock().unwrap().clone()
    }

    /// Make every following patch fail with `StoreError::Rejected`
    pub fn reject_patches(&self, reason: &str) {
        *self.reject_patches.lock().unwrap() = Some(reason.to_string());
    }
}

#[cfg(test)]
#[async_trait]
#[allow(clippy::unwrap_used)]
impl IngressReader for MockIngressStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Ingress, StoreError> {
        self.stored(namespace, name).ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
#[async_trait]
#[allow(clippy::unwrap_used)]
impl IngressPatcher for MockIngressStore {
    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.patches.lock().unwrap().push(RecordedPatch {
            namespace: namespace.to_string(),
            name: name.to_string(),
            patch: patch.clone(),
        });

        if let Some(reason) = self.reject_patches.lock().unwrap().clone() {
            return Err(StoreError::Rejected(reason));
        }

        let key = (namespace.to_string(), name.to_string());
        let mut ingresses = self.ingresses.lock().unwrap();
        let current = ingresses.get(&key).ok_or(StoreError::NotFound)?;

        let current_version = current.metadata.resource_version.clone();
        if let Some(expected) = patch
            .pointer("/metadata/resourceVersion")
            .and_then(|v| v.as_str())
        {
            if current_version.as_deref() != Some(expected) {
                return Err(StoreError::Conflict(format!(
                    "the object has been modified: expected resourceVersion {}, found {:?}",
                    expected, current_version
                )));
            }
        }

        let mut document = serde_json::to_value(current).unwrap();
        json_patch::merge(&mut document, patch);
        let mut updated: Ingress = serde_json::from_value(document)
            .map_err(|e| StoreError::Rejected(format!("invalid Ingress after patch: {}", e)))?;

        let next_version = current_version
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        updated.metadata.resource_version = Some(next_version.to_string());

        ingresses.insert(key, updated);
        Ok(())
    }
}
