//! Pluggable traffic routers
//!
//! A traffic router moves a routing resource to the state that sends a given
//! percentage of traffic to the canary service. Each routing backend flavour
//! implements `TrafficRoutingReconciler`; `select_reconciler` picks one from
//! the canary configuration.
//!
//! Only Traefik (Ingress `service-weights` annotation) is implemented.

pub mod patch;
pub mod traefik;
pub mod validation;

pub use traefik::TraefikReconciler;
pub use validation::{validate_canary_traffic, validate_weight};

use crate::controller::events::{EventRecorder, KubeEventRecorder};
use crate::controller::ingress::{IngressPatcher, IngressReader, KubeIngressStore, StoreError};
use crate::crd::traffic_routing::CanaryTrafficSpec;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::networking::v1::ServiceBackendPort;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by traffic routers
#[derive(Debug, Error)]
pub enum TrafficRoutingError {
    #[error("ingress `{name}` not found in namespace `{namespace}`")]
    NotFound { namespace: String, name: String },

    #[error("ingress `{ingress}` does not have service `{service}` in rules")]
    Misconfigured { ingress: String, service: String },

    #[error("failed to read ingress `{ingress}`: {source}")]
    Read {
        ingress: String,
        #[source]
        source: StoreError,
    },

    #[error("conflict patching traefik ingress `{ingress}`: {source}")]
    WriteConflict {
        ingress: String,
        #[source]
        source: StoreError,
    },

    #[error("error patching traefik ingress `{ingress}`: {source}")]
    WriteFailure {
        ingress: String,
        #[source]
        source: StoreError,
    },

    #[error("Invalid traffic routing config: {0}")]
    InvalidConfig(String),

    #[error("Unsupported traffic routing: {0}")]
    Unsupported(String),

    #[error("Failed to serialize ingress projection: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Live resource already matched the desired state, nothing was written
    Unchanged,
    /// One patch was written
    Patched,
}

/// What a router needs to split traffic for one requested weight
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSpec {
    /// Service currently receiving all traffic (stable, or the root service override)
    pub action_service: String,
    pub canary_service: String,
    pub canary_port: ServiceBackendPort,
    /// Percentage of traffic for the canary, 0-100
    pub desired_weight: i32,
}

/// Collaborators shared by all traffic routers
pub struct Context {
    pub reader: Arc<dyn IngressReader>,
    pub patcher: Arc<dyn IngressPatcher>,
    pub recorder: Arc<dyn EventRecorder>,
}

impl Context {
    /// Create a Context backed by the Kubernetes API
    ///
    /// `instance` identifies this controller replica in published Events.
    pub fn new(client: kube::Client, instance: Option<String>) -> Self {
        let store = Arc::new(KubeIngressStore::new(client.clone()));
        Context {
            reader: store.clone(),
            patcher: store,
            recorder: Arc::new(KubeEventRecorder::new(client, instance)),
        }
    }

    /// Create a Context from explicit collaborators
    pub fn with_collaborators(
        reader: Arc<dyn IngressReader>,
        patcher: Arc<dyn IngressPatcher>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Context {
            reader,
            patcher,
            recorder,
        }
    }
}

/// Traffic router for one routing backend flavour
///
/// # Idempotency
/// `reconcile` recomputes the desired state from the live resource on every
/// call. Calling it again with the same weight writes nothing.
#[async_trait]
pub trait TrafficRoutingReconciler: Send + Sync {
    /// Routing backend kind (e.g., "Traefik")
    fn kind(&self) -> &'static str;

    /// Move the routing resource to `desired_weight` percent canary traffic
    async fn reconcile(&self, desired_weight: i32) -> Result<PatchOutcome, TrafficRoutingError>;
}

/// Select the traffic router configured in the canary spec
///
/// # Arguments
/// * `namespace` - Namespace of the routing resource
/// * `spec` - Canary services and traffic routing configuration
/// * `owner` - Object that published Events are attached to (defaults to the routing resource)
/// * `ctx` - Accessors and event recorder
///
/// # Returns
/// * `Ok(Box<dyn TrafficRoutingReconciler>)` - Router for the configured backend
/// * `Err(TrafficRoutingError::InvalidConfig)` - Spec failed validation
/// * `Err(TrafficRoutingError::Unsupported)` - No supported routing backend configured
pub fn select_reconciler(
    namespace: &str,
    spec: &CanaryTrafficSpec,
    owner: Option<ObjectReference>,
    ctx: Arc<Context>,
) -> Result<Box<dyn TrafficRoutingReconciler>, TrafficRoutingError> {
    validate_canary_traffic(spec).map_err(TrafficRoutingError::InvalidConfig)?;

    let routing = spec.traffic_routing.as_ref().ok_or_else(|| {
        TrafficRoutingError::Unsupported("no trafficRouting configured".to_string())
    })?;

    if routing.traefik.is_some() {
        let reconciler = TraefikReconciler::new(namespace, spec.clone(), owner, ctx)?;
        return Ok(Box::new(reconciler));
    }

    Err(TrafficRoutingError::Unsupported(
        "trafficRouting has no supported router (expected traefik)".to_string(),
    ))
}
