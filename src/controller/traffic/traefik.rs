//! Traefik traffic router
//!
//! Splits traffic through a Traefik-served Ingress:
//! - the `<prefix>/service-weights` annotation carries the canary weight
//! - every path routed to the action service gets a sibling path to the canary
//!
//! Each pass derives the desired annotations and rules from the live Ingress,
//! diffs them against it and writes a single merge patch only when they differ.

use super::patch::create_merge_patch;
use super::{
    validate_canary_traffic, validate_weight, Context, PatchOutcome, TrafficRoutingError,
    TrafficRoutingReconciler, WeightSpec,
};
use crate::controller::events::TrafficEvent;
use crate::controller::ingress::StoreError;
use crate::crd::traffic_routing::{CanaryTrafficSpec, TraefikTrafficRouting};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, Ingress, IngressBackend, IngressRule, IngressServiceBackend, IngressSpec,
    ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Routing backend kind handled by this router
pub const TYPE: &str = "Traefik";

/// Event reason used when the Ingress is patched
pub const PATCH_EVENT_REASON: &str = "PatchingTraefikIngress";

/// Traefik router for one canary configuration
pub struct TraefikReconciler {
    namespace: String,
    spec: CanaryTrafficSpec,
    routing: TraefikTrafficRouting,
    owner: Option<ObjectReference>,
    ctx: Arc<Context>,
}

/// Merge patch between the live Ingress and its desired state
#[derive(Debug, Clone, PartialEq)]
pub struct IngressPatch {
    /// Partial Ingress touching only `metadata.annotations` and `spec.rules`
    pub document: serde_json::Value,
    /// False when the live Ingress already matches
    pub modified: bool,
}

impl TraefikReconciler {
    /// Create a Traefik router
    ///
    /// Fails with `InvalidConfig` when the spec has no Traefik routing or does
    /// not pass `validate_canary_traffic`.
    pub fn new(
        namespace: &str,
        spec: CanaryTrafficSpec,
        owner: Option<ObjectReference>,
        ctx: Arc<Context>,
    ) -> Result<Self, TrafficRoutingError> {
        validate_canary_traffic(&spec).map_err(TrafficRoutingError::InvalidConfig)?;

        let routing = spec
            .traffic_routing
            .as_ref()
            .and_then(|t| t.traefik.clone())
            .ok_or_else(|| {
                TrafficRoutingError::InvalidConfig(
                    "trafficRouting.traefik is required".to_string(),
                )
            })?;

        Ok(TraefikReconciler {
            namespace: namespace.to_string(),
            spec,
            routing,
            owner,
            ctx,
        })
    }

    /// Name of the managed Ingress
    pub fn ingress_name(&self) -> &str {
        &self.routing.ingress
    }

    /// Services and port used to split traffic at `desired_weight`
    pub fn weight_spec(&self, desired_weight: i32) -> WeightSpec {
        WeightSpec {
            action_service: self.spec.action_service().to_string(),
            canary_service: self.spec.canary_service.clone(),
            canary_port: self.routing.backend_port(),
            desired_weight,
        }
    }

    /// Fetch the managed Ingress
    pub async fn resolve(&self) -> Result<Ingress, TrafficRoutingError> {
        self.ctx
            .reader
            .get(&self.namespace, &self.routing.ingress)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => TrafficRoutingError::NotFound {
                    namespace: self.namespace.clone(),
                    name: self.routing.ingress.clone(),
                },
                other => TrafficRoutingError::Read {
                    ingress: self.routing.ingress.clone(),
                    source: other,
                },
            })
    }

    /// Write `patch` to the live Ingress when it is modified
    ///
    /// The snapshot's resourceVersion is sent along as a precondition, so a
    /// concurrent change to the Ingress fails the write with a conflict.
    pub async fn apply(
        &self,
        ingress: &Ingress,
        patch: IngressPatch,
        weights: &WeightSpec,
    ) -> Result<PatchOutcome, TrafficRoutingError> {
        let ingress_name = self.routing.ingress.as_str();
        let desired_weight = weights.desired_weight;

        if !patch.modified {
            info!(ingress = %ingress_name, "No changes to the Traefik ingress");
            return Ok(PatchOutcome::Unchanged);
        }

        let mut document = patch.document;
        if let Some(version) = ingress.metadata.resource_version.as_deref() {
            document["metadata"]["resourceVersion"] = serde_json::Value::from(version);
        }

        debug!(ingress = %ingress_name, patch = %document, "Applying Traefik ingress patch");
        info!(ingress = %ingress_name, desired_weight, "Updating Traefik ingress");

        if let Err(e) = self
            .ctx
            .patcher
            .patch(&self.namespace, ingress_name, &document)
            .await
        {
            error!(error = %e, ingress = %ingress_name, "Error patching Traefik ingress");
            return Err(match e {
                conflict @ StoreError::Conflict(_) => TrafficRoutingError::WriteConflict {
                    ingress: ingress_name.to_string(),
                    source: conflict,
                },
                other => TrafficRoutingError::WriteFailure {
                    ingress: ingress_name.to_string(),
                    source: other,
                },
            });
        }

        let reference = self
            .owner
            .clone()
            .unwrap_or_else(|| ingress.object_ref(&()));
        let event = TrafficEvent {
            reason: PATCH_EVENT_REASON.to_string(),
            action: "Patch".to_string(),
            note: format!(
                "Updating Ingress `{}` to desiredWeight '{}'",
                ingress_name, desired_weight
            ),
        };
        if let Err(e) = self.ctx.recorder.publish(&reference, event).await {
            warn!(error = %e, ingress = %ingress_name, "Failed to publish event");
        }

        Ok(PatchOutcome::Patched)
    }
}

#[async_trait]
impl TrafficRoutingReconciler for TraefikReconciler {
    fn kind(&self) -> &'static str {
        TYPE
    }

    async fn reconcile(&self, desired_weight: i32) -> Result<PatchOutcome, TrafficRoutingError> {
        validate_weight(desired_weight).map_err(TrafficRoutingError::InvalidConfig)?;

        let weights = self.weight_spec(desired_weight);
        let ingress = self.resolve().await?;

        if !has_rule_with_service(&ingress, &weights.action_service) {
            return Err(TrafficRoutingError::Misconfigured {
                ingress: self.routing.ingress.clone(),
                service: weights.action_service.clone(),
            });
        }

        let annotations = desired_annotations(
            &ingress,
            &self.routing.service_weights_key(),
            &weights.canary_service,
            weights.desired_weight,
        );
        let rules = desired_rules(
            current_rules(&ingress),
            &weights.action_service,
            &weights.canary_service,
            &weights.canary_port,
        );

        let patch = calculate_patch(&ingress, &annotations, &rules)?;
        self.apply(&ingress, patch, &weights).await
    }
}

/// Rules of the Ingress, empty when it has none
pub fn current_rules(ingress: &Ingress) -> &[IngressRule] {
    ingress
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_deref())
        .unwrap_or(&[])
}

fn backend_service(path: &HTTPIngressPath) -> Option<&str> {
    path.backend.service.as_ref().map(|s| s.name.as_str())
}

/// Does any HTTP path of the Ingress route to `service`?
pub fn has_rule_with_service(ingress: &Ingress, service: &str) -> bool {
    current_rules(ingress)
        .iter()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .any(|path| backend_service(path) == Some(service))
}

/// Value of the service-weights annotation
///
/// A YAML block scalar Traefik parses as `service: weight%`.
pub fn service_weights_value(canary_service: &str, weight: i32) -> String {
    format!("|\n{}: {}%", canary_service, weight)
}

/// Current annotations with the service-weights key set for the canary
pub fn desired_annotations(
    current: &Ingress,
    key: &str,
    canary_service: &str,
    weight: i32,
) -> BTreeMap<String, String> {
    let mut desired = current.metadata.annotations.clone().unwrap_or_default();
    desired.insert(
        key.to_string(),
        service_weights_value(canary_service, weight),
    );
    desired
}

/// Current rules with a canary path next to every action-service path
///
/// The canary path is a copy of the matched path pointing at
/// `canary_service:canary_port`. An existing canary path with the same
/// `path`/`pathType` is updated in place; otherwise the new path is appended
/// after the rule's existing paths.
pub fn desired_rules(
    current: &[IngressRule],
    action_service: &str,
    canary_service: &str,
    canary_port: &ServiceBackendPort,
) -> Vec<IngressRule> {
    current
        .iter()
        .map(|rule| {
            let mut desired = rule.clone();
            if let Some(http) = desired.http.as_mut() {
                let action_paths: Vec<HTTPIngressPath> = http
                    .paths
                    .iter()
                    .filter(|p| backend_service(p) == Some(action_service))
                    .cloned()
                    .collect();

                for action_path in action_paths {
                    let canary_path = HTTPIngressPath {
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: canary_service.to_string(),
                                port: Some(canary_port.clone()),
                            }),
                            resource: None,
                        },
                        ..action_path.clone()
                    };

                    let existing = http.paths.iter().position(|p| {
                        backend_service(p) == Some(canary_service)
                            && p.path == action_path.path
                            && p.path_type == action_path.path_type
                    });

                    match existing {
                        Some(index) => http.paths[index] = canary_path,
                        None => http.paths.push(canary_path),
                    }
                }
            }
            desired
        })
        .collect()
}

/// Ingress holding only annotations and rules
fn projection(
    annotations: Option<BTreeMap<String, String>>,
    rules: Option<Vec<IngressRule>>,
) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            annotations,
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules,
            ..Default::default()
        }),
        status: None,
    }
}

/// Diff the live Ingress against the desired annotations and rules
///
/// Only those two fields are compared and only they can appear in the patch.
pub fn calculate_patch(
    current: &Ingress,
    desired_annotations: &BTreeMap<String, String>,
    desired_rules: &[IngressRule],
) -> Result<IngressPatch, serde_json::Error> {
    let current_rules = current.spec.as_ref().and_then(|s| s.rules.clone());
    let desired_rules = if current_rules.is_none() && desired_rules.is_empty() {
        None
    } else {
        Some(desired_rules.to_vec())
    };

    let current = serde_json::to_value(projection(
        current.metadata.annotations.clone(),
        current_rules,
    ))?;
    let desired = serde_json::to_value(projection(
        Some(desired_annotations.clone()),
        desired_rules,
    ))?;

    Ok(match create_merge_patch(&current, &desired) {
        Some(document) => IngressPatch {
            document,
            modified: true,
        },
        None => IngressPatch {
            document: serde_json::json!({}),
            modified: false,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "traefik_test.rs"]
mod tests;
