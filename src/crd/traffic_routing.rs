use k8s_openapi::api::networking::v1::ServiceBackendPort;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default annotation prefix understood by Traefik's Kubernetes Ingress provider
pub const DEFAULT_TRAEFIK_ANNOTATION_PREFIX: &str = "traefik.ingress.kubernetes.io";

/// Suffix of the annotation carrying per-service weights
pub const SERVICE_WEIGHTS_SUFFIX: &str = "/service-weights";

/// Canary traffic configuration consumed by the traffic routers
///
/// Same field names as the Rollout canary strategy, so it can be read
/// straight out of `spec.strategy.canary`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct CanaryTrafficSpec {
    /// Name of the service that selects canary pods
    #[serde(rename = "canaryService")]
    pub canary_service: String,

    /// Name of the service that selects stable pods
    #[serde(rename = "stableService")]
    pub stable_service: String,

    /// Traffic routing configuration
    #[serde(rename = "trafficRouting", skip_serializing_if = "Option::is_none")]
    pub traffic_routing: Option<TrafficRouting>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct TrafficRouting {
    /// Traefik (Kubernetes Ingress provider) configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traefik: Option<TraefikTrafficRouting>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct TraefikTrafficRouting {
    /// Name of the Ingress that routes to the stable (or root) service
    pub ingress: String,

    /// Port of the canary service, numeric or named (default: 80)
    #[serde(rename = "servicePort", skip_serializing_if = "Option::is_none")]
    pub service_port: Option<IntOrString>,

    /// Service currently receiving all traffic, when it is not the stable service
    #[serde(rename = "rootService", skip_serializing_if = "Option::is_none")]
    pub root_service: Option<String>,

    /// Annotation prefix used for the service-weights key
    #[serde(rename = "annotationPrefix", skip_serializing_if = "Option::is_none")]
    pub annotation_prefix: Option<String>,
}

impl CanaryTrafficSpec {
    /// Service whose Ingress paths receive a canary sibling
    ///
    /// The Traefik `rootService` overrides the stable service when set.
    pub fn action_service(&self) -> &str {
        self.traffic_routing
            .as_ref()
            .and_then(|t| t.traefik.as_ref())
            .and_then(|t| t.root_service.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(self.stable_service.as_str())
    }
}

impl TraefikTrafficRouting {
    /// Configured canary port, defaulting to 80
    pub fn service_port(&self) -> IntOrString {
        self.service_port.clone().unwrap_or(IntOrString::Int(80))
    }

    /// Canary port in the shape an Ingress backend expects
    pub fn backend_port(&self) -> ServiceBackendPort {
        match self.service_port() {
            IntOrString::Int(number) => ServiceBackendPort {
                number: Some(number),
                name: None,
            },
            IntOrString::String(name) => ServiceBackendPort {
                number: None,
                name: Some(name),
            },
        }
    }

    /// Annotation key holding the service weights, e.g.
    /// `traefik.ingress.kubernetes.io/service-weights`
    pub fn service_weights_key(&self) -> String {
        let prefix = self
            .annotation_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_TRAEFIK_ANNOTATION_PREFIX);
        format!("{}{}", prefix, SERVICE_WEIGHTS_SUFFIX)
    }
}

#[cfg(test)]
#[path = "traffic_routing_test.rs"]
mod tests;
