//! Runtime configuration from environment variables
//!
//! | Variable | Default |
//! |---|---|
//! | `KULTA_NAMESPACE` | `default` |
//! | `KULTA_TRAEFIK_INGRESS` | required |
//! | `KULTA_STABLE_SERVICE` | required |
//! | `KULTA_CANARY_SERVICE` | required |
//! | `KULTA_TRAEFIK_ROOT_SERVICE` | unset |
//! | `KULTA_TRAEFIK_SERVICE_PORT` | `80` (number or port name) |
//! | `KULTA_TRAEFIK_ANNOTATION_PREFIX` | `traefik.ingress.kubernetes.io` |
//! | `KULTA_DESIRED_WEIGHT` | required, 0-100 |
//! | `KULTA_ROLLOUT_NAME` | unset (Events go to the Ingress) |
//! | `POD_NAME` | unset |

use crate::crd::traffic_routing::{CanaryTrafficSpec, TraefikTrafficRouting, TrafficRouting};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use thiserror::Error;

/// Default namespace when `KULTA_NAMESPACE` is unset
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Configuration of one traffic routing pass
#[derive(Debug, Clone, PartialEq)]
pub struct TraefikRouterConfig {
    pub namespace: String,
    pub canary: CanaryTrafficSpec,
    pub desired_weight: i32,
    /// Rollout the published Events are attached to
    pub rollout_name: Option<String>,
    /// Controller replica reported as Event source instance
    pub instance: Option<String>,
}

impl TraefikRouterConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let desired_weight = require("KULTA_DESIRED_WEIGHT")?
            .trim()
            .parse::<i32>()
            .map_err(|e| ConfigError::Invalid {
                name: "KULTA_DESIRED_WEIGHT",
                reason: e.to_string(),
            })?;

        let service_port = get("KULTA_TRAEFIK_SERVICE_PORT").map(|raw| parse_port(raw.trim()));

        Ok(TraefikRouterConfig {
            namespace: get("KULTA_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            canary: CanaryTrafficSpec {
                canary_service: require("KULTA_CANARY_SERVICE")?,
                stable_service: require("KULTA_STABLE_SERVICE")?,
                traffic_routing: Some(TrafficRouting {
                    traefik: Some(TraefikTrafficRouting {
                        ingress: require("KULTA_TRAEFIK_INGRESS")?,
                        service_port,
                        root_service: get("KULTA_TRAEFIK_ROOT_SERVICE"),
                        annotation_prefix: get("KULTA_TRAEFIK_ANNOTATION_PREFIX"),
                    }),
                }),
            },
            desired_weight,
            rollout_name: get("KULTA_ROLLOUT_NAME"),
            instance: get("POD_NAME"),
        })
    }

    /// Reference to the Rollout that Events are attached to, if configured
    pub fn rollout_reference(&self) -> Option<ObjectReference> {
        self.rollout_name.as_ref().map(|name| ObjectReference {
            api_version: Some("kulta.io/v1alpha1".to_string()),
            kind: Some("Rollout".to_string()),
            name: Some(name.clone()),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        })
    }
}

/// Numeric ports become `Int`, anything else is a port name
fn parse_port(raw: &str) -> IntOrString {
    match raw.parse::<i32>() {
        Ok(number) => IntOrString::Int(number),
        Err(_) => IntOrString::String(raw.to_string()),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
