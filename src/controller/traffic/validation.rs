use crate::crd::traffic_routing::CanaryTrafficSpec;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Validate canary traffic configuration
///
/// Checked before any API call because the CRD schema cannot express these.
///
/// # Validation Rules
/// - `canaryService` and `stableService` cannot be empty
/// - `trafficRouting.traefik.ingress` cannot be empty (when Traefik is configured)
/// - numeric `servicePort` must be 1-65535, named `servicePort` cannot be empty
/// - the canary service must differ from the service it is split from
///
/// # Returns
/// * `Ok(())` - Validation passed
/// * `Err(String)` - Validation error message
pub fn validate_canary_traffic(spec: &CanaryTrafficSpec) -> Result<(), String> {
    if spec.canary_service.is_empty() {
        return Err("canaryService cannot be empty".to_string());
    }

    if spec.stable_service.is_empty() {
        return Err("stableService cannot be empty".to_string());
    }

    if let Some(traefik) = spec
        .traffic_routing
        .as_ref()
        .and_then(|t| t.traefik.as_ref())
    {
        if traefik.ingress.is_empty() {
            return Err("trafficRouting.traefik.ingress cannot be empty".to_string());
        }

        match traefik.service_port() {
            IntOrString::Int(port) => {
                if !(1..=65535).contains(&port) {
                    return Err(format!(
                        "trafficRouting.traefik.servicePort must be 1-65535, got {}",
                        port
                    ));
                }
            }
            IntOrString::String(name) => {
                if name.is_empty() {
                    return Err("trafficRouting.traefik.servicePort name cannot be empty".to_string());
                }
            }
        }
    }

    let action_service = spec.action_service();
    if spec.canary_service == action_service {
        return Err(format!(
            "canaryService must differ from the routed service, both are '{}'",
            action_service
        ));
    }

    Ok(())
}

/// Validate a requested canary weight (percent)
pub fn validate_weight(weight: i32) -> Result<(), String> {
    if !(0..=100).contains(&weight) {
        return Err(format!("desired weight must be 0-100, got {}", weight));
    }
    Ok(())
}
