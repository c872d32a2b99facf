use kube::Client;
use kulta_traefik::config::TraefikRouterConfig;
use kulta_traefik::controller::traffic::{select_reconciler, Context, PatchOutcome};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install ring as the default crypto provider for rustls (kube client TLS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match TraefikRouterConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    info!(
        namespace = %config.namespace,
        stable = %config.canary.stable_service,
        canary = %config.canary.canary_service,
        desired_weight = config.desired_weight,
        "Starting KULTA Traefik traffic router"
    );

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let ctx = Arc::new(Context::new(client, config.instance.clone()));
    let reconciler = select_reconciler(
        &config.namespace,
        &config.canary,
        config.rollout_reference(),
        ctx,
    )?;

    match reconciler.reconcile(config.desired_weight).await {
        Ok(PatchOutcome::Patched) => {
            info!(
                router = reconciler.kind(),
                desired_weight = config.desired_weight,
                "Traffic weight applied"
            );
            Ok(())
        }
        Ok(PatchOutcome::Unchanged) => {
            info!(
                router = reconciler.kind(),
                desired_weight = config.desired_weight,
                "Traffic already at desired weight"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, router = reconciler.kind(), "Traffic routing failed");
            Err(e.into())
        }
    }
}
