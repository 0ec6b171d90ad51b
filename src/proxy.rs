use std::time::Duration;

use tracing::{info, warn};

const PROXY_SERVER_ENV: &str = "WS_PROXY_SERVER";
const PROXY_ENDPOINT_ENV: &str = "WS_PROXY_ENDPOINT";
const PROVISION_TIMEOUT: Duration = Duration::from_secs(10);

/// Ask the proxy provisioner for an endpoint. Never fails the run: any
/// problem here is logged and the pipeline proceeds unproxied.
///
/// `WS_PROXY_SERVER` supplies an endpoint directly; otherwise
/// `WS_PROXY_ENDPOINT` names a provisioning URL answering with one.
pub async fn provision() -> Option<String> {
    if let Ok(server) = std::env::var(PROXY_SERVER_ENV) {
        let server = server.trim().to_string();
        if !server.is_empty() {
            info!("Using proxy from {}", PROXY_SERVER_ENV);
            return Some(server);
        }
    }

    let endpoint = match std::env::var(PROXY_ENDPOINT_ENV) {
        Ok(e) if !e.trim().is_empty() => e,
        _ => {
            warn!(
                "Proxy requested but neither {} nor {} is set; continuing without proxy",
                PROXY_SERVER_ENV, PROXY_ENDPOINT_ENV
            );
            return None;
        }
    };

    match fetch_endpoint(&endpoint).await {
        Ok(server) if !server.is_empty() => {
            info!("Provisioned proxy via {}", endpoint);
            Some(server)
        }
        Ok(_) => {
            warn!(
                "Proxy provisioner at {} returned nothing; continuing without proxy",
                endpoint
            );
            None
        }
        Err(e) => {
            warn!("Proxy provisioning failed ({}); continuing without proxy", e);
            None
        }
    }
}

async fn fetch_endpoint(endpoint: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(PROVISION_TIMEOUT)
        .build()?;
    let body = client
        .get(endpoint)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body.trim().to_string())
}
