use std::sync::Arc;

use fp_connect::{
    AdminApiClient, ConnectError, ConnectionInfoFetcher, ConnectorConfig, InstanceName,
};
use tracing::{error, info};

/// One-shot bootstrap: fetch connection info for the configured instance and
/// write the TLS materials where the database client expects them. A pooled
/// front end would drive the same fetcher from its socket-factory hook
/// instead, re-running it before the certificate expires.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetpg=debug".parse().unwrap()),
        )
        .init();

    // Install rustls crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = ConnectorConfig::from_env();
    if config.instance_name.is_empty() {
        anyhow::bail!("FLEETPG_INSTANCE_NAME is not set");
    }
    let instance: InstanceName = config.instance_name.parse()?;
    info!(instance = %instance, iam_authn = config.enable_iam_authn, "FleetPG bootstrap starting");

    let keys = rcgen::KeyPair::generate()?;
    let api = Arc::new(AdminApiClient::new(config.admin_api()));
    let fetcher = ConnectionInfoFetcher::new(api);

    let bundle = match fetcher.fetch(&instance, &keys).await {
        Ok(bundle) => bundle,
        Err(e @ ConnectError::Terminal { .. }) => {
            error!("bootstrap failed permanently, do not retry: {}", e);
            return Err(e.into());
        }
        Err(e) => {
            error!("bootstrap failed, retry with backoff: {}", e);
            return Err(e.into());
        }
    };

    info!(
        ip = %bundle.ip_address,
        public_ip = ?bundle.public_ip_address,
        psc_dns = ?bundle.psc_dns_name,
        uid = %bundle.instance_uid,
        cert_expiry = %bundle.client_certificate.not_after,
        "connection info fetched"
    );

    tokio::fs::create_dir_all(&config.output_dir).await?;
    let chain_pem: String = bundle
        .certificate_chain
        .iter()
        .map(|c| c.pem())
        .collect();
    tokio::fs::write(
        config.output_dir.join("client.pem"),
        bundle.client_certificate.pem(),
    )
    .await?;
    tokio::fs::write(config.output_dir.join("chain.pem"), chain_pem).await?;
    tokio::fs::write(config.output_dir.join("ca.pem"), bundle.ca_certificate.pem()).await?;
    tokio::fs::write(config.output_dir.join("key.pem"), keys.serialize_pem()).await?;

    info!("TLS materials written to {}", config.output_dir.display());

    fetcher.close();
    Ok(())
}
