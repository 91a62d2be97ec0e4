//! The bootstrap core: one `fetch` call fans out the metadata lookup and the
//! certificate issuance concurrently, joins the pair, and assembles the TLS
//! materials into a [`ConnectionBundle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rcgen::KeyPair;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::admin::AdminApi;
use crate::certs;
use crate::types::{ConnectError, ConnectResult, ConnectionBundle, InstanceName};

/// Fetches connection metadata and a short-lived client certificate for one
/// instance per call. Holds a shared handle to the admin API client; the
/// surrounding application owns the client's and the runtime's lifecycle.
///
/// The fetcher never retries and never caches. Callers decide whether to
/// retry based on [`ConnectError::is_terminal`], and re-invoke the bootstrap
/// before the issued certificate expires.
pub struct ConnectionInfoFetcher<A> {
    api: Arc<A>,
    closed: AtomicBool,
}

impl<A: AdminApi> ConnectionInfoFetcher<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            closed: AtomicBool::new(false),
        }
    }

    /// Obtain everything needed to open a mutually authenticated connection
    /// to `instance`, presenting the public half of `keys` for signing.
    ///
    /// Issues two independent RPCs concurrently; the call resolves once both
    /// have resolved. On any failure exactly one classified error is
    /// surfaced and no partial bundle is produced.
    pub async fn fetch(
        &self,
        instance: &InstanceName,
        keys: &KeyPair,
    ) -> ConnectResult<ConnectionBundle> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectError::terminal(
                "connection info fetcher is closed",
            ));
        }

        let public_key_pem = certs::encode_public_key_pem(&keys.public_key_der());
        let cluster = instance.cluster_name();

        // Both tasks go onto the runtime before either result is awaited.
        let metadata_api = Arc::clone(&self.api);
        let metadata_instance = instance.clone();
        let metadata_task = tokio::spawn(async move {
            metadata_api.get_connection_info(&metadata_instance).await
        });

        let cert_api = Arc::clone(&self.api);
        let cert_task = tokio::spawn(async move {
            cert_api
                .generate_client_certificate(&cluster, &public_key_pem)
                .await
        });

        let (metadata_join, cert_join) = tokio::join!(metadata_task, cert_task);
        let metadata_result = metadata_join
            .map_err(panic_error)
            .and_then(|r| r.map_err(ConnectError::classify));
        let cert_result = cert_join
            .map_err(panic_error)
            .and_then(|r| r.map_err(ConnectError::classify));

        let (metadata, certificate) = match (metadata_result, cert_result) {
            (Ok(metadata), Ok(certificate)) => (metadata, certificate),
            // Terminal classification takes precedence when both calls fail.
            (Err(first), Err(second)) => {
                warn!(
                    first = %first,
                    second = %second,
                    "both bootstrap calls failed"
                );
                let chosen = if second.is_terminal() && !first.is_terminal() {
                    second
                } else {
                    first
                };
                return Err(chosen);
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(e),
        };

        if certificate.pem_certificate_chain.is_empty() {
            return Err(ConnectError::transient(
                "admin API failed to return the connection info. \
                 Reason: empty certificate chain in response",
            ));
        }

        let mut certificate_chain = Vec::with_capacity(certificate.pem_certificate_chain.len());
        for cert in &certificate.pem_certificate_chain {
            certificate_chain.push(certs::parse_certificate(cert.as_bytes())?);
        }
        let client_certificate = certificate_chain[0].clone();
        let ca_certificate = certs::parse_certificate(certificate.ca_cert.as_bytes())?;

        debug!(
            instance = %instance,
            uid = %metadata.instance_uid,
            chain_len = certificate_chain.len(),
            cert_expiry = %client_certificate.not_after,
            "connection info fetched"
        );

        Ok(ConnectionBundle {
            ip_address: metadata.ip_address,
            public_ip_address: metadata.public_ip_address,
            psc_dns_name: metadata.psc_dns_name,
            instance_uid: metadata.instance_uid,
            client_certificate,
            certificate_chain,
            ca_certificate,
        })
    }

    /// Release the admin API client handle. Idempotent; callers must stop
    /// issuing fetches before closing. Skipping close on process exit is
    /// fine.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("connection info fetcher closed");
        }
    }
}

fn panic_error(e: JoinError) -> ConnectError {
    ConnectError::transient(format!(
        "admin API failed to return the connection info. Reason: {}",
        e
    ))
}
