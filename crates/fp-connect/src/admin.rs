//! Client for the database admin control plane. Two operations are consumed
//! by the bootstrap: the per-instance connection-info lookup and the
//! cluster-scoped client certificate issuance.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

use crate::types::{AdminApiError, ClusterName, InstanceName, RpcCode};

/// Validity requested for issued client certificates. Callers are expected to
/// re-run the bootstrap before this elapses.
pub const CERT_DURATION_SECONDS: u64 = 3600;

/// Connection metadata for one instance, as returned by the control plane.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetadata {
    /// Private IP address of the instance.
    pub ip_address: String,
    #[serde(default)]
    pub public_ip_address: Option<String>,
    #[serde(default)]
    pub psc_dns_name: Option<String>,
    /// Opaque identity token for the instance.
    pub instance_uid: String,
}

/// Issued certificate material: the chain is leaf first, followed by
/// intermediates, with the CA certificate carried separately.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResponse {
    pub pem_certificate_chain: Vec<String>,
    pub ca_cert: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateRequest<'a> {
    public_key: &'a str,
    cert_duration: String,
    use_metadata_exchange: bool,
}

/// The seam between the fetcher and the control plane. Both methods report
/// failures through the shared RPC status taxonomy so classification does not
/// depend on which call failed.
pub trait AdminApi: Send + Sync + 'static {
    fn get_connection_info(
        &self,
        instance: &InstanceName,
    ) -> impl Future<Output = Result<InstanceMetadata, AdminApiError>> + Send;

    fn generate_client_certificate(
        &self,
        cluster: &ClusterName,
        public_key_pem: &str,
    ) -> impl Future<Output = Result<CertificateResponse, AdminApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct AdminApiConfig {
    /// Base URL of the admin API, without a trailing slash.
    pub endpoint: String,
    /// Bearer token attached to every request, if set.
    pub auth_token: Option<String>,
}

impl Default for AdminApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://admin.fleetpg.dev".to_string(),
            auth_token: None,
        }
    }
}

/// REST client for the admin control plane.
pub struct AdminApiClient {
    http: reqwest::Client,
    config: AdminApiConfig,
}

impl AdminApiClient {
    pub fn new(config: AdminApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, AdminApiError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| AdminApiError::Decode(format!("{}", e)));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(error_from_parts(status.as_u16(), &body))
    }
}

impl AdminApi for AdminApiClient {
    async fn get_connection_info(
        &self,
        instance: &InstanceName,
    ) -> Result<InstanceMetadata, AdminApiError> {
        let url = format!("{}/v1/{}/connectionInfo", self.config.endpoint, instance);
        debug!(instance = %instance, "requesting connection info");

        let resp = self.authorize(self.http.get(&url)).send().await?;
        Self::decode(resp).await
    }

    async fn generate_client_certificate(
        &self,
        cluster: &ClusterName,
        public_key_pem: &str,
    ) -> Result<CertificateResponse, AdminApiError> {
        let url = format!(
            "{}/v1/{}:generateClientCertificate",
            self.config.endpoint, cluster
        );
        debug!(cluster = %cluster, "requesting client certificate");

        let request = CertificateRequest {
            public_key: public_key_pem,
            cert_duration: format!("{}s", CERT_DURATION_SECONDS),
            use_metadata_exchange: true,
        };
        let resp = self
            .authorize(self.http.post(&url))
            .json(&request)
            .send()
            .await?;
        Self::decode(resp).await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Build a status error from a non-2xx response, preferring the structured
/// error body over the bare HTTP status.
fn error_from_parts(http_status: u16, body: &str) -> AdminApiError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => AdminApiError::Status {
            status: RpcCode::from_status(&parsed.error.status),
            message: parsed.error.message,
        },
        Err(_) => AdminApiError::Status {
            status: RpcCode::from_http(http_status),
            message: format!("HTTP {}", http_status),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_structured_body() {
        let body = r#"{"error": {"code": 403, "message": "caller may not connect", "status": "PERMISSION_DENIED"}}"#;
        let err = error_from_parts(403, body);
        assert_eq!(err.code(), RpcCode::PermissionDenied);
        assert!(err.to_string().contains("PERMISSION_DENIED"));
        assert!(err.to_string().contains("caller may not connect"));
    }

    #[test]
    fn test_error_falls_back_to_http_status() {
        let err = error_from_parts(404, "<html>not json</html>");
        assert_eq!(err.code(), RpcCode::NotFound);

        let err = error_from_parts(502, "");
        assert_eq!(err.code(), RpcCode::Unknown);
    }

    #[test]
    fn test_certificate_request_wire_shape() {
        let request = CertificateRequest {
            public_key: "PEM",
            cert_duration: format!("{}s", CERT_DURATION_SECONDS),
            use_metadata_exchange: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["publicKey"], "PEM");
        assert_eq!(json["certDuration"], "3600s");
        assert_eq!(json["useMetadataExchange"], true);
    }

    #[test]
    fn test_metadata_decodes_optional_fields() {
        let full: InstanceMetadata = serde_json::from_str(
            r#"{"ipAddress": "10.0.0.5", "publicIpAddress": "34.1.2.3",
                "pscDnsName": "i.c.l.p.psc.fleetpg.dev", "instanceUid": "abc123"}"#,
        )
        .unwrap();
        assert_eq!(full.ip_address, "10.0.0.5");
        assert_eq!(full.public_ip_address.as_deref(), Some("34.1.2.3"));

        let minimal: InstanceMetadata =
            serde_json::from_str(r#"{"ipAddress": "10.0.0.5", "instanceUid": "abc123"}"#).unwrap();
        assert!(minimal.public_ip_address.is_none());
        assert!(minimal.psc_dns_name.is_none());
    }
}
