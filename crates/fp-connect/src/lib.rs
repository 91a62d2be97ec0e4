//! FleetPG connection bootstrap
//!
//! This crate obtains the connection metadata and short-lived client
//! certificate needed to open a mutually authenticated connection to a
//! managed PostgreSQL instance. One [`ConnectionInfoFetcher::fetch`] call
//! runs the two control-plane lookups concurrently and returns a
//! [`ConnectionBundle`], or a failure classified as terminal (stop) or
//! transient (retry with backoff).

pub mod admin;
pub mod certs;
pub mod config;
mod fetcher;
pub mod types;

pub use admin::{AdminApi, AdminApiClient, AdminApiConfig, CERT_DURATION_SECONDS};
pub use certs::{CertError, ParsedCertificate};
pub use config::ConnectorConfig;
pub use fetcher::ConnectionInfoFetcher;
pub use types::{
    AdminApiError, ClusterName, ConnectError, ConnectResult, ConnectionBundle, InstanceName,
    RpcCode, TERMINAL_STATUS_CODES,
};
