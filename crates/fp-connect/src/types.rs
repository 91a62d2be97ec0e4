use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::certs::ParsedCertificate;

/// Status codes from the standard RPC taxonomy, as surfaced by the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

/// Codes the caller must not retry on.
pub const TERMINAL_STATUS_CODES: [RpcCode; 3] = [
    RpcCode::NotFound,
    RpcCode::PermissionDenied,
    RpcCode::InvalidArgument,
];

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// Parse the `status` field of an admin API error body.
    pub fn from_status(status: &str) -> Self {
        match status {
            "CANCELLED" => Self::Cancelled,
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "NOT_FOUND" => Self::NotFound,
            "ALREADY_EXISTS" => Self::AlreadyExists,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "FAILED_PRECONDITION" => Self::FailedPrecondition,
            "ABORTED" => Self::Aborted,
            "OUT_OF_RANGE" => Self::OutOfRange,
            "UNIMPLEMENTED" => Self::Unimplemented,
            "INTERNAL" => Self::Internal,
            "UNAVAILABLE" => Self::Unavailable,
            "DATA_LOSS" => Self::DataLoss,
            "UNAUTHENTICATED" => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// Fallback mapping for error responses that carry no structured body.
    pub fn from_http(status: u16) -> Self {
        match status {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            501 => Self::Unimplemented,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised by the admin API client before classification.
#[derive(Debug, Error)]
pub enum AdminApiError {
    #[error("{status}: {message}")]
    Status { status: RpcCode, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl AdminApiError {
    pub fn code(&self) -> RpcCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::Transport(_) => RpcCode::Unavailable,
            Self::Decode(_) => RpcCode::Internal,
        }
    }
}

/// Classified fetch failure. Terminal means the caller must stop retrying;
/// Transient means a retry with backoff may succeed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("{message}")]
    Terminal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{message}")]
    Transient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectError {
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Map an admin API failure to its retry classification. The same mapping
    /// applies no matter which of the two bootstrap calls raised the error.
    pub fn classify(err: AdminApiError) -> Self {
        let message = format!(
            "admin API failed to return the connection info. Reason: {}",
            err
        );
        if TERMINAL_STATUS_CODES.contains(&err.code()) {
            Self::Terminal {
                message,
                source: Some(Box::new(err)),
            }
        } else {
            Self::Transient {
                message,
                source: Some(Box::new(err)),
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }
}

impl From<crate::certs::CertError> for ConnectError {
    fn from(err: crate::certs::CertError) -> Self {
        // Malformed material from a trusted control plane is operational,
        // not a caller input error.
        Self::Transient {
            message: format!(
                "admin API failed to return the connection info. Reason: {}",
                err
            ),
            source: Some(Box::new(err)),
        }
    }
}

pub type ConnectResult<T> = Result<T, ConnectError>;

/// Fully qualified name of a database instance:
/// `projects/{project}/locations/{location}/clusters/{cluster}/instances/{instance}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    project: String,
    location: String,
    cluster: String,
    instance: String,
}

impl InstanceName {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        cluster: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
            cluster: cluster.into(),
            instance: instance.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Name of the cluster that owns this instance. Certificate issuance is
    /// scoped to the cluster, not the instance.
    pub fn cluster_name(&self) -> ClusterName {
        ClusterName {
            project: self.project.clone(),
            location: self.location.clone(),
            cluster: self.cluster.clone(),
        }
    }
}

impl FromStr for InstanceName {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "locations", location, "clusters", cluster, "instances", instance]
                if !project.is_empty()
                    && !location.is_empty()
                    && !cluster.is_empty()
                    && !instance.is_empty() =>
            {
                Ok(Self::new(*project, *location, *cluster, *instance))
            }
            _ => Err(ConnectError::terminal(format!(
                "invalid instance name: {:?} (expected \
                 projects/<project>/locations/<location>/clusters/<cluster>/instances/<instance>)",
                s
            ))),
        }
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/clusters/{}/instances/{}",
            self.project, self.location, self.cluster, self.instance
        )
    }
}

/// Fully qualified name of the cluster owning an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterName {
    project: String,
    location: String,
    cluster: String,
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/clusters/{}",
            self.project, self.location, self.cluster
        )
    }
}

/// Everything needed to open a mutually authenticated connection to one
/// instance: addressing from the metadata lookup plus the issued TLS
/// materials. Built once per successful fetch, never mutated.
#[derive(Debug, Clone)]
pub struct ConnectionBundle {
    pub ip_address: String,
    pub public_ip_address: Option<String>,
    pub psc_dns_name: Option<String>,
    pub instance_uid: String,
    pub client_certificate: ParsedCertificate,
    pub certificate_chain: Vec<ParsedCertificate>,
    pub ca_certificate: ParsedCertificate,
}
