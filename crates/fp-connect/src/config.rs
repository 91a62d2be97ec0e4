use std::path::PathBuf;

use crate::admin::AdminApiConfig;

/// Connector configuration loaded from environment variables. These are the
/// same knobs a pooled front end passes through out-of-band: the target
/// instance name and the IAM authentication flag, plus the admin API
/// endpoint and credentials.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Fully qualified instance name,
    /// e.g. `projects/p/locations/l/clusters/c/instances/i`.
    pub instance_name: String,
    /// Base URL of the admin API.
    pub api_endpoint: String,
    /// Bearer token for the admin API, if required.
    pub api_token: Option<String>,
    /// Authenticate to the database with IAM instead of a password.
    pub enable_iam_authn: bool,
    /// Where the CLI writes the fetched TLS materials.
    pub output_dir: PathBuf,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            instance_name: String::new(),
            api_endpoint: AdminApiConfig::default().endpoint,
            api_token: None,
            enable_iam_authn: false,
            output_dir: PathBuf::from("/var/lib/fleetpg/tls"),
        }
    }
}

impl ConnectorConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("FLEETPG_INSTANCE_NAME") {
            config.instance_name = v;
        }
        if let Ok(v) = std::env::var("FLEETPG_API_ENDPOINT") {
            config.api_endpoint = v;
        }
        if let Ok(v) = std::env::var("FLEETPG_API_TOKEN") {
            config.api_token = Some(v);
        }
        if let Ok(v) = std::env::var("FLEETPG_ENABLE_IAM_AUTHN") {
            config.enable_iam_authn = v.to_lowercase() != "false" && v != "0";
        }
        if let Ok(v) = std::env::var("FLEETPG_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }

        config
    }

    pub fn admin_api(&self) -> AdminApiConfig {
        AdminApiConfig {
            endpoint: self.api_endpoint.trim_end_matches('/').to_string(),
            auth_token: self.api_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_api_config_strips_trailing_slash() {
        let config = ConnectorConfig {
            api_endpoint: "https://admin.example.com/".to_string(),
            ..ConnectorConfig::default()
        };
        assert_eq!(config.admin_api().endpoint, "https://admin.example.com");
    }
}
