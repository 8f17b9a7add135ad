use std::fmt;
use std::net::SocketAddr;

pub const DEFAULT_API_VERSION: &str = "2024-10-21";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("CLARIFY_BIND_ADDR {0:?} is not a socket address")]
    InvalidBindAddr(String),
}

/// Credentials and routing for the hosted chat-completion deployment.
#[derive(Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub endpoint: String,
    pub api_version: String,
    pub deployment: String,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Every missing required
    /// variable is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut require = |key: &'static str| {
            get(key).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };

        let api_key = require("AZURE_OPENAI_API_KEY");
        let endpoint = require("AZURE_OPENAI_ENDPOINT");
        let deployment = require("AZURE_OPENAI_DEPLOYMENT");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let api_version =
            get("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let bind = get("CLARIFY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind.clone()))?;

        Ok(Self {
            bind_addr,
            gateway: GatewayConfig {
                api_key,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_version,
                deployment,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("AZURE_OPENAI_API_KEY", "secret"),
        ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com/"),
        ("AZURE_OPENAI_DEPLOYMENT", "gpt-4o"),
    ];

    #[test]
    fn defaults_fill_optional_values() {
        let config = ServerConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.gateway.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.gateway.endpoint, "https://example.openai.azure.com");
        assert_eq!(config.gateway.deployment, "gpt-4o");
    }

    #[test]
    fn all_missing_variables_reported_together() {
        let err = ServerConfig::from_lookup(lookup(&[("AZURE_OPENAI_ENDPOINT", "  ")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing(vec![
                "AZURE_OPENAI_API_KEY",
                "AZURE_OPENAI_ENDPOINT",
                "AZURE_OPENAI_DEPLOYMENT"
            ])
        );
    }

    #[test]
    fn bad_bind_address_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CLARIFY_BIND_ADDR", "localhost"));
        let err = ServerConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::InvalidBindAddr("localhost".into()));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = ServerConfig::from_lookup(lookup(REQUIRED)).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
