//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The broker token is wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::broker::BrokerEndpoint;
use crate::connector::ConnectorConfig;
use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug)]
pub struct Config {
    pub broker_uri: String,
    pub broker_token: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let broker_uri = required_var("BROKER_URI")?;
        // Validate early so a bad URI fails at startup, not on first submit.
        BrokerEndpoint::new(broker_uri.as_str())?;

        Ok(Self {
            broker_uri,
            broker_token: optional_var("BROKER_TOKEN").map(SecretString::from),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Build the broker endpoint, attaching the token if one is set.
    pub fn endpoint(&self) -> Result<BrokerEndpoint> {
        let endpoint = BrokerEndpoint::new(self.broker_uri.as_str())?;
        Ok(match &self.broker_token {
            Some(token) => {
                endpoint.with_credentials(SecretString::from(token.expose_secret().to_owned()))
            }
            None => endpoint,
        })
    }

    pub fn connector_config(&self) -> Result<ConnectorConfig> {
        Ok(ConnectorConfig::new(self.endpoint()?))
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// Unset and blank are treated the same.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
