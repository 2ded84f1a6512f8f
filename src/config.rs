//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `STOREFRONT_HOST` - Bind address (default: 0.0.0.0)
//! - `STOREFRONT_PORT` - Listen port (default: 8000)
//! - `STOREFRONT_API_URL` - Base URL of the catalog and stock services
//!   (default: http://127.0.0.1:9000/)
//! - `STOREFRONT_MERCHANT_TYPE` - `inventory` to check live stock, `catalog`
//!   to skip it (default: catalog)
//! - `STOREFRONT_STOCK_REFRESH_SECS` - Seconds between stock refreshes (default: 30)

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use thiserror::Error;
use url::Url;

use crate::cart::reconciler::{MerchantType, STOCK_REFRESH_INTERVAL};

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Base URL of the remote catalog and stock services
    pub api_url: Url,
    /// Tenant mode; decides whether cart stock is checked
    pub merchant_type: MerchantType,
    /// Interval between availability refreshes of a mounted cart
    pub stock_refresh: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key-value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = parse_var("STOREFRONT_HOST", &get("STOREFRONT_HOST", "0.0.0.0"))?;
        let port = parse_var("STOREFRONT_PORT", &get("STOREFRONT_PORT", "8000"))?;
        let api_url = parse_api_url(&get("STOREFRONT_API_URL", "http://127.0.0.1:9000/"))?;
        let merchant_type =
            parse_var("STOREFRONT_MERCHANT_TYPE", &get("STOREFRONT_MERCHANT_TYPE", "catalog"))?;
        let refresh_secs: u64 = parse_var(
            "STOREFRONT_STOCK_REFRESH_SECS",
            &get(
                "STOREFRONT_STOCK_REFRESH_SECS",
                &STOCK_REFRESH_INTERVAL.as_secs().to_string(),
            ),
        )?;
        if refresh_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_STOCK_REFRESH_SECS".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            api_url,
            merchant_type,
            stock_refresh: Duration::from_secs(refresh_secs),
        })
    }

    /// Returns the socket address for binding the server.
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("STOREFRONT_API_URL".to_string(), reason);
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("must be a hierarchical URL".to_string()));
    }
    Ok(url)
}
