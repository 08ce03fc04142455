//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PROCESSOR_BASE_URL` (required): base URL of the external payment processor API
/// - `PROCESSOR_ACCESS_TOKEN` (required): bearer token for the processor API
/// - `PROCESSOR_TIMEOUT_SECS` (optional): upper bound on processor calls, defaults to 10
/// - `BACKEND_URL` (required): public base URL of this service, used to build the
///   notification URL the processor pushes payment events to
/// - `SYSTEM_URL` (optional): login URL included in credential notifications
/// - `MAIL_API_URL` / `MAIL_API_KEY` / `MAIL_FROM` (optional): mail delivery API;
///   when unset, notification dispatch fails softly (logged, never fatal)
/// - `DEFAULT_IDENTIFICATION_TYPE` (optional): payer document type, defaults to "CPF"
/// - `DEFAULT_IDENTIFICATION_NUMBER` (optional): payer document fallback; only used
///   when the request carries no identification and this is explicitly configured
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub processor_base_url: String,
    pub processor_access_token: String,

    #[serde(default = "default_processor_timeout")]
    pub processor_timeout_secs: u64,

    pub backend_url: String,

    #[serde(default = "default_system_url")]
    pub system_url: String,

    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: Option<String>,

    #[serde(default = "default_identification_type")]
    pub default_identification_type: String,

    pub default_identification_number: Option<String>,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

/// Default upper bound (seconds) on blocking processor calls.
fn default_processor_timeout() -> u64 {
    10
}

fn default_system_url() -> String {
    "https://app.example.com".to_string()
}

fn default_identification_type() -> String {
    "CPF".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing, cannot be
    /// parsed into expected types, or if a URL-shaped setting is not a valid URL.
    pub fn from_env() -> anyhow::Result<Self> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        let config = envy::from_env::<Config>()?;
        config.validate_urls()?;
        Ok(config)
    }

    /// Reject malformed URL settings at startup instead of on the first request.
    fn validate_urls(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("PROCESSOR_BASE_URL", &self.processor_base_url),
            ("BACKEND_URL", &self.backend_url),
            ("SYSTEM_URL", &self.system_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("{name} is not a valid URL ({value}): {e}"))?;
        }
        if let Some(mail_url) = &self.mail_api_url {
            url::Url::parse(mail_url)
                .map_err(|e| anyhow::anyhow!("MAIL_API_URL is not a valid URL ({mail_url}): {e}"))?;
        }
        Ok(())
    }

    /// URL the processor should push payment notifications to.
    pub fn notification_url(&self) -> String {
        format!(
            "{}/webhooks/processor",
            self.backend_url.trim_end_matches('/')
        )
    }
}
