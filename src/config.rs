//! Configuration for the Techem client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

/// Country used when the config file does not name one.
const DEFAULT_COUNTRY: &str = "dk";

/// GraphQL endpoint and portal referer for one country.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CountryEndpoint {
    /// Display name (e.g., "Denmark")
    pub name: String,

    /// GraphQL endpoint URL
    pub url: String,

    /// Tenant portal URL sent as `Referer`
    pub referer: String,
}

impl CountryEndpoint {
    /// Referer without the trailing slash, as sent in `Origin`.
    pub fn origin(&self) -> &str {
        self.referer.trim_end_matches('/')
    }
}

/// Built-in country table.
pub fn builtin_countries() -> BTreeMap<String, CountryEndpoint> {
    let mut countries = BTreeMap::new();
    countries.insert(
        "dk".to_string(),
        CountryEndpoint {
            name: "Denmark".to_string(),
            url: "https://techemadmin.dk/analytics/graphql".to_string(),
            referer: "https://beboer.techemadmin.dk/".to_string(),
        },
    );
    countries.insert(
        "no".to_string(),
        CountryEndpoint {
            name: "Norway".to_string(),
            url: "https://techemadmin.no/analytics/graphql".to_string(),
            referer: "https://beboer.techemadmin.no/".to_string(),
        },
    );
    countries
}

/// Tenant login and the unit to query.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub object_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("object_id", &self.object_id)
            .finish()
    }
}

/// Main configuration structure.
#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    /// Tenant portal login email
    pub email: String,

    /// Tenant portal password
    pub password: String,

    /// Provider identifier of the rental unit
    pub object_id: String,

    /// Country code selecting the endpoint (e.g., "dk", "no")
    #[serde(default = "default_country")]
    pub country: String,

    /// Extra or overriding entries for the country table
    #[serde(default)]
    pub countries: BTreeMap<String, CountryEndpoint>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Reuse the login token across fetches instead of logging in each time
    #[serde(default)]
    pub cache_token: bool,

    /// Token lifetime assumed when the token carries no `exp` claim
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,

    /// Buffer before token expiration to refresh (seconds)
    #[serde(default = "default_token_buffer")]
    pub token_refresh_buffer_seconds: u64,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_token_ttl() -> u64 {
    900
}

fn default_token_buffer() -> u64 {
    30
}

impl Config {
    /// Build a config with defaults for everything but the login.
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            object_id: object_id.into(),
            country: default_country(),
            countries: BTreeMap::new(),
            timeout_seconds: default_timeout(),
            cache_token: false,
            token_ttl_seconds: default_token_ttl(),
            token_refresh_buffer_seconds: default_token_buffer(),
            debug: false,
        }
    }

    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.trim().is_empty() {
            return Err(ConfigError::MissingField("email".into()));
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingField("password".into()));
        }
        if self.object_id.trim().is_empty() {
            return Err(ConfigError::MissingField("object_id".into()));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeout_seconds must be greater than zero".into(),
            ));
        }

        self.endpoint()?;
        Ok(())
    }

    /// Country table with file entries merged over the built-ins.
    pub fn country_table(&self) -> BTreeMap<String, CountryEndpoint> {
        let mut table = builtin_countries();
        table.extend(
            self.countries
                .iter()
                .map(|(code, endpoint)| (code.to_lowercase(), endpoint.clone())),
        );
        table
    }

    /// Resolve the configured country to its endpoint.
    pub fn endpoint(&self) -> Result<CountryEndpoint, ConfigError> {
        let mut table = self.country_table();
        let code = self.country.to_lowercase();
        table.remove(&code).ok_or_else(|| {
            let known: Vec<String> = self.country_table().into_keys().collect();
            ConfigError::Invalid(format!(
                "Unknown country '{}'. Known countries: {:?}",
                self.country, known
            ))
        })
    }

    /// Login and unit identifier.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
            object_id: self.object_id.clone(),
        }
    }

    /// Get timeout as Duration.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    /// Get fallback token lifetime as chrono Duration.
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_seconds as i64)
    }

    /// Get token refresh buffer as chrono Duration.
    pub fn token_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_refresh_buffer_seconds as i64)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("object_id", &self.object_id)
            .field("country", &self.country)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("cache_token", &self.cache_token)
            .field("debug", &self.debug)
            .finish()
    }
}
