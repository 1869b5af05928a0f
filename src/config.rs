//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub session: SessionConfig,
    pub itineraries: ItineraryStoreConfig,
    /// Deployment environment; production turns on `Secure` cookies
    #[serde(default)]
    pub environment: Environment,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Directory holding the exported front-end pages
    pub static_dir: PathBuf,
    /// Origins allowed for cross-origin requests (empty = same origin only)
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Identity service (Appwrite-compatible) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// REST endpoint including the version prefix, e.g. "https://cloud.appwrite.io/v1"
    pub endpoint: String,
    /// Project identifier sent with every request
    pub project_id: String,
    /// Server API key used for admin-scoped calls
    pub api_key: String,
    /// Storage bucket receiving avatar uploads
    pub avatar_bucket_id: String,
    /// Timeout for a single identity request
    pub timeout_seconds: u64,
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Cookie holding the identity session secret
    pub cookie_name: String,
    /// Cookie max age in seconds (default: 604800 = 7 days)
    pub max_age_seconds: i64,
}

/// Database and collections holding saved itineraries
#[derive(Debug, Clone, Deserialize)]
pub struct ItineraryStoreConfig {
    pub database_id: String,
    /// One document per trip
    pub itineraries_collection: String,
    pub budgets_collection: String,
    pub days_collection: String,
    pub time_blocks_collection: String,
    pub recommendations_collection: String,
    pub journey_paths_collection: String,
}

impl ItineraryStoreConfig {
    /// Config keys of collections left blank
    fn missing(&self) -> Vec<&'static str> {
        [
            ("itineraries_collection", &self.itineraries_collection),
            ("budgets_collection", &self.budgets_collection),
            ("days_collection", &self.days_collection),
            ("time_blocks_collection", &self.time_blocks_collection),
            ("recommendations_collection", &self.recommendations_collection),
            ("journey_paths_collection", &self.journey_paths_collection),
        ]
        .into_iter()
        .filter(|(_, id)| id.trim().is_empty())
        .map(|(key, _)| key)
        .collect()
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (AVENTRA__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.static_dir", "public")?
            .set_default("identity.avatar_bucket_id", "avatars")?
            .set_default("identity.timeout_seconds", 30)?
            .set_default("session.cookie_name", "user-session")?
            .set_default("session.max_age_seconds", 604800)?
            .set_default("itineraries.database_id", "trips")?
            .set_default("itineraries.itineraries_collection", "itineraries")?
            .set_default("itineraries.budgets_collection", "budget_breakdowns")?
            .set_default("itineraries.days_collection", "itinerary_days")?
            .set_default("itineraries.time_blocks_collection", "time_blocks")?
            .set_default("itineraries.recommendations_collection", "recommendations")?
            .set_default("itineraries.journey_paths_collection", "journey_paths")?
            .set_default("environment", "development")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("AVENTRA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.environment == Environment::Production
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        let endpoint = url::Url::parse(&self.identity.endpoint).map_err(|e| {
            AppError::Config(format!("identity.endpoint is not a valid URL: {e}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(AppError::Config(
                "identity.endpoint must use http or https".to_string(),
            ));
        }

        if self.identity.project_id.trim().is_empty() {
            return Err(AppError::Config(
                "identity.project_id must not be empty".to_string(),
            ));
        }

        if self.identity.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "identity.api_key must not be empty".to_string(),
            ));
        }

        if self.session.max_age_seconds <= 0 {
            return Err(AppError::Config(
                "session.max_age_seconds must be greater than 0".to_string(),
            ));
        }

        if self.session.cookie_name.trim().is_empty() {
            return Err(AppError::Config(
                "session.cookie_name must not be empty".to_string(),
            ));
        }

        if self.itineraries.database_id.trim().is_empty() {
            return Err(AppError::Config(
                "itineraries.database_id must not be empty".to_string(),
            ));
        }

        let missing = self.itineraries.missing();
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "Missing itinerary collection ids: {}",
                missing.join(", ")
            )));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            )));
        }

        if self.environment == Environment::Production && endpoint.scheme() != "https" {
            return Err(AppError::Config(
                "identity.endpoint must use https in production".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                static_dir: PathBuf::from("public"),
                allowed_origins: Vec::new(),
            },
            identity: IdentityConfig {
                endpoint: "http://localhost/v1".to_string(),
                project_id: "aventra".to_string(),
                api_key: "server-key".to_string(),
                avatar_bucket_id: "avatars".to_string(),
                timeout_seconds: 30,
            },
            session: SessionConfig {
                cookie_name: "user-session".to_string(),
                max_age_seconds: 604_800,
            },
            itineraries: ItineraryStoreConfig {
                database_id: "trips".to_string(),
                itineraries_collection: "itineraries".to_string(),
                budgets_collection: "budget_breakdowns".to_string(),
                days_collection: "itinerary_days".to_string(),
                time_blocks_collection: "time_blocks".to_string(),
                recommendations_collection: "recommendations".to_string(),
                journey_paths_collection: "journey_paths".to_string(),
            },
            environment: Environment::Development,
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_endpoint_in_development() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_missing_api_key() {
        let mut config = valid_config();
        config.identity.api_key = "  ".to_string();

        let error = config.validate().expect_err("blank api key must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("identity.api_key")
        ));
    }

    #[test]
    fn validate_rejects_http_endpoint_in_production() {
        let mut config = valid_config();
        config.environment = Environment::Production;

        let error = config
            .validate()
            .expect_err("production must talk to the identity service over https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("https in production")
        ));

        config.identity.endpoint = "https://cloud.appwrite.io/v1".to_string();
        assert!(config.validate().is_ok());
        assert!(config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_non_positive_max_age() {
        let mut config = valid_config();
        config.session.max_age_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_names_every_blank_collection() {
        let mut config = valid_config();
        config.itineraries.days_collection = String::new();
        config.itineraries.journey_paths_collection = " ".to_string();

        let error = config.validate().expect_err("blank collections must fail");
        assert_eq!(
            error.user_message(),
            "Missing itinerary collection ids: days_collection, journey_paths_collection"
        );
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = valid_config();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        config.logging.format = "json".to_string();
        assert!(config.validate().is_ok());
    }
}
