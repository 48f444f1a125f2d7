use std::env;

use audit::DEFAULT_SERVICE;

pub const DEFAULT_OBJECTS_API_BASE_URL: &str = "https://api.restful-api.dev/objects";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT value {0:?}")]
    InvalidPort(String),
    #[error("invalid OBJECTS_API_BASE_URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Service settings, read from the environment at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub objects_api_base_url: String,
    /// Without one every request is treated as anonymous.
    pub identity_service_url: Option<String>,
    pub audit_event_queue_url: Option<String>,
    pub audit_service_name: String,
    /// Appended to the description of created objects before they leave this service.
    pub server_annotation: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match optional("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        Ok(ServiceConfig {
            port,
            objects_api_base_url: optional("OBJECTS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OBJECTS_API_BASE_URL.to_string()),
            identity_service_url: optional("IDENTITY_SERVICE_URL"),
            audit_event_queue_url: optional("AUDIT_EVENT_QUEUE_URL"),
            audit_service_name: optional("AUDIT_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
            server_annotation: optional("SERVER_ANNOTATION"),
        })
    }
}
