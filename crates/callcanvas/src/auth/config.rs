//! Authentication configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum accepted length for the JWT secret outside dev mode.
const MIN_SECRET_LEN: usize = 32;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accept `dev:<user>` tokens. Never enable in production.
    pub dev_mode: bool,

    /// JWT secret for HS256. Accepts `env:VAR_NAME`.
    /// REQUIRED when dev_mode is false.
    pub jwt_secret: Option<String>,

    /// Allowed CORS origins. Empty means any origin in dev mode and none
    /// otherwise.
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            jwt_secret: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        self.jwt_secret
            .as_deref()
            .map(resolve_env_reference)
            .transpose()
    }

    /// Validate the configuration for the current mode.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.dev_mode {
            return Ok(());
        }
        match self.resolve_jwt_secret()? {
            None => Err(ConfigValidationError::MissingJwtSecret),
            Some(secret) if secret.len() < MIN_SECRET_LEN => {
                Err(ConfigValidationError::JwtSecretTooShort)
            }
            Some(_) => Ok(()),
        }
    }

    /// Generate a random 64 character alphanumeric secret.
    pub fn generate_jwt_secret() -> String {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        const SECRET_LENGTH: usize = 64;

        let mut rng = rand::rng();
        (0..SECRET_LENGTH)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect()
    }
}

/// Expand an `env:VAR_NAME` reference; other values are returned as-is.
pub fn resolve_env_reference(value: &str) -> Result<String, ConfigValidationError> {
    let Some(var_name) = value.strip_prefix("env:") else {
        return Ok(value.to_string());
    };
    match std::env::var(var_name) {
        Ok(resolved) if !resolved.is_empty() => Ok(resolved),
        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error(
        "JWT secret is required when dev_mode is false. Set CALLCANVAS__AUTH__JWT_SECRET or auth.jwt_secret in config."
    )]
    MissingJwtSecret,

    #[error("JWT secret must be at least 32 characters long.")]
    JwtSecretTooShort,

    #[error("Environment variable '{0}' not found (referenced via env:{0} in config).")]
    EnvVarNotFound(String),

    #[error("Environment variable '{0}' is empty (referenced via env:{0} in config).")]
    EnvVarEmpty(String),
}
