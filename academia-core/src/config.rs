//! Configuration management

use crate::config_error;
use crate::error::AuthResult;
use crate::logging::LoggingConfig;
use crate::types::{Identity, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const REMOTE_URL_ENV: &str = "ACADEMIA_REMOTE_URL";
pub const REMOTE_API_KEY_ENV: &str = "ACADEMIA_REMOTE_API_KEY";

/// Top-level configuration of the session layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub remote: RemoteConfig,
    pub records: RecordsConfig,
    pub fallback: FallbackConfig,
    pub logging: LoggingConfig,
}

/// Remote identity service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Public (anon) key sent with every request
    pub api_key: String,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            timeout_ms: 10_000,
        }
    }
}

/// Tables consulted by the role strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub role_table: String,
    pub profile_table: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            role_table: "user_auth".to_string(),
            profile_table: "profiles".to_string(),
        }
    }
}

/// Local fallback store and credential table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Key the cached identity lives under
    pub storage_key: String,
    /// Directory of the file-backed store (`~/.academia/fallback` when unset)
    pub storage_dir: Option<PathBuf>,
    /// Whether a failed remote login may be retried against `credentials`
    pub allow_fallback_login: bool,
    pub credentials: Vec<FallbackCredential>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            storage_key: "user".to_string(),
            storage_dir: None,
            allow_fallback_login: true,
            credentials: vec![
                FallbackCredential {
                    id: "admin1".to_string(),
                    email: "admin@academia.com".to_string(),
                    password: "admin123".to_string(),
                    display_name: "Admin User".to_string(),
                    role: Role::Admin,
                    avatar_url: Some("/assets/admin-avatar.jpg".to_string()),
                },
                FallbackCredential {
                    id: "student1".to_string(),
                    email: "student@email.com".to_string(),
                    password: "student123".to_string(),
                    display_name: "João Silva".to_string(),
                    role: Role::Member,
                    avatar_url: Some("/assets/student-avatar.jpg".to_string()),
                },
            ],
        }
    }
}

impl FallbackConfig {
    /// Directory of the file-backed store, resolved against the home directory
    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".academia")
                .join("fallback")
        })
    }
}

/// Entry of the preconfigured credential table
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackCredential {
    pub id: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl FallbackCredential {
    /// Identity carried by this entry, without the password
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            avatar_url: self.avatar_url.clone(),
        }
    }
}

impl std::fmt::Debug for FallbackCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCredential")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("role", &self.role)
            .finish()
    }
}

impl AuthConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AuthResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| config_error!(format!("Failed to read config file: {}", e), "read_file", e))?;

        let config: AuthConfig = toml::from_str(&content)
            .map_err(|e| config_error!(format!("Failed to parse config: {}", e), "parse_toml", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> AuthResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            config_error!(format!("Failed to serialize config: {}", e), "serialize_toml", e)
        })?;

        std::fs::write(path, content)
            .map_err(|e| config_error!(format!("Failed to write config file: {}", e), "write_file", e))?;

        Ok(())
    }

    /// Override the remote endpoint from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(REMOTE_URL_ENV) {
            if !url.trim().is_empty() {
                self.remote.base_url = url;
            }
        }
        if let Ok(key) = std::env::var(REMOTE_API_KEY_ENV) {
            self.remote.api_key = key;
        }
    }

    pub fn validate(&self) -> AuthResult<()> {
        if self.remote.timeout_ms == 0 {
            return Err(config_error!(
                "remote.timeout_ms must be greater than 0",
                "validate"
            ));
        }

        if self.fallback.storage_key.trim().is_empty() {
            return Err(config_error!(
                "fallback.storage_key must not be empty",
                "validate"
            ));
        }

        let mut seen = HashSet::new();
        for credential in &self.fallback.credentials {
            let email = credential.email.to_lowercase();
            if !email.contains('@') || email.starts_with('@') {
                return Err(config_error!(
                    format!("Malformed fallback credential email: {}", credential.email),
                    "validate"
                ));
            }
            if !seen.insert(email) {
                return Err(config_error!(
                    format!("Duplicate fallback credential email: {}", credential.email),
                    "validate"
                ));
            }
        }

        Ok(())
    }
}
