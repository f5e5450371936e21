//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms set these)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_RETRY__MAX_ATTEMPTS`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (the `Default` impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level configuration, grouped by concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub context: ContextConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where uploaded audio and user context live.
///
/// ## Fields:
/// - `object_root`: directory that stands in for the object store; each
///   container is a subdirectory
/// - `user_context_table`: document-store table holding user context
/// - `user_inputs_bucket`: container app uploads land in
/// - `response_audio_bucket`: container synthesized replies are written to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub object_root: String,
    pub user_context_table: String,
    pub user_inputs_bucket: String,
    pub response_audio_bucket: String,
}

/// Retry schedule for object-store downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_multiplier: f64,
    pub initial_delay_ms: u64,
}

/// User-context defaults and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Conversation entries kept per user; older ones are dropped on write
    pub max_history_entries: usize,
    /// Name given to callers seen for the first time
    pub default_user_name: String,
    pub default_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                object_root: "./data/objects".to_string(),
                user_context_table: "vaani-user-context".to_string(),
                user_inputs_bucket: "vaani-user-inputs".to_string(),
                response_audio_bucket: "vaani-response-audio".to_string(),
            },
            retry: RetryConfig {
                max_attempts: 3,
                backoff_multiplier: 2.0,
                initial_delay_ms: 200,
            },
            context: ContextConfig {
                max_history_entries: 50,
                default_user_name: "उपयोगकर्ता".to_string(),
                default_language: "hi-IN".to_string(),
            },
            logging: LoggingConfig {
                json: false,
                filter: "voice_intake=debug,actix_web=info".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`
    /// - `APP_STORAGE__OBJECT_ROOT=/var/lib/voice-intake/objects`
    /// - `APP_LOGGING__JSON=true`
    /// - `PORT=3000`
    ///
    /// Sections and fields are split on a double underscore since field
    /// names contain single underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.storage.user_context_table.trim().is_empty() {
            return Err(anyhow::anyhow!("User context table name cannot be empty"));
        }

        if self.storage.object_root.trim().is_empty() {
            return Err(anyhow::anyhow!("Object store root cannot be empty"));
        }

        if self.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("Retry max_attempts must be at least 1"));
        }

        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!("Retry backoff_multiplier must be >= 1.0"));
        }

        if self.context.max_history_entries == 0 {
            return Err(anyhow::anyhow!("max_history_entries must be greater than 0"));
        }

        Ok(())
    }

    /// Apply a partial update given as JSON, e.g. `{"retry": {"max_attempts": 5}}`.
    ///
    /// Only fields present in the JSON change. The result is validated before
    /// returning; on error `self` may be partially updated, so callers work on
    /// a copy.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = u16::try_from(port)
                    .map_err(|_| anyhow::anyhow!("Server port out of range: {}", port))?;
            }
        }

        if let Some(retry) = partial.get("retry") {
            if let Some(attempts) = retry.get("max_attempts").and_then(|v| v.as_u64()) {
                self.retry.max_attempts = u32::try_from(attempts)
                    .map_err(|_| anyhow::anyhow!("max_attempts out of range: {}", attempts))?;
            }
            if let Some(multiplier) = retry.get("backoff_multiplier").and_then(|v| v.as_f64()) {
                self.retry.backoff_multiplier = multiplier;
            }
            if let Some(delay) = retry.get("initial_delay_ms").and_then(|v| v.as_u64()) {
                self.retry.initial_delay_ms = delay;
            }
        }

        if let Some(context) = partial.get("context") {
            if let Some(max) = context.get("max_history_entries").and_then(|v| v.as_u64()) {
                self.context.max_history_entries = max as usize;
            }
            if let Some(name) = context.get("default_user_name").and_then(|v| v.as_str()) {
                self.context.default_user_name = name.to_string();
            }
            if let Some(language) = context.get("default_language").and_then(|v| v.as_str()) {
                self.context.default_language = language.to_string();
            }
        }

        self.validate()?;
        Ok(())
    }
}
