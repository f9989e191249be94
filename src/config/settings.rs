//! Core settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all core settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Message limits and reconciliation tuning
    pub message: MessageSettings,

    /// Invite code generation and lifetime
    pub invite: InviteSettings,

    /// Retry/backoff policy for collaborator calls
    pub retry: RetrySettings,

    /// Authorization policy (platform-admin allowlist)
    pub authorization: AuthorizationSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Message stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSettings {
    /// Maximum message content length in characters (after trimming)
    pub max_content_length: usize,

    /// Number of messages fetched when a channel is opened
    pub history_page_size: usize,

    /// Window in which an authoritative insert may be matched against a
    /// pending optimistic entry, in seconds
    pub reconcile_window_secs: i64,
}

/// Invite lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InviteSettings {
    /// Length of generated invite codes
    pub code_length: usize,

    /// Fresh draws attempted on code collision before giving up
    pub max_generation_attempts: u32,
}

/// Retry policy for collaborator reads and subscriptions.
///
/// Non-idempotent mutations are never retried; these knobs apply to
/// one-shot fetches (bounded) and feed subscriptions (unbounded).
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Attempts for one-shot idempotent fetches
    pub fetch_attempts: u32,

    /// Initial backoff delay in milliseconds
    pub backoff_base_ms: u64,

    /// Backoff ceiling in milliseconds
    pub backoff_cap_ms: u64,
}

/// Authorization policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationSettings {
    /// Emails granted platform-admin rights when role lookup fails.
    /// Kept in configuration so no credential ever lands in code.
    pub admin_emails: Vec<String>,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-1023)
    pub machine_id: u16,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("message.max_content_length", 4000_i64)?
            .set_default("message.history_page_size", 50_i64)?
            .set_default("message.reconcile_window_secs", 10_i64)?
            .set_default("invite.code_length", 8_i64)?
            .set_default("invite.max_generation_attempts", 5_i64)?
            .set_default("retry.fetch_attempts", 3_i64)?
            .set_default("retry.backoff_base_ms", 250_i64)?
            .set_default("retry.backoff_cap_ms", 30000_i64)?
            .set_default("authorization.admin_emails", Vec::<String>::new())?
            .set_default("snowflake.machine_id", 1)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            // GUILD__MESSAGE__MAX_CONTENT_LENGTH=4000 -> message.max_content_length
            .add_source(
                Environment::default()
                    .prefix("GUILD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Settings {
    /// Built-in defaults, used by embedders and tests that do not carry
    /// configuration files.
    fn default() -> Self {
        Self {
            message: MessageSettings {
                max_content_length: 4000,
                history_page_size: 50,
                reconcile_window_secs: 10,
            },
            invite: InviteSettings {
                code_length: 8,
                max_generation_attempts: 5,
            },
            retry: RetrySettings {
                fetch_attempts: 3,
                backoff_base_ms: 250,
                backoff_cap_ms: 30000,
            },
            authorization: AuthorizationSettings {
                admin_emails: Vec::new(),
            },
            snowflake: SnowflakeSettings { machine_id: 1 },
            environment: "development".into(),
        }
    }
}
