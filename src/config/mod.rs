//! # Configuration Module
//!
//! Handles configuration loading and management. Configuration can be
//! loaded from:
//! - Environment variables (prefixed with GUILD__)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use guild_core::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("max message length: {}", settings.message.max_content_length);
//! ```

mod settings;

pub use settings::*;
