//! # Ingot Runtime
//!
//! Host-process wiring for an Ingot bot: configuration loading, logging
//! setup, and the [`Bot`] orchestrator that boots storage and modules and
//! drives the inbound event loop.
//!
//! ```rust,ignore
//! use ingot_runtime::{Bot, BotConfig, logging};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfig::load()?;
//!     let _log_guard = logging::init_from_config(&config.logging);
//!
//!     let (gateway, events) = my_gateway::connect(&config.gateway).await?;
//!     let mut bot = Bot::new(config, gateway);
//!     bot.register_module(Arc::new(Dice::new()));
//!     bot.run(events).await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;

pub use bot::Bot;
pub use config::{BotConfig, ConfigError, GatewayConfig, LoggingConfig, StorageConfig};
pub use error::RuntimeError;
pub use logging::{LoggingBuilder, init_from_config};
