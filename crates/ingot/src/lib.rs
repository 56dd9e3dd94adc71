//! # Ingot
//!
//! A modular chat-bot framework: inbound gateway events flow through an
//! ordered chain of filters to pluggable feature modules, and module replies
//! are composed back into the gateway's inline-markup wire format.
//!
//! ```text
//! ┌─────────┐    ┌───────────────────────────────┐    ┌──────────────────┐
//! │ Gateway │───▶│ EventBus                      │───▶│ Module "dice"    │
//! │ adapter │    │  globals → gate → own filters │───▶│ Module "admin"   │
//! └─────────┘    │  first non-empty reply wins   │───▶│ Module ...       │
//!       ▲        └───────────────────────────────┘    └──────────────────┘
//!       └──────────────── composed reply ◀────────────────────┘
//! ```
//!
//! - **Modules** get scoped handles at init: a bus handle tagged with their
//!   identity, key-value and file storage partitioned under their id, and a
//!   leniently resolved dependency table.
//! - **Filters** run in declared order, may rewrite the event copy's text
//!   (prefix stripping), and may abort the whole chain with a fixed verdict.
//! - **Markup** (`[CQ:...]` tags) round-trips losslessly through the codec
//!   in `ingot_core::markup`.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ingot::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BotConfig::load()?;
//!     let _log_guard = ingot::runtime::logging::init_from_config(&config.logging);
//!
//!     let (gateway, events) = my_adapter::connect(&config.gateway).await?;
//!     let mut bot = Bot::new(config, gateway);
//!     bot.register_module(Arc::new(my_module::MyModule::new()));
//!     bot.run(events).await?;
//!     Ok(())
//! }
//! ```

pub use ingot_core as core;
pub use ingot_framework as framework;
pub use ingot_runtime as runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - entry point and configuration.
    pub use ingot_runtime::{Bot, BotConfig};

    // Module system - the unit of feature development.
    pub use ingot_framework::{
        Dependency, Module, ModuleContext, ModuleError, ModuleInfo, ModuleRegistry,
    };

    // Bus and filters - for wiring listeners in `init`.
    pub use ingot_framework::{
        EventBus, FilterContext, FilterResult, MessageFilter, ModuleBus, Reply, RequestFilter,
        filters,
    };

    // Scoped handles.
    pub use ingot_framework::{ConversationKey, Conversations, FileStore, Storage};

    // Event model and gateway boundary.
    pub use ingot_core::{
        ApiError, ApiResult, Event, Gateway, MessageEvent, MessageType, RequestEvent,
        RequestSubType, RequestType,
    };

    // Markup codec.
    pub use ingot_core::markup::{self, Segment, Tag};
}
