//! # Ingot Framework
//!
//! Dispatch machinery for the Ingot bot framework: the event bus, the
//! ordered filter chains that guard every registration, and the module
//! lifecycle container that wires feature modules to their scoped handles.
//!
//! # Dispatch pipeline
//!
//! ```text
//! ┌─────────┐    ┌──────────────────────────────────────────────┐
//! │ Gateway │───▶│ EventBus                                     │
//! └─────────┘    │  per registration, in registration order:    │
//!                │   clone event → globals → gate → own filters │
//!                │   → handler                                  │
//!                │  messages: first non-empty reply wins        │
//!                │  requests: every accepted handler fires      │
//!                └──────────────────────────────────────────────┘
//! ```
//!
//! # Module lifecycle
//!
//! Modules implement [`Module`] and are registered into a [`ModuleRegistry`]
//! in priority order.  At startup the registry attaches the conversation
//! rendezvous listener, initializes each module with a [`ModuleContext`]
//! (scoped bus handle, storage and file scopes under the module id, resolved
//! dependencies), and finally registers the bot-wide help surface.

pub mod bus;
pub mod error;
pub mod files;
pub mod filter;
mod help;
pub mod module;
pub mod registry;
pub mod session;
pub mod storage;

pub use bus::{DEBUG_PREFIX, EventBus, MessageHandler, ModuleBus, Reply, RequestHandler};
pub use error::{BoxError, BusError, ModuleError, SessionError};
pub use files::{FileService, FileStore};
pub use filter::{
    FilterContext, FilterResult, GlobalFilter, MessageFilter, RequestFilter, filters,
};
pub use module::{Dependency, Deps, Module, ModuleCatalog, ModuleContext, ModuleInfo};
pub use registry::ModuleRegistry;
pub use session::{ConversationKey, ConversationScope, Conversations, PendingReply};
pub use storage::{Storage, StorageService};
