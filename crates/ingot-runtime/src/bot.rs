//! Bot orchestration.
//!
//! [`Bot`] owns the pieces the framework crates provide — storage, the
//! event bus, the module registry, the conversation registry — and drives
//! the boot sequence plus the inbound event loop:
//!
//! 1. load the persisted key-value store,
//! 2. initialize every registered module (sessions attached first, the help
//!    surface last),
//! 3. drain the inbound event stream, spawning one dispatch task per event
//!    so a handler suspended on I/O or a conversation rendezvous never
//!    blocks unrelated events,
//! 4. on shutdown, flush storage once more.
//!
//! Message replies produced by dispatch are routed back through the
//! [`Gateway`](ingot_core::Gateway) to the originating group or user.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ingot_core::{BoxedGateway, Event, MessageEvent, MessageType};
use ingot_framework::{
    Conversations, EventBus, FileService, Module, ModuleInfo, ModuleRegistry, StorageService,
};

use crate::config::BotConfig;
use crate::error::RuntimeError;

/// The assembled bot host.
pub struct Bot {
    config: BotConfig,
    bus: EventBus,
    registry: ModuleRegistry,
    storage: StorageService,
    files: FileService,
    conversations: Conversations,
    gateway: BoxedGateway,
    shutdown: CancellationToken,
}

impl Bot {
    /// Assembles a bot from configuration and a gateway adapter.
    pub fn new(config: BotConfig, gateway: BoxedGateway) -> Self {
        let bus = EventBus::new(config.debug);
        let storage = StorageService::new(config.storage_path(), config.autosave_interval());
        let files = FileService::new(config.files_root());
        Self {
            config,
            bus,
            registry: ModuleRegistry::new(),
            storage,
            files,
            conversations: Conversations::new(),
            gateway,
            shutdown: CancellationToken::new(),
        }
    }

    /// Registers a feature module.  Registration order is dispatch priority.
    pub fn register_module(&mut self, module: Arc<dyn Module>) {
        self.registry.register(module);
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// A handle that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Boots the bot and dispatches events until the stream closes or the
    /// shutdown token is cancelled.
    pub async fn run(&self, mut events: mpsc::Receiver<Event>) -> Result<(), RuntimeError> {
        self.storage.load().await;

        if self.bus.is_debug() {
            // Probe listener: an empty command in debug mode confirms the
            // sandbox is up.  Registered ahead of modules, like the sandbox
            // filter itself.
            self.bus
                .scoped(ModuleInfo::new("core.debug", ""))
                .register_message(vec![], |event: MessageEvent| async move {
                    Ok(event
                        .message
                        .is_empty()
                        .then(|| "Debug mode is on".to_owned()))
                });
        }

        self.registry.init_all(
            &self.bus,
            Arc::clone(&self.gateway),
            &self.storage,
            &self.files,
            &self.conversations,
        )?;

        info!(
            modules = self.registry.modules().len(),
            debug = self.bus.is_debug(),
            "Bot ready, dispatching events"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Event stream closed");
                        break;
                    };
                    let bus = self.bus.clone();
                    let gateway = Arc::clone(&self.gateway);
                    tokio::spawn(async move {
                        let reply = bus.dispatch(&event).await;
                        if let Some(reply) = reply
                            && let Some(message) = event.as_message()
                        {
                            deliver_reply(&gateway, message, &reply).await;
                        }
                    });
                }
            }
        }

        if let Err(e) = self.storage.flush().await {
            warn!(error = %e, "Final storage flush failed");
        }
        Ok(())
    }
}

/// Routes a composed reply back to where the message came from.
async fn deliver_reply(gateway: &BoxedGateway, event: &MessageEvent, reply: &str) {
    let result = match (event.message_type, event.group_id) {
        (MessageType::Private, _) => gateway.send_private(event.user_id, reply).await,
        (_, Some(group_id)) => gateway.send_group(group_id, reply).await,
        _ => {
            warn!(user = event.user_id, "Group message without a group id, dropping reply");
            return;
        }
    };
    if let Err(e) = result {
        error!(error = %e, "Failed to deliver reply");
    }
}
