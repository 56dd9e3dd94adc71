//! Shared fixtures for module tests: a booted bus with real storage over a
//! temp directory and a recording gateway double.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use ingot_core::{ApiResult, Event, Gateway, MessageEvent, MessageType};
use ingot_framework::{
    Conversations, EventBus, FileService, Module, ModuleError, ModuleRegistry, Storage,
    StorageService,
};

/// Gateway double that records every outbound interaction.
#[derive(Default)]
pub(crate) struct RecordingGateway {
    calls: Mutex<Vec<(String, Value)>>,
    private: Mutex<Vec<(i64, String)>>,
    group: Mutex<Vec<(i64, String)>>,
    role: Mutex<String>,
}

impl RecordingGateway {
    pub(crate) fn api_calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub(crate) fn private_messages(&self) -> Vec<(i64, String)> {
        self.private.lock().clone()
    }

    #[allow(dead_code)]
    pub(crate) fn group_messages(&self) -> Vec<(i64, String)> {
        self.group.lock().clone()
    }

    /// Role reported by `get_group_member_info` for any user.
    pub(crate) fn set_role(&self, role: &str) {
        *self.role.lock() = role.to_owned();
    }
}

#[async_trait::async_trait]
impl Gateway for RecordingGateway {
    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
        self.calls.lock().push((action.to_owned(), params));
        match action {
            "get_group_member_info" => Ok(json!({
                "retcode": 0,
                "data": { "role": self.role.lock().clone() },
            })),
            _ => Ok(json!({ "retcode": 0, "data": null })),
        }
    }

    async fn send_private(&self, user_id: i64, message: &str) -> ApiResult<()> {
        self.private.lock().push((user_id, message.to_owned()));
        Ok(())
    }

    async fn send_group(&self, group_id: i64, message: &str) -> ApiResult<()> {
        self.group.lock().push((group_id, message.to_owned()));
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A fully booted bus + storage + gateway, backed by a temp directory.
pub(crate) struct Fixture {
    pub(crate) bus: EventBus,
    pub(crate) storage: Storage,
    pub(crate) gateway: Arc<RecordingGateway>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub(crate) async fn dispatch_group_message(&self, text: &str) -> Option<String> {
        let event = MessageEvent {
            self_id: 10000,
            time: 0,
            user_id: 20000,
            group_id: Some(30000),
            message_type: MessageType::Group,
            message_id: 1,
            message: text.to_owned(),
        };
        self.bus.dispatch(&Event::Message(event)).await
    }
}

/// Boots the given modules through the real registry path.
pub(crate) async fn try_boot(modules: Vec<Arc<dyn Module>>) -> Result<Fixture, ModuleError> {
    let dir = tempfile::tempdir().expect("temp dir");
    let bus = EventBus::new(false);
    let gateway = Arc::new(RecordingGateway::default());

    let storage_service =
        StorageService::new(dir.path().join("storage.json"), Duration::from_secs(10));
    storage_service.load().await;
    let files = FileService::new(dir.path().join("files"));

    let mut registry = ModuleRegistry::new();
    for module in modules {
        registry.register(module);
    }
    registry.init_all(
        &bus,
        Arc::clone(&gateway) as Arc<dyn Gateway>,
        &storage_service,
        &files,
        &Conversations::new(),
    )?;

    Ok(Fixture {
        bus,
        storage: storage_service.root(),
        gateway,
        _dir: dir,
    })
}

pub(crate) async fn boot(modules: Vec<Arc<dyn Module>>) -> Fixture {
    try_boot(modules).await.expect("modules should boot")
}
