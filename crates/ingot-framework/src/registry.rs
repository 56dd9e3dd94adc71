//! Module registration and lifecycle.
//!
//! [`ModuleRegistry`] owns the ordered module list.  Position in the list is
//! the tie-break priority for dispatch: a module registered earlier gets its
//! bus registrations evaluated earlier.
//!
//! [`init_all`](ModuleRegistry::init_all) wires everything up, in this
//! order:
//!
//! 1. the conversation-session listener (ahead of every module, so pending
//!    follow-ups are intercepted before ordinary command registrations),
//! 2. each module's `init`, in registration order, with its scoped context,
//! 3. the help surface (after every module — lowest dispatch priority).

use std::sync::Arc;

use tracing::{info, warn};

use ingot_core::BoxedGateway;

use crate::bus::EventBus;
use crate::error::ModuleError;
use crate::files::FileService;
use crate::help;
use crate::module::{Deps, Module, ModuleCatalog, ModuleContext};
use crate::session::Conversations;
use crate::storage::StorageService;

/// Ordered container of all registered modules.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a module.  Registration order is dispatch priority.
    pub fn register(&mut self, module: Arc<dyn Module>) {
        info!(module = %module.info().id, "Module registered");
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    /// Identity snapshot of every registered module, in order.
    pub fn catalog(&self) -> ModuleCatalog {
        ModuleCatalog::new(self.modules.iter().map(|m| m.info()).collect())
    }

    /// Wires up and initializes every module.  Call once, after storage has
    /// been loaded and before the first event is dispatched.
    pub fn init_all(
        &self,
        bus: &EventBus,
        gateway: BoxedGateway,
        storage: &StorageService,
        files: &FileService,
        conversations: &Conversations,
    ) -> Result<(), ModuleError> {
        conversations.attach(bus);

        let catalog = self.catalog();
        let root = storage.root();
        for module in &self.modules {
            let module_info = module.info();
            let ctx = ModuleContext {
                gateway: Arc::clone(&gateway),
                bus: bus.scoped(module_info.clone()),
                storage: root.child(&module_info.id),
                files: files.scope(&module_info.id),
                deps: self.resolve_dependencies(module.as_ref()),
                catalog: catalog.clone(),
                conversations: conversations.clone(),
            };
            module.init(ctx)?;
            info!(module = %module_info.id, "Module initialized");
        }

        help::register(bus, &self.modules);
        Ok(())
    }

    /// Resolves a module's declared dependencies by concrete type.
    ///
    /// Resolution is lenient: a missing provider logs a warning and the
    /// entry is omitted, so optional integrations ("use the admin module if
    /// present") do not impose a boot order.
    fn resolve_dependencies(&self, module: &dyn Module) -> Deps {
        let mut deps = Deps::default();
        for dep in module.dependencies() {
            let provider = self.modules.iter().find(|candidate| {
                let any = Arc::clone(candidate).as_any();
                (*any).type_id() == dep.type_id
            });
            match provider {
                Some(provider) => deps.insert(dep.name, Arc::clone(provider).as_any()),
                None => warn!(
                    module = %module.info().id,
                    dependency = dep.name,
                    "Dependency unresolved, entry omitted"
                ),
            }
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Dependency, ModuleInfo};
    use ingot_core::{ApiResult, Gateway, MessageEvent, MessageType};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::any::Any;
    use std::time::Duration;

    struct NullGateway;

    #[async_trait::async_trait]
    impl Gateway for NullGateway {
        async fn call_api(&self, _action: &str, _params: Value) -> ApiResult<Value> {
            Ok(Value::Null)
        }

        async fn send_private(&self, _user_id: i64, _message: &str) -> ApiResult<()> {
            Ok(())
        }

        async fn send_group(&self, _group_id: i64, _message: &str) -> ApiResult<()> {
            Ok(())
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[derive(Default)]
    struct Greeter {
        init_count: Mutex<usize>,
    }

    impl Module for Greeter {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new("greeter", "Greeter")
        }

        fn init(&self, ctx: ModuleContext) -> Result<(), ModuleError> {
            *self.init_count.lock() += 1;
            ctx.bus
                .register_starts_with("hi", |_| async { Ok(Some("hello".to_owned())) });
            Ok(())
        }

        fn help(&self, _event: &MessageEvent) -> String {
            "say hi".to_owned()
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    struct NeedsGreeter {
        resolved: Mutex<Option<bool>>,
    }

    impl Module for NeedsGreeter {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new("needy", "Needy")
        }

        fn dependencies(&self) -> Vec<Dependency> {
            vec![
                Dependency::on::<Greeter>("greeter"),
                Dependency::on::<MissingModule>("missing"),
            ]
        }

        fn init(&self, ctx: ModuleContext) -> Result<(), ModuleError> {
            let greeter = ctx.deps.get::<Greeter>("greeter");
            let missing = ctx.deps.get::<MissingModule>("missing");
            *self.resolved.lock() = Some(greeter.is_some() && missing.is_none());
            Ok(())
        }

        fn help(&self, _event: &MessageEvent) -> String {
            String::new()
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    struct MissingModule;

    impl Module for MissingModule {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new("missing", "Missing")
        }

        fn init(&self, _ctx: ModuleContext) -> Result<(), ModuleError> {
            Ok(())
        }

        fn help(&self, _event: &MessageEvent) -> String {
            String::new()
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn fixtures(dir: &tempfile::TempDir) -> (EventBus, StorageService, FileService) {
        (
            EventBus::new(false),
            StorageService::new(dir.path().join("storage.json"), Duration::from_secs(10)),
            FileService::new(dir.path().join("files")),
        )
    }

    fn message(text: &str) -> MessageEvent {
        MessageEvent {
            self_id: 10000,
            time: 0,
            user_id: 20000,
            group_id: Some(30000),
            message_type: MessageType::Group,
            message_id: 1,
            message: text.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_init_all_wires_modules_once() {
        let dir = tempfile::tempdir().unwrap();
        let (bus, storage, files) = fixtures(&dir);

        let greeter = Arc::new(Greeter::default());
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::clone(&greeter) as Arc<dyn Module>);
        registry
            .init_all(
                &bus,
                Arc::new(NullGateway),
                &storage,
                &files,
                &Conversations::new(),
            )
            .unwrap();

        assert_eq!(*greeter.init_count.lock(), 1);
        let reply = bus.dispatch_message(&message("hi there")).await;
        assert_eq!(reply.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_dependency_resolution_is_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let (bus, storage, files) = fixtures(&dir);

        let needy = Arc::new(NeedsGreeter {
            resolved: Mutex::new(None),
        });
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(Greeter::default()));
        registry.register(Arc::clone(&needy) as Arc<dyn Module>);
        registry
            .init_all(
                &bus,
                Arc::new(NullGateway),
                &storage,
                &files,
                &Conversations::new(),
            )
            .unwrap();

        assert_eq!(*needy.resolved.lock(), Some(true));
    }

    #[tokio::test]
    async fn test_catalog_preserves_registration_order() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(Greeter::default()));
        registry.register(Arc::new(MissingModule));

        let ids: Vec<String> = registry.catalog().iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, ["greeter", "missing"]);
        assert!(registry.catalog().contains("greeter"));
        assert!(!registry.catalog().contains("nope"));
    }
}
