//! Module capability interface and construction context.
//!
//! A module is a self-contained feature unit: it declares an identity, an
//! optional set of dependencies on other modules, and wires its listeners
//! into the bus when [`Module::init`] runs.  Modules live for the process
//! lifetime; there is no teardown hook.
//!
//! # State
//!
//! Module state belongs to the module instance — keep it behind a
//! `parking_lot::Mutex` field rather than in statics, so its lifetime is
//! tied to the instance and tests can construct modules in isolation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use ingot_core::{BoxedGateway, MessageEvent};

use crate::bus::ModuleBus;
use crate::error::ModuleError;
use crate::files::FileStore;
use crate::session::Conversations;
use crate::storage::Storage;

/// Identity record attached to every registration a module makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Stable machine token, also the module's storage/file scope prefix.
    pub id: String,
    /// Human label shown by the help surface and the admin listing.
    pub name: String,
    /// Whether the module is active in groups with no explicit override.
    pub default_enabled: bool,
}

impl ModuleInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            default_enabled: true,
        }
    }

    /// Marks the module as opt-in: groups must enable it explicitly.
    pub fn disabled_by_default(mut self) -> Self {
        self.default_enabled = false;
        self
    }
}

/// One declared dependency: a lookup name plus the concrete module type.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: &'static str,
    pub type_id: TypeId,
}

impl Dependency {
    /// Declares a dependency on a module of concrete type `M`.
    pub fn on<M: Module>(name: &'static str) -> Self {
        Self {
            name,
            type_id: TypeId::of::<M>(),
        }
    }
}

/// The capability interface every feature module implements.
pub trait Module: Send + Sync + 'static {
    /// The module's identity; must be stable across calls.
    fn info(&self) -> ModuleInfo;

    /// Dependencies to resolve before [`init`](Module::init) runs.
    ///
    /// Resolution is lenient: a dependency no registered module satisfies is
    /// omitted from [`ModuleContext::deps`], and the module must null-check
    /// at its use sites.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Called exactly once, after storage is loaded and dependencies are
    /// resolved.  This is where the module registers its bus listeners.
    fn init(&self, ctx: ModuleContext) -> Result<(), ModuleError>;

    /// Self-description for the help surface.
    ///
    /// Must be a pure query: no state mutation, and safe for any event shape
    /// the module might see.  Return an empty string to stay out of the help
    /// listing.
    fn help(&self, event: &MessageEvent) -> String;

    /// Returns self as an `Arc<dyn Any>` for dependency downcasting.
    ///
    /// Implementors simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Resolved dependency table injected into [`ModuleContext`].
///
/// Entries the container could not resolve are absent.
#[derive(Default, Clone)]
pub struct Deps {
    entries: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl Deps {
    pub(crate) fn insert(&mut self, name: &'static str, module: Arc<dyn Any + Send + Sync>) {
        self.entries.insert(name, module);
    }

    /// Looks up a resolved dependency by name, downcasting to its concrete
    /// module type.  Returns `None` when the dependency was not resolved or
    /// `M` does not match the declared type.
    pub fn get<M: Module>(&self, name: &str) -> Option<Arc<M>> {
        self.entries.get(name).cloned()?.downcast::<M>().ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered, read-only snapshot of every registered module's identity.
///
/// Handed to modules so cross-cutting features (the admin listing, id
/// validation) do not need access to the live module instances.
#[derive(Clone)]
pub struct ModuleCatalog {
    infos: Arc<Vec<ModuleInfo>>,
}

impl ModuleCatalog {
    pub(crate) fn new(infos: Vec<ModuleInfo>) -> Self {
        Self {
            infos: Arc::new(infos),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.infos.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.infos.iter().any(|info| info.id == id)
    }
}

/// Construction context passed to [`Module::init`].
///
/// Every handle is scoped to the receiving module: bus registrations carry
/// its identity, and the storage/file scopes are partitioned under its id so
/// cross-module key collisions are impossible by construction.
pub struct ModuleContext {
    /// Outbound gateway, shared by all modules.
    pub gateway: BoxedGateway,
    /// Bus handle tagged with this module's identity.
    pub bus: ModuleBus,
    /// Key-value scope rooted at `<module id>.`.
    pub storage: Storage,
    /// File scope rooted at `<data dir>/<module id>/`.
    pub files: FileStore,
    /// Resolved dependency table (lenient; see [`Module::dependencies`]).
    pub deps: Deps,
    /// Identity snapshot of all registered modules, in registration order.
    pub catalog: ModuleCatalog,
    /// Multi-turn conversation rendezvous registry.
    pub conversations: Conversations,
}
