//! The event bus: registration lists and dispatch.
//!
//! The bus owns every (module, filter chain, handler) registration,
//! partitioned by event kind.  Registration order is significant twice over:
//! it is the evaluation order of a registration's own filters, and the
//! dispatch priority across registrations of the same kind.
//!
//! # Dispatch semantics
//!
//! - **Message events**: registrations are tried in order, each against its
//!   own clone of the canonical event.  The first handler returning a
//!   non-empty reply wins and dispatch stops.  A handler that accepts but
//!   returns nothing (side effects only) lets dispatch fall through.
//!   Handler errors are logged and treated as "no reply".
//! - **Request events**: push-only — every accepted handler runs, with
//!   per-handler error isolation.
//!
//! # Debug sandbox
//!
//! With debug mode on, an always-first global filter admits only messages
//! carrying the `"debug "` sentinel prefix (stripped before further
//! filters), and outgoing replies are prefixed with the same sentinel.  Off,
//! sentinel-prefixed messages are rejected.  This lets a debug build share a
//! gateway connection with the production bot without the two answering
//! each other's traffic.
//!
//! # Cheap cloning
//!
//! `EventBus` is a handle over shared internals; cloning it is an `Arc`
//! bump.  [`ModuleBus`] handles derived via [`scoped`](EventBus::scoped)
//! share the same registration lists.

use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, error, trace};

use ingot_core::{Event, MessageEvent, RequestEvent};

use crate::error::{BoxError, BusError};
use crate::filter::{
    self, FilterContext, FilterResult, GlobalFilter, MessageFilter, RequestFilter,
};
use crate::module::ModuleInfo;

/// Sentinel prefix separating debug-session traffic from production traffic.
pub const DEBUG_PREFIX: &str = "debug ";

/// What a message handler produces: an optional reply string.
///
/// `Ok(None)` and `Ok(Some(""))` both mean "no reply"; dispatch continues to
/// the next registration.
pub type Reply = Result<Option<String>, BoxError>;

/// Type-erased message handler.
pub type MessageHandler = Arc<dyn Fn(MessageEvent) -> BoxFuture<'static, Reply> + Send + Sync>;

/// Type-erased request handler.
pub type RequestHandler =
    Arc<dyn Fn(RequestEvent) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

struct MessageRegistration {
    module: ModuleInfo,
    filters: Vec<MessageFilter>,
    handler: MessageHandler,
}

struct RequestRegistration {
    module: ModuleInfo,
    filters: Vec<RequestFilter>,
    handler: RequestHandler,
}

struct BusInner {
    debug: bool,
    /// Host-wide filters, evaluated first for every registration.
    global_filters: Vec<GlobalFilter>,
    /// The late-bound per-group enable/disable gate; at most one.
    module_gate: RwLock<Option<GlobalFilter>>,
    message_regs: RwLock<Vec<Arc<MessageRegistration>>>,
    request_regs: RwLock<Vec<Arc<RequestRegistration>>>,
}

/// The central event bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// A weak bus handle for closures the bus itself retains, so a registration
/// holding its own bus does not keep the internals alive forever.
#[derive(Clone)]
pub(crate) struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    pub(crate) fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

impl EventBus {
    /// Creates a bus.  `debug` turns on the sandbox sentinel handling.
    pub fn new(debug: bool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                debug,
                global_filters: vec![debug_sandbox(debug)],
                module_gate: RwLock::new(None),
                message_regs: RwLock::new(Vec::new()),
                request_regs: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn is_debug(&self) -> bool {
        self.inner.debug
    }

    pub(crate) fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Derives a registration handle tagged with `module`'s identity.
    pub fn scoped(&self, module: ModuleInfo) -> ModuleBus {
        ModuleBus {
            bus: self.clone(),
            module,
        }
    }

    /// Installs the per-group module gate.
    ///
    /// The gate runs for every registration after the global filters and
    /// before the registration's own filters.  Installing a second gate is a
    /// fatal configuration error and fails with
    /// [`BusError::GateAlreadyInstalled`].
    pub fn set_module_gate(&self, gate: GlobalFilter) -> Result<(), BusError> {
        let mut slot = self.inner.module_gate.write();
        if slot.is_some() {
            return Err(BusError::GateAlreadyInstalled);
        }
        *slot = Some(gate);
        Ok(())
    }

    pub(crate) fn gate(&self) -> Option<GlobalFilter> {
        self.inner.module_gate.read().clone()
    }

    pub fn message_registration_count(&self) -> usize {
        self.inner.message_regs.read().len()
    }

    pub fn request_registration_count(&self) -> usize {
        self.inner.request_regs.read().len()
    }

    fn register_message(
        &self,
        module: ModuleInfo,
        filters: Vec<MessageFilter>,
        handler: MessageHandler,
    ) {
        trace!(module = %module.id, "Registering message listener");
        self.inner
            .message_regs
            .write()
            .push(Arc::new(MessageRegistration {
                module,
                filters,
                handler,
            }));
    }

    fn register_request(
        &self,
        module: ModuleInfo,
        filters: Vec<RequestFilter>,
        handler: RequestHandler,
    ) {
        trace!(module = %module.id, "Registering request listener");
        self.inner
            .request_regs
            .write()
            .push(Arc::new(RequestRegistration {
                module,
                filters,
                handler,
            }));
    }

    // ─── Dispatch ─────────────────────────────────────────────────────────────

    /// Dispatches one inbound event, returning the composed reply for
    /// message events (`None` for requests and unanswered messages).
    pub async fn dispatch(&self, event: &Event) -> Option<String> {
        match event {
            Event::Message(e) => self.dispatch_message(e).await,
            Event::Request(e) => {
                self.dispatch_request(e).await;
                None
            }
        }
    }

    /// Runs message dispatch: first non-empty reply wins.
    pub async fn dispatch_message(&self, event: &MessageEvent) -> Option<String> {
        let registrations = self.inner.message_regs.read().clone();
        for reg in registrations {
            let Some(admitted) = self.admit_message(event, &reg) else {
                continue;
            };
            debug!(module = %reg.module.id, "Message registration accepted");
            match (reg.handler)(admitted).await {
                Ok(Some(reply)) if !reply.is_empty() => {
                    return Some(self.decorate_reply(reply));
                }
                Ok(_) => {}
                Err(e) => {
                    error!(module = %reg.module.id, error = %e, "Message handler failed");
                }
            }
        }
        None
    }

    /// Runs request dispatch: every accepted handler fires, errors isolated.
    pub async fn dispatch_request(&self, event: &RequestEvent) {
        let registrations = self.inner.request_regs.read().clone();
        for reg in registrations {
            let Some(admitted) = self.admit_request(event, &reg) else {
                continue;
            };
            if let Err(e) = (reg.handler)(admitted).await {
                error!(module = %reg.module.id, error = %e, "Request handler failed");
            }
        }
    }

    /// Evaluates the full chain for one registration against a fresh clone.
    ///
    /// Stage order: global filters, module gate, the registration's own
    /// filters.  An abort anywhere settles the verdict for all remaining
    /// stages.
    fn admit_message(
        &self,
        event: &MessageEvent,
        reg: &MessageRegistration,
    ) -> Option<MessageEvent> {
        let ctx = FilterContext::new(reg.module.clone());
        let mut union = Event::Message(event.clone());

        if let Some(verdict) = filter::run_stage(&self.inner.global_filters, &mut union, &ctx) {
            return verdict.then(|| take_message(union)).flatten();
        }
        if let Some(gate) = self.gate() {
            match gate(&mut union, &ctx) {
                FilterResult::Pass => {}
                FilterResult::Reject => return None,
                FilterResult::Abort(verdict) => {
                    return verdict.then(|| take_message(union)).flatten();
                }
            }
        }

        let mut message = take_message(union)?;
        match filter::run_stage(&reg.filters, &mut message, &ctx) {
            Some(verdict) => verdict.then_some(message),
            None => Some(message),
        }
    }

    fn admit_request(
        &self,
        event: &RequestEvent,
        reg: &RequestRegistration,
    ) -> Option<RequestEvent> {
        let ctx = FilterContext::new(reg.module.clone());
        let mut union = Event::Request(event.clone());

        if let Some(verdict) = filter::run_stage(&self.inner.global_filters, &mut union, &ctx) {
            return verdict.then(|| take_request(union)).flatten();
        }
        if let Some(gate) = self.gate() {
            match gate(&mut union, &ctx) {
                FilterResult::Pass => {}
                FilterResult::Reject => return None,
                FilterResult::Abort(verdict) => {
                    return verdict.then(|| take_request(union)).flatten();
                }
            }
        }

        let mut request = take_request(union)?;
        match filter::run_stage(&reg.filters, &mut request, &ctx) {
            Some(verdict) => verdict.then_some(request),
            None => Some(request),
        }
    }

    fn decorate_reply(&self, reply: String) -> String {
        if self.inner.debug {
            format!("{DEBUG_PREFIX}{reply}")
        } else {
            reply
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("debug", &self.inner.debug)
            .field("message_registrations", &self.message_registration_count())
            .field("request_registrations", &self.request_registration_count())
            .finish()
    }
}

fn take_message(event: Event) -> Option<MessageEvent> {
    match event {
        Event::Message(e) => Some(e),
        Event::Request(_) => None,
    }
}

fn take_request(event: Event) -> Option<RequestEvent> {
    match event {
        Event::Request(e) => Some(e),
        Event::Message(_) => None,
    }
}

/// Builds the debug-sandbox global filter.  Request events pass untouched.
fn debug_sandbox(debug: bool) -> GlobalFilter {
    Arc::new(move |event, _| {
        let Some(message) = event.as_message_mut() else {
            return FilterResult::Pass;
        };
        if debug {
            match message.message.strip_prefix(DEBUG_PREFIX) {
                Some(rest) => {
                    message.message = rest.to_owned();
                    FilterResult::Pass
                }
                None => FilterResult::Reject,
            }
        } else if message.message.starts_with(DEBUG_PREFIX) {
            FilterResult::Reject
        } else {
            FilterResult::Pass
        }
    })
}

// ─── ModuleBus ────────────────────────────────────────────────────────────────

/// A bus handle scoped to one module.
///
/// Every registration made through the handle is tagged with the module's
/// identity, which is what the enable/disable gate and the help surface key
/// on.
#[derive(Clone)]
pub struct ModuleBus {
    bus: EventBus,
    module: ModuleInfo,
}

impl ModuleBus {
    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }

    /// Registers a message listener behind an ordered filter chain.
    pub fn register_message<F, Fut>(&self, filters: Vec<MessageFilter>, handler: F)
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let handler: MessageHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.bus
            .register_message(self.module.clone(), filters, handler);
    }

    /// Registers a request listener behind an ordered filter chain.
    pub fn register_request<F, Fut>(&self, filters: Vec<RequestFilter>, handler: F)
    where
        F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.bus
            .register_request(self.module.clone(), filters, handler);
    }

    /// Shorthand: listener gated on a mention of the bot.
    pub fn register_at_me<F, Fut>(&self, handler: F)
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        self.register_message(vec![filter::filters::at_me()], handler);
    }

    /// Shorthand: listener gated on private messages.
    pub fn register_private<F, Fut>(&self, handler: F)
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        self.register_message(vec![filter::filters::private()], handler);
    }

    /// Shorthand: listener gated on (and consuming) a text prefix.
    pub fn register_starts_with<F, Fut>(&self, prefix: impl Into<String>, handler: F)
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        self.register_message(vec![filter::filters::starts_with(prefix)], handler);
    }

    /// Installs the per-group module gate; see [`EventBus::set_module_gate`].
    pub fn install_module_gate(&self, gate: GlobalFilter) -> Result<(), BusError> {
        self.bus.set_module_gate(gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::filters;
    use ingot_core::{MessageType, RequestType};
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    fn request() -> RequestEvent {
        RequestEvent {
            self_id: 10000,
            time: 0,
            user_id: 20000,
            request_type: RequestType::Friend,
            sub_type: None,
            comment: String::new(),
            flag: "flag".to_owned(),
            group_id: None,
        }
    }

    fn info(id: &str) -> ModuleInfo {
        ModuleInfo::new(id, id)
    }

    #[tokio::test]
    async fn test_first_non_empty_reply_wins() {
        let bus = EventBus::new(false);
        let side_effects = Arc::new(AtomicUsize::new(0));

        // Accepts, runs for side effects only.
        let counter = Arc::clone(&side_effects);
        bus.scoped(info("silent")).register_message(vec![], move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        });
        bus.scoped(info("second"))
            .register_message(vec![], |_| async { Ok(Some("from second".to_owned())) });
        bus.scoped(info("third"))
            .register_message(vec![], |_| async { Ok(Some("from third".to_owned())) });

        let reply = bus.dispatch_message(&message("hi")).await;
        assert_eq!(reply.as_deref(), Some("from second"));
        assert_eq!(side_effects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_reply_falls_through() {
        let bus = EventBus::new(false);
        bus.scoped(info("empty"))
            .register_message(vec![], |_| async { Ok(Some(String::new())) });
        bus.scoped(info("real"))
            .register_message(vec![], |_| async { Ok(Some("real".to_owned())) });

        let reply = bus.dispatch_message(&message("hi")).await;
        assert_eq!(reply.as_deref(), Some("real"));
    }

    #[tokio::test]
    async fn test_handler_error_is_swallowed() {
        let bus = EventBus::new(false);
        bus.scoped(info("broken")).register_message(vec![], |_| async {
            Err::<Option<String>, _>("boom".into())
        });
        bus.scoped(info("ok"))
            .register_message(vec![], |_| async { Ok(Some("still here".to_owned())) });

        let reply = bus.dispatch_message(&message("hi")).await;
        assert_eq!(reply.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn test_clones_do_not_leak_across_registrations() {
        let bus = EventBus::new(false);
        // First registration strips a prefix but returns no reply.
        bus.scoped(info("stripper")).register_message(
            vec![filters::starts_with("cmd ")],
            |_| async { Ok(None) },
        );
        // Second registration must still see the unstripped text.
        bus.scoped(info("observer"))
            .register_message(vec![], |e| async move { Ok(Some(e.message)) });

        let reply = bus.dispatch_message(&message("cmd payload")).await;
        assert_eq!(reply.as_deref(), Some("cmd payload"));
    }

    #[tokio::test]
    async fn test_request_fan_out_with_failure() {
        let bus = EventBus::new(false);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        bus.scoped(info("a")).register_request(vec![], move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("first handler breaks".into())
            }
        });
        for id in ["b", "c"] {
            let counter = Arc::clone(&fired);
            bus.scoped(info(id)).register_request(vec![], move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        bus.dispatch_request(&request()).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_debug_mode_sandbox() {
        let bus = EventBus::new(true);
        bus.scoped(info("echo"))
            .register_message(vec![], |e| async move { Ok(Some(e.message)) });

        // Without the sentinel the event is invisible to a debug bus.
        assert_eq!(bus.dispatch_message(&message("hello")).await, None);

        // With the sentinel: stripped on the way in, re-applied on the way out.
        let reply = bus.dispatch_message(&message("debug hello")).await;
        assert_eq!(reply.as_deref(), Some("debug hello"));
    }

    #[tokio::test]
    async fn test_production_bus_ignores_debug_traffic() {
        let bus = EventBus::new(false);
        bus.scoped(info("echo"))
            .register_message(vec![], |e| async move { Ok(Some(e.message)) });

        assert_eq!(bus.dispatch_message(&message("debug hello")).await, None);
        assert_eq!(
            bus.dispatch_message(&message("hello")).await.as_deref(),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn test_module_gate_vetoes_disabled_group() {
        let bus = EventBus::new(false);
        bus.scoped(info("gated"))
            .register_message(vec![], |_| async { Ok(Some("ran".to_owned())) });

        // Disable everything in group 42.
        bus.set_module_gate(Arc::new(|event, _| {
            let disabled = event
                .as_message_mut()
                .is_some_and(|m| m.group_id == Some(42));
            FilterResult::from_bool(!disabled)
        }))
        .unwrap();

        let mut in_42 = message("hi");
        in_42.group_id = Some(42);
        assert_eq!(bus.dispatch_message(&in_42).await, None);

        let mut in_43 = message("hi");
        in_43.group_id = Some(43);
        assert_eq!(bus.dispatch_message(&in_43).await.as_deref(), Some("ran"));
    }

    #[tokio::test]
    async fn test_second_gate_installation_fails() {
        let bus = EventBus::new(false);
        let gate: GlobalFilter = Arc::new(|_, _| FilterResult::Pass);
        bus.set_module_gate(Arc::clone(&gate)).unwrap();
        assert_eq!(
            bus.set_module_gate(gate),
            Err(BusError::GateAlreadyInstalled)
        );
    }

    #[tokio::test]
    async fn test_own_filter_mutation_reaches_handler() {
        let bus = EventBus::new(false);
        bus.scoped(info("dice")).register_message(
            vec![filters::starts_with(".dice ")],
            |e| async move { Ok(Some(format!("rolled {}", e.message))) },
        );

        let reply = bus.dispatch_message(&message(".dice 2d6")).await;
        assert_eq!(reply.as_deref(), Some("rolled 2d6"));
    }
}
