//! The bot-wide help surface.
//!
//! A host-provided registration — appended after every feature module, so it
//! has the lowest dispatch priority — that answers command-shaped messages
//! containing a help keyword by concatenating the self-descriptions of all
//! modules visible in the event's context.

use std::sync::Arc;

use ingot_core::{Event, MessageEvent};

use crate::bus::EventBus;
use crate::filter::{FilterContext, FilterResult, GlobalFilter, MessageFilter, filters};
use crate::module::{Module, ModuleInfo};

const HELP_KEYWORDS: &[&str] = &["help", "帮助", "?", "使用说明"];

fn help_keyword() -> MessageFilter {
    Arc::new(|event, _| {
        FilterResult::from_bool(HELP_KEYWORDS.iter().any(|k| event.message.contains(k)))
    })
}

/// Registers the help surface; called last by the module registry.
pub(crate) fn register(bus: &EventBus, modules: &[Arc<dyn Module>]) {
    let modules: Vec<Arc<dyn Module>> = modules.to_vec();
    let bus_ref = bus.downgrade();

    let handle = bus.scoped(ModuleInfo::new("core.help", ""));
    handle.register_message(vec![filters::command(), help_keyword()], move |event| {
        let modules = modules.clone();
        let bus_ref = bus_ref.clone();
        async move {
            let gate = bus_ref.upgrade().and_then(|bus| bus.gate());
            Ok(compose(&modules, gate.as_ref(), &event))
        }
    });
}

/// Builds the aggregated help text: one `"{name}:\n{help}"` block per
/// module with a non-empty description, in registration order, separated by
/// blank lines.  In contexts where the module gate vetoes a module, its
/// block is omitted — the listing matches what would actually dispatch.
fn compose(
    modules: &[Arc<dyn Module>],
    gate: Option<&GlobalFilter>,
    event: &MessageEvent,
) -> Option<String> {
    let mut blocks = Vec::new();
    for module in modules {
        let info = module.info();
        if let Some(gate) = gate {
            let ctx = FilterContext::new(info.clone());
            let mut probe = Event::Message(event.clone());
            let enabled = matches!(
                gate(&mut probe, &ctx),
                FilterResult::Pass | FilterResult::Abort(true)
            );
            if !enabled {
                continue;
            }
        }
        let text = module.help(event);
        if text.is_empty() {
            continue;
        }
        blocks.push(format!("{}:\n{}", info.name, text));
    }
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleError;
    use crate::module::ModuleContext;
    use ingot_core::MessageType;
    use std::any::Any;

    struct FakeModule {
        info: ModuleInfo,
        help: &'static str,
    }

    impl Module for FakeModule {
        fn info(&self) -> ModuleInfo {
            self.info.clone()
        }

        fn init(&self, _ctx: ModuleContext) -> Result<(), ModuleError> {
            Ok(())
        }

        fn help(&self, _event: &MessageEvent) -> String {
            self.help.to_owned()
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn modules() -> Vec<Arc<dyn Module>> {
        vec![
            Arc::new(FakeModule {
                info: ModuleInfo::new("dice", "简单骰子"),
                help: "roll xdy",
            }),
            Arc::new(FakeModule {
                info: ModuleInfo::new("quiet", "Quiet"),
                help: "",
            }),
            Arc::new(FakeModule {
                info: ModuleInfo::new("echo", "Echo"),
                help: "repeats things",
            }),
        ]
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
    async fn test_help_reply_joins_blocks_in_order() {
        let bus = EventBus::new(false);
        register(&bus, &modules());

        let reply = bus.dispatch_message(&message(".help")).await.unwrap();
        assert_eq!(reply, "简单骰子:\nroll xdy\n\nEcho:\nrepeats things");
    }

    #[tokio::test]
    async fn test_non_command_is_ignored() {
        let bus = EventBus::new(false);
        register(&bus, &modules());

        assert_eq!(bus.dispatch_message(&message("help")).await, None);
    }

    #[tokio::test]
    async fn test_gate_hides_disabled_modules() {
        let bus = EventBus::new(false);
        bus.set_module_gate(Arc::new(|_, ctx| {
            FilterResult::from_bool(ctx.module().id != "echo")
        }))
        .unwrap();
        register(&bus, &modules());

        let reply = bus.dispatch_message(&message(".help")).await.unwrap();
        assert_eq!(reply, "简单骰子:\nroll xdy");
    }
}
