//! Filter chain primitives.
//!
//! A filter decides whether a registration's handler may run for an event,
//! and may rewrite the event copy's text as a side channel — the common
//! pattern is a prefix filter that consumes the prefix so downstream filters
//! and the handler see only the remainder.  Because of that mutation,
//! filters are **not** commutative: declared order is evaluation order,
//! exactly.
//!
//! Each filter returns a [`FilterResult`]:
//!
//! - [`Pass`](FilterResult::Pass) — continue to the next filter,
//! - [`Reject`](FilterResult::Reject) — the registration does not fire,
//! - [`Abort`](FilterResult::Abort)`(r)` — terminate the whole chain with
//!   verdict `r`, skipping every remaining filter (including later stages).
//!
//! A chain whose filters all return `Pass` accepts.

use std::sync::Arc;

use ingot_core::{Event, MessageEvent, RequestEvent, Tag};

use crate::module::ModuleInfo;

/// Verdict of a single filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Continue to the next filter in the chain.
    Pass,
    /// Stop; the registration does not fire.
    Reject,
    /// Stop immediately with the given verdict, bypassing all remaining
    /// filters.  The escape hatch for filters that must veto or force-accept
    /// unconditionally.
    Abort(bool),
}

impl FilterResult {
    /// Maps a plain predicate outcome onto `Pass`/`Reject`.
    pub fn from_bool(accept: bool) -> Self {
        if accept {
            FilterResult::Pass
        } else {
            FilterResult::Reject
        }
    }
}

/// Context visible to every filter: the identity of the module whose
/// registration is being evaluated.  Global filters use it to make
/// module-aware decisions (e.g. "is this module enabled for this group?").
pub struct FilterContext {
    module: ModuleInfo,
}

impl FilterContext {
    pub(crate) fn new(module: ModuleInfo) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }
}

/// A filter over message events.
pub type MessageFilter =
    Arc<dyn Fn(&mut MessageEvent, &FilterContext) -> FilterResult + Send + Sync>;

/// A filter over request events.
pub type RequestFilter =
    Arc<dyn Fn(&mut RequestEvent, &FilterContext) -> FilterResult + Send + Sync>;

/// A host-wide filter, evaluated for every registration ahead of its own
/// filters.  Sees the event through the kind union.
pub type GlobalFilter = Arc<dyn Fn(&mut Event, &FilterContext) -> FilterResult + Send + Sync>;

/// Runs one stage of a chain.
///
/// Returns `None` when every filter passed (evaluation continues with the
/// next stage) or `Some(verdict)` when a filter rejected or aborted.
pub(crate) fn run_stage<E>(
    filters: &[Arc<dyn Fn(&mut E, &FilterContext) -> FilterResult + Send + Sync>],
    event: &mut E,
    ctx: &FilterContext,
) -> Option<bool> {
    for filter in filters {
        match filter(event, ctx) {
            FilterResult::Pass => {}
            FilterResult::Reject => return Some(false),
            FilterResult::Abort(verdict) => return Some(verdict),
        }
    }
    None
}

/// Stock message filters.
///
/// The mutating ones (mention/prefix stripping) follow the convention that
/// an accepted event's text no longer contains what the filter matched on.
pub mod filters {
    use super::*;

    /// Accepts private messages only.
    pub fn private() -> MessageFilter {
        Arc::new(|event, _| FilterResult::from_bool(event.is_private()))
    }

    /// Accepts group (and discuss) messages only.
    pub fn group() -> MessageFilter {
        Arc::new(|event, _| FilterResult::from_bool(event.is_group()))
    }

    /// Accepts messages mentioning the bot, removing the first mention tag.
    pub fn at_me() -> MessageFilter {
        Arc::new(|event, _| {
            let mention = Tag::at(event.self_id).to_string();
            if event.message.contains(&mention) {
                event.message = event.message.replacen(&mention, "", 1);
                FilterResult::Pass
            } else {
                FilterResult::Reject
            }
        })
    }

    /// Accepts messages starting with `prefix`, consuming the prefix.
    pub fn starts_with(prefix: impl Into<String>) -> MessageFilter {
        let prefix = prefix.into();
        Arc::new(move |event, _| match event.message.strip_prefix(&prefix) {
            Some(rest) => {
                event.message = rest.to_owned();
                FilterResult::Pass
            }
            None => FilterResult::Reject,
        })
    }

    /// Accepts command-shaped messages: either a mention of the bot or a
    /// leading `.`, consuming whichever matched.
    pub fn command() -> MessageFilter {
        Arc::new(|event, _| {
            let mention = Tag::at(event.self_id).to_string();
            if event.message.contains(&mention) {
                event.message = event.message.replacen(&mention, "", 1);
                return FilterResult::Pass;
            }
            match event.message.strip_prefix('.') {
                Some(rest) => {
                    event.message = rest.to_owned();
                    FilterResult::Pass
                }
                None => FilterResult::Reject,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::filters;
    use super::*;
    use ingot_core::MessageType;

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

    fn ctx() -> FilterContext {
        FilterContext::new(ModuleInfo::new("test", "test"))
    }

    #[test]
    fn test_order_sensitivity() {
        // F1 strips the "A" prefix, F2 requires the remainder to be "B".
        let f1 = filters::starts_with("A");
        let f2: MessageFilter =
            Arc::new(|e, _| FilterResult::from_bool(e.message == "B"));

        let mut event = message("AB");
        assert_eq!(run_stage(&[f1.clone(), f2.clone()], &mut event, &ctx()), None);

        let mut event = message("AB");
        assert_eq!(run_stage(&[f2, f1], &mut event, &ctx()), Some(false));
    }

    #[test]
    fn test_abort_short_circuits() {
        let reached = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let always_false: MessageFilter = Arc::new(|_, _| FilterResult::Reject);
        let abort_true: MessageFilter = {
            let reached = Arc::clone(&reached);
            Arc::new(move |_, _| {
                reached.store(true, std::sync::atomic::Ordering::SeqCst);
                FilterResult::Abort(true)
            })
        };

        // Reject first: the abort filter must never run.
        let mut event = message("x");
        assert_eq!(
            run_stage(&[always_false.clone(), abort_true.clone()], &mut event, &ctx()),
            Some(false)
        );
        assert!(!reached.load(std::sync::atomic::Ordering::SeqCst));

        // Abort first: accepted without evaluating the rejecting filter.
        let mut event = message("x");
        assert_eq!(
            run_stage(&[abort_true, always_false], &mut event, &ctx()),
            Some(true)
        );
        assert!(reached.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_at_me_strips_mention() {
        let filter = filters::at_me();
        let mut event = message("[CQ:at,qq=10000] roll");
        assert_eq!(run_stage(&[filter.clone()], &mut event, &ctx()), None);
        assert_eq!(event.message, " roll");

        let mut event = message("[CQ:at,qq=99999] roll");
        assert_eq!(run_stage(&[filter], &mut event, &ctx()), Some(false));
    }

    #[test]
    fn test_command_accepts_dot_or_mention() {
        let filter = filters::command();

        let mut event = message(".dice 2d6");
        assert_eq!(run_stage(&[filter.clone()], &mut event, &ctx()), None);
        assert_eq!(event.message, "dice 2d6");

        let mut event = message("[CQ:at,qq=10000]dice");
        assert_eq!(run_stage(&[filter.clone()], &mut event, &ctx()), None);
        assert_eq!(event.message, "dice");

        let mut event = message("dice");
        assert_eq!(run_stage(&[filter], &mut event, &ctx()), Some(false));
    }

    #[test]
    fn test_private_and_group() {
        let mut group_event = message("x");
        assert_eq!(run_stage(&[filters::group()], &mut group_event, &ctx()), None);
        assert_eq!(
            run_stage(&[filters::private()], &mut group_event, &ctx()),
            Some(false)
        );
    }
}
