//! Multi-turn conversation sessions.
//!
//! A handler that needs a follow-up message from the same user (a
//! "pick a number" exchange, a confirmation step) suspends at an explicit
//! rendezvous instead of nesting callbacks:
//!
//! ```rust,ignore
//! let pending = ctx.conversations.expect_reply(ConversationKey::of(&event))?;
//! let followup = pending
//!     .recv_timeout(Duration::from_secs(60))
//!     .await
//!     .ok_or("no answer in time")?;
//! ```
//!
//! Each key — (group or private scope, user id) — holds at most one waiter;
//! starting a second session for an active key fails fast with
//! [`SessionError::AlreadyActive`].  The transient listener is cleaned up on
//! completion and on abandonment (dropping the [`PendingReply`], which is
//! what a timeout does).
//!
//! The registry attaches a single bus registration ahead of all modules: its
//! filter accepts exactly the messages some waiter is pending on, and its
//! handler fulfils the rendezvous without producing a reply, so dispatch
//! continues normally for everyone else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use ingot_core::MessageEvent;

use crate::bus::EventBus;
use crate::error::SessionError;
use crate::filter::{FilterResult, MessageFilter};
use crate::module::ModuleInfo;

/// Where a conversation takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationScope {
    /// A group (or discuss) chat.
    Group(i64),
    /// A one-on-one private chat.
    Private,
}

/// Identity of one conversation: the place plus the user being waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub scope: ConversationScope,
    pub user_id: i64,
}

impl ConversationKey {
    /// The key under which a follow-up to `event` would arrive.
    pub fn of(event: &MessageEvent) -> Self {
        let scope = match event.group_id {
            Some(group_id) if event.is_group() => ConversationScope::Group(group_id),
            _ => ConversationScope::Private,
        };
        Self {
            scope,
            user_id: event.user_id,
        }
    }
}

struct Waiter {
    token: u64,
    tx: oneshot::Sender<MessageEvent>,
}

#[derive(Default)]
struct Registry {
    pending: Mutex<HashMap<ConversationKey, Waiter>>,
    next_token: AtomicU64,
}

impl Registry {
    fn contains(&self, key: ConversationKey) -> bool {
        self.pending.lock().contains_key(&key)
    }

    fn complete(&self, event: &MessageEvent) -> bool {
        let key = ConversationKey::of(event);
        let Some(waiter) = self.pending.lock().remove(&key) else {
            return false;
        };
        trace!(?key, "Conversation waiter fulfilled");
        // A send failure means the waiter was abandoned between lookup and
        // delivery; the entry is gone either way.
        waiter.tx.send(event.clone()).is_ok()
    }

    /// Removes the waiter only if it is still the one identified by `token`,
    /// so a late drop cannot evict a successor waiter on the same key.
    fn abandon(&self, key: ConversationKey, token: u64) {
        let mut pending = self.pending.lock();
        if pending.get(&key).is_some_and(|w| w.token == token) {
            pending.remove(&key);
            trace!(?key, "Conversation waiter abandoned");
        }
    }
}

/// Single-slot rendezvous registry for multi-turn exchanges.
///
/// Cloning is cheap; all clones share one waiter table.
#[derive(Clone, Default)]
pub struct Conversations {
    inner: Arc<Registry>,
}

impl Conversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for the next message matching `key`.
    ///
    /// Fails with [`SessionError::AlreadyActive`] while a previous waiter
    /// for the same key is still pending.
    pub fn expect_reply(&self, key: ConversationKey) -> Result<PendingReply, SessionError> {
        let mut pending = self.inner.pending.lock();
        if pending.contains_key(&key) {
            return Err(SessionError::AlreadyActive);
        }
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        pending.insert(key, Waiter { token, tx });
        trace!(?key, "Conversation waiter registered");
        Ok(PendingReply {
            key,
            token,
            rx,
            registry: Arc::downgrade(&self.inner),
        })
    }

    /// `true` while a waiter is pending for `key`.
    pub fn contains(&self, key: ConversationKey) -> bool {
        self.inner.contains(key)
    }

    /// Attaches the rendezvous listener to the bus.
    ///
    /// Called by the module registry before any module initializes, so a
    /// pending follow-up is intercepted ahead of ordinary command
    /// registrations.
    pub(crate) fn attach(&self, bus: &EventBus) {
        let handle = bus.scoped(ModuleInfo::new("core.session", ""));

        let registry = Arc::downgrade(&self.inner);
        let pending_filter: MessageFilter = Arc::new(move |event, _| {
            let accept = registry
                .upgrade()
                .is_some_and(|r| r.contains(ConversationKey::of(event)));
            FilterResult::from_bool(accept)
        });

        let registry = Arc::downgrade(&self.inner);
        handle.register_message(vec![pending_filter], move |event| {
            let registry = registry.clone();
            async move {
                if let Some(r) = registry.upgrade() {
                    r.complete(&event);
                }
                Ok(None)
            }
        });
    }
}

/// A registered waiter; resolves to the follow-up message.
///
/// Dropping it (e.g. on timeout) abandons the session and frees the key.
#[derive(Debug)]
pub struct PendingReply {
    key: ConversationKey,
    token: u64,
    rx: oneshot::Receiver<MessageEvent>,
    registry: Weak<Registry>,
}

impl PendingReply {
    /// Suspends until the follow-up arrives.  `None` means the registry went
    /// away before a message matched.
    pub async fn recv(mut self) -> Option<MessageEvent> {
        (&mut self.rx).await.ok()
    }

    /// Like [`recv`](Self::recv), with a deadline.  On timeout the waiter is
    /// abandoned and the key becomes free again.
    pub async fn recv_timeout(self, timeout: Duration) -> Option<MessageEvent> {
        tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.abandon(self.key, self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_core::MessageType;

    fn group_message(group_id: i64, user_id: i64, text: &str) -> MessageEvent {
        MessageEvent {
            self_id: 10000,
            time: 0,
            user_id,
            group_id: Some(group_id),
            message_type: MessageType::Group,
            message_id: 1,
            message: text.to_owned(),
        }
    }

    fn key(group_id: i64, user_id: i64) -> ConversationKey {
        ConversationKey {
            scope: ConversationScope::Group(group_id),
            user_id,
        }
    }

    #[tokio::test]
    async fn test_rendezvous_delivers_follow_up() {
        let conversations = Conversations::new();
        let bus = EventBus::new(false);
        conversations.attach(&bus);

        let pending = conversations.expect_reply(key(30000, 20000)).unwrap();
        bus.dispatch_message(&group_message(30000, 20000, "42"))
            .await;

        let followup = pending.recv().await.unwrap();
        assert_eq!(followup.message, "42");
        assert!(!conversations.contains(key(30000, 20000)));
    }

    #[tokio::test]
    async fn test_second_waiter_for_same_key_fails_fast() {
        let conversations = Conversations::new();
        let _first = conversations.expect_reply(key(1, 2)).unwrap();
        assert_eq!(
            conversations.expect_reply(key(1, 2)).unwrap_err(),
            SessionError::AlreadyActive
        );
        // A different user in the same group is a different key.
        assert!(conversations.expect_reply(key(1, 3)).is_ok());
    }

    #[tokio::test]
    async fn test_unrelated_messages_do_not_complete() {
        let conversations = Conversations::new();
        let bus = EventBus::new(false);
        conversations.attach(&bus);

        let _pending = conversations.expect_reply(key(30000, 20000)).unwrap();
        bus.dispatch_message(&group_message(30000, 99999, "not you"))
            .await;
        assert!(conversations.contains(key(30000, 20000)));
    }

    #[tokio::test]
    async fn test_drop_frees_the_key() {
        let conversations = Conversations::new();
        let pending = conversations.expect_reply(key(1, 2)).unwrap();
        drop(pending);
        assert!(conversations.expect_reply(key(1, 2)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_abandons_the_session() {
        let conversations = Conversations::new();
        let pending = conversations.expect_reply(key(1, 2)).unwrap();

        let answer = pending.recv_timeout(Duration::from_secs(60)).await;
        assert!(answer.is_none());
        assert!(!conversations.contains(key(1, 2)));
    }

    #[tokio::test]
    async fn test_private_scope_is_distinct_from_group() {
        let conversations = Conversations::new();
        let group_key = key(1, 2);
        let private_key = ConversationKey {
            scope: ConversationScope::Private,
            user_id: 2,
        };
        let _a = conversations.expect_reply(group_key).unwrap();
        assert!(conversations.expect_reply(private_key).is_ok());
    }
}
