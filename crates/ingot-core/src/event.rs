//! Inbound event model.
//!
//! Field names and enum spellings mirror the gateway's JSON payloads, so the
//! types deserialize straight from the wire:
//!
//! ```text
//! Event
//! ├── Message (post_type = "message"): group/private/discuss chat text
//! └── Request (post_type = "request"): friend-add and group-invite requests
//! ```
//!
//! Events are immutable as received.  The dispatch layer hands every
//! registration its own clone, and filters are allowed to rewrite the clone's
//! `message` text in place (e.g. stripping a command prefix before the
//! handler runs).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Where a message was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// A regular QQ group.
    Group,
    /// A one-on-one private chat.
    Private,
    /// A legacy discuss group.
    Discuss,
}

/// What kind of membership request was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Someone wants to add the bot as a friend.
    Friend,
    /// A group join/invite request.
    Group,
}

/// Request sub-kind, present on group requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSubType {
    /// A user asked to join a group the bot administers.
    Add,
    /// The bot was invited into a group.
    Invite,
}

/// One inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// The bot's own account id.
    pub self_id: i64,
    /// Gateway timestamp (unix seconds).
    pub time: i64,
    /// Sender account id.
    pub user_id: i64,
    /// Group id for group/discuss messages, `None` for private chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    pub message_type: MessageType,
    /// Monotonically assigned by the gateway.
    pub message_id: i64,
    /// Raw text, possibly containing inline `[CQ:...]` markup tags.
    pub message: String,
}

impl MessageEvent {
    /// `true` for messages posted in a group or discuss context.
    pub fn is_group(&self) -> bool {
        matches!(self.message_type, MessageType::Group | MessageType::Discuss)
    }

    /// `true` for one-on-one private messages.
    pub fn is_private(&self) -> bool {
        self.message_type == MessageType::Private
    }
}

/// One inbound friend/group membership request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    /// The bot's own account id.
    pub self_id: i64,
    /// Gateway timestamp (unix seconds).
    pub time: i64,
    /// Requester account id.
    pub user_id: i64,
    pub request_type: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<RequestSubType>,
    /// Free-form text attached by the requester.
    #[serde(default)]
    pub comment: String,
    /// Opaque correlation token; must be echoed back to approve or reject.
    pub flag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
}

/// An inbound occurrence from the gateway: a message or a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Message(MessageEvent),
    Request(RequestEvent),
}

impl Event {
    /// Decodes a raw gateway payload, keyed on its `post_type` field.
    ///
    /// Returns `None` for post types the core does not model (notices, meta
    /// events, heartbeats); decode failures on known kinds are logged and
    /// also yield `None` so a single garbled payload cannot stall the event
    /// loop.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let kind = payload.get("post_type").and_then(Value::as_str)?.to_owned();
        let parsed = match kind.as_str() {
            "message" => serde_json::from_value(payload).map(Event::Message),
            "request" => serde_json::from_value(payload).map(Event::Request),
            _ => return None,
        };
        match parsed {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(post_type = %kind, error = %e, "Failed to decode gateway event");
                None
            }
        }
    }

    /// The bot account this event was delivered to.
    pub fn self_id(&self) -> i64 {
        match self {
            Event::Message(e) => e.self_id,
            Event::Request(e) => e.self_id,
        }
    }

    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Event::Message(e) => Some(e),
            Event::Request(_) => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut MessageEvent> {
        match self {
            Event::Message(e) => Some(e),
            Event::Request(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_group_message() {
        let payload = json!({
            "post_type": "message",
            "message_type": "group",
            "self_id": 10000,
            "time": 1_700_000_000,
            "user_id": 20000,
            "group_id": 30000,
            "message_id": 42,
            "message": "hello [CQ:at,qq=10000]"
        });
        let event = Event::from_payload(payload).unwrap();
        let Event::Message(msg) = event else {
            panic!("expected message event");
        };
        assert_eq!(msg.message_type, MessageType::Group);
        assert_eq!(msg.group_id, Some(30000));
        assert!(msg.is_group());
        assert!(msg.message.contains("[CQ:at"));
    }

    #[test]
    fn test_decode_friend_request() {
        let payload = json!({
            "post_type": "request",
            "request_type": "friend",
            "self_id": 10000,
            "time": 1_700_000_000,
            "user_id": 20000,
            "comment": "hi",
            "flag": "abc123"
        });
        let event = Event::from_payload(payload).unwrap();
        let Event::Request(req) = event else {
            panic!("expected request event");
        };
        assert_eq!(req.request_type, RequestType::Friend);
        assert_eq!(req.sub_type, None);
        assert_eq!(req.flag, "abc123");
    }

    #[test]
    fn test_decode_group_invite() {
        let payload = json!({
            "post_type": "request",
            "request_type": "group",
            "sub_type": "invite",
            "self_id": 10000,
            "time": 1_700_000_000,
            "user_id": 20000,
            "group_id": 30000,
            "flag": "f"
        });
        let Some(Event::Request(req)) = Event::from_payload(payload) else {
            panic!("expected request event");
        };
        assert_eq!(req.sub_type, Some(RequestSubType::Invite));
        assert_eq!(req.comment, "");
    }

    #[test]
    fn test_unknown_post_type_is_ignored() {
        let payload = json!({ "post_type": "meta_event", "self_id": 1 });
        assert!(Event::from_payload(payload).is_none());
    }

    #[test]
    fn test_garbled_payload_is_ignored() {
        let payload = json!({ "post_type": "message", "message": 3 });
        assert!(Event::from_payload(payload).is_none());
    }
}
