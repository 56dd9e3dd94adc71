//! Gateway boundary.
//!
//! The physical socket transport lives outside the core.  Everything the
//! core needs from it is captured by the [`Gateway`] trait: a raw API call
//! primitive plus the two message-send shortcuts dispatch uses to route
//! replies.  Adapters implement the trait; tests substitute an in-memory
//! recording double.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiResult;

/// Outbound side of the messaging gateway.
///
/// # API Design
///
/// - [`call_api`](Gateway::call_api): raw action call with JSON parameters;
///   every other method could be expressed through it.
/// - [`send_private`](Gateway::send_private) / [`send_group`](Gateway::send_group):
///   the reply primitives, taking markup-laden text.
///
/// Sends are fire-and-forget from the caller's perspective; an `Err` means
/// the gateway reported a hard failure.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Calls a raw gateway API with the given action name and parameters.
    ///
    /// # Arguments
    ///
    /// * `action` - The API action name (e.g. "set_group_add_request")
    /// * `params` - JSON value containing the parameters
    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value>;

    /// Sends a private message to a user.
    async fn send_private(&self, user_id: i64, message: &str) -> ApiResult<()>;

    /// Sends a message to a group.
    async fn send_group(&self, group_id: i64, message: &str) -> ApiResult<()>;

    /// Returns self as an `Arc<dyn Any>` for safe downcasting.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared gateway trait object.
pub type BoxedGateway = Arc<dyn Gateway>;
