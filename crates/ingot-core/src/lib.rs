//! # Ingot Core
//!
//! Foundation types for the Ingot bot framework.
//!
//! This crate holds the pieces every other layer builds on:
//!
//! - **Event model**: the two inbound event kinds delivered by the messaging
//!   gateway — [`MessageEvent`] and [`RequestEvent`] — unified as [`Event`].
//! - **Markup codec**: the inline `[CQ:...]` tag mini-language embedded in
//!   message text ([`markup`]), with lossless escaping and strict tag-grammar
//!   validation.
//! - **Gateway boundary**: the [`Gateway`] trait through which replies and
//!   raw API calls leave the process, together with [`ApiError`].
//!
//! Dispatch logic (filter chains, the event bus, module lifecycle) lives in
//! `ingot-framework`; this crate stays free of it so the codec and event
//! shapes can be used from tests and tools without pulling in the runtime.

pub mod error;
pub mod event;
pub mod gateway;
pub mod markup;

pub use error::{ApiError, ApiResult};
pub use event::{Event, MessageEvent, MessageType, RequestEvent, RequestSubType, RequestType};
pub use gateway::{BoxedGateway, Gateway};
pub use markup::{MarkupError, Segment, Tag};
