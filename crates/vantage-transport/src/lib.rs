//! `vantage-transport` – Localization Transport
//!
//! Moves localization traffic between the device and the visual positioning
//! service, and routes session events between in-process components.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`wire`] – Tag/varint encoding primitives.
//! - [`messages`] – Localization request and response messages.
//! - [`socket`] – Persistent WebSocket client with request-id correlation.
//! - [`channel`] – The [`LocalizationChannel`] seam the reconciler talks to.

pub mod bus;
pub mod channel;
pub mod messages;
pub mod socket;
pub mod wire;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use channel::LocalizationChannel;
pub use messages::{
    ExternalParameters, InternalParameters, LocalizationRequest, LocalizationResponse,
    MessageType, Operation, ResponseError, ResponseOffsets,
};
pub use socket::{LocalizationSocket, SocketConfig};
pub use wire::{WireError, WireReader, WireType, WireWriter};
