//! The seam between the pose reconciler and the positioning service.
//!
//! The reconciler never speaks WebSocket directly. It hands encoded
//! requests to a [`LocalizationChannel`] and waits on the matching
//! response; [`LocalizationSocket`][crate::socket::LocalizationSocket] is
//! the production implementation, tests substitute scripted fakes.

use async_trait::async_trait;
use vantage_types::VantageError;

use crate::messages::{LocalizationRequest, LocalizationResponse};

/// Every localization transport must implement this trait.
///
/// # Contract
///
/// * `connect` – resolves once the channel is usable; calling it again on
///   an open channel is a no-op.
/// * `send_frame` – submits one scan frame. Frames of one scan share a
///   request id and the channel expects a single response for it.
/// * `await_response` – yields the response whose id equals `request_id`.
///   Responses carrying any other id are discarded.
#[async_trait]
pub trait LocalizationChannel: Send + Sync {
    async fn connect(&self) -> Result<(), VantageError>;

    async fn send_frame(&self, request: &LocalizationRequest) -> Result<(), VantageError>;

    async fn await_response(&self, request_id: u64) -> Result<LocalizationResponse, VantageError>;
}
