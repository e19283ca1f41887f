//! `vantage-types` – shared vocabulary of the vantage stack.
//!
//! Plain data carriers that cross crate boundaries: geodetic fixes, the
//! error taxonomy, and the envelope used on the event bus.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A geodetic fix on the WGS-84 ellipsoid.
///
/// Latitude and longitude are in decimal degrees, altitude in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPosition {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

/// Bootstrap and localization states of a session.
///
/// The bootstrap walks the first seven states in order. `Ready` can then
/// move into `Localizing` and on to `Localized`. `Error` and `Timeout`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    ValidatingToken,
    StartingSensors,
    CheckingCoverage,
    LoadingMesh,
    StartingTransport,
    Ready,
    Localizing,
    Localized,
    Error,
    Timeout,
}

impl SessionState {
    /// `true` once the session can no longer make progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Error | SessionState::Timeout)
    }

    /// `true` for every state at or past `Ready` that is not terminal.
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Localizing | SessionState::Localized
        )
    }
}

/// Envelope for everything routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"vantage-runtime::session"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// The session bootstrap has started.
    Initializing,
    /// The session moved to a new bootstrap or localization state.
    StateChanged(SessionState),
    /// The environment mesh tile for the current fix has been downloaded.
    MeshDataLoaded { bytes: usize },
    /// Every bootstrap step succeeded.
    Ready,
    /// The session failed; `code` is a short machine-readable tag.
    Error { code: String, message: String },
    /// A scan frame crossed its target angle and was submitted.
    FrameCaptured { request_id: u64, order: u32, count: u32 },
    /// All scan frames were captured; waiting on the service.
    LocalizationLoading,
    /// A localization response was applied to the pose offsets.
    LocalizationComplete { request_id: u64 },
    /// The service reported an error for a localization request.
    LocalizationFailed { code: i64, message: String },
    /// The volumetric sequence wrapped back to its first frame.
    LoopEnd,
    /// The stream could not be fetched or decoded.
    PlaybackError(String),
}

/// Error taxonomy shared by every vantage crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VantageError {
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Permission denied for {0}")]
    PermissionDenied(String),

    #[error("Sensor {0} is not ready")]
    NotReady(String),

    #[error("Connection timed out after {0} ms")]
    ConnectTimeout(u64),

    #[error("Response id {received} does not match expected {expected}")]
    ResponseMismatch { expected: u64, received: u64 },

    #[error("Localization failed ({code}): {message}")]
    LocalizationFailed { code: i64, message: String },

    #[error("Localization service does not cover {latitude}, {longitude}")]
    CoverageUnavailable { latitude: f64, longitude: f64 },

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("UTM reference has not been set")]
    ReferenceNotSet,

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Session not ready after {0} s")]
    SessionTimeout(u64),

    #[error("Request {0} timed out")]
    RequestTimeout(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl VantageError {
    /// Short machine-readable tag, used as the `code` of error events.
    pub fn code(&self) -> &'static str {
        match self {
            VantageError::SensorUnavailable(_) => "sensor_unavailable",
            VantageError::PermissionDenied(_) => "permission_denied",
            VantageError::NotReady(_) => "not_ready",
            VantageError::ConnectTimeout(_) => "connect_timeout",
            VantageError::ResponseMismatch { .. } => "response_mismatch",
            VantageError::LocalizationFailed { .. } => "localization_failed",
            VantageError::CoverageUnavailable { .. } => "coverage_unavailable",
            VantageError::InvalidContainer(_) => "invalid_container",
            VantageError::ReferenceNotSet => "reference_not_set",
            VantageError::InvalidToken => "invalid_token",
            VantageError::SessionTimeout(_) => "timeout",
            VantageError::RequestTimeout(_) => "request_timeout",
            VantageError::Transport(_) => "transport",
            VantageError::Http(_) => "http",
            VantageError::Decode(_) => "decode",
            VantageError::Channel(_) => "channel",
        }
    }
}
