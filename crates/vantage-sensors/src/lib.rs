//! `vantage-sensors` – Sensor providers.
//!
//! Every capability the pose pipeline reads from the device (orientation,
//! position, camera frames) sits behind a small trait so the session can be
//! driven by real platform feeds or by fixed mock values.
//!
//! # Modules
//!
//! - [`imu`] – [`Imu`][imu::Imu]: device orientation plus tracked position.
//! - [`gps`] – [`Gps`][gps::Gps]: geodetic fixes.
//! - [`video`] – [`VideoSource`][video::VideoSource]: captured frames and
//!   camera intrinsics.
//! - [`feed`] – [`FeedSensor`][feed::FeedSensor]: device-backed providers
//!   that the platform layer pushes readings into.
//! - [`mock`] – fixed-value providers for development and tests.
//! - [`registry`] – [`SensorSet`][registry::SensorSet]: the three providers
//!   of a session, initialised concurrently.

use async_trait::async_trait;
use vantage_types::VantageError;

pub mod feed;
pub mod gps;
pub mod imu;
pub mod mock;
pub mod registry;
pub mod video;

pub use feed::{FeedHandle, FeedSensor};
pub use gps::{Gps, GpsReading};
pub use imu::{Imu, ImuReading};
pub use mock::{MockGps, MockImu, MockVideo};
pub use registry::SensorSet;
pub use video::{CameraIntrinsics, VideoFrame, VideoSource};

/// Lifecycle of a sensor provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorStatus {
    Initializing,
    Ready,
    NotSupported,
}

/// Behaviour shared by every provider.
#[async_trait]
pub trait Sensor: Send + Sync {
    /// Stable identifier, e.g. `"device_imu"`.
    fn id(&self) -> &str;

    fn status(&self) -> SensorStatus;

    /// Bring the provider up.
    ///
    /// # Errors
    ///
    /// [`VantageError::SensorUnavailable`] when the device lacks the
    /// capability, [`VantageError::PermissionDenied`] when the user declined.
    async fn init(&self) -> Result<SensorStatus, VantageError>;
}

/// Fail with [`VantageError::NotReady`] unless `sensor` is ready.
pub(crate) fn ensure_ready(sensor: &dyn Sensor) -> Result<(), VantageError> {
    match sensor.status() {
        SensorStatus::Ready => Ok(()),
        _ => Err(VantageError::NotReady(sensor.id().to_string())),
    }
}
