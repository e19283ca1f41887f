//! Device-backed providers.
//!
//! The platform layer (orientation events, geolocation watch, camera
//! stream) owns a [`FeedHandle`] and pushes readings into it; the session
//! reads the paired [`FeedSensor`] through the capability traits. `init`
//! resolves with the first reading, or fails as soon as the platform reports
//! that the capability is missing or was refused.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};
use vantage_geo::{Quaternion, Vec3};
use vantage_types::{GeoPosition, VantageError};

use crate::gps::{Gps, GpsReading};
use crate::imu::{Imu, ImuReading};
use crate::video::{CameraIntrinsics, VideoFrame, VideoSource};
use crate::{Sensor, SensorStatus, ensure_ready};

/// How long `init` waits for the first reading before giving up.
const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
enum FeedState<T> {
    Pending,
    Reading(T),
    Denied,
    Unsupported,
}

/// Producer side of a device feed.
#[derive(Debug, Clone)]
pub struct FeedHandle<T> {
    tx: watch::Sender<FeedState<T>>,
}

impl<T> FeedHandle<T> {
    /// Publish the latest reading.
    pub fn push(&self, reading: T) {
        self.tx.send_replace(FeedState::Reading(reading));
    }

    /// The user refused the permission prompt.
    pub fn deny(&self) {
        self.tx.send_replace(FeedState::Denied);
    }

    /// The device has no such capability.
    pub fn unsupported(&self) {
        self.tx.send_replace(FeedState::Unsupported);
    }
}

/// Consumer side of a device feed.
#[derive(Debug)]
pub struct FeedSensor<T> {
    id: String,
    rx: watch::Receiver<FeedState<T>>,
    init_timeout: Duration,
}

impl<T: Clone + Send + Sync + 'static> FeedSensor<T> {
    /// Create a provider and the handle that feeds it.
    pub fn new(id: impl Into<String>) -> (Self, FeedHandle<T>) {
        let (tx, rx) = watch::channel(FeedState::Pending);
        let sensor = Self {
            id: id.into(),
            rx,
            init_timeout: DEFAULT_INIT_TIMEOUT,
        };
        (sensor, FeedHandle { tx })
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    fn latest(&self) -> Result<T, VantageError> {
        match &*self.rx.borrow() {
            FeedState::Reading(reading) => Ok(reading.clone()),
            _ => Err(VantageError::NotReady(self.id.clone())),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Sensor for FeedSensor<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> SensorStatus {
        match &*self.rx.borrow() {
            FeedState::Pending => SensorStatus::Initializing,
            FeedState::Reading(_) => SensorStatus::Ready,
            FeedState::Denied | FeedState::Unsupported => SensorStatus::NotSupported,
        }
    }

    async fn init(&self) -> Result<SensorStatus, VantageError> {
        let mut rx = self.rx.clone();
        let settled = tokio::time::timeout(
            self.init_timeout,
            rx.wait_for(|state| !matches!(state, FeedState::Pending)),
        )
        .await;

        let outcome = match settled {
            Err(_) => Err(VantageError::SensorUnavailable(format!(
                "{}: no reading within {:?}",
                self.id, self.init_timeout
            ))),
            Ok(Err(_)) => Err(VantageError::SensorUnavailable(format!(
                "{}: feed closed",
                self.id
            ))),
            Ok(Ok(state)) => match &*state {
                FeedState::Reading(_) => Ok(SensorStatus::Ready),
                FeedState::Denied => Err(VantageError::PermissionDenied(self.id.clone())),
                FeedState::Unsupported => Err(VantageError::SensorUnavailable(self.id.clone())),
                FeedState::Pending => Ok(SensorStatus::Initializing),
            },
        };

        match &outcome {
            Ok(_) => debug!(sensor = %self.id, "sensor ready"),
            Err(e) => warn!(sensor = %self.id, error = %e, "sensor init failed"),
        }
        outcome
    }
}

impl Imu for FeedSensor<ImuReading> {
    fn orientation(&self) -> Result<Quaternion, VantageError> {
        ensure_ready(self)?;
        Ok(self.latest()?.orientation)
    }

    fn position(&self) -> Result<Vec3, VantageError> {
        ensure_ready(self)?;
        Ok(self.latest()?.position)
    }
}

impl Gps for FeedSensor<GeoPosition> {
    fn current_location(&self) -> Result<GeoPosition, VantageError> {
        ensure_ready(self)?;
        self.latest()
    }
}

impl Gps for FeedSensor<GpsReading> {
    fn current_location(&self) -> Result<GeoPosition, VantageError> {
        Ok(self.current_reading()?.position)
    }

    fn current_reading(&self) -> Result<GpsReading, VantageError> {
        ensure_ready(self)?;
        self.latest()
    }
}

impl VideoSource for FeedSensor<VideoFrame> {
    fn capture(&self) -> Result<VideoFrame, VantageError> {
        ensure_ready(self)?;
        self.latest()
    }

    /// Frame size of the latest capture with the uncalibrated projection.
    fn intrinsics(&self) -> CameraIntrinsics {
        match &*self.rx.borrow() {
            FeedState::Reading(frame) => CameraIntrinsics::new(frame.width, frame.height),
            _ => CameraIntrinsics::new(0, 0),
        }
    }
}
