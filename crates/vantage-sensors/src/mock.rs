//! Fixed-value providers.
//!
//! Never touch a device. `init` resolves immediately and every getter
//! returns whatever was configured (or last set).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use vantage_geo::{Quaternion, Vec3};
use vantage_types::{GeoPosition, VantageError};

use crate::gps::{Gps, GpsReading};
use crate::imu::{Imu, ImuReading};
use crate::video::{CameraIntrinsics, VideoFrame, VideoSource};
use crate::{Sensor, SensorStatus, ensure_ready};

/// Ready flag shared by the mocks.
#[derive(Debug, Default)]
struct Readiness(AtomicBool);

impl Readiness {
    fn status(&self) -> SensorStatus {
        if self.0.load(Ordering::SeqCst) {
            SensorStatus::Ready
        } else {
            SensorStatus::Initializing
        }
    }

    fn mark_ready(&self) -> SensorStatus {
        self.0.store(true, Ordering::SeqCst);
        SensorStatus::Ready
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MockImu
// ────────────────────────────────────────────────────────────────────────────

/// Orientation source driven by the caller.
#[derive(Debug, Default)]
pub struct MockImu {
    reading: Mutex<ImuReading>,
    ready: Readiness,
}

impl MockImu {
    pub fn new(reading: ImuReading) -> Self {
        Self {
            reading: Mutex::new(reading),
            ready: Readiness::default(),
        }
    }

    /// Replace the current reading, e.g. to simulate the user turning.
    pub fn set_reading(&self, reading: ImuReading) {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner) = reading;
    }

    /// Face the given heading in degrees, level.
    pub fn set_yaw(&self, yaw_degrees: f64) {
        let mut reading = self.reading.lock().unwrap_or_else(PoisonError::into_inner);
        reading.orientation = Quaternion::from_device_orientation(yaw_degrees, 0.0, 0.0);
    }

    fn snapshot(&self) -> ImuReading {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Sensor for MockImu {
    fn id(&self) -> &str {
        "mock_imu"
    }

    fn status(&self) -> SensorStatus {
        self.ready.status()
    }

    async fn init(&self) -> Result<SensorStatus, VantageError> {
        Ok(self.ready.mark_ready())
    }
}

impl Imu for MockImu {
    fn orientation(&self) -> Result<Quaternion, VantageError> {
        ensure_ready(self)?;
        Ok(self.snapshot().orientation)
    }

    fn position(&self) -> Result<Vec3, VantageError> {
        ensure_ready(self)?;
        Ok(self.snapshot().position)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MockGps
// ────────────────────────────────────────────────────────────────────────────

/// A GPS that never moves unless told to.
#[derive(Debug, Default)]
pub struct MockGps {
    fix: Mutex<GeoPosition>,
    accuracy: Option<f64>,
    ready: Readiness,
}

impl MockGps {
    pub fn new(fix: GeoPosition) -> Self {
        Self {
            fix: Mutex::new(fix),
            accuracy: None,
            ready: Readiness::default(),
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy = Some(meters);
        self
    }

    pub fn set_fix(&self, fix: GeoPosition) {
        *self.fix.lock().unwrap_or_else(PoisonError::into_inner) = fix;
    }
}

#[async_trait]
impl Sensor for MockGps {
    fn id(&self) -> &str {
        "mock_gps"
    }

    fn status(&self) -> SensorStatus {
        self.ready.status()
    }

    async fn init(&self) -> Result<SensorStatus, VantageError> {
        Ok(self.ready.mark_ready())
    }
}

impl Gps for MockGps {
    fn current_location(&self) -> Result<GeoPosition, VantageError> {
        ensure_ready(self)?;
        Ok(*self.fix.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn current_reading(&self) -> Result<GpsReading, VantageError> {
        Ok(GpsReading {
            position: self.current_location()?,
            accuracy: self.accuracy,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MockVideo
// ────────────────────────────────────────────────────────────────────────────

/// Returns the same still on every capture.
#[derive(Debug)]
pub struct MockVideo {
    frame: VideoFrame,
    intrinsics: CameraIntrinsics,
    ready: Readiness,
}

impl MockVideo {
    pub fn new(frame: VideoFrame) -> Self {
        let intrinsics = CameraIntrinsics::new(frame.width, frame.height);
        Self {
            frame,
            intrinsics,
            ready: Readiness::default(),
        }
    }

    pub fn with_intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.intrinsics = intrinsics;
        self
    }
}

impl Default for MockVideo {
    /// A 2×2 RGB placeholder.
    fn default() -> Self {
        Self::new(VideoFrame {
            width: 2,
            height: 2,
            data: vec![0u8; 2 * 2 * 3],
        })
    }
}

#[async_trait]
impl Sensor for MockVideo {
    fn id(&self) -> &str {
        "mock_video"
    }

    fn status(&self) -> SensorStatus {
        self.ready.status()
    }

    async fn init(&self) -> Result<SensorStatus, VantageError> {
        Ok(self.ready.mark_ready())
    }
}

impl VideoSource for MockVideo {
    fn capture(&self) -> Result<VideoFrame, VantageError> {
        ensure_ready(self)?;
        Ok(self.frame.clone())
    }

    fn intrinsics(&self) -> CameraIntrinsics {
        self.intrinsics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_gps_returns_configured_fix() {
        let fix = GeoPosition::new(37.7749, -122.4194, 10.0);
        let gps = MockGps::new(fix);
        assert!(matches!(gps.current_location(), Err(VantageError::NotReady(_))));
        assert_eq!(gps.init().await, Ok(SensorStatus::Ready));
        assert_eq!(gps.current_location().unwrap(), fix);
        assert_eq!(gps.current_reading().unwrap().accuracy, None);

        let precise = MockGps::new(fix).with_accuracy(3.0);
        precise.init().await.unwrap();
        assert_eq!(precise.current_reading().unwrap().accuracy, Some(3.0));
    }

    #[tokio::test]
    async fn mock_imu_follows_set_yaw() {
        let imu = MockImu::default();
        imu.init().await.unwrap();
        imu.set_yaw(-60.0);
        assert!((imu.orientation().unwrap().yaw_degrees() + 60.0).abs() < 1e-9);
        assert_eq!(imu.position().unwrap(), Vec3::zero());
    }

    #[tokio::test]
    async fn mock_video_capture() {
        let video = MockVideo::default();
        video.init().await.unwrap();
        assert_eq!(video.id(), "mock_video");
        let frame = video.capture().unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.data.len(), 12);
    }
}
