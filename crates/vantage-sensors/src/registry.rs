//! [`SensorSet`] – the providers a session reads from.
//!
//! One IMU, one GPS and one video source, shared by reference between the
//! session bootstrap and the pose reconciler.

use std::sync::Arc;

use tracing::info;
use vantage_types::{GeoPosition, VantageError};

use crate::gps::Gps;
use crate::imu::Imu;
use crate::mock::{MockGps, MockImu, MockVideo};
use crate::video::VideoSource;

/// The three capability providers of a session.
#[derive(Clone)]
pub struct SensorSet {
    pub imu: Arc<dyn Imu>,
    pub gps: Arc<dyn Gps>,
    pub video: Arc<dyn VideoSource>,
}

impl SensorSet {
    pub fn new(imu: Arc<dyn Imu>, gps: Arc<dyn Gps>, video: Arc<dyn VideoSource>) -> Self {
        Self { imu, gps, video }
    }

    /// Mock providers pinned to `fix`.
    pub fn mock(fix: GeoPosition) -> Self {
        Self::new(
            Arc::new(MockImu::default()),
            Arc::new(MockGps::new(fix)),
            Arc::new(MockVideo::default()),
        )
    }

    /// Initialise all three providers concurrently.
    ///
    /// # Errors
    ///
    /// The first provider error; the others are abandoned.
    pub async fn init_all(&self) -> Result<(), VantageError> {
        tokio::try_join!(self.imu.init(), self.gps.init(), self.video.init())?;
        info!(
            imu = self.imu.id(),
            gps = self.gps.id(),
            video = self.video.id(),
            "sensors ready"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SensorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSet")
            .field("imu", &self.imu.id())
            .field("gps", &self.gps.id())
            .field("video", &self.video.id())
            .finish()
    }
}
