//! Inertial orientation sensor.

use vantage_geo::{Quaternion, Vec3};
use vantage_types::VantageError;

use crate::Sensor;

/// One orientation sample in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuReading {
    pub orientation: Quaternion,
    /// Tracked displacement from where tracking started. Orientation-only
    /// devices report zero.
    pub position: Vec3,
}

impl ImuReading {
    /// Reading from device orientation angles in degrees.
    pub fn from_device_orientation(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            orientation: Quaternion::from_device_orientation(alpha, beta, gamma),
            position: Vec3::zero(),
        }
    }
}

/// An orientation provider.
pub trait Imu: Sensor {
    /// Latest orientation.
    ///
    /// # Errors
    ///
    /// [`VantageError::NotReady`] before [`Sensor::init`] has resolved.
    fn orientation(&self) -> Result<Quaternion, VantageError>;

    /// Latest tracked position.
    ///
    /// # Errors
    ///
    /// [`VantageError::NotReady`] before [`Sensor::init`] has resolved.
    fn position(&self) -> Result<Vec3, VantageError>;
}
