//! Satellite positioning sensor.

use vantage_types::{GeoPosition, VantageError};

use crate::Sensor;

/// A fix together with the provider's horizontal accuracy estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsReading {
    pub position: GeoPosition,
    /// Radius of the 68% confidence circle in meters, when reported.
    pub accuracy: Option<f64>,
}

impl GpsReading {
    pub fn new(position: GeoPosition, accuracy: f64) -> Self {
        Self {
            position,
            accuracy: Some(accuracy),
        }
    }
}

impl From<GeoPosition> for GpsReading {
    fn from(position: GeoPosition) -> Self {
        Self {
            position,
            accuracy: None,
        }
    }
}

/// A geodetic position provider.
pub trait Gps: Sensor {
    /// Latest fix.
    ///
    /// # Errors
    ///
    /// [`VantageError::NotReady`] before [`Sensor::init`] has resolved.
    fn current_location(&self) -> Result<GeoPosition, VantageError>;

    /// Latest fix with its accuracy. Providers that do not report one
    /// leave `accuracy` empty.
    fn current_reading(&self) -> Result<GpsReading, VantageError> {
        self.current_location().map(GpsReading::from)
    }
}
