//! Geodetic ⇄ local Cartesian conversion around a fixed UTM origin.
//!
//! The origin is taken from the first GPS fix of a session and never moves
//! afterwards: moving it mid-session would make every anchored object jump.
//! Local axes are +x east, +y north, +z altitude (world frame).

use std::sync::OnceLock;

use tracing::{debug, warn};
use vantage_types::{GeoPosition, VantageError};

use crate::orientation::Vec3;
use crate::utm::{Ellipsoid, UtmCoordinate, lat_lng_to_utm, lat_lng_to_utm_in_zone, utm_to_lat_lng};

/// Converter between [`GeoPosition`] and local metres.
#[derive(Debug, Default)]
pub struct GeoTransform {
    ellipsoid: Ellipsoid,
    reference: OnceLock<UtmCoordinate>,
}

impl GeoTransform {
    /// A WGS-84 converter without a reference.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ellipsoid(ellipsoid: Ellipsoid) -> Self {
        Self {
            ellipsoid,
            reference: OnceLock::new(),
        }
    }

    /// Fix the local origin at `geo`.
    ///
    /// Only the first call has an effect; returns `false` when a reference
    /// was already set.
    pub fn set_reference(&self, geo: GeoPosition) -> bool {
        let utm = lat_lng_to_utm(geo.latitude, geo.longitude, self.ellipsoid);
        match self.reference.set(utm) {
            Ok(()) => {
                debug!(
                    zone = utm.zone_number,
                    letter = %utm.zone_letter,
                    easting = utm.easting,
                    northing = utm.northing,
                    "UTM reference set"
                );
                true
            }
            Err(_) => {
                warn!("UTM reference already set; ignoring new origin");
                false
            }
        }
    }

    pub fn reference(&self) -> Option<&UtmCoordinate> {
        self.reference.get()
    }

    pub fn has_reference(&self) -> bool {
        self.reference.get().is_some()
    }

    /// Offset of `geo` from the reference in metres.
    ///
    /// # Errors
    ///
    /// [`VantageError::ReferenceNotSet`] before [`set_reference`](Self::set_reference).
    pub fn to_local(&self, geo: GeoPosition) -> Result<Vec3, VantageError> {
        let reference = self.reference.get().ok_or(VantageError::ReferenceNotSet)?;
        let utm = lat_lng_to_utm_in_zone(
            geo.latitude,
            geo.longitude,
            reference.zone_number,
            self.ellipsoid,
        );
        Ok(Vec3::new(
            utm.easting - reference.easting,
            utm.northing - reference.northing,
            geo.altitude,
        ))
    }

    /// Geodetic position of a local offset.
    ///
    /// # Errors
    ///
    /// [`VantageError::ReferenceNotSet`] before [`set_reference`](Self::set_reference).
    pub fn to_geo(&self, local: Vec3) -> Result<GeoPosition, VantageError> {
        let reference = self.reference.get().ok_or(VantageError::ReferenceNotSet)?;
        let utm = UtmCoordinate {
            easting: reference.easting + local.x,
            northing: reference.northing + local.y,
            ..*reference
        };
        let (latitude, longitude) = utm_to_lat_lng(&utm, self.ellipsoid);
        Ok(GeoPosition::new(latitude, longitude, local.z))
    }
}
