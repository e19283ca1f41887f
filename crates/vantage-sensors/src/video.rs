//! `VideoSource` trait and supporting types for the back-facing camera.

use vantage_types::VantageError;

use crate::Sensor;

/// Row-major projection of an uncalibrated phone camera.
pub const DEFAULT_PROJECTION: [f64; 16] = [
    2.588984407376442,
    0.0,
    0.0,
    0.0,
    0.0,
    1.457299930273459,
    0.0,
    0.0,
    0.0,
    0.0,
    -1.0000100000500003,
    -0.020000100000500003,
    0.0,
    0.0,
    -1.0,
    0.0,
];

/// A still captured from the video feed.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Encoded image bytes (JPEG).
    pub data: Vec<u8>,
}

/// Camera intrinsics sent alongside every localization frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub width: u32,
    pub height: u32,
    /// Row-major 4×4 projection matrix (`e00, e01, …, e33`).
    pub projection: [f64; 16],
}

impl CameraIntrinsics {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            projection: DEFAULT_PROJECTION,
        }
    }

    pub fn with_projection(mut self, projection: [f64; 16]) -> Self {
        self.projection = projection;
        self
    }

    /// Vertical field of view in degrees, derived from the projection.
    pub fn fov_degrees(&self) -> f64 {
        2.0 * (1.0 / self.projection[5]).atan().to_degrees()
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

/// A camera feed.
pub trait VideoSource: Sensor {
    /// Grab the current frame.
    ///
    /// # Errors
    ///
    /// [`VantageError::NotReady`] before [`Sensor::init`] has resolved.
    fn capture(&self) -> Result<VideoFrame, VantageError>;

    fn intrinsics(&self) -> CameraIntrinsics;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_projection_fov() {
        let intrinsics = CameraIntrinsics::new(1080, 1920);
        let fov = intrinsics.fov_degrees();
        assert!(fov > 68.0 && fov < 69.0, "fov = {fov}");
        assert!(intrinsics.is_portrait());
    }

    #[test]
    fn custom_projection_replaces_default() {
        let mut projection = DEFAULT_PROJECTION;
        projection[5] = 1.0;
        let intrinsics = CameraIntrinsics::new(640, 480).with_projection(projection);
        assert!((intrinsics.fov_degrees() - 90.0).abs() < 1e-9);
        assert!(!intrinsics.is_portrait());
    }
}
