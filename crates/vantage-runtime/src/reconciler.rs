//! [`PoseReconciler`] – turns raw sensor readings into the camera pose.
//!
//! Four frames of reference meet here: the IMU's orientation, GPS/UTM world
//! coordinates, the positioning service's correction, and the renderer's
//! local space. The reconciler owns the accumulated [`OffsetCorrection`] and
//! derives every per-frame output from it plus the latest sensor readings.
//! None of its per-frame methods suspend or touch the network.

use std::sync::Arc;

use tracing::{debug, info};
use vantage_geo::orientation::{render_to_world, world_to_render, world_to_render_position};
use vantage_geo::{GeoTransform, Pose, Quaternion, Vec3};
use vantage_sensors::SensorSet;
use vantage_transport::{
    ExternalParameters, InternalParameters, LocalizationRequest, LocalizationResponse,
};
use vantage_types::{GeoPosition, VantageError};

use crate::scan::CaptureTrigger;

/// Corrections accumulated from successful localizations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetCorrection {
    pub yaw: Quaternion,
    pub pitch: Quaternion,
    /// Service-corrected device location of the latest localization.
    pub location: Option<GeoPosition>,
}

impl Default for OffsetCorrection {
    fn default() -> Self {
        Self {
            yaw: Quaternion::identity(),
            pitch: Quaternion::identity(),
            location: None,
        }
    }
}

pub struct PoseReconciler {
    sensors: SensorSet,
    geo: Arc<GeoTransform>,
    correction: OffsetCorrection,
    /// IMU position at the moment of the latest localization.
    tracking_origin: Vec3,
    tracking_id: Option<String>,
    camera_elevation: f64,
}

impl PoseReconciler {
    pub fn new(sensors: SensorSet, geo: Arc<GeoTransform>) -> Self {
        Self {
            sensors,
            geo,
            correction: OffsetCorrection::default(),
            tracking_origin: Vec3::zero(),
            tracking_id: None,
            camera_elevation: 0.0,
        }
    }

    pub fn with_camera_elevation(mut self, elevation: f64) -> Self {
        self.camera_elevation = elevation;
        self
    }

    /// Height of the camera above the ground used until the first
    /// localization supplies a real altitude.
    pub fn set_camera_elevation(&mut self, elevation: f64) {
        self.camera_elevation = elevation;
    }

    pub fn is_localized(&self) -> bool {
        self.correction.location.is_some()
    }

    pub fn correction(&self) -> &OffsetCorrection {
        &self.correction
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.tracking_id.as_deref()
    }

    /// Drop every correction; the raw sensor pose is used again.
    pub fn reset(&mut self) {
        self.correction = OffsetCorrection::default();
        self.tracking_origin = Vec3::zero();
        self.tracking_id = None;
        info!("pose correction reset");
    }

    // ────────────────────────────────────────────────────────────────────────
    // Localization protocol
    // ────────────────────────────────────────────────────────────────────────

    /// Assemble the wire request for one captured scan frame.
    pub fn frame_request(
        &self,
        request_id: u64,
        trigger: CaptureTrigger,
    ) -> Result<LocalizationRequest, VantageError> {
        let fix = self.sensors.gps.current_location()?;
        let orientation = self.sensors.imu.orientation()?;
        let frame = self.sensors.video.capture()?;
        let intrinsics = self.sensors.video.intrinsics();

        Ok(LocalizationRequest::alignment(
            request_id,
            ExternalParameters {
                position: fix,
                orientation,
            },
            InternalParameters {
                scene_width: intrinsics.width,
                scene_height: intrinsics.height,
                fov: intrinsics.fov_degrees() as f32,
                projection: intrinsics.projection,
            },
            trigger.count,
            trigger.order,
            frame.data,
        ))
    }

    /// Fold a service response into the running correction.
    ///
    /// # Errors
    ///
    /// [`VantageError::LocalizationFailed`] when the response carries an
    /// error; the correction is left untouched.
    pub fn apply_response(&mut self, response: &LocalizationResponse) -> Result<(), VantageError> {
        if let Some(err) = &response.error {
            return Err(VantageError::LocalizationFailed {
                code: err.code,
                message: err.message.clone(),
            });
        }
        let offsets = response.offsets.ok_or_else(|| {
            VantageError::Decode(format!(
                "response {} carries neither offsets nor an error",
                response.request_id
            ))
        })?;

        self.tracking_origin = self.sensors.imu.position()?;
        self.correction.yaw = offsets.yaw_offset.compose(self.correction.yaw);
        self.correction.pitch = self.correction.pitch.compose(offsets.pitch_offset);
        self.correction.location = Some(offsets.position);
        self.tracking_id = Some(response.tracking_id.clone()).filter(|id| !id.is_empty());

        info!(
            request_id = response.request_id,
            latitude = offsets.position.latitude,
            longitude = offsets.position.longitude,
            "localization applied"
        );
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Per-frame outputs
    // ────────────────────────────────────────────────────────────────────────

    /// IMU orientation with the yaw and pitch corrections applied.
    pub fn corrected_orientation(&self) -> Result<Quaternion, VantageError> {
        let sensor = self.sensors.imu.orientation()?;
        if !self.is_localized() {
            return Ok(sensor);
        }
        Ok(self
            .correction
            .yaw
            .compose(sensor)
            .compose(self.correction.pitch))
    }

    /// Rotation that carries the raw sensor orientation onto the corrected one.
    pub fn orientation_offset(&self) -> Result<Quaternion, VantageError> {
        let sensor = self.sensors.imu.orientation()?;
        Ok(self
            .correction
            .yaw
            .compose(sensor)
            .compose(self.correction.pitch)
            .compose(sensor.inverse()))
    }

    /// World-space translation from tracking space to the reference origin.
    ///
    /// `z` carries the absolute altitude of the anchoring fix.
    pub fn location_offset(&self) -> Result<Vec3, VantageError> {
        let (anchor, relative) = match self.correction.location {
            Some(location) => (location, self.tracking_origin),
            None => (
                self.sensors.gps.current_location()?,
                self.sensors.imu.position()?,
            ),
        };
        let mut absolute = self.geo.to_local(anchor)?;
        absolute.z = anchor.altitude;
        Ok(absolute.sub(relative))
    }

    /// Camera pose in render space.
    ///
    /// The parent carries the location and orientation offsets; the child is
    /// the IMU's own tracking pose. Before the first localization the parent
    /// sits at the configured camera elevation.
    pub fn camera_transform(&self) -> Result<Pose, VantageError> {
        let mut parent_position = world_to_render_position(self.location_offset()?);
        if !self.is_localized() {
            parent_position.y = self.camera_elevation;
        }
        let offset = self.orientation_offset()?;
        let parent_rotation = world_to_render(offset.compose(render_to_world(Quaternion::identity())));
        let parent = Pose::new(parent_position, parent_rotation);

        let child = Pose::new(
            world_to_render_position(self.sensors.imu.position()?),
            world_to_render(self.sensors.imu.orientation()?),
        );
        let pose = parent.compose(child);
        debug!(x = pose.position.x, y = pose.position.y, z = pose.position.z, "camera transform");
        Ok(pose)
    }

    /// Best estimate of the device's geodetic location.
    ///
    /// Raw GPS before localization; afterwards the corrected fix moved by
    /// however far the device has tracked since.
    pub fn camera_location(&self) -> Result<GeoPosition, VantageError> {
        let Some(anchor) = self.correction.location else {
            return self.sensors.gps.current_location();
        };
        let travelled = self
            .orientation_offset()?
            .rotate(self.sensors.imu.position()?.sub(self.tracking_origin));
        let mut local = self.geo.to_local(anchor)?;
        local = local.add(Vec3::new(travelled.x, travelled.y, 0.0));
        let mut location = self.geo.to_geo(local)?;
        location.altitude = anchor.altitude + travelled.z;
        Ok(location)
    }
}

impl std::fmt::Debug for PoseReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseReconciler")
            .field("correction", &self.correction)
            .field("tracking_origin", &self.tracking_origin)
            .field("camera_elevation", &self.camera_elevation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_sensors::imu::ImuReading;
    use vantage_sensors::mock::{MockGps, MockImu, MockVideo};
    use vantage_transport::ResponseOffsets;

    const FIX: GeoPosition = GeoPosition {
        latitude: 35.6812,
        longitude: 139.7671,
        altitude: 40.0,
    };

    struct Rig {
        imu: Arc<MockImu>,
        gps: Arc<MockGps>,
        reconciler: PoseReconciler,
    }

    async fn rig() -> Rig {
        let imu = Arc::new(MockImu::default());
        let gps = Arc::new(MockGps::new(FIX));
        let sensors = SensorSet::new(imu.clone(), gps.clone(), Arc::new(MockVideo::default()));
        sensors.init_all().await.unwrap();
        let geo = Arc::new(GeoTransform::new());
        geo.set_reference(FIX);
        Rig {
            imu,
            gps,
            reconciler: PoseReconciler::new(sensors, geo),
        }
    }

    fn yaw_quat(deg: f64) -> Quaternion {
        Quaternion::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), deg.to_radians())
    }

    fn response(yaw_deg: f64, position: GeoPosition) -> LocalizationResponse {
        LocalizationResponse::success(
            14,
            ResponseOffsets {
                position,
                yaw_offset: yaw_quat(yaw_deg),
                pitch_offset: Quaternion::identity(),
            },
        )
    }

    fn assert_quat(a: Quaternion, b: Quaternion) {
        // q and -q are the same rotation.
        let dot = a.w * b.w + a.x * b.x + a.y * b.y + a.z * b.z;
        assert!((dot.abs() - 1.0).abs() < 1e-9, "{a:?} != {b:?}");
    }

    #[tokio::test]
    async fn unlocalized_pose_follows_raw_sensors() {
        let rig = rig().await;
        rig.imu.set_yaw(30.0);
        assert!(!rig.reconciler.is_localized());
        assert_quat(rig.reconciler.corrected_orientation().unwrap(), yaw_quat(30.0));
        assert_quat(rig.reconciler.orientation_offset().unwrap(), Quaternion::identity());

        let offset = rig.reconciler.location_offset().unwrap();
        assert!(offset.x.abs() < 1e-6 && offset.y.abs() < 1e-6);
        assert!((offset.z - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn camera_sits_at_elevation_before_localization() {
        let mut rig = rig().await;
        rig.reconciler.set_camera_elevation(1.5);
        let pose = rig.reconciler.camera_transform().unwrap();
        assert!((pose.position.y - 1.5).abs() < 1e-9);
        assert_quat(pose.orientation, world_to_render(Quaternion::identity()));
    }

    #[tokio::test]
    async fn response_marks_localized() {
        let mut rig = rig().await;
        let corrected = GeoPosition::new(35.6813, 139.7672, 42.0);
        rig.reconciler.apply_response(&response(10.0, corrected)).unwrap();
        assert!(rig.reconciler.is_localized());
        assert_eq!(rig.reconciler.correction().location, Some(corrected));
        assert_quat(rig.reconciler.corrected_orientation().unwrap(), yaw_quat(10.0));

        // GPS drift no longer moves the camera once localized.
        rig.gps.set_fix(GeoPosition::new(35.70, 139.80, 0.0));
        let offset = rig.reconciler.location_offset().unwrap();
        assert!((offset.z - 42.0).abs() < 1e-9);
        let expected = rig.reconciler.geo.to_local(corrected).unwrap();
        assert!((offset.x - expected.x).abs() < 1e-9);
    }

    #[tokio::test]
    async fn corrections_accumulate_in_order() {
        let mut twice = rig().await;
        twice.reconciler.apply_response(&response(10.0, FIX)).unwrap();
        twice.reconciler.apply_response(&response(25.0, FIX)).unwrap();

        let mut once = rig().await;
        once.reconciler.apply_response(&response(25.0, FIX)).unwrap();

        assert_quat(twice.reconciler.correction().yaw, yaw_quat(35.0));
        assert_quat(once.reconciler.correction().yaw, yaw_quat(25.0));
        assert_ne!(twice.reconciler.correction().yaw, once.reconciler.correction().yaw);
    }

    #[tokio::test]
    async fn pitch_composes_on_the_right() {
        let mut rig = rig().await;
        let pitch = Quaternion::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), 0.1);
        let resp = LocalizationResponse::success(
            14,
            ResponseOffsets {
                position: FIX,
                yaw_offset: yaw_quat(20.0),
                pitch_offset: pitch,
            },
        );
        rig.imu.set_yaw(-45.0);
        rig.reconciler.apply_response(&resp).unwrap();

        let sensor = yaw_quat(-45.0);
        let expected = yaw_quat(20.0).compose(sensor).compose(pitch);
        assert_quat(rig.reconciler.corrected_orientation().unwrap(), expected);

        let offset = rig.reconciler.orientation_offset().unwrap();
        assert_quat(offset.compose(sensor), expected);
    }

    #[tokio::test]
    async fn error_response_leaves_correction_untouched() {
        let mut rig = rig().await;
        let resp = LocalizationResponse::failure(14, 5, "not enough features");
        assert_eq!(
            rig.reconciler.apply_response(&resp),
            Err(VantageError::LocalizationFailed {
                code: 5,
                message: "not enough features".to_string()
            })
        );
        assert!(!rig.reconciler.is_localized());
        assert_eq!(*rig.reconciler.correction(), OffsetCorrection::default());
    }

    #[tokio::test]
    async fn tracking_origin_is_snapshotted() {
        let mut rig = rig().await;
        rig.imu.set_reading(ImuReading {
            orientation: Quaternion::identity(),
            position: Vec3::new(2.0, 3.0, 0.5),
        });
        rig.reconciler.apply_response(&response(0.0, FIX)).unwrap();

        // Walking 4 m east after localization moves the camera 4 m east.
        rig.imu.set_reading(ImuReading {
            orientation: Quaternion::identity(),
            position: Vec3::new(6.0, 3.0, 0.5),
        });
        let origin = rig.reconciler.location_offset().unwrap();
        let pose = rig.reconciler.camera_transform().unwrap();
        let render_origin = world_to_render_position(origin);
        assert!((pose.position.x - render_origin.x - 6.0).abs() < 1e-9);

        let moved = rig.reconciler.camera_location().unwrap();
        let east = rig.reconciler.geo.to_local(moved).unwrap();
        assert!((east.x - 4.0).abs() < 1e-2, "east={}", east.x);
    }

    #[tokio::test]
    async fn reset_restores_identity() {
        let mut rig = rig().await;
        rig.reconciler.apply_response(&response(10.0, FIX)).unwrap();
        rig.reconciler.reset();
        assert!(!rig.reconciler.is_localized());
        assert_eq!(rig.reconciler.correction().yaw, Quaternion::identity());
    }

    #[tokio::test]
    async fn frame_request_carries_sensor_snapshot() {
        let rig = rig().await;
        rig.imu.set_yaw(15.0);
        let req = rig
            .reconciler
            .frame_request(34, CaptureTrigger { count: 8, order: 2 })
            .unwrap();
        assert_eq!(req.request_id, 34);
        assert_eq!(req.external.position, FIX);
        assert_quat(req.external.orientation, yaw_quat(15.0));
        assert_eq!((req.total_frames, req.frame_order), (8, 2));
        assert_eq!(req.internal.scene_width, 2);
        assert_eq!(req.source_image.len(), 12);
        assert!(req.tracking_id.is_empty());
    }

    #[tokio::test]
    async fn missing_reference_surfaces() {
        let imu = Arc::new(MockImu::default());
        let sensors = SensorSet::new(
            imu,
            Arc::new(MockGps::new(FIX)),
            Arc::new(MockVideo::default()),
        );
        sensors.init_all().await.unwrap();
        let reconciler = PoseReconciler::new(sensors, Arc::new(GeoTransform::new()));
        assert_eq!(reconciler.location_offset(), Err(VantageError::ReferenceNotSet));
    }
}
