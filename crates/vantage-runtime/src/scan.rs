//! Multi-frame scan protocol.
//!
//! The user turns the device clockwise through a sweep of `target_count`
//! targets spaced `angle` degrees apart. Each time the accumulated sweep
//! crosses the next target a [`CaptureTrigger`] is produced; the caller
//! captures and submits a frame for it.

/// Number of frames in a scan.
pub const DEFAULT_TARGET_COUNT: u32 = 8;
/// Spacing between targets when the device is held upright.
pub const PORTRAIT_ANGLE: f64 = 30.0;
/// Spacing between targets in landscape, where the camera sees wider.
pub const LANDSCAPE_ANGLE: f64 = 40.0;

/// Slack allowed past the last target before the sweep is read as wrapping.
const CAPTURE_RANGE_SLACK: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanConfig {
    pub target_count: u32,
    /// Degrees between consecutive targets.
    pub angle: f64,
}

impl ScanConfig {
    pub fn for_orientation(landscape: bool) -> Self {
        Self {
            target_count: DEFAULT_TARGET_COUNT,
            angle: if landscape {
                LANDSCAPE_ANGLE
            } else {
                PORTRAIT_ANGLE
            },
        }
    }

    /// Degrees between the first and the last target.
    pub fn capture_range(&self) -> f64 {
        f64::from(self.target_count.saturating_sub(1)) * self.angle
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::for_orientation(false)
    }
}

/// Signed sweep from `start` to `current`, in degrees, positive clockwise.
///
/// Yaw decreases as the device turns clockwise. The raw difference is
/// folded into [-180, 180]; when the configured capture range exceeds 180°
/// a small positive difference near the end of the range is read as the
/// far side of the sweep instead.
pub fn yaw_diff(current: f64, start: f64, config: &ScanConfig) -> f64 {
    let mut diff = current - start;
    let abs = diff.abs();
    if abs > 180.0 {
        diff = if diff > 0.0 { -(360.0 - abs) } else { 360.0 - abs };
    }

    let capture_range = config.capture_range();
    if diff > 0.0
        && capture_range > 180.0
        && diff < 180.0
        && diff >= 360.0 - capture_range - CAPTURE_RANGE_SLACK
    {
        diff -= 360.0;
    }
    -diff
}

/// A target angle was reached; capture frame `order` of `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTrigger {
    pub count: u32,
    pub order: u32,
}

impl CaptureTrigger {
    /// `true` for the final frame of the scan.
    pub fn is_last(&self) -> bool {
        self.order + 1 >= self.count
    }
}

/// Tracks progress through one scan.
#[derive(Debug, Clone)]
pub struct ScanProtocol {
    config: ScanConfig,
    start_yaw: f64,
    target_index: u32,
    order: u32,
}

impl ScanProtocol {
    /// Begin a scan at heading `start_yaw`.
    pub fn start(config: ScanConfig, start_yaw: f64) -> Self {
        Self {
            config,
            start_yaw,
            target_index: 0,
            order: 0,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Feed the current heading. Yields at most one trigger per call.
    pub fn update(&mut self, current_yaw: f64) -> Option<CaptureTrigger> {
        if self.is_complete() {
            return None;
        }
        let target = f64::from(self.target_index) * self.config.angle;
        let swept = yaw_diff(current_yaw, self.start_yaw, &self.config);
        if swept < target {
            return None;
        }
        let trigger = CaptureTrigger {
            count: self.config.target_count,
            order: self.order,
        };
        self.order += 1;
        self.target_index += 1;
        Some(trigger)
    }

    pub fn is_complete(&self) -> bool {
        self.order >= self.config.target_count
    }

    pub fn captured(&self) -> u32 {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(deg: f64) -> f64 {
        let mut d = (deg + 180.0).rem_euclid(360.0) - 180.0;
        if d == -180.0 {
            d = 180.0;
        }
        d
    }

    #[test]
    fn zero_sweep_is_zero() {
        let config = ScanConfig::default();
        for theta in [-179.0, -90.0, 0.0, 45.0, 180.0] {
            assert_eq!(yaw_diff(theta, theta, &config), 0.0);
        }
    }

    #[test]
    fn wraparound_deltas_are_opposite() {
        let config = ScanConfig {
            target_count: 4,
            angle: 30.0,
        };
        let a = yaw_diff(350.0, 10.0, &config);
        let b = yaw_diff(10.0, 350.0, &config);
        assert!((a + b).abs() < 1e-9);
        assert!((a.abs() - 20.0).abs() < 1e-9);
        assert!(a.abs() <= 360.0);
    }

    #[test]
    fn clockwise_turn_is_positive() {
        let config = ScanConfig::default();
        assert!((yaw_diff(-30.0, 0.0, &config) - 30.0).abs() < 1e-9);
        assert!((yaw_diff(170.0, -170.0, &config) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn wide_capture_range_reads_far_side() {
        // 7 * 30 = 210 > 180: a 200° clockwise sweep shows up as +160.
        let config = ScanConfig::default();
        assert!((yaw_diff(wrap(-200.0), 0.0, &config) - 200.0).abs() < 1e-9);
        // Past the slack it is read as a small counter-clockwise turn.
        assert!(yaw_diff(wrap(-250.0), 0.0, &config) < 0.0);
    }

    #[test]
    fn landscape_uses_wider_steps() {
        assert_eq!(ScanConfig::for_orientation(true).angle, 40.0);
        assert_eq!(ScanConfig::for_orientation(false).angle, 30.0);
        assert_eq!(ScanConfig::default().target_count, 8);
    }

    #[test]
    fn sweep_of_245_degrees_triggers_eight_frames() {
        let config = ScanConfig::default();
        let start = 12.0;
        let mut scan = ScanProtocol::start(config, start);
        let mut triggers = Vec::new();
        for step in 0..=245 {
            let yaw = wrap(start - f64::from(step));
            if let Some(trigger) = scan.update(yaw) {
                triggers.push(trigger);
            }
        }
        assert_eq!(triggers.len(), 8);
        for (i, t) in triggers.iter().enumerate() {
            assert_eq!(t.order, i as u32);
            assert_eq!(t.count, 8);
        }
        assert!(triggers[7].is_last());
        assert!(scan.is_complete());
        assert_eq!(scan.update(wrap(start - 210.0)), None);
    }

    #[test]
    fn holding_still_captures_only_the_first_frame() {
        let mut scan = ScanProtocol::start(ScanConfig::default(), 90.0);
        assert_eq!(scan.update(90.0), Some(CaptureTrigger { count: 8, order: 0 }));
        assert_eq!(scan.update(90.0), None);
        assert_eq!(scan.captured(), 1);
    }
}
