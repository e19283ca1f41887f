//! [`LocalizationSession`] – bootstrap state machine and scan driver.
//!
//! A session walks a fixed chain of async steps before it is usable:
//!
//! ```text
//! Uninitialized → ValidatingToken → StartingSensors → CheckingCoverage
//!               → LoadingMesh → StartingTransport → Ready
//! ```
//!
//! Any failure moves the session to `Error`; overrunning the start-up
//! budget moves it to `Timeout`. Both are terminal. Once `Ready`, each call
//! to [`LocalizationSession::localize`] runs one multi-frame scan and folds
//! the service's correction into the [`PoseReconciler`].
//!
//! Progress is published on the [`EventBus`] (`Topic::Session` for the
//! bootstrap, `Topic::Localization` for scans) and mirrored in a
//! `watch` channel for callers that only care about the current state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vantage_geo::{GeoTransform, Pose};
use vantage_sensors::SensorSet;
use vantage_transport::{
    EventBus, LocalizationChannel, LocalizationResponse, LocalizationSocket, MessageType,
    SocketConfig, Topic,
};
use vantage_types::{Event, EventPayload, GeoPosition, SessionState, VantageError};

use crate::reconciler::PoseReconciler;
use crate::scan::{DEFAULT_TARGET_COUNT, ScanConfig, ScanProtocol};
use crate::vps_client::{VpsApi, VpsClient};

const SOURCE: &str = "vantage-runtime::session";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub access_key: String,
    /// REST root, e.g. `https://api.sturfee.com/api/0.2.0`.
    pub api_base_url: String,
    /// WebSocket root the alignment socket hangs off.
    pub ws_base_url: String,
    /// Budget from [`LocalizationSession::start`] to `Ready`.
    pub session_timeout: Duration,
    pub connect_timeout: Duration,
    /// `None` waits on a response for as long as the socket stays open.
    pub request_timeout: Option<Duration>,
    /// Radius in metres of the environment mesh tile.
    pub mesh_radius: u32,
    pub landscape: bool,
    pub scan_target_count: u32,
    /// How often the scan loop samples the heading.
    pub scan_poll_interval: Duration,
    /// Render-space height of the camera before the first localization.
    pub camera_elevation: f64,
    /// The environment mesh hides virtual content behind real geometry.
    pub enable_occlusion: bool,
    /// Draw the environment mesh half-transparent instead of invisible.
    pub show_environment_mesh: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            api_base_url: "https://api.sturfee.com/api/0.2.0".to_string(),
            ws_base_url: "wss://api.sturfee.com/api/0.2.0".to_string(),
            session_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(20),
            request_timeout: Some(Duration::from_secs(10)),
            mesh_radius: 300,
            landscape: false,
            scan_target_count: DEFAULT_TARGET_COUNT,
            scan_poll_interval: Duration::from_millis(16),
            camera_elevation: 0.0,
            enable_occlusion: true,
            show_environment_mesh: false,
        }
    }
}

impl SessionConfig {
    fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            target_count: self.scan_target_count,
            ..ScanConfig::for_orientation(self.landscape)
        }
    }
}

/// Material settings for the environment mesh, read by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshStyle {
    pub depth_test: bool,
    /// 0 keeps the mesh invisible; it still occludes when `depth_test` is set.
    pub opacity: f32,
}

impl MeshStyle {
    const VISIBLE_OPACITY: f32 = 0.5;

    pub fn new(enable_occlusion: bool, show_environment_mesh: bool) -> Self {
        Self {
            depth_test: enable_occlusion,
            opacity: if show_environment_mesh {
                Self::VISIBLE_OPACITY
            } else {
                0.0
            },
        }
    }
}

/// Builds the localization channel once the session knows its GPS fix.
pub type ChannelFactory =
    Box<dyn Fn(GeoPosition) -> Arc<dyn LocalizationChannel> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// LocalizationSession
// ─────────────────────────────────────────────────────────────────────────────

pub struct LocalizationSession {
    config: SessionConfig,
    sensors: SensorSet,
    api: Arc<dyn VpsApi>,
    make_channel: ChannelFactory,
    channel: OnceLock<Arc<dyn LocalizationChannel>>,
    bus: EventBus,
    geo: Arc<GeoTransform>,
    reconciler: Mutex<PoseReconciler>,
    state: watch::Sender<SessionState>,
    request_counter: AtomicU64,
    mesh: OnceLock<serde_json::Value>,
}

impl LocalizationSession {
    /// Assemble a session from explicit collaborators.
    pub fn new(
        config: SessionConfig,
        sensors: SensorSet,
        api: Arc<dyn VpsApi>,
        make_channel: ChannelFactory,
        bus: EventBus,
    ) -> Self {
        let geo = Arc::new(GeoTransform::new());
        let reconciler = PoseReconciler::new(sensors.clone(), Arc::clone(&geo))
            .with_camera_elevation(config.camera_elevation);
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            config,
            sensors,
            api,
            make_channel,
            channel: OnceLock::new(),
            bus,
            geo,
            reconciler: Mutex::new(reconciler),
            state,
            request_counter: AtomicU64::new(0),
            mesh: OnceLock::new(),
        }
    }

    /// A session wired to the hosted service over HTTP and WebSocket.
    pub fn connect_to_service(
        config: SessionConfig,
        sensors: SensorSet,
        bus: EventBus,
    ) -> Result<Self, VantageError> {
        let api = VpsClient::new(config.api_base_url.clone(), config.access_key.clone())
            .with_timeout(config.session_timeout)?;

        let ws_base = config.ws_base_url.clone();
        let token = config.access_key.clone();
        let connect_timeout = config.connect_timeout;
        let request_timeout = config.request_timeout;
        let make_channel: ChannelFactory = Box::new(move |fix| {
            let socket_config = SocketConfig::alignment(&ws_base, fix, &token)
                .with_connect_timeout(connect_timeout)
                .with_request_timeout(request_timeout);
            Arc::new(LocalizationSocket::new(socket_config))
        });

        Ok(Self::new(config, sensors, Arc::new(api), make_channel, bus))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Accessors
    // ────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Follow state changes without subscribing to the event bus.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn geo(&self) -> &Arc<GeoTransform> {
        &self.geo
    }

    /// The environment mesh tile, once loaded.
    pub fn mesh(&self) -> Option<&serde_json::Value> {
        self.mesh.get()
    }

    pub fn mesh_style(&self) -> MeshStyle {
        MeshStyle::new(self.config.enable_occlusion, self.config.show_environment_mesh)
    }

    pub fn is_localized(&self) -> bool {
        self.reconciler().is_localized()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Bootstrap
    // ────────────────────────────────────────────────────────────────────────

    /// Run the bootstrap chain up to `Ready`.
    ///
    /// # Errors
    ///
    /// * [`VantageError::InvalidToken`] – no access key, or the service
    ///   rejected it.
    /// * [`VantageError::SessionTimeout`] – `Ready` was not reached within
    ///   the configured budget.
    /// * Any sensor, coverage or transport error raised by a step.
    ///
    /// Every failure leaves the session in a terminal state.
    pub async fn start(&self) -> Result<(), VantageError> {
        if self.state() != SessionState::Uninitialized {
            return Err(VantageError::NotReady(format!(
                "session already started ({:?})",
                self.state()
            )));
        }
        if self.config.access_key.is_empty() {
            return self.fail(SessionState::Error, VantageError::InvalidToken);
        }

        self.emit(Topic::Session, EventPayload::Initializing);
        let budget = self.config.session_timeout;
        match tokio::time::timeout(budget, self.bootstrap()).await {
            Ok(Ok(())) => {
                self.transition(SessionState::Ready);
                self.emit(Topic::Session, EventPayload::Ready);
                info!("localization session ready");
                Ok(())
            }
            Ok(Err(e)) => self.fail(SessionState::Error, e),
            Err(_) => self.fail(
                SessionState::Timeout,
                VantageError::SessionTimeout(budget.as_secs()),
            ),
        }
    }

    async fn bootstrap(&self) -> Result<(), VantageError> {
        self.transition(SessionState::ValidatingToken);
        self.api.validate_token().await?;

        self.transition(SessionState::StartingSensors);
        self.sensors.init_all().await?;
        let reading = self.sensors.gps.current_reading()?;
        let fix = reading.position;
        info!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            accuracy = ?reading.accuracy,
            "gps fix acquired"
        );

        self.transition(SessionState::CheckingCoverage);
        self.api.check_coverage(fix).await?;

        self.transition(SessionState::LoadingMesh);
        let mesh = self.api.load_mesh(fix, self.config.mesh_radius).await?;
        let bytes = mesh.to_string().len();
        let _ = self.mesh.set(mesh);
        self.emit(Topic::Session, EventPayload::MeshDataLoaded { bytes });
        self.geo.set_reference(fix);

        self.transition(SessionState::StartingTransport);
        let channel = (self.make_channel)(fix);
        channel.connect().await?;
        let _ = self.channel.set(channel);
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Localization
    // ────────────────────────────────────────────────────────────────────────

    /// Run one scan and apply the service's correction.
    ///
    /// The caller is expected to prompt the user to turn the device; this
    /// future resolves once every target angle has been crossed and the
    /// service has answered. A failure leaves the previous correction in
    /// place and does not retry.
    pub async fn localize(&self) -> Result<LocalizationResponse, VantageError> {
        let state = self.state();
        if !state.is_ready() {
            return Err(VantageError::NotReady(format!("session is {state:?}")));
        }
        if state == SessionState::Localizing {
            return Err(VantageError::NotReady("a scan is already running".to_string()));
        }
        let channel = self
            .channel
            .get()
            .cloned()
            .ok_or_else(|| VantageError::NotReady("localization channel".to_string()))?;

        self.transition(SessionState::Localizing);
        match self.scan(channel.as_ref()).await {
            Ok(response) => {
                self.transition(SessionState::Localized);
                self.emit(
                    Topic::Localization,
                    EventPayload::LocalizationComplete {
                        request_id: response.request_id,
                    },
                );
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "localization failed");
                let fallback = if self.is_localized() {
                    SessionState::Localized
                } else {
                    SessionState::Ready
                };
                self.transition(fallback);
                let (code, message) = match &e {
                    VantageError::LocalizationFailed { code, message } => (*code, message.clone()),
                    other => (-1, other.to_string()),
                };
                self.emit(
                    Topic::Localization,
                    EventPayload::LocalizationFailed { code, message },
                );
                Err(e)
            }
        }
    }

    async fn scan(
        &self,
        channel: &dyn LocalizationChannel,
    ) -> Result<LocalizationResponse, VantageError> {
        let counter = self.request_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let request_id = MessageType::StaticMultiframe.request_id(counter);
        let mut scan = ScanProtocol::start(self.config.scan_config(), self.current_yaw()?);
        info!(request_id, targets = scan.config().target_count, "scan started");

        let mut ticker = tokio::time::interval(self.config.scan_poll_interval);
        while !scan.is_complete() {
            ticker.tick().await;
            let Some(trigger) = scan.update(self.current_yaw()?) else {
                continue;
            };
            let request = self.reconciler().frame_request(request_id, trigger)?;
            channel.send_frame(&request).await?;
            debug!(request_id, order = trigger.order, "frame submitted");
            self.emit(
                Topic::Localization,
                EventPayload::FrameCaptured {
                    request_id,
                    order: trigger.order,
                    count: trigger.count,
                },
            );
        }

        self.emit(Topic::Localization, EventPayload::LocalizationLoading);
        let response = channel.await_response(request_id).await?;
        self.reconciler().apply_response(&response)?;
        Ok(response)
    }

    fn current_yaw(&self) -> Result<f64, VantageError> {
        Ok(self.reconciler().corrected_orientation()?.yaw_degrees())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Per-frame outputs
    // ────────────────────────────────────────────────────────────────────────

    /// Camera pose in render space. Never suspends.
    pub fn camera_transform(&self) -> Result<Pose, VantageError> {
        self.reconciler().camera_transform()
    }

    /// Corrected geodetic location of the device.
    pub fn camera_location(&self) -> Result<GeoPosition, VantageError> {
        self.reconciler().camera_location()
    }

    /// Drop every accumulated correction. A `Localized` session falls back
    /// to `Ready`.
    pub fn reset(&self) {
        self.reconciler().reset();
        if self.state() == SessionState::Localized {
            self.transition(SessionState::Ready);
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ────────────────────────────────────────────────────────────────────────

    fn reconciler(&self) -> MutexGuard<'_, PoseReconciler> {
        self.reconciler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        debug!(from = ?previous, to = ?next, "session state");
        self.emit(Topic::Session, EventPayload::StateChanged(next));
    }

    fn emit(&self, topic: Topic, payload: EventPayload) {
        self.bus.notify(topic, Event::new(SOURCE, payload));
    }

    fn fail(&self, terminal: SessionState, e: VantageError) -> Result<(), VantageError> {
        error!(error = %e, state = ?terminal, "session bootstrap failed");
        self.transition(terminal);
        self.emit(
            Topic::Session,
            EventPayload::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        );
        Err(e)
    }
}

impl std::fmt::Debug for LocalizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizationSession")
            .field("state", &self.state())
            .field("sensors", &self.sensors)
            .field("requests", &self.request_counter.load(Ordering::Relaxed))
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vantage_geo::Quaternion;
    use vantage_sensors::{MockGps, MockImu, MockVideo};
    use vantage_transport::{LocalizationRequest, ResponseOffsets};

    const FIX: GeoPosition = GeoPosition {
        latitude: 35.6812,
        longitude: 139.7671,
        altitude: 40.0,
    };

    struct FakeApi {
        token_ok: bool,
        covered: bool,
        mesh_delay: Duration,
    }

    impl Default for FakeApi {
        fn default() -> Self {
            Self {
                token_ok: true,
                covered: true,
                mesh_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl VpsApi for FakeApi {
        async fn validate_token(&self) -> Result<(), VantageError> {
            if self.token_ok {
                Ok(())
            } else {
                Err(VantageError::InvalidToken)
            }
        }

        async fn check_coverage(&self, fix: GeoPosition) -> Result<(), VantageError> {
            if self.covered {
                Ok(())
            } else {
                Err(VantageError::CoverageUnavailable {
                    latitude: fix.latitude,
                    longitude: fix.longitude,
                })
            }
        }

        async fn load_mesh(
            &self,
            _fix: GeoPosition,
            _radius: u32,
        ) -> Result<serde_json::Value, VantageError> {
            tokio::time::sleep(self.mesh_delay).await;
            Ok(serde_json::json!({ "asset": { "version": "2.0" } }))
        }
    }

    type Responder = Box<dyn Fn(u64) -> LocalizationResponse + Send + Sync>;

    /// Records every frame and answers with whatever `respond` builds.
    struct ScriptedChannel {
        sent: Mutex<Vec<LocalizationRequest>>,
        respond: Responder,
    }

    impl ScriptedChannel {
        fn new(respond: Responder) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                respond,
            })
        }

        fn sent(&self) -> Vec<LocalizationRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LocalizationChannel for ScriptedChannel {
        async fn connect(&self) -> Result<(), VantageError> {
            Ok(())
        }

        async fn send_frame(&self, request: &LocalizationRequest) -> Result<(), VantageError> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn await_response(
            &self,
            request_id: u64,
        ) -> Result<LocalizationResponse, VantageError> {
            Ok((self.respond)(request_id))
        }
    }

    fn success(request_id: u64) -> LocalizationResponse {
        LocalizationResponse::success(
            request_id,
            ResponseOffsets {
                position: GeoPosition::new(35.6813, 139.7672, 41.0),
                yaw_offset: Quaternion::from_axis_angle(
                    vantage_geo::Vec3::new(0.0, 0.0, 1.0),
                    10f64.to_radians(),
                ),
                pitch_offset: Quaternion::identity(),
            },
        )
    }

    struct Rig {
        session: LocalizationSession,
        imu: Arc<MockImu>,
        channel: Arc<ScriptedChannel>,
    }

    fn rig(config: SessionConfig, api: FakeApi, respond: Responder) -> Rig {
        let imu = Arc::new(MockImu::default());
        let sensors = SensorSet::new(
            imu.clone(),
            Arc::new(MockGps::new(FIX)),
            Arc::new(MockVideo::default()),
        );
        let channel = ScriptedChannel::new(respond);
        let for_factory = channel.clone();
        let make_channel: ChannelFactory =
            Box::new(move |_fix| for_factory.clone() as Arc<dyn LocalizationChannel>);
        let session = LocalizationSession::new(
            config,
            sensors,
            Arc::new(api),
            make_channel,
            EventBus::new(64),
        );
        Rig {
            session,
            imu,
            channel,
        }
    }

    fn keyed() -> SessionConfig {
        SessionConfig {
            access_key: "test-key".to_string(),
            scan_poll_interval: Duration::from_millis(1),
            ..SessionConfig::default()
        }
    }

    fn drain(rx: &mut vantage_transport::TopicReceiver) -> Vec<EventPayload> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.payload);
        }
        out
    }

    #[tokio::test]
    async fn bootstrap_walks_every_state_in_order() {
        let rig = rig(keyed(), FakeApi::default(), Box::new(success));
        let mut rx = rig.session.bus().subscribe_to(Topic::Session);

        rig.session.start().await.unwrap();
        assert_eq!(rig.session.state(), SessionState::Ready);
        assert!(rig.session.geo().has_reference());
        assert!(rig.session.mesh().is_some());

        let events = drain(&mut rx);
        let states: Vec<SessionState> = events
            .iter()
            .filter_map(|p| match p {
                EventPayload::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::ValidatingToken,
                SessionState::StartingSensors,
                SessionState::CheckingCoverage,
                SessionState::LoadingMesh,
                SessionState::StartingTransport,
                SessionState::Ready,
            ]
        );
        assert_eq!(events.first(), Some(&EventPayload::Initializing));
        assert_eq!(events.last(), Some(&EventPayload::Ready));
        assert!(
            events
                .iter()
                .any(|p| matches!(p, EventPayload::MeshDataLoaded { bytes } if *bytes > 0))
        );
    }

    #[tokio::test]
    async fn missing_access_key_is_invalid_token() {
        let rig = rig(SessionConfig::default(), FakeApi::default(), Box::new(success));
        assert_eq!(rig.session.start().await, Err(VantageError::InvalidToken));
        assert_eq!(rig.session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn rejected_token_ends_in_error_state() {
        let api = FakeApi {
            token_ok: false,
            ..FakeApi::default()
        };
        let rig = rig(keyed(), api, Box::new(success));
        let mut rx = rig.session.bus().subscribe_to(Topic::Session);

        assert_eq!(rig.session.start().await, Err(VantageError::InvalidToken));
        assert_eq!(rig.session.state(), SessionState::Error);
        let events = drain(&mut rx);
        assert!(events.iter().any(|p| matches!(
            p,
            EventPayload::Error { code, .. } if code == "invalid_token"
        )));
        assert!(!rig.session.geo().has_reference());
    }

    #[tokio::test]
    async fn uncovered_location_fails_bootstrap() {
        let api = FakeApi {
            covered: false,
            ..FakeApi::default()
        };
        let rig = rig(keyed(), api, Box::new(success));
        let err = rig.session.start().await.unwrap_err();
        assert!(matches!(err, VantageError::CoverageUnavailable { .. }));
        assert_eq!(rig.session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn slow_bootstrap_times_out() {
        let api = FakeApi {
            mesh_delay: Duration::from_secs(5),
            ..FakeApi::default()
        };
        let config = SessionConfig {
            session_timeout: Duration::from_millis(50),
            ..keyed()
        };
        let rig = rig(config, api, Box::new(success));
        assert_eq!(rig.session.start().await, Err(VantageError::SessionTimeout(0)));
        assert_eq!(rig.session.state(), SessionState::Timeout);
        assert!(rig.session.state().is_terminal());
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let rig = rig(keyed(), FakeApi::default(), Box::new(success));
        rig.session.start().await.unwrap();
        assert!(matches!(
            rig.session.start().await,
            Err(VantageError::NotReady(_))
        ));
        assert_eq!(rig.session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn localize_before_ready_is_not_ready() {
        let rig = rig(keyed(), FakeApi::default(), Box::new(success));
        assert!(matches!(
            rig.session.localize().await,
            Err(VantageError::NotReady(_))
        ));
        assert!(rig.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn full_scan_submits_eight_frames_under_one_request_id() {
        let rig = rig(keyed(), FakeApi::default(), Box::new(success));
        rig.session.start().await.unwrap();
        let mut rx = rig.session.bus().subscribe_to(Topic::Localization);

        // Start turning once the first frame has gone out.
        let imu = rig.imu.clone();
        let mut frames = rig.session.bus().subscribe_to(Topic::Localization);
        let rotator = tokio::spawn(async move {
            while let Ok(event) = frames.recv().await {
                if matches!(event.payload, EventPayload::FrameCaptured { .. }) {
                    break;
                }
            }
            for step in 1..=212 {
                imu.set_yaw(-f64::from(step));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let response = rig.session.localize().await.unwrap();
        rotator.await.unwrap();

        assert_eq!(response.request_id, 14);
        assert_eq!(rig.session.state(), SessionState::Localized);
        assert!(rig.session.is_localized());

        let sent = rig.channel.sent();
        assert_eq!(sent.len(), 8);
        for (i, request) in sent.iter().enumerate() {
            assert_eq!(request.request_id, 14);
            assert_eq!(request.frame_order, i as u32);
            assert_eq!(request.total_frames, 8);
        }

        let events = drain(&mut rx);
        let captured = events
            .iter()
            .filter(|p| matches!(p, EventPayload::FrameCaptured { .. }))
            .count();
        assert_eq!(captured, 8);
        let loading = events
            .iter()
            .position(|p| *p == EventPayload::LocalizationLoading)
            .unwrap();
        let complete = events
            .iter()
            .position(|p| *p == EventPayload::LocalizationComplete { request_id: 14 })
            .unwrap();
        assert!(loading < complete);
    }

    #[tokio::test]
    async fn request_ids_advance_per_scan() {
        let config = SessionConfig {
            scan_target_count: 1,
            ..keyed()
        };
        let rig = rig(config, FakeApi::default(), Box::new(success));
        rig.session.start().await.unwrap();

        assert_eq!(rig.session.localize().await.unwrap().request_id, 14);
        assert_eq!(rig.session.localize().await.unwrap().request_id, 24);
        let ids: Vec<u64> = rig.channel.sent().iter().map(|r| r.request_id).collect();
        assert_eq!(ids, vec![14, 24]);
    }

    #[tokio::test]
    async fn service_error_is_surfaced_without_retry() {
        let config = SessionConfig {
            scan_target_count: 1,
            ..keyed()
        };
        let rig = rig(
            config,
            FakeApi::default(),
            Box::new(|id| LocalizationResponse::failure(id, 3, "no features")),
        );
        rig.session.start().await.unwrap();
        let mut rx = rig.session.bus().subscribe_to(Topic::Localization);

        let err = rig.session.localize().await.unwrap_err();
        assert_eq!(
            err,
            VantageError::LocalizationFailed {
                code: 3,
                message: "no features".to_string()
            }
        );
        assert_eq!(rig.session.state(), SessionState::Ready);
        assert!(!rig.session.is_localized());
        assert_eq!(rig.channel.sent().len(), 1);

        let events = drain(&mut rx);
        assert!(events.contains(&EventPayload::LocalizationFailed {
            code: 3,
            message: "no features".to_string()
        }));
    }

    #[tokio::test]
    async fn reset_returns_localized_session_to_ready() {
        let config = SessionConfig {
            scan_target_count: 1,
            ..keyed()
        };
        let rig = rig(config, FakeApi::default(), Box::new(success));
        rig.session.start().await.unwrap();
        rig.session.localize().await.unwrap();
        assert_eq!(rig.session.state(), SessionState::Localized);

        rig.session.reset();
        assert_eq!(rig.session.state(), SessionState::Ready);
        assert!(!rig.session.is_localized());
        assert_eq!(rig.session.camera_location().unwrap(), FIX);
    }

    #[test]
    fn mesh_style_follows_the_display_flags() {
        assert_eq!(
            MeshStyle::new(true, false),
            MeshStyle {
                depth_test: true,
                opacity: 0.0
            }
        );
        assert_eq!(
            MeshStyle::new(false, true),
            MeshStyle {
                depth_test: false,
                opacity: 0.5
            }
        );

        let config = SessionConfig {
            show_environment_mesh: true,
            ..keyed()
        };
        let rig = rig(config, FakeApi::default(), Box::new(success));
        assert_eq!(rig.session.mesh_style(), MeshStyle::new(true, true));
    }

    #[tokio::test]
    async fn camera_transform_is_available_once_ready() {
        let rig = rig(keyed(), FakeApi::default(), Box::new(success));
        assert!(rig.session.camera_transform().is_err());
        rig.session.start().await.unwrap();
        let pose = rig.session.camera_transform().unwrap();
        assert!(pose.position.x.abs() < 1e-6);
        assert!(pose.position.z.abs() < 1e-6);
    }
}
