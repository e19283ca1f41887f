//! `vantage-runtime` – pose reconciliation and the localization session.
//!
//! Everything between raw sensor readings and the camera transform handed
//! to the renderer lives here.
//!
//! # Modules
//!
//! - [`scan`] – [`ScanProtocol`][scan::ScanProtocol]: the clockwise sweep
//!   that decides when each frame of a multi-frame scan is captured, and
//!   the wraparound-aware [`yaw_diff`][scan::yaw_diff].
//! - [`reconciler`] – [`PoseReconciler`][reconciler::PoseReconciler]:
//!   accumulates the service's yaw, pitch and location corrections and
//!   derives the per-frame camera pose from them. Never suspends.
//! - [`vps_client`] – [`VpsClient`][vps_client::VpsClient]: token
//!   validation, coverage check and mesh download over HTTP.
//! - [`session`] – [`LocalizationSession`][session::LocalizationSession]:
//!   the bootstrap state machine with its 30 s budget, and the scan driver.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console or
//!   JSON logs plus optional OTLP span export.

pub mod reconciler;
pub mod scan;
pub mod session;
pub mod telemetry;
pub mod vps_client;

pub use reconciler::{OffsetCorrection, PoseReconciler};
pub use scan::{CaptureTrigger, ScanConfig, ScanProtocol, yaw_diff};
pub use session::{ChannelFactory, LocalizationSession, MeshStyle, SessionConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use vps_client::{VpsApi, VpsClient, VpsError};
