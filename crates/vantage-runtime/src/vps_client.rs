//! [`VpsClient`] – REST side of the visual positioning service.
//!
//! Three calls gate a session: token validation, a coverage check for the
//! current fix, and the download of the environment mesh around it. All
//! three send the access token both as a query parameter and as a Bearer
//! header.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use vantage_types::{GeoPosition, VantageError};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from REST calls to the service.
#[derive(Error, Debug)]
pub enum VpsError {
    /// The HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("{endpoint} returned {status}")]
    Status { endpoint: &'static str, status: u16 },
}

impl From<VpsError> for VantageError {
    fn from(e: VpsError) -> Self {
        VantageError::Http(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// The REST calls a session bootstrap needs.
#[async_trait]
pub trait VpsApi: Send + Sync {
    /// Fails with [`VantageError::InvalidToken`] when the key is rejected.
    async fn validate_token(&self) -> Result<(), VantageError>;

    /// Fails with [`VantageError::CoverageUnavailable`] outside the service area.
    async fn check_coverage(&self, fix: GeoPosition) -> Result<(), VantageError>;

    /// Environment mesh (glTF JSON) within `radius` metres of `fix`.
    async fn load_mesh(&self, fix: GeoPosition, radius: u32) -> Result<serde_json::Value, VantageError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// VpsClient
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP implementation of [`VpsApi`].
pub struct VpsClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl VpsClient {
    /// `base_url` is the API root, e.g. `"https://api.sturfee.com/api/0.2.0"`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Give up on any single call after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, VpsError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn status_url(&self) -> String {
        format!("{}/status?token={}", self.base_url, self.token)
    }

    fn coverage_url(&self, fix: GeoPosition) -> String {
        format!(
            "{}/alignment_available/?lat={}&lng={}&token={}",
            self.base_url, fix.latitude, fix.longitude, self.token
        )
    }

    fn mesh_url(&self, fix: GeoPosition, radius: u32) -> String {
        format!(
            "{}/get_gltf/?lat={}&lng={}&radius={}&token={}",
            self.base_url, fix.latitude, fix.longitude, radius, self.token
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, VpsError> {
        debug!(url = %url.split('?').next().unwrap_or(url), "vps request");
        Ok(self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?)
    }
}

#[async_trait]
impl VpsApi for VpsClient {
    async fn validate_token(&self) -> Result<(), VantageError> {
        let response = self.get(&self.status_url()).await?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "token rejected");
            return Err(VantageError::InvalidToken);
        }
        info!("access token valid");
        Ok(())
    }

    async fn check_coverage(&self, fix: GeoPosition) -> Result<(), VantageError> {
        let response = self.get(&self.coverage_url(fix)).await?;
        if !response.status().is_success() {
            return Err(VantageError::CoverageUnavailable {
                latitude: fix.latitude,
                longitude: fix.longitude,
            });
        }
        Ok(())
    }

    async fn load_mesh(&self, fix: GeoPosition, radius: u32) -> Result<serde_json::Value, VantageError> {
        let response = self.get(&self.mesh_url(fix, radius)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VpsError::Status {
                endpoint: "get_gltf",
                status: status.as_u16(),
            }
            .into());
        }
        let mesh = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| VantageError::Decode(format!("mesh tile: {e}")))?;
        info!(radius, "mesh tile loaded");
        Ok(mesh)
    }
}
