//! Configuration Vault – reads/writes `~/.vantage/config.toml`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroize;

use vantage_runtime::SessionConfig;
use vantage_stream::PlayerConfig;
use vantage_types::GeoPosition;

/// Where GPS fixes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum GpsProvider {
    /// Fed by the host platform's location service.
    Device,
    /// A fixed position taken from `mock_latitude` / `mock_longitude`.
    #[default]
    Mock,
}

impl std::fmt::Display for GpsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpsProvider::Device => write!(f, "device"),
            GpsProvider::Mock => write!(f, "mock"),
        }
    }
}

/// Persisted user configuration stored in `~/.vantage/config.toml`.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Token for the positioning service. Stored as plain text; the file is
    /// written owner-only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_key: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    #[serde(default)]
    pub gps_provider: GpsProvider,

    #[serde(default = "default_mock_latitude")]
    pub mock_latitude: f64,

    #[serde(default = "default_mock_longitude")]
    pub mock_longitude: f64,

    #[serde(default)]
    pub mock_altitude: f64,

    #[serde(default = "default_true")]
    pub enable_occlusion: bool,

    #[serde(default)]
    pub show_environment_mesh: bool,

    #[serde(default)]
    pub landscape: bool,

    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Per-request wait on a localization response. 0 disables it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Radius in metres of the environment mesh tile.
    #[serde(default = "default_mesh_radius")]
    pub mesh_radius: u32,

    /// Bytes per bulk range request when streaming volumetric video.
    #[serde(default = "default_stream_cache_budget")]
    pub stream_cache_budget: u64,

    #[serde(default = "default_decoder_cache_size")]
    pub decoder_cache_size: usize,

    #[serde(default)]
    pub keep_chunks_in_cache: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "access_key",
                if self.access_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("api_base_url", &self.api_base_url)
            .field("ws_base_url", &self.ws_base_url)
            .field("gps_provider", &self.gps_provider)
            .field("mock_latitude", &self.mock_latitude)
            .field("mock_longitude", &self.mock_longitude)
            .field("mock_altitude", &self.mock_altitude)
            .field("enable_occlusion", &self.enable_occlusion)
            .field("show_environment_mesh", &self.show_environment_mesh)
            .field("landscape", &self.landscape)
            .field("session_timeout_secs", &self.session_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("mesh_radius", &self.mesh_radius)
            .field("stream_cache_budget", &self.stream_cache_budget)
            .field("decoder_cache_size", &self.decoder_cache_size)
            .field("keep_chunks_in_cache", &self.keep_chunks_in_cache)
            .finish()
    }
}

// Struct-update syntax is unavailable on `Config` because of this impl.
impl Drop for Config {
    fn drop(&mut self) {
        self.access_key.zeroize();
    }
}

fn default_api_base_url() -> String {
    "https://api.sturfee.com/api/0.2.0".to_string()
}
fn default_ws_base_url() -> String {
    "wss://api.sturfee.com/api/0.2.0".to_string()
}
fn default_mock_latitude() -> f64 {
    37.7749
}
fn default_mock_longitude() -> f64 {
    -122.4194
}
fn default_true() -> bool {
    true
}
fn default_session_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    20
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_mesh_radius() -> u32 {
    300
}
fn default_stream_cache_budget() -> u64 {
    vantage_stream::DEFAULT_CACHE_BUDGET
}
fn default_decoder_cache_size() -> usize {
    vantage_stream::DEFAULT_DECODED_CACHE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            api_base_url: default_api_base_url(),
            ws_base_url: default_ws_base_url(),
            gps_provider: GpsProvider::default(),
            mock_latitude: default_mock_latitude(),
            mock_longitude: default_mock_longitude(),
            mock_altitude: 0.0,
            enable_occlusion: true,
            show_environment_mesh: false,
            landscape: false,
            session_timeout_secs: default_session_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            mesh_radius: default_mesh_radius(),
            stream_cache_budget: default_stream_cache_budget(),
            decoder_cache_size: default_decoder_cache_size(),
            keep_chunks_in_cache: false,
        }
    }
}

impl Config {
    pub fn mock_fix(&self) -> GeoPosition {
        GeoPosition::new(self.mock_latitude, self.mock_longitude, self.mock_altitude)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            access_key: self.access_key.clone(),
            api_base_url: self.api_base_url.clone(),
            ws_base_url: self.ws_base_url.clone(),
            session_timeout: Duration::from_secs(self.session_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: (self.request_timeout_secs > 0)
                .then(|| Duration::from_secs(self.request_timeout_secs)),
            mesh_radius: self.mesh_radius,
            landscape: self.landscape,
            enable_occlusion: self.enable_occlusion,
            show_environment_mesh: self.show_environment_mesh,
            ..SessionConfig::default()
        }
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            cache_budget: self.stream_cache_budget,
            decoder_cache_size: self.decoder_cache_size,
            keep_chunks_in_cache: self.keep_chunks_in_cache,
            ..PlayerConfig::default()
        }
    }
}

/// JSON schema of [`Config`], pretty-printed.
pub fn schema() -> Result<String, String> {
    let schema = schemars::schema_for!(Config);
    serde_json::to_string_pretty(&schema).map_err(|e| format!("Failed to render schema: {}", e))
}

/// Return the path to `~/.vantage/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vantage").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VANTAGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VANTAGE_ACCESS_KEY` | `access_key` |
/// | `VANTAGE_API_URL` | `api_base_url` |
/// | `VANTAGE_WS_URL` | `ws_base_url` |
/// | `VANTAGE_MOCK_GPS_LATITUDE` | `mock_latitude` |
/// | `VANTAGE_MOCK_GPS_LONGITUDE` | `mock_longitude` |
/// | `VANTAGE_MOCK_GPS_ALTITUDE` | `mock_altitude` |
///
/// Values that do not parse as numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VANTAGE_ACCESS_KEY") {
        cfg.access_key = v;
    }
    if let Ok(v) = std::env::var("VANTAGE_API_URL") {
        cfg.api_base_url = v;
    }
    if let Ok(v) = std::env::var("VANTAGE_WS_URL") {
        cfg.ws_base_url = v;
    }
    if let Ok(v) = std::env::var("VANTAGE_MOCK_GPS_LATITUDE")
        && let Ok(lat) = v.parse::<f64>()
    {
        cfg.mock_latitude = lat;
    }
    if let Ok(v) = std::env::var("VANTAGE_MOCK_GPS_LONGITUDE")
        && let Ok(lon) = v.parse::<f64>()
    {
        cfg.mock_longitude = lon;
    }
    if let Ok(v) = std::env::var("VANTAGE_MOCK_GPS_ALTITUDE")
        && let Ok(alt) = v.parse::<f64>()
    {
        cfg.mock_altitude = alt;
    }
}

/// Save the config to disk, creating `~/.vantage/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_the_access_key() {
        let mut cfg = Config::default();
        cfg.access_key = "vps-super-secret".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("vps-super-secret"));
        assert!(debug_str.contains("<redacted>"));
        assert!(format!("{:?}", Config::default()).contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.gps_provider, GpsProvider::Mock);
        assert_eq!(loaded.session_timeout_secs, 30);
        assert_eq!(loaded.mesh_radius, 300);
        assert_eq!(loaded.decoder_cache_size, 20);
        assert!(loaded.enable_occlusion);
        assert!(!loaded.show_environment_mesh);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = toml::from_str("gps_provider = \"device\"\nlandscape = true\n").unwrap();
        assert_eq!(cfg.gps_provider, GpsProvider::Device);
        assert!(cfg.landscape);
        assert_eq!(cfg.api_base_url, "https://api.sturfee.com/api/0.2.0");
        assert_eq!(cfg.stream_cache_budget, 6_000_000);
    }

    #[test]
    fn config_path_points_to_vantage_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".vantage"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn session_config_carries_timeouts() {
        let mut cfg = Config::default();
        cfg.request_timeout_secs = 0;
        cfg.landscape = true;
        let session = cfg.session_config();
        assert_eq!(session.session_timeout, Duration::from_secs(30));
        assert_eq!(session.connect_timeout, Duration::from_secs(20));
        assert_eq!(session.request_timeout, None);
        assert!(session.landscape);
        assert_eq!(Config::default().session_config().request_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn session_config_carries_mesh_flags() {
        let defaults = Config::default().session_config();
        assert!(defaults.enable_occlusion);
        assert!(!defaults.show_environment_mesh);

        let mut cfg = Config::default();
        cfg.enable_occlusion = false;
        cfg.show_environment_mesh = true;
        let session = cfg.session_config();
        assert!(!session.enable_occlusion);
        assert!(session.show_environment_mesh);
    }

    #[test]
    fn schema_lists_the_fields() {
        let schema = schema().unwrap();
        assert!(schema.contains("access_key"));
        assert!(schema.contains("stream_cache_budget"));
        assert!(schema.contains("mock"));
    }

    // Env-var tests each use a distinct variable so they can run in parallel.

    #[test]
    fn apply_env_overrides_changes_access_key() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("VANTAGE_ACCESS_KEY", "from-env") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.access_key, "from-env");
        unsafe { std::env::remove_var("VANTAGE_ACCESS_KEY") };
    }

    #[test]
    fn apply_env_overrides_changes_mock_latitude() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("VANTAGE_MOCK_GPS_LATITUDE", "48.8566") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.mock_latitude - 48.8566).abs() < 1e-9);
        unsafe { std::env::remove_var("VANTAGE_MOCK_GPS_LATITUDE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_longitude() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("VANTAGE_MOCK_GPS_LONGITUDE", "west") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.mock_longitude, default_mock_longitude());
        unsafe { std::env::remove_var("VANTAGE_MOCK_GPS_LONGITUDE") };
    }
}
