//! Layered configuration – `~/.agent_arena/config.toml`, overridden by
//! `AGENT_ARENA_*` environment variables, overridden by nothing (compiled
//! defaults are the floor, not the ceiling).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted server configuration, stored at `~/.agent_arena/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bound size of the `/tick` worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Registers the `/debug/*` endpoints when true.
    #[serde(default)]
    pub enable_debug: bool,

    /// Root directory for on-disk reasoning traces. Defaults to
    /// `AGENT_ARENA_TRACES_DIR` or `~/.agent_arena/traces`, matching
    /// `arena_memory::TraceStore::shared`.
    #[serde(default)]
    pub traces_dir: Option<PathBuf>,

    /// Spatial-memory grid cell size, in world units. The grid index itself
    /// uses a fixed compile-time constant (`arena_spatial::GRID_CELL_SIZE`);
    /// this field is carried for config-surface completeness and operator
    /// visibility, not threaded into the grid.
    #[serde(default = "default_spatial_cell_size")]
    pub spatial_cell_size: f64,

    /// Ticks since last-seen before a spatial object is considered stale.
    #[serde(default = "default_spatial_stale_threshold")]
    pub spatial_stale_threshold: u64,

    /// Sliding-window memory capacity for LLM-tier behaviors.
    #[serde(default = "default_sliding_window_capacity")]
    pub sliding_window_capacity: usize,

    /// Per-agent experience log cap in spatial memory.
    #[serde(default = "default_experience_cap")]
    pub experience_cap: usize,

    /// Capacity of the in-memory debug trace ring buffer.
    #[serde(default = "default_debug_ring_capacity")]
    pub debug_ring_capacity: usize,

    /// `"compact"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_workers", &self.max_workers)
            .field("enable_debug", &self.enable_debug)
            .field("traces_dir", &self.traces_dir)
            .field("spatial_cell_size", &self.spatial_cell_size)
            .field("spatial_stale_threshold", &self.spatial_stale_threshold)
            .field("sliding_window_capacity", &self.sliding_window_capacity)
            .field("experience_cap", &self.experience_cap)
            .field("debug_ring_capacity", &self.debug_ring_capacity)
            .field("log_format", &self.log_format)
            .field("otlp_endpoint", &self.otlp_endpoint)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_model", &self.llm_model)
            .field(
                "llm_api_key",
                if self.llm_api_key.as_deref().is_some_and(|k| !k.is_empty()) {
                    &"<redacted>"
                } else {
                    &"<not set>"
                },
            )
            .finish()
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_max_workers() -> usize {
    4
}
fn default_spatial_cell_size() -> f64 {
    10.0
}
fn default_spatial_stale_threshold() -> u64 {
    100
}
fn default_sliding_window_capacity() -> usize {
    10
}
fn default_experience_cap() -> usize {
    50
}
fn default_debug_ring_capacity() -> usize {
    1000
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            max_workers: default_max_workers(),
            enable_debug: false,
            traces_dir: None,
            spatial_cell_size: default_spatial_cell_size(),
            spatial_stale_threshold: default_spatial_stale_threshold(),
            sliding_window_capacity: default_sliding_window_capacity(),
            experience_cap: default_experience_cap(),
            debug_ring_capacity: default_debug_ring_capacity(),
            log_format: default_log_format(),
            otlp_endpoint: None,
            llm_base_url: None,
            llm_model: None,
            llm_api_key: None,
        }
    }
}

/// Return the path to `~/.agent_arena/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".agent_arena").join("config.toml")
}

/// Load the config, applying environment overrides. Returns compiled
/// defaults (with overrides applied) if no file exists at [`config_path`].
pub fn load() -> Result<Config, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Config, String> {
    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {e}"))?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `AGENT_ARENA_*` environment variable overrides to `cfg`. Config
/// layering order: env overrides file, file overrides compiled defaults.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("AGENT_ARENA_HOST") {
        cfg.host = v;
    }
    if let Ok(v) = std::env::var("AGENT_ARENA_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("AGENT_ARENA_MAX_WORKERS")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.max_workers = n;
    }
    if let Ok(v) = std::env::var("AGENT_ARENA_ENABLE_DEBUG") {
        cfg.enable_debug = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = std::env::var("AGENT_ARENA_TRACES_DIR") {
        cfg.traces_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("AGENT_ARENA_LOG_FORMAT") {
        cfg.log_format = v;
    }
    if let Ok(v) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        cfg.otlp_endpoint = Some(v);
    }
    if let Ok(v) = std::env::var("AGENT_ARENA_LLM_BASE_URL") {
        cfg.llm_base_url = Some(v);
    }
    if let Ok(v) = std::env::var("AGENT_ARENA_LLM_MODEL") {
        cfg.llm_model = Some(v);
    }
    if let Ok(v) = std::env::var("AGENT_ARENA_LLM_API_KEY") {
        cfg.llm_api_key = Some(v);
    }
}

/// Save the config to disk, creating `~/.agent_arena/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {e}"))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {e}"))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {e}"))?;
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
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_llm_api_key() {
        let mut cfg = Config::default();
        cfg.llm_api_key = Some("sk-super-secret".to_string());
        let debug_str = format!("{cfg:?}");
        assert!(!debug_str.contains("sk-super-secret"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn config_debug_shows_not_set_for_missing_key() {
        let cfg = Config::default();
        assert!(format!("{cfg:?}").contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok");
        assert_eq!(loaded.host, "127.0.0.1");
        assert_eq!(loaded.port, 5000);
        assert_eq!(loaded.max_workers, 4);
        assert!(!loaded.enable_debug);
    }

    #[test]
    fn config_path_points_to_agent_arena_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".agent_arena"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = load_from(&path).expect("no error");
        assert_eq!(cfg.port, 5000);
    }

    #[test]
    fn apply_env_overrides_changes_port() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("AGENT_ARENA_PORT", "9999") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 9999);
        unsafe { std::env::remove_var("AGENT_ARENA_PORT") };
    }

    #[test]
    fn apply_env_overrides_changes_enable_debug() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("AGENT_ARENA_ENABLE_DEBUG", "true") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.enable_debug);
        unsafe { std::env::remove_var("AGENT_ARENA_ENABLE_DEBUG") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_port() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("AGENT_ARENA_PORT", "not-a-port") };
        let mut cfg = Config::default();
        let original_port = cfg.port;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, original_port);
        unsafe { std::env::remove_var("AGENT_ARENA_PORT") };
    }

    #[test]
    fn apply_env_overrides_sets_llm_api_key() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("AGENT_ARENA_LLM_API_KEY", "sk-test") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.llm_api_key.as_deref(), Some("sk-test"));
        unsafe { std::env::remove_var("AGENT_ARENA_LLM_API_KEY") };
    }
}
