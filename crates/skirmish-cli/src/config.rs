//! Service configuration – reads `~/.skirmish/config.toml`.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, `SKIRMISH_*`
//! environment variables, then command-line flags (applied in `main`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skirmish_policy::{ModelSettings, PolicyKind};
use skirmish_server::DEFAULT_PORT;
use skirmish_types::SkirmishError;

/// Service settings, as stored in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port on the loopback interface.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Requested policy.
    #[serde(default)]
    pub policy: PolicyKind,

    /// Bound on a connection's read phase; `0` disables it.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// External model endpoint, used when `policy = "model"`.
    #[serde(default)]
    pub model: ModelSettings,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_read_timeout_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            policy: PolicyKind::default(),
            read_timeout_ms: default_read_timeout_ms(),
            model: ModelSettings::default(),
        }
    }
}

impl Config {
    /// The read timeout, or `None` when disabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

/// Return the path to `~/.skirmish/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".skirmish").join("config.toml")
}

/// Resolve the effective config.
///
/// An explicit `path` must exist. The default path is optional: when it is
/// absent the built-in defaults are used. Env overrides apply either way.
pub fn resolve(path: Option<&Path>) -> Result<Config, SkirmishError> {
    let mut cfg = match path {
        Some(p) => load_from(p)?
            .ok_or_else(|| SkirmishError::Config(format!("config not found at {}", p.display())))?,
        None => load_from(&config_path())?.unwrap_or_default(),
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path. Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, SkirmishError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        SkirmishError::Config(format!("failed to read config at {}: {}", path.display(), e))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| SkirmishError::Config(format!("failed to parse config: {}", e)))?;
    Ok(Some(cfg))
}

/// Apply `SKIRMISH_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SKIRMISH_PORT` | `port` |
/// | `SKIRMISH_POLICY` | `policy` |
/// | `SKIRMISH_READ_TIMEOUT_MS` | `read_timeout_ms` |
/// | `SKIRMISH_MODEL_ENDPOINT` | `model.endpoint` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SKIRMISH_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("SKIRMISH_POLICY")
        && let Ok(kind) = v.parse::<PolicyKind>()
    {
        cfg.policy = kind;
    }
    if let Ok(v) = std::env::var("SKIRMISH_READ_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.read_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("SKIRMISH_MODEL_ENDPOINT") {
        cfg.model.endpoint = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = config_path_for_home(&dir.path().to_string_lossy());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_match_service_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 12345);
        assert_eq!(cfg.policy, PolicyKind::Heuristic);
        assert_eq!(cfg.read_timeout(), Some(Duration::from_secs(30)));
        assert!(!cfg.model.route_decisions);
    }

    #[test]
    fn zero_read_timeout_disables_it() {
        let cfg = Config {
            read_timeout_ms: 0,
            ..Config::default()
        };
        assert_eq!(cfg.read_timeout(), None);
    }

    #[test]
    fn config_path_points_to_skirmish_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".skirmish"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_parses_full_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write_config(
            &dir,
            r#"
port = 4000
policy = "vpt"
read_timeout_ms = 500

[model]
endpoint = "http://gpu-box:9000"
name = "shoot_animals_2x"
route_decisions = true
"#,
        );
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.policy, PolicyKind::Model);
        assert_eq!(cfg.read_timeout_ms, 500);
        assert_eq!(cfg.model.endpoint, "http://gpu-box:9000");
        assert_eq!(cfg.model.name, "shoot_animals_2x");
        assert_eq!(cfg.model.timeout_ms, 2000);
        assert!(cfg.model.route_decisions);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write_config(&dir, "port = 5555\n");
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.port, 5555);
        assert_eq!(cfg.policy, PolicyKind::Heuristic);
        assert_eq!(cfg.model, ModelSettings::default());
    }

    #[test]
    fn invalid_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write_config(&dir, "policy = \"neural\"\n");
        assert!(matches!(load_from(&path), Err(SkirmishError::Config(_))));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nope.toml");
        assert!(matches!(resolve(Some(&path)), Err(SkirmishError::Config(_))));
    }

    // Every env-var assertion lives in one test so parallel tests never race
    // on the process environment.
    #[test]
    fn apply_env_overrides_reads_skirmish_vars() {
        // SAFETY: the only test in this crate that touches these variables.
        unsafe {
            std::env::set_var("SKIRMISH_PORT", "4242");
            std::env::set_var("SKIRMISH_POLICY", "model");
            std::env::set_var("SKIRMISH_READ_TIMEOUT_MS", "not-a-number");
            std::env::set_var("SKIRMISH_MODEL_ENDPOINT", "http://robot-host:8765");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 4242);
        assert_eq!(cfg.policy, PolicyKind::Model);
        assert_eq!(cfg.read_timeout_ms, 30_000, "invalid value is ignored");
        assert_eq!(cfg.model.endpoint, "http://robot-host:8765");

        unsafe { std::env::set_var("SKIRMISH_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 12345);

        unsafe {
            std::env::remove_var("SKIRMISH_PORT");
            std::env::remove_var("SKIRMISH_POLICY");
            std::env::remove_var("SKIRMISH_READ_TIMEOUT_MS");
            std::env::remove_var("SKIRMISH_MODEL_ENDPOINT");
        }
    }
}
