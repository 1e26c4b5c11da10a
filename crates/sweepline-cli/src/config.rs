//! Robot configuration – reads/writes `~/.sweepline/config.toml`.
//!
//! Every field has a default, so an empty or partial file is valid.
//!
//! ```toml
//! [serial]
//! ports = ["/dev/ttyACM0", "/dev/ttyACM1"]
//! baud = 9600
//!
//! [navigation]
//! dwell_ms = 750
//!
//! [drive]
//! tolerance = 50
//!
//! [monitors]
//! window = 20
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sweepline_hal::DriveConfig;
use sweepline_kernel::MonitorConfig;
use sweepline_runtime::{CycleConfig, NavConfig};
use sweepline_types::SweepError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Candidate device paths, tried in order.
    pub ports: Vec<String>,
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            ports: vec!["/dev/ttyACM0".to_string(), "/dev/ttyACM1".to_string()],
            baud: 9600,
        }
    }
}

/// Persisted configuration stored in `~/.sweepline/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub navigation: NavConfig,
    pub drive: DriveConfig,
    pub monitors: MonitorConfig,
}

impl Config {
    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            navigation: self.navigation.clone(),
            drive: self.drive.clone(),
            monitors: self.monitors.clone(),
        }
    }
}

/// Return the path to `~/.sweepline/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sweepline").join("config.toml")
}

/// Load the config from `path` with environment overrides applied.
/// Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, SweepError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        SweepError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| SweepError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Load from `path`, falling back to defaults (plus environment overrides)
/// when the file is absent.
pub fn load_or_default(path: &Path) -> Result<Config, SweepError> {
    match load_from(path)? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Apply `SWEEPLINE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SWEEPLINE_SERIAL_PORT` | `serial.ports` (replaced by the single port) |
/// | `SWEEPLINE_BAUD` | `serial.baud` |
/// | `SWEEPLINE_DWELL_MS` | `navigation.dwell_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(port) = lookup("SWEEPLINE_SERIAL_PORT")
        && !port.is_empty()
    {
        cfg.serial.ports = vec![port];
    }
    if let Some(v) = lookup("SWEEPLINE_BAUD")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.serial.baud = baud;
    }
    if let Some(v) = lookup("SWEEPLINE_DWELL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.navigation.dwell_ms = ms;
    }
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), SweepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SweepError::Config(format!("failed to create config directory: {e}")))?;
        // Owner-only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                SweepError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| SweepError::Serialization(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| SweepError::Config(format!("failed to write {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
