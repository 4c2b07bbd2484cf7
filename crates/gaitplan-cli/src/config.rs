//! Runtime settings – reads/writes `~/.gaitplan/config.toml`.

use gaitplan_runtime::{LogFormat, PlanSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Persisted operator configuration stored in `~/.gaitplan/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Control period in milliseconds.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Evaluation budget per tick in microseconds.  Defaults to the period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_budget_us: Option<u64>,

    /// Directories searched, in order, for plan files given by relative name.
    #[serde(default = "default_plan_search_path")]
    pub plan_search_path: Vec<PathBuf>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Ticks `run` keeps retrying `start()` before giving up.
    #[serde(default = "default_start_timeout_ticks")]
    pub start_timeout_ticks: u64,
}

fn default_tick_period_ms() -> u64 {
    5
}
fn default_plan_search_path() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}
fn default_start_timeout_ticks() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            deadline_budget_us: None,
            plan_search_path: default_plan_search_path(),
            log_format: LogFormat::default(),
            start_timeout_ticks: default_start_timeout_ticks(),
        }
    }
}

impl Config {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    pub fn plan_settings(&self) -> PlanSettings {
        let period = self.period();
        PlanSettings {
            period,
            deadline_budget: self
                .deadline_budget_us
                .map_or(period, Duration::from_micros),
        }
    }
}

/// Return the path to `~/.gaitplan/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".gaitplan").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns `None`
/// if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the config from a specific path, without environment overrides.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `GAITPLAN_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `GAITPLAN_TICK_PERIOD_MS` | `tick-period-ms` |
/// | `GAITPLAN_PLAN_PATH` | `plan-search-path` (colon separated) |
/// | `GAITPLAN_LOG_FORMAT` | `log-format` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GAITPLAN_TICK_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.tick_period_ms = ms;
    }
    if let Ok(v) = std::env::var("GAITPLAN_PLAN_PATH") {
        let dirs: Vec<PathBuf> = v
            .split(':')
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .collect();
        if !dirs.is_empty() {
            cfg.plan_search_path = dirs;
        }
    }
    if let Ok(v) = std::env::var("GAITPLAN_LOG_FORMAT")
        && let Ok(format) = v.parse::<LogFormat>()
    {
        cfg.log_format = format;
    }
}

/// Save the config to disk, creating `~/.gaitplan/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
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
