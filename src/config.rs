use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::lifecycle::{DEFAULT_POLL_INTERVAL, PollOptions, Timeout};
use crate::snapshot::DEFAULT_MAX_ENTRIES;
use anyhow::{Context, Result, bail};
use log::debug;
use serde::Deserialize;

/// Overrides the location of the configuration file.
pub const CONFIG_PATH_ENV: &str = "PROCSCOPE_CONFIG";

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables shared by every operation of a [`crate::ProcessControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    /// Upper bound on entries yielded by one snapshot walk.
    pub max_snapshot_entries: usize,
    /// Sleep between two liveness probes when polling.
    pub poll_interval: Duration,
    /// Timeout used by waits that do not specify their own.
    pub wait_timeout: Timeout,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_snapshot_entries: DEFAULT_MAX_ENTRIES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout: Timeout::from_duration(DEFAULT_WAIT_TIMEOUT),
        }
    }
}

/// On-disk shape of the configuration. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    max_snapshot_entries: Option<usize>,
    poll_interval: Option<DurationValue>,
    wait_timeout: Option<DurationValue>,
}

/// A duration written either as a number of seconds or as a humantime string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(f64),
    Text(String),
}

impl DurationValue {
    fn parse(&self) -> Result<Duration> {
        match self {
            DurationValue::Seconds(seconds) => Duration::try_from_secs_f64(*seconds)
                .with_context(|| format!("Invalid duration: {seconds} seconds")),
            DurationValue::Text(text) => parse_duration(text),
        }
    }
}

/// Parses `"500ms"`, `"1.5s"`, `"2m"` or a bare number of seconds such as `"2"`.
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if let Ok(seconds) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("Invalid duration: {seconds} seconds"));
    }

    humantime::parse_duration(s).with_context(|| {
        format!(
            "Invalid duration format: '{s}'. Expected format like '1s', '500ms', '2m' or a number in seconds"
        )
    })
}

fn parse_timeout(value: &DurationValue) -> Result<Timeout> {
    if matches!(value, DurationValue::Text(text) if text.trim().eq_ignore_ascii_case("infinite")) {
        return Ok(Timeout::Infinite);
    }
    Ok(Timeout::from_duration(value.parse()?))
}

impl TryFrom<ConfigFile> for ControlConfig {
    type Error = anyhow::Error;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let defaults = ControlConfig::default();

        let max_snapshot_entries = file
            .max_snapshot_entries
            .unwrap_or(defaults.max_snapshot_entries);
        if max_snapshot_entries == 0 {
            bail!("max-snapshot-entries must be at least 1");
        }

        let poll_interval = match &file.poll_interval {
            Some(value) => value.parse().context("Invalid poll-interval")?,
            None => defaults.poll_interval,
        };
        if poll_interval.is_zero() {
            bail!("poll-interval must be greater than zero");
        }

        let wait_timeout = match &file.wait_timeout {
            Some(value) => parse_timeout(value).context("Invalid wait-timeout")?,
            None => defaults.wait_timeout,
        };

        Ok(Self {
            max_snapshot_entries,
            poll_interval,
            wait_timeout,
        })
    }
}

/// Location of the configuration file, following the XDG Base Directory Specification:
/// `$PROCSCOPE_CONFIG`, else `$XDG_CONFIG_HOME/procscope/config.yaml`, else
/// `$HOME/.config/procscope/config.yaml`.
pub fn configuration_file_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let config_dir = match env::var("XDG_CONFIG_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let home = env::var("HOME").context("Neither XDG_CONFIG_HOME nor HOME is set")?;
            PathBuf::from(home).join(".config")
        }
    };
    Ok(config_dir.join("procscope").join("config.yaml"))
}

impl ControlConfig {
    /// Loads the configuration from its default location. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&configuration_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let file = match fs::read(path) {
            Ok(bytes) => {
                let file: ConfigFile = serde_yaml::from_slice(&bytes)
                    .with_context(|| format!("Failed to parse config at {}", path.display()))?;
                debug!("Config loaded from {}", path.display());
                file
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file not found at {}", path.display());
                ConfigFile::default()
            }
            Err(e) => bail!("Failed to load config at {}: {e}", path.display()),
        };

        Self::try_from(file).with_context(|| format!("Invalid config at {}", path.display()))
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: self.poll_interval,
            deadline: None,
        }
    }
}
