use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_INTERVAL_SECS, DEFAULT_PAUSE_SLICE_MS, DEFAULT_PROBE_TIMEOUT_SECS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Pause between cycles when autostarting
    #[serde(default = "default_interval")]
    pub interval_secs: f64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: f64,
    #[serde(default = "default_pause_slice")]
    pub pause_slice_ms: u64,
    /// CSV service list imported at startup
    #[serde(default)]
    pub services_file: Option<PathBuf>,
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_interval() -> f64 {
    DEFAULT_INTERVAL_SECS
}

fn default_probe_timeout() -> f64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_pause_slice() -> u64 {
    DEFAULT_PAUSE_SLICE_MS
}

fn default_listen() -> String {
    "127.0.0.1:8054".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            probe_timeout_secs: default_probe_timeout(),
            pause_slice_ms: default_pause_slice(),
            services_file: None,
            autostart: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl MonitorConfig {
    /// Per-probe connect timeout, falling back to the default when not positive
    pub fn probe_timeout(&self) -> Duration {
        positive_secs(self.probe_timeout_secs).unwrap_or_else(|| {
            tracing::warn!(
                "Invalid probe_timeout_secs {}, using {}",
                self.probe_timeout_secs,
                DEFAULT_PROBE_TIMEOUT_SECS
            );
            Duration::from_secs_f64(DEFAULT_PROBE_TIMEOUT_SECS)
        })
    }

    /// Slice length of the cancellable pause
    pub fn pause_slice(&self) -> Duration {
        if self.pause_slice_ms == 0 {
            tracing::warn!("Invalid pause_slice_ms 0, using {}", DEFAULT_PAUSE_SLICE_MS);
            return Duration::from_millis(DEFAULT_PAUSE_SLICE_MS);
        }
        Duration::from_millis(self.pause_slice_ms)
    }
}

/// Seconds as a duration if finite and strictly positive
pub fn positive_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [monitor]
            interval_secs = 2.5
            probe_timeout_secs = 1.0
            pause_slice_ms = 250
            services_file = "/srv/assets.csv"
            autostart = true

            [api]
            listen = "0.0.0.0:9000"
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.monitor.interval_secs, 2.5);
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(1));
        assert_eq!(config.monitor.pause_slice(), Duration::from_millis(250));
        assert_eq!(config.monitor.services_file, Some(PathBuf::from("/srv/assets.csv")));
        assert!(config.monitor.autostart);
        assert_eq!(config.api.listen, "0.0.0.0:9000");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.monitor.interval_secs, 5.0);
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.monitor.pause_slice(), Duration::from_millis(500));
        assert!(config.monitor.services_file.is_none());
        assert!(!config.monitor.autostart);
        assert_eq!(config.api.listen, "127.0.0.1:8054");
    }

    #[test]
    fn test_invalid_timeouts_fall_back() {
        let monitor = MonitorConfig {
            probe_timeout_secs: -1.0,
            pause_slice_ms: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(monitor.probe_timeout(), Duration::from_secs(5));
        assert_eq!(monitor.pause_slice(), Duration::from_millis(500));
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Config::load("/nonexistent/portwatchd.toml").is_err());
    }
}
