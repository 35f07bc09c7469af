use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::pid::PidGains;

/// Longest accepted balance loop period.
pub const MAX_DT_SECS: f32 = 1.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SystemConfig {
    pub motor: MotorConfig,
    pub rangefinder: RangefinderConfig,
    pub control: ControlConfig,
    /// Where to write the per-cycle CSV trace of a balance run, if anywhere.
    pub trace_csv: Option<PathBuf>,
}

/// Both serial lines run at a fixed 9600 baud, so there is no baud setting.
#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct MotorConfig {
    pub device: String,
    pub read_timeout_ds: u8,
    pub settle_ms: u64,
    pub shutdown_settle_ms: u64,
    pub default_velocity: f32,
    pub default_acceleration: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            read_timeout_ds: 1,
            settle_ms: 20,
            shutdown_settle_ms: 1000,
            default_velocity: 10.0,
            default_acceleration: 5.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct RangefinderConfig {
    pub device: String,
    pub read_timeout_ds: u8,
    pub settle_ms: u64,
    /// Subtracted from every raw reading (sensor mounting distance).
    pub offset: f32,
    /// Number of raw readings averaged per measurement.
    pub window: usize,
}

impl Default for RangefinderConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB1".to_string(),
            read_timeout_ds: 1,
            settle_ms: 10,
            offset: 12.0,
            window: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlConfig {
    pub gains: PidGains,
    /// Sample period in seconds; also the tick period of the balance loop.
    pub dt_secs: f32,
    /// Divisor applied to the PID output before it becomes a position target.
    pub scale: f32,
    pub output_limit: f32,
    pub measurement_limit: f32,
    /// Stop the balance loop after this many cycles (runs until interrupted if unset).
    pub max_cycles: Option<u64>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            dt_secs: 0.01,
            scale: 20.0,
            output_limit: 125.0,
            measurement_limit: 10.0,
            max_cycles: None,
        }
    }
}

impl ControlConfig {
    /// Tick period of the balance loop, bounded to `0..=MAX_DT_SECS`.
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f32(self.dt_secs.min(MAX_DT_SECS)).unwrap_or(Duration::ZERO)
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dt = self.control.dt_secs;
        if !(dt > 0.0 && dt <= MAX_DT_SECS) {
            return Err(ConfigError::Invalid(format!(
                "control.dt_secs must be in (0, {MAX_DT_SECS}], got {dt}"
            )));
        }
        if self.control.scale == 0.0 {
            return Err(ConfigError::Invalid("control.scale must be non-zero".into()));
        }
        if self.rangefinder.window == 0 {
            return Err(ConfigError::Invalid("rangefinder.window must be at least 1".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<SystemConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: SystemConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config: SystemConfig = toml::from_str("").unwrap();
        assert_eq!(config.motor.device, "/dev/ttyUSB0");
        assert_eq!(config.motor.read_timeout_ds, 1);
        assert_eq!(config.control.dt_secs, 0.01);
        assert_eq!(config.rangefinder.window, 10);
        assert!(config.trace_csv.is_none());
    }

    #[test]
    fn loads_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
trace_csv = "balance.csv"

[motor]
device = "/dev/ttyACM3"

[control]
gains = {{ p = 1.5, i = 0.25, d = 0.05 }}
scale = 40.0
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.motor.device, "/dev/ttyACM3");
        assert_eq!(config.motor.settle_ms, 20);
        assert_eq!(config.control.gains, PidGains::new(1.5, 0.25, 0.05));
        assert_eq!(config.control.scale, 40.0);
        assert_eq!(config.trace_csv, Some(PathBuf::from("balance.csv")));
    }

    #[test]
    fn rejects_non_positive_dt() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[control]\ndt_secs = 0.0").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_oversized_dt() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[control]\ndt_secs = 1e30").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_baud_rate_setting() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[motor]\nbaud_rate = 19200").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn period_is_bounded() {
        let mut control = ControlConfig::default();
        let default = control.period().as_secs_f64();
        assert!((default - 0.01).abs() < 1e-6);
        control.dt_secs = 1e30;
        assert_eq!(control.period(), Duration::from_secs(1));
        control.dt_secs = -2.0;
        assert_eq!(control.period(), Duration::ZERO);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config("/nonexistent/smart_motor.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
