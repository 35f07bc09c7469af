pub mod config;
pub mod telemetry;
pub mod diagnostics;
pub mod metrics;
pub mod pid;

pub use config::{ConfigError, ControlConfig, MotorConfig, RangefinderConfig, SystemConfig};
pub use telemetry::{TelemetryBuffer, TelemetrySample};
pub use diagnostics::{DiagnosticsSnapshot, SharedDiagnostics};
pub use metrics::{ControlCycle, CycleRecorder};
pub use pid::{PidController, PidGains, SignalHistory, HISTORY_LEN};
