use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the non-fatal faults the supervisory loop rides through.
#[derive(Debug, Default)]
pub struct SharedDiagnostics {
    pub write_errors: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub sensor_errors: AtomicU64,
    pub clamped_outputs: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub write_errors: u64,
    pub protocol_errors: u64,
    pub sensor_errors: u64,
    pub clamped_outputs: u64,
}

impl SharedDiagnostics {
    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor_error(&self) {
        self.sensor_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_clamped_output(&self) {
        self.clamped_outputs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            write_errors: self.write_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            sensor_errors: self.sensor_errors.load(Ordering::Relaxed),
            clamped_outputs: self.clamped_outputs.load(Ordering::Relaxed),
        }
    }
}
