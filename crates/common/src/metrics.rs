use std::path::Path;

use serde::Serialize;

/// One tick of the balance loop as recorded for later analysis.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ControlCycle {
    pub cycle_id: u64,
    pub timestamp_ns: u64,
    /// Measurement after clamping, as fed to the PID history.
    pub measurement: Option<f32>,
    pub pid_output: f32,
    pub position_target: f32,
    pub command_sent: bool,
    pub deadline_met: bool,
    pub lateness_ns: i64,
}

/// Running statistics over control cycles, plus an optional per-cycle trace
/// for CSV export.
///
/// Without a trace the recorder holds only counters, so a loop that runs
/// for the whole session uses constant memory.
#[derive(Debug, Default)]
pub struct CycleRecorder {
    trace: Option<Vec<ControlCycle>>,
    cycles: usize,
    missed_deadlines: usize,
    commands_sent: usize,
    skipped_measurements: usize,
    max_lateness_ns: i64,
}

impl CycleRecorder {
    /// Keep statistics only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep statistics and every recorded cycle.
    pub fn with_trace() -> Self {
        Self {
            trace: Some(Vec::with_capacity(10_000)),
            ..Self::default()
        }
    }

    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    pub fn record(&mut self, result: ControlCycle) {
        self.cycles += 1;
        if !result.deadline_met {
            self.missed_deadlines += 1;
        }
        if result.command_sent {
            self.commands_sent += 1;
        }
        if result.measurement.is_none() {
            self.skipped_measurements += 1;
        }
        self.max_lateness_ns = self.max_lateness_ns.max(result.lateness_ns);
        if let Some(trace) = &mut self.trace {
            trace.push(result);
        }
    }

    /// Recorded cycles; empty unless built with [`CycleRecorder::with_trace`].
    pub fn results(&self) -> &[ControlCycle] {
        self.trace.as_deref().unwrap_or_default()
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn missed_deadlines(&self) -> usize {
        self.missed_deadlines
    }

    pub fn commands_sent(&self) -> usize {
        self.commands_sent
    }

    /// Cycles in which no measurement reached the controller.
    pub fn skipped_measurements(&self) -> usize {
        self.skipped_measurements
    }

    pub fn max_lateness_ns(&self) -> i64 {
        self.max_lateness_ns
    }

    /// Share of cycles that met their deadline, in percent.
    pub fn deadline_compliance(&self) -> f64 {
        if self.cycles == 0 {
            return 0.0;
        }
        (self.cycles - self.missed_deadlines) as f64 / self.cycles as f64 * 100.0
    }

    pub fn save_to_csv(&self, path: impl AsRef<Path>) -> Result<(), csv::Error> {
        let path = path.as_ref();
        let mut wtr = csv::Writer::from_path(path)?;
        for record in self.results() {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        tracing::info!(records = self.results().len(), path = %path.display(), "saved cycle trace");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(id: u64, deadline_met: bool) -> ControlCycle {
        ControlCycle {
            cycle_id: id,
            timestamp_ns: id * 10_000_000,
            measurement: Some(1.5),
            pid_output: -3.0,
            position_target: 0.15,
            command_sent: true,
            deadline_met,
            lateness_ns: if deadline_met { 0 } else { 250_000 },
        }
    }

    #[test]
    fn counts_missed_deadlines() {
        let mut recorder = CycleRecorder::with_trace();
        recorder.record(cycle(0, true));
        recorder.record(cycle(1, false));
        recorder.record(cycle(2, true));
        recorder.record(cycle(3, true));
        assert_eq!(recorder.results().len(), 4);
        assert_eq!(recorder.cycles(), 4);
        assert_eq!(recorder.missed_deadlines(), 1);
        assert!((recorder.deadline_compliance() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_recorder_has_zero_compliance() {
        assert_eq!(CycleRecorder::new().deadline_compliance(), 0.0);
    }

    #[test]
    fn statistics_only_recorder_keeps_no_cycles() {
        let mut recorder = CycleRecorder::new();
        assert!(!recorder.is_tracing());
        for id in 0..1_000 {
            recorder.record(ControlCycle {
                measurement: (id % 4 != 0).then_some(0.5),
                command_sent: id % 4 != 0,
                ..cycle(id, id % 10 != 0)
            });
        }
        assert!(recorder.results().is_empty());
        assert_eq!(recorder.cycles(), 1_000);
        assert_eq!(recorder.missed_deadlines(), 100);
        assert_eq!(recorder.commands_sent(), 750);
        assert_eq!(recorder.skipped_measurements(), 250);
        assert_eq!(recorder.max_lateness_ns(), 250_000);
        assert!((recorder.deadline_compliance() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn writes_csv_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");

        let mut recorder = CycleRecorder::with_trace();
        recorder.record(cycle(0, true));
        recorder.record(ControlCycle {
            measurement: None,
            ..cycle(1, false)
        });
        recorder.save_to_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "cycle_id,timestamp_ns,measurement,pid_output,position_target,command_sent,deadline_met,lateness_ns"
        );
        assert_eq!(lines.count(), 2);
    }
}
