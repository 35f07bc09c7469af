use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use common::{ControlConfig, ControlCycle, CycleRecorder, PidController, PidGains};
use motor::{DistanceSensor, Link};

use crate::session::{LoopMode, Supervisor};

/// Result of feeding one measurement through the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceStep {
    pub measurement: f32,
    pub pid_output: f32,
    pub position_target: f32,
    pub clamped: bool,
}

/// Turns rangefinder readings into actuator position targets.
///
/// The measurement is clamped, pushed into the PID history, and the PID
/// output is inverted and divided by `scale` before being clamped to the
/// output range.
#[derive(Debug, Clone)]
pub struct BalanceController {
    pid: PidController,
    gains: PidGains,
    dt: f32,
    scale: f32,
    output_limit: f32,
    measurement_limit: f32,
    last_target: f32,
}

impl BalanceController {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            pid: PidController::new(),
            gains: config.gains,
            dt: config.dt_secs,
            scale: config.scale,
            output_limit: config.output_limit,
            measurement_limit: config.measurement_limit,
            last_target: 0.0,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Gains can be retuned between ticks without disturbing the history.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn last_target(&self) -> f32 {
        self.last_target
    }

    pub fn reset(&mut self) {
        self.pid.reset();
        self.last_target = 0.0;
    }

    pub fn step(&mut self, measurement: f32) -> BalanceStep {
        let measurement = measurement.clamp(-self.measurement_limit, self.measurement_limit);
        self.pid.push(measurement);
        let pid_output = self.pid.compute(&self.gains, self.dt);
        let raw = -pid_output / self.scale;
        let position_target = raw.clamp(-self.output_limit, self.output_limit);
        self.last_target = position_target;
        BalanceStep {
            measurement,
            pid_output,
            position_target,
            clamped: position_target != raw,
        }
    }
}

/// Run the balance loop until `shutdown` is raised or the configured cycle
/// count is reached. Returns the number of cycles run.
///
/// The loop only starts once the balance entry sequence has fully reached
/// the device. Ticks are paced at `dt_secs`. A failed measurement skips the
/// PID update for that tick; a failed position command leaves the previous
/// target in force. Neither stops the loop.
pub fn run_balance_loop<L: Link, S: DistanceSensor>(
    session: &mut Supervisor<L>,
    sensor: &mut S,
    controller: &mut BalanceController,
    config: &ControlConfig,
    shutdown: &AtomicBool,
    recorder: &mut CycleRecorder,
) -> motor::Result<u64> {
    if session.mode() != LoopMode::Balance || !session.entry_complete() {
        session.switch_mode(LoopMode::Balance)?;
    }

    let period = config.period();
    let start_time = Instant::now();
    let mut next_tick = start_time;
    let mut cycle_id = 0u64;

    info!(period_ms = period.as_secs_f64() * 1000.0, gains = ?controller.gains(), "balance loop started");

    while !shutdown.load(Ordering::Relaxed) {
        if config.max_cycles.is_some_and(|max| cycle_id >= max) {
            break;
        }

        let expected = next_tick;
        next_tick += period;
        let now = Instant::now();
        if now < expected {
            thread::sleep(expected - now);
        }
        let actual = Instant::now();

        let (measurement, step) = match sensor.measure() {
            Ok(m) => {
                let step = controller.step(m);
                (Some(step.measurement), Some(step))
            }
            Err(e) => {
                warn!(cycle = cycle_id, error = %e, "measurement failed, holding target");
                session.diagnostics().record_sensor_error();
                (None, None)
            }
        };

        let mut command_sent = false;
        if let Some(step) = step {
            if step.clamped {
                session.diagnostics().record_clamped_output();
            }
            match session.motor_mut().go_absolute_position(step.position_target) {
                Ok(()) => command_sent = true,
                Err(_) => session.diagnostics().record_write_error(),
            }
            debug!(
                cycle = cycle_id,
                measurement = step.measurement,
                output = step.pid_output,
                target = step.position_target,
                "tick"
            );
        }

        let elapsed = actual.elapsed();
        let deadline_met = elapsed <= period;
        let lateness_ns = if deadline_met {
            0
        } else {
            (elapsed - period).as_nanos() as i64
        };

        recorder.record(ControlCycle {
            cycle_id,
            timestamp_ns: actual.duration_since(start_time).as_nanos() as u64,
            measurement,
            pid_output: step.map_or(0.0, |s| s.pid_output),
            position_target: controller.last_target(),
            command_sent,
            deadline_met,
            lateness_ns,
        });

        cycle_id += 1;
    }

    info!(
        cycles = cycle_id,
        missed_deadlines = recorder.missed_deadlines(),
        "balance loop stopped"
    );
    Ok(cycle_id)
}
