use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use common::{SharedDiagnostics, TelemetryBuffer, TelemetrySample};
use motor::{Link, MotorController, MotorError, MotorLimits, OperatingMode};

use crate::targets::{PositionTargets, Tracked, VelocityTargets};

/// Telemetry samples kept for display.
pub const TELEMETRY_LEN: usize = 100;

/// What the operator is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Jog to absolute positions with a velocity/acceleration profile.
    Position,
    /// Spin at a commanded velocity.
    Velocity,
    /// Closed loop on the rangefinder through the PID controller.
    Balance,
}

impl LoopMode {
    /// Device mode this loop drives the motor in.
    pub fn operating_mode(self) -> OperatingMode {
        match self {
            LoopMode::Velocity => OperatingMode::Velocity,
            LoopMode::Position | LoopMode::Balance => OperatingMode::Position,
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopMode::Position => "position",
            LoopMode::Velocity => "velocity",
            LoopMode::Balance => "balance",
        })
    }
}

/// Owns the motor and applies operator intent to it.
///
/// Targets are diffed against what was last sent so the device only sees
/// commands for values that actually changed.
pub struct Supervisor<L: Link> {
    motor: MotorController<L>,
    mode: LoopMode,
    /// Every step of the current mode's entry sequence reached the device.
    entry_complete: bool,
    limits: MotorLimits,
    position: PositionTargets,
    velocity: VelocityTargets,
    telemetry: TelemetryBuffer,
    diagnostics: Arc<SharedDiagnostics>,
}

impl<L: Link> Supervisor<L> {
    /// Wrap a freshly armed motor, which sits in position mode holding its
    /// defaults. Defaults that failed to load at start-up stay pending.
    pub fn new(motor: MotorController<L>, diagnostics: Arc<SharedDiagnostics>) -> Self {
        let settings = *motor.settings();
        let loaded = motor.defaults_loaded();
        let profile = |value: f32| {
            if loaded {
                Tracked::applied(value)
            } else {
                Tracked::new(value)
            }
        };
        let mut session = Self {
            motor,
            mode: LoopMode::Position,
            entry_complete: loaded,
            limits: MotorLimits::default(),
            position: PositionTargets {
                position: Tracked::applied(0.0),
                velocity: profile(settings.default_velocity),
                acceleration: profile(settings.default_acceleration),
            },
            velocity: VelocityTargets {
                velocity: Tracked::applied(0.0),
                acceleration: Tracked::applied(settings.default_acceleration),
            },
            telemetry: TelemetryBuffer::new(TELEMETRY_LEN),
            diagnostics,
        };
        let current = session.refresh_telemetry();
        session.position.position.sync(current.position);
        session
    }

    pub fn with_limits(mut self, limits: MotorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    /// False while steps of the last mode entry are still outstanding.
    pub fn entry_complete(&self) -> bool {
        self.entry_complete
    }

    pub fn limits(&self) -> &MotorLimits {
        &self.limits
    }

    pub fn motor(&self) -> &MotorController<L> {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut MotorController<L> {
        &mut self.motor
    }

    pub fn telemetry(&self) -> &TelemetryBuffer {
        &self.telemetry
    }

    pub fn diagnostics(&self) -> &Arc<SharedDiagnostics> {
        &self.diagnostics
    }

    pub fn position_targets(&self) -> &PositionTargets {
        &self.position
    }

    pub fn velocity_targets(&self) -> &VelocityTargets {
        &self.velocity
    }

    pub fn into_motor(self) -> MotorController<L> {
        self.motor
    }

    fn note(&self, err: &MotorError) {
        if err.is_write() {
            self.diagnostics.record_write_error();
        } else if err.is_protocol() {
            self.diagnostics.record_protocol_error();
        }
    }

    fn check<T>(&self, res: motor::Result<T>) -> motor::Result<T> {
        if let Err(e) = &res {
            self.note(e);
        }
        res
    }

    /// Read position and velocity, keeping the previous value of any field
    /// whose query fails.
    pub fn refresh_telemetry(&mut self) -> TelemetrySample {
        let mut sample = self.telemetry.latest().unwrap_or_default();
        match self.motor.get_position() {
            Ok(p) => sample.position = p,
            Err(e) => {
                warn!(error = %e, "position read failed, keeping last value");
                self.note(&e);
            }
        }
        match self.motor.get_velocity() {
            Ok(v) => sample.velocity = v,
            Err(e) => {
                warn!(error = %e, "velocity read failed, keeping last value");
                self.note(&e);
            }
        }
        self.telemetry.add(sample);
        sample
    }

    /// Run the entry sequence of `mode`.
    ///
    /// If the mode select cannot be written nothing changes. Once it has
    /// been written the session follows the device into `mode` even if a
    /// later step fails: that error is returned, the unsent targets stay
    /// pending for [`Supervisor::apply_targets`], and
    /// [`Supervisor::entry_complete`] stays false until the entry is re-run.
    pub fn switch_mode(&mut self, mode: LoopMode) -> motor::Result<()> {
        let res = self.motor.set_mode(mode.operating_mode());
        self.check(res)?;
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "operator mode change");
        }
        self.mode = mode;
        self.entry_complete = false;

        let res = match mode {
            LoopMode::Position => self.enter_position(),
            LoopMode::Velocity => self.enter_velocity(),
            LoopMode::Balance => self.enter_balance(),
        };
        if let Err(e) = &res {
            warn!(%mode, error = %e, "mode entry incomplete");
        }
        self.check(res)?;
        self.entry_complete = true;
        Ok(())
    }

    fn enter_position(&mut self) -> motor::Result<()> {
        // hold the last known position; the profile is lost with the switch
        let last = self.telemetry.latest().unwrap_or_default().position;
        self.position.position.sync(last);
        self.position.velocity.invalidate();
        self.position.acceleration.invalidate();

        let v = self.position.velocity.get();
        self.motor.set_velocity(v)?;
        self.position.velocity.mark_applied(v);
        let a = self.position.acceleration.get();
        self.motor.set_acceleration(a)?;
        self.position.acceleration.mark_applied(a);
        self.motor.stop()?;
        let here = self.refresh_telemetry().position;
        self.position.position.sync(here);
        Ok(())
    }

    fn enter_velocity(&mut self) -> motor::Result<()> {
        self.velocity.velocity.set(0.0);
        self.velocity.velocity.invalidate();
        self.velocity.acceleration.invalidate();

        self.motor.set_velocity(0.0)?;
        self.velocity.velocity.mark_applied(0.0);
        let a = self.velocity.acceleration.get();
        self.motor.set_acceleration(a)?;
        self.velocity.acceleration.mark_applied(a);
        Ok(())
    }

    fn enter_balance(&mut self) -> motor::Result<()> {
        // the position-mode profile no longer matches the device
        self.position.acceleration.invalidate();
        self.motor.set_acceleration(self.limits.acceleration)?;
        self.motor.set_origin(0)?;
        self.position.position.sync(0.0);
        Ok(())
    }

    pub fn set_position_target(&mut self, position: f32) {
        let limit = self.limits.position;
        self.position.position.set(position.clamp(-limit, limit));
    }

    pub fn set_velocity_target(&mut self, velocity: f32) {
        let limit = self.limits.velocity;
        match self.mode {
            LoopMode::Velocity => self.velocity.velocity.set(velocity.clamp(-limit, limit)),
            _ => self.position.velocity.set(velocity.clamp(0.0, limit)),
        }
    }

    pub fn set_acceleration_target(&mut self, acceleration: f32) {
        let a = acceleration.clamp(0.0, self.limits.acceleration);
        match self.mode {
            LoopMode::Velocity => self.velocity.acceleration.set(a),
            _ => self.position.acceleration.set(a),
        }
    }

    /// Send every target that changed since it was last applied.
    ///
    /// Failed commands stay pending and are retried on the next call.
    pub fn apply_targets(&mut self) {
        match self.mode {
            LoopMode::Position => {
                if let Some(p) = self.position.position.pending() {
                    let res = self.motor.go_absolute_position(p);
                    if self.check(res).is_ok() {
                        self.position.position.mark_applied(p);
                    }
                }
                if let Some(v) = self.position.velocity.pending() {
                    let res = self.motor.set_velocity(v);
                    if self.check(res).is_ok() {
                        self.position.velocity.mark_applied(v);
                    }
                }
                if let Some(a) = self.position.acceleration.pending() {
                    let res = self.motor.set_acceleration(a);
                    if self.check(res).is_ok() {
                        self.position.acceleration.mark_applied(a);
                    }
                }
            }
            LoopMode::Velocity => {
                if let Some(v) = self.velocity.velocity.pending() {
                    let res = self.motor.set_velocity(v).and_then(|_| self.motor.go());
                    if self.check(res).is_ok() {
                        self.velocity.velocity.mark_applied(v);
                    }
                }
                if let Some(a) = self.velocity.acceleration.pending() {
                    let res = self.motor.set_acceleration(a);
                    if self.check(res).is_ok() {
                        self.velocity.acceleration.mark_applied(a);
                    }
                }
            }
            LoopMode::Balance => {}
        }
    }

    /// Make the current position the origin.
    pub fn set_origin(&mut self) -> motor::Result<()> {
        let res = self.motor.set_origin(0);
        self.check(res)?;
        self.position.position.sync(0.0);
        Ok(())
    }

    pub fn go_to_origin(&mut self) -> motor::Result<()> {
        let res = self.motor.go_absolute_position(0.0);
        self.check(res)?;
        self.position.position.sync(0.0);
        Ok(())
    }

    /// Halt the axis; in velocity mode the velocity target drops to zero.
    pub fn stop(&mut self) -> motor::Result<()> {
        let res = self.motor.stop();
        self.check(res)?;
        if self.mode == LoopMode::Velocity {
            self.velocity.velocity.sync(0.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motor::{MemoryLink, MotorSettings, SerialChannel};
    use std::time::Duration;

    fn session(link: &MemoryLink) -> Supervisor<MemoryLink> {
        let channel = SerialChannel::with_link(link.clone(), "mem", Duration::ZERO);
        let settings = MotorSettings {
            shutdown_settle: Duration::ZERO,
            ..MotorSettings::default()
        };
        let motor = MotorController::new(channel, settings);
        link.push_reply("80\r");
        link.push_reply("0\r");
        let s = Supervisor::new(motor, Arc::new(SharedDiagnostics::default()));
        link.clear_written();
        s
    }

    #[test]
    fn starts_holding_current_position() {
        let link = MemoryLink::new();
        let s = session(&link);
        assert_eq!(s.mode(), LoopMode::Position);
        assert_eq!(s.position_targets().position.get(), 20.0);
        assert_eq!(s.position_targets().position.pending(), None);
    }

    #[test]
    fn unchanged_targets_are_not_resent() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        s.apply_targets();
        assert!(link.commands().is_empty());

        s.set_position_target(25.0);
        s.apply_targets();
        s.apply_targets();
        assert_eq!(link.commands(), vec!["PT=100 G"]);
    }

    #[test]
    fn position_entry_sequence() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        s.switch_mode(LoopMode::Velocity).unwrap();
        link.clear_written();
        link.push_reply("-40\r");
        link.push_reply("0\r");

        s.switch_mode(LoopMode::Position).unwrap();
        assert_eq!(
            link.commands(),
            vec!["MP", "VT=327680", "ADT=20", "X", "RPA", "RVC"]
        );
        assert_eq!(s.position_targets().position.get(), -10.0);
    }

    #[test]
    fn velocity_mode_goes_on_change() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        s.switch_mode(LoopMode::Velocity).unwrap();
        assert_eq!(s.motor().get_mode(), OperatingMode::Velocity);
        assert_eq!(link.commands(), vec!["MV", "VT=0", "ADT=20"]);

        link.clear_written();
        s.set_velocity_target(-1.5);
        s.set_acceleration_target(10.0);
        s.apply_targets();
        assert_eq!(link.commands(), vec!["VT=-49152", "G", "ADT=40"]);
    }

    #[test]
    fn targets_are_clamped_to_limits() {
        let link = MemoryLink::new();
        let mut s = session(&link).with_limits(MotorLimits {
            position: 10.0,
            velocity: 2.0,
            acceleration: 1.0,
        });
        s.set_position_target(1e6);
        s.set_velocity_target(99.0);
        s.set_acceleration_target(-3.0);
        s.apply_targets();
        assert_eq!(link.commands(), vec!["PT=40 G", "VT=65536", "ADT=0"]);
    }

    #[test]
    fn balance_entry_zeroes_origin() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        s.switch_mode(LoopMode::Balance).unwrap();
        assert_eq!(link.commands(), vec!["MP", "ADT=204", "O=0"]);
        assert_eq!(s.mode(), LoopMode::Balance);
    }

    #[test]
    fn failed_write_stays_pending() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        s.set_position_target(5.0);
        link.set_fail_writes(true);
        s.apply_targets();
        assert_eq!(s.diagnostics().snapshot().write_errors, 1);
        assert_eq!(s.position_targets().position.pending(), Some(5.0));

        link.set_fail_writes(false);
        s.apply_targets();
        assert_eq!(link.commands(), vec!["PT=20 G"]);
        assert_eq!(s.position_targets().position.pending(), None);
    }

    #[test]
    fn failed_mode_switch_keeps_mode() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        link.set_fail_writes(true);
        assert!(s.switch_mode(LoopMode::Velocity).is_err());
        assert_eq!(s.mode(), LoopMode::Position);
        assert_eq!(s.motor().get_mode(), OperatingMode::Position);
        assert!(s.entry_complete());
        link.set_fail_writes(false);
    }

    #[test]
    fn interrupted_entry_follows_device_mode() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        s.switch_mode(LoopMode::Velocity).unwrap();
        link.clear_written();

        link.fail_command(Some("VT=327680"));
        assert!(s.switch_mode(LoopMode::Position).unwrap_err().is_write());
        link.fail_command(None);
        assert_eq!(s.mode(), LoopMode::Position);
        assert_eq!(s.motor().get_mode(), s.mode().operating_mode());
        assert!(!s.entry_complete());
        assert_eq!(s.diagnostics().snapshot().write_errors, 1);

        // no velocity-mode G may reach a device now in position mode
        s.set_velocity_target(3.0);
        s.apply_targets();
        assert_eq!(link.commands(), vec!["MP", "VT=98304", "ADT=20"]);
    }

    #[test]
    fn interrupted_entry_completes_on_retry() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        link.fail_command(Some("ADT=20"));
        assert!(s.switch_mode(LoopMode::Velocity).is_err());
        link.fail_command(None);
        assert_eq!(s.mode(), LoopMode::Velocity);
        assert_eq!(s.velocity_targets().acceleration.pending(), Some(5.0));

        link.clear_written();
        s.switch_mode(LoopMode::Velocity).unwrap();
        assert!(s.entry_complete());
        assert_eq!(link.commands(), vec!["MV", "VT=0", "ADT=20"]);
    }

    #[test]
    fn missing_defaults_stay_pending() {
        let link = MemoryLink::new();
        link.fail_command(Some("ADT=20"));
        let channel = SerialChannel::with_link(link.clone(), "mem", Duration::ZERO);
        let settings = MotorSettings {
            shutdown_settle: Duration::ZERO,
            ..MotorSettings::default()
        };
        let motor = MotorController::new(channel, settings);
        link.fail_command(None);
        let mut s = Supervisor::new(motor, Arc::new(SharedDiagnostics::default()));
        assert!(!s.entry_complete());
        link.clear_written();

        s.apply_targets();
        assert_eq!(link.commands(), vec!["VT=327680", "ADT=20"]);
    }

    #[test]
    fn telemetry_goes_stale_on_silence() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        let sample = s.refresh_telemetry();
        assert_eq!(sample.position, 20.0);
        assert_eq!(s.diagnostics().snapshot().protocol_errors, 2);
        assert_eq!(s.telemetry().len(), 2);
    }

    #[test]
    fn stop_in_velocity_mode_zeroes_target() {
        let link = MemoryLink::new();
        let mut s = session(&link);
        s.switch_mode(LoopMode::Velocity).unwrap();
        s.set_velocity_target(4.0);
        s.stop().unwrap();
        assert_eq!(s.velocity_targets().velocity.get(), 0.0);
        assert_eq!(s.velocity_targets().velocity.pending(), None);
    }
}
