use std::thread;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info, warn};

use common::MotorConfig;

use crate::channel::{SerialChannel, SerialSettings, REPLY_BUFFER_LEN};
use crate::error::Result;
use crate::link::Link;
use crate::mode::OperatingMode;
use crate::protocol::{parse_reply, Command, Quantity, Query, Scaling};

/// Construction-time parameters of a [`MotorController`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorSettings {
    pub scaling: Scaling,
    pub default_velocity: f32,
    pub default_acceleration: f32,
    /// How long teardown waits for the axis to stop before de-energizing.
    pub shutdown_settle: Duration,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            scaling: Scaling::default(),
            default_velocity: 10.0,
            default_acceleration: 5.0,
            shutdown_settle: Duration::from_secs(1),
        }
    }
}

impl From<&MotorConfig> for MotorSettings {
    fn from(config: &MotorConfig) -> Self {
        Self {
            scaling: Scaling::default(),
            default_velocity: config.default_velocity,
            default_acceleration: config.default_acceleration,
            shutdown_settle: Duration::from_millis(config.shutdown_settle_ms),
        }
    }
}

/// Operating envelope of the actuator, for front ends that clamp user input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorLimits {
    pub position: f32,
    pub velocity: f32,
    pub acceleration: f32,
}

impl Default for MotorLimits {
    fn default() -> Self {
        Self {
            position: 100_000.0,
            velocity: 50.0,
            acceleration: 50.0,
        }
    }
}

/// Typed command/telemetry API for one smart motor.
///
/// The only state kept locally is the operating mode; every query goes to
/// the device. Dropping the controller runs the shutdown sequence: velocity
/// mode, zero target, go, wait, off.
pub struct MotorController<L: Link = Box<dyn SerialPort>> {
    channel: SerialChannel<L>,
    mode: OperatingMode,
    settings: MotorSettings,
    /// Cleared once the shutdown sequence has run.
    armed: bool,
    defaults_loaded: bool,
}

impl MotorController {
    /// Open and configure the device, then arm it.
    ///
    /// Only an unavailable device fails; see [`MotorController::new`].
    pub fn open(config: &MotorConfig) -> Result<Self> {
        let channel = SerialChannel::open(&config.device, &SerialSettings::from(config))?;
        Ok(Self::new(channel, MotorSettings::from(config)))
    }
}

impl<L: Link> MotorController<L> {
    /// Arm the device and load the default velocity and acceleration.
    ///
    /// A start-up command that cannot be written is dropped like any other
    /// failed write; [`MotorController::defaults_loaded`] reports whether all
    /// of them went out.
    pub fn new(channel: SerialChannel<L>, settings: MotorSettings) -> Self {
        let mut motor = Self {
            channel,
            mode: OperatingMode::Position,
            settings,
            armed: true,
            defaults_loaded: false,
        };
        let arm = motor.send(Command::Arm);
        let velocity = motor.set_velocity(settings.default_velocity);
        let acceleration = motor.set_acceleration(settings.default_acceleration);
        motor.defaults_loaded = arm.is_ok() && velocity.is_ok() && acceleration.is_ok();
        if motor.defaults_loaded {
            info!(device = motor.channel.name(), "motor armed in position mode");
        } else {
            warn!(device = motor.channel.name(), "motor start-up incomplete");
        }
        motor
    }

    /// Whether arming and both default targets were written at start-up.
    pub fn defaults_loaded(&self) -> bool {
        self.defaults_loaded
    }

    pub fn settings(&self) -> &MotorSettings {
        &self.settings
    }

    pub fn scaling(&self) -> &Scaling {
        &self.settings.scaling
    }

    fn send(&mut self, command: Command) -> Result<()> {
        debug!(%command, "send");
        self.channel.send(command.encode().as_bytes())
    }

    fn query(&mut self, query: Query) -> Result<f32> {
        self.send(Command::Query(query))?;
        let reply = self.channel.receive(REPLY_BUFFER_LEN)?;
        let counts = parse_reply(&reply)?;
        debug!(query = query.token(), counts, "reply");
        Ok(self.settings.scaling.from_counts(query.quantity(), counts))
    }

    fn counts(&self, quantity: Quantity, value: f32) -> i32 {
        self.settings.scaling.to_counts(quantity, value)
    }

    /// Execute the pending target.
    pub fn go(&mut self) -> Result<()> {
        self.send(Command::Go)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// De-energize the motor.
    pub fn off(&mut self) -> Result<()> {
        self.send(Command::Off)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Declare the current physical position to be `offset` counts.
    pub fn set_origin(&mut self, offset: i32) -> Result<()> {
        self.send(Command::SetOrigin(offset))
    }

    pub fn set_velocity(&mut self, velocity: f32) -> Result<()> {
        let counts = self.counts(Quantity::Velocity, velocity);
        self.send(Command::SetVelocity(counts))
    }

    pub fn set_acceleration(&mut self, acceleration: f32) -> Result<()> {
        let counts = self.counts(Quantity::Acceleration, acceleration);
        self.send(Command::SetAcceleration(counts))
    }

    pub fn go_absolute_position(&mut self, position: f32) -> Result<()> {
        let counts = self.counts(Quantity::Position, position);
        self.send(Command::GoAbsolute(counts))
    }

    pub fn go_relative_position(&mut self, offset: f32) -> Result<()> {
        let counts = self.counts(Quantity::Position, offset);
        self.send(Command::GoRelative(counts))
    }

    pub fn get_position(&mut self) -> Result<f32> {
        self.query(Query::Position)
    }

    pub fn get_velocity(&mut self) -> Result<f32> {
        self.query(Query::Velocity)
    }

    pub fn get_target_velocity(&mut self) -> Result<f32> {
        self.query(Query::TargetVelocity)
    }

    pub fn get_acceleration(&mut self) -> Result<f32> {
        self.query(Query::Acceleration)
    }

    pub fn get_target_acceleration(&mut self) -> Result<f32> {
        self.query(Query::TargetAcceleration)
    }

    /// Switch operating mode.
    ///
    /// The device does not keep velocity and acceleration targets across a
    /// switch; callers re-send them. The cached mode only changes once the
    /// select command has been written.
    pub fn set_mode(&mut self, mode: OperatingMode) -> Result<()> {
        self.send(Command::SelectMode(mode))?;
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "mode change");
        }
        self.mode = mode;
        Ok(())
    }

    pub fn get_mode(&self) -> OperatingMode {
        self.mode
    }

    /// Bring the axis to rest and de-energize it, reporting the first failure.
    ///
    /// Every step is attempted even if an earlier one fails.
    pub fn shutdown(mut self) -> Result<()> {
        self.run_shutdown()
    }

    fn run_shutdown(&mut self) -> Result<()> {
        if !self.armed {
            return Ok(());
        }
        self.armed = false;
        info!(device = self.channel.name(), "shutting down motor");

        let mut first_err = None;
        let mut keep = |res: Result<()>| {
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        };
        keep(self.set_mode(OperatingMode::Velocity));
        keep(self.set_velocity(0.0));
        keep(self.go());
        if !self.settings.shutdown_settle.is_zero() {
            thread::sleep(self.settings.shutdown_settle);
        }
        keep(self.off());

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<L: Link> Drop for MotorController<L> {
    fn drop(&mut self) {
        if let Err(e) = self.run_shutdown() {
            warn!(error = %e, "motor shutdown incomplete");
        }
    }
}
