//! Glue between operator intent, the rangefinder and the motor controller.

pub mod balance;
pub mod session;
pub mod targets;

pub use balance::{run_balance_loop, BalanceController, BalanceStep};
pub use session::{LoopMode, Supervisor, TELEMETRY_LEN};
pub use targets::{PositionTargets, Tracked, VelocityTargets};
