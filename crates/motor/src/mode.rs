use std::fmt;

use serde::{Deserialize, Serialize};

/// Control mode of the actuator. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    #[default]
    Position,
    Velocity,
    Torque,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 3] = [
        OperatingMode::Position,
        OperatingMode::Velocity,
        OperatingMode::Torque,
    ];

    /// Mode-select token understood by the device.
    pub fn token(self) -> &'static str {
        match self {
            OperatingMode::Position => "MP",
            OperatingMode::Velocity => "MV",
            OperatingMode::Torque => "MT",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatingMode::Position => "position",
            OperatingMode::Velocity => "velocity",
            OperatingMode::Torque => "torque",
        };
        f.write_str(name)
    }
}
