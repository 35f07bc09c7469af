/// A setpoint together with the value last confirmed on the device.
///
/// `pending` returns the new value only when it differs from what was last
/// applied, so unchanged targets are never re-sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tracked<T> {
    target: T,
    applied: Option<T>,
}

impl<T: Copy + PartialEq> Tracked<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            applied: None,
        }
    }

    /// A target the device is already known to hold.
    pub fn applied(value: T) -> Self {
        Self {
            target: value,
            applied: Some(value),
        }
    }

    pub fn set(&mut self, target: T) {
        self.target = target;
    }

    pub fn get(&self) -> T {
        self.target
    }

    pub fn pending(&self) -> Option<T> {
        match self.applied {
            Some(applied) if applied == self.target => None,
            _ => Some(self.target),
        }
    }

    pub fn mark_applied(&mut self, value: T) {
        self.applied = Some(value);
    }

    /// Set and mark applied in one go, for values sent outside the diffing path.
    pub fn sync(&mut self, value: T) {
        self.target = value;
        self.applied = Some(value);
    }

    /// Forget what the device holds so the next pass re-sends the target.
    pub fn invalidate(&mut self) {
        self.applied = None;
    }
}

/// Targets used while jogging in position mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTargets {
    pub position: Tracked<f32>,
    pub velocity: Tracked<f32>,
    pub acceleration: Tracked<f32>,
}

/// Targets used in velocity mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityTargets {
    pub velocity: Tracked<f32>,
    pub acceleration: Tracked<f32>,
}
