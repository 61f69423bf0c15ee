//! Actuator state and the bank abstraction over the servo hardware

mod servo;

pub use servo::{ServoBank, ServoError};

use std::fmt;

use crate::link::Command;

/// Upper bound of the servo travel, in degrees
pub const MAX_ANGLE: u8 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorId {
    A,
    B,
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorId::A => write!(f, "A"),
            ActuatorId::B => write!(f, "B"),
        }
    }
}

/// Servo angle in degrees, always within `0..=180`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Angle(u8);

impl Angle {
    /// Saturates any integer into `0..=180`
    pub fn clamped(value: i64) -> Self {
        Angle(value.clamp(0, MAX_ANGLE as i64) as u8)
    }

    pub fn degrees(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Positions the two actuators
///
/// Fire-and-forget: implementations log hardware errors themselves and never
/// block the link loop for longer than a register write.
pub trait ActuatorBank {
    fn set_angle(&mut self, id: ActuatorId, angle: Angle);
}

/// Last commanded angles of both actuators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorState {
    a: Angle,
    b: Angle,
}

impl ActuatorState {
    pub fn new(a: Angle, b: Angle) -> Self {
        Self { a, b }
    }

    pub fn angle(&self, id: ActuatorId) -> Angle {
        match id {
            ActuatorId::A => self.a,
            ActuatorId::B => self.b,
        }
    }

    /// Drives both actuators to the current state
    pub fn sync<B: ActuatorBank + ?Sized>(&self, bank: &mut B) {
        bank.set_angle(ActuatorId::A, self.a);
        bank.set_angle(ActuatorId::B, self.b);
    }

    /// Applies a validated command to both actuators
    ///
    /// A command always carries both angles, so there is no partial update.
    pub fn apply_command<B: ActuatorBank + ?Sized>(&mut self, command: Command, bank: &mut B) {
        self.a = command.angle_a;
        self.b = command.angle_b;
        self.sync(bank);
    }
}
