//! Hobby servos on the Pi's two hardware PWM channels

use rppal::pwm::{Channel, Polarity, Pwm};
use std::time::Duration;
use thiserror::Error;

use super::{ActuatorBank, ActuatorId, Angle, MAX_ANGLE};
use crate::config::ActuatorConfig;

#[derive(Error, Debug)]
pub enum ServoError {
    #[error("PWM error: {0}")]
    Pwm(#[from] rppal::pwm::Error),
}

/// Maps an angle onto the configured pulse range
pub(crate) fn pulse_width(angle: Angle, min_pulse_us: u64, max_pulse_us: u64) -> Duration {
    let span = max_pulse_us - min_pulse_us;
    let us = min_pulse_us + span * angle.degrees() as u64 / MAX_ANGLE as u64;
    Duration::from_micros(us)
}

/// Servo A on PWM0 (GPIO18), servo B on PWM1 (GPIO19)
pub struct ServoBank {
    servo_a: Pwm,
    servo_b: Pwm,
    min_pulse_us: u64,
    max_pulse_us: u64,
}

impl ServoBank {
    pub fn new(config: &ActuatorConfig) -> Result<Self, ServoError> {
        let period = Duration::from_millis(config.period_ms);
        let neutral = pulse_width(Angle::clamped(90), config.min_pulse_us, config.max_pulse_us);

        // Channels start disabled; the first set_angle enables them so the horn
        // does not twitch through neutral before the defaults are written.
        let servo_a = Pwm::with_period(Channel::Pwm0, period, neutral, Polarity::Normal, false)?;
        let servo_b = Pwm::with_period(Channel::Pwm1, period, neutral, Polarity::Normal, false)?;

        log::info!(
            "Servo PWM ready: period {} ms, pulse {}..{} us",
            config.period_ms,
            config.min_pulse_us,
            config.max_pulse_us
        );

        Ok(Self {
            servo_a,
            servo_b,
            min_pulse_us: config.min_pulse_us,
            max_pulse_us: config.max_pulse_us,
        })
    }

    fn drive(&mut self, id: ActuatorId, angle: Angle) -> Result<(), ServoError> {
        let pwm = match id {
            ActuatorId::A => &mut self.servo_a,
            ActuatorId::B => &mut self.servo_b,
        };
        pwm.set_pulse_width(pulse_width(angle, self.min_pulse_us, self.max_pulse_us))?;
        if !pwm.is_enabled()? {
            pwm.enable()?;
        }
        Ok(())
    }
}

impl ActuatorBank for ServoBank {
    fn set_angle(&mut self, id: ActuatorId, angle: Angle) {
        if let Err(e) = self.drive(id, angle) {
            log::warn!("Failed to move servo {} to {}°: {}", id, angle, e);
        }
    }
}

impl Drop for ServoBank {
    fn drop(&mut self) {
        let _ = self.servo_a.disable();
        let _ = self.servo_b.disable();
    }
}
