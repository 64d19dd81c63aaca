//! Heater-power LED duty-cycle driver (§6: "PWM-like duty cycle
//! reflects battery temperature over a 2s period"): off at or below
//! `min_temp`, fully on at or above `max_temp`, linear between, and a
//! ~2.5Hz flash whenever the battery reading is unavailable.
//!
//! Pure function of wall-clock phase within the configured period, so
//! it is driven by its own fast-cadence scheduler task (§5) rather
//! than the 5s heater tick, and is testable without GPIO.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct HeaterLedConfig {
    pub min_temp: f32,
    pub max_temp: f32,
    pub period: Duration,
    pub error_interval: Duration,
}

pub struct HeaterLed {
    cfg: HeaterLedConfig,
    started_at: Instant,
}

impl HeaterLed {
    pub fn new(cfg: HeaterLedConfig, now: Instant) -> Self {
        HeaterLed { cfg, started_at: now }
    }

    /// Whether the LED should be lit at `now`, given the latest
    /// battery temperature (`None` if the battery sensor isn't live).
    pub fn is_on(&self, now: Instant, battery_temp: Option<f32>) -> bool {
        match battery_temp {
            None => self.flash_phase(now),
            Some(t) => {
                let duty = duty_fraction(t, self.cfg.min_temp, self.cfg.max_temp);
                if duty <= 0.0 {
                    false
                } else if duty >= 1.0 {
                    true
                } else {
                    self.phase_fraction(now, self.cfg.period) < duty
                }
            }
        }
    }

    fn flash_phase(&self, now: Instant) -> bool {
        self.phase_fraction(now, self.cfg.error_interval) < 0.5
    }

    fn phase_fraction(&self, now: Instant, period: Duration) -> f32 {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        let period_secs = period.as_secs_f64().max(f64::EPSILON);
        ((elapsed % period_secs) / period_secs) as f32
    }
}

/// Linear duty fraction in [0, 1] for `temp` between `min_temp` and
/// `max_temp` (§6). Clamped outside the range.
fn duty_fraction(temp: f32, min_temp: f32, max_temp: f32) -> f32 {
    if max_temp <= min_temp {
        return if temp >= max_temp { 1.0 } else { 0.0 };
    }
    ((temp - min_temp) / (max_temp - min_temp)).clamp(0.0, 1.0)
}
