//! Open-loop duty-cycle heater control for when both thermocouples are
//! faulted (§4.10, component #10): alternate fixed-duration Heating
//! and Cooling phases computed from the Newtonian cooling model,
//! rather than reacting to readings that don't exist.
//!
//! Entered from whichever of `NormalHeaterController` /
//! `BatteryOnlyHeaterController` was active when both sensors went bad
//! (§4.7, §4.9); exited back to that controller the moment a usable
//! reading returns (§4.10 Non-goals: no attempt to resume the prior
//! controller's sub-state, it just restarts at `Idle`).

use super::thermal_model::{cooling_seconds, heating_seconds};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Heating,
    Cooling,
}

/// Parameters the supervisor hands in each time it (re)enters no-temps
/// mode: the light-mode-selected band and the best outside-temperature
/// estimate available (§4.10: falls back to the configured
/// `dark_low_temp` minus a margin when even the weather bus is stale).
#[derive(Debug, Clone, Copy)]
pub struct NoTempsParams {
    pub low: f32,
    pub high: f32,
    pub outside_temp_c: f32,
    pub degrees_per_second: f32,
    pub thermal_model_k: f64,
    pub safety_tweak: f32,
}

pub struct NoTempsController {
    phase: Phase,
    deadline: Instant,
}

impl NoTempsController {
    /// Start in Cooling if the assumed starting point is the high band
    /// (matches how the heater would be left by whichever controller
    /// handed off), so the first phase duration is always computable.
    pub fn new(now: Instant, params: NoTempsParams) -> Self {
        let mut c = NoTempsController {
            phase: Phase::Cooling,
            deadline: now,
        };
        c.enter_cooling(now, params);
        c
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ssr_on(&self) -> bool {
        self.phase == Phase::Heating
    }

    /// Advance the phase if its planned duration has elapsed.
    pub fn tick(&mut self, now: Instant, params: NoTempsParams) {
        if now < self.deadline {
            return;
        }
        match self.phase {
            Phase::Cooling => self.enter_heating(now, params),
            Phase::Heating => self.enter_cooling(now, params),
        }
    }

    fn enter_cooling(&mut self, now: Instant, params: NoTempsParams) {
        self.phase = Phase::Cooling;
        let secs = cooling_seconds(
            params.high as f64,
            params.outside_temp_c as f64,
            params.low as f64,
            params.thermal_model_k,
        );
        // Undefined cooling (outside isn't cooler, or never reaches
        // low): §4.10 says run 0 and re-evaluate next tick rather than
        // block forever with the heater off.
        let secs = secs.unwrap_or(0.0).max(0.0);
        self.deadline = now + Duration::from_secs_f64(secs);
    }

    fn enter_heating(&mut self, now: Instant, params: NoTempsParams) {
        self.phase = Phase::Heating;
        let secs = heating_seconds(
            params.low as f64,
            params.high as f64,
            params.degrees_per_second as f64,
            params.safety_tweak as f64,
        );
        self.deadline = now + Duration::from_secs_f64(secs.max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(outside: f32) -> NoTempsParams {
        NoTempsParams {
            low: 10.0,
            high: 20.0,
            outside_temp_c: outside,
            degrees_per_second: 0.05,
            thermal_model_k: 0.000841,
            safety_tweak: 1.03,
        }
    }

    #[test]
    fn starts_cooling_then_switches_to_heating() {
        let now = Instant::now();
        let mut c = NoTempsController::new(now, params(-4.0));
        assert_eq!(c.phase(), Phase::Cooling);
        assert!(!c.ssr_on());

        c.tick(now + Duration::from_secs(10_000), params(-4.0));
        assert_eq!(c.phase(), Phase::Heating);
        assert!(c.ssr_on());
    }

    #[test]
    fn heating_phase_runs_for_the_planned_duration() {
        let now = Instant::now();
        let mut c = NoTempsController::new(now, params(-4.0));
        c.tick(now + Duration::from_secs(10_000), params(-4.0)); // -> Heating
        let expected = heating_seconds(10.0, 20.0, 0.05, 1.03);

        // before the deadline, still heating
        c.tick(now + Duration::from_secs(10_000) + Duration::from_secs_f64(expected - 1.0), params(-4.0));
        assert_eq!(c.phase(), Phase::Heating);

        // at/after the deadline, flips back to cooling
        c.tick(now + Duration::from_secs(10_000) + Duration::from_secs_f64(expected + 1.0), params(-4.0));
        assert_eq!(c.phase(), Phase::Cooling);
    }

    #[test]
    fn undefined_cooling_runs_zero_length_and_flips_immediately() {
        // Outside warmer than the box: cooling_seconds is None -> treated as 0.
        let now = Instant::now();
        let c = NoTempsController::new(now, params(25.0));
        assert_eq!(c.phase(), Phase::Cooling);
        // deadline == now, so the very next tick flips to Heating.
        let mut c = c;
        c.tick(now, params(25.0));
        assert_eq!(c.phase(), Phase::Heating);
    }
}
