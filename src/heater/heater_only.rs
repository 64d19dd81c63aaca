//! HeaterOnlyHeaterController (§4.9, component #9): the battery
//! thermocouple is dead but the heater-output thermocouple is live. It
//! stands in for the battery reading only once the heater has been off
//! long enough for the box air to equilibrate, then plans a fixed-
//! duration heat using the Newtonian heating rate rather than
//! continuously re-checking a battery reading that doesn't exist.
//!
//! Reuses `Confirming` from [`super::policy`] for the on/off
//! confirmation phases, since the heater thermocouple itself is live
//! and the same rising/falling-delta proof applies — only the middle
//! phase (a planned fixed duration instead of a reactive band check)
//! differs from [`super::policy::ConfirmingController`].

use super::policy::Confirming;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum State {
    WaitForEquilibration,
    ConfirmingOn,
    HeatFixed,
    ConfirmingOff,
    Failed,
    StuckOn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrRequest {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterFault {
    FailedToStart,
    StuckOn,
}

pub struct HeaterOnlyController {
    equilibration_period: Duration,
    tick_interval: Duration,
    confirm_on_delta: f32,
    confirm_off_delta: f32,
    on_timeout: Duration,
    off_timeout: Duration,
    degrees_per_second: f32,
    max_attempts: u32,
    initial_cooldown_period: Duration,

    state: State,
    wait_deadline: Instant,
    confirm: Option<Confirming>,
    planned_duration: Duration,
    heat_deadline: Instant,
    start_attempts: u32,
}

/// Tunables `Supervisor` hands in once per mode entry; all sourced
/// from `HeaterConfig` (§4.9, §11 ambient config).
#[derive(Debug, Clone, Copy)]
pub struct HeaterOnlyPolicy {
    pub equilibration_period: Duration,
    pub tick_interval: Duration,
    pub confirm_on_delta: f32,
    pub confirm_off_delta: f32,
    pub on_timeout: Duration,
    pub off_timeout: Duration,
    pub degrees_per_second: f32,
    pub max_attempts: u32,
    pub initial_cooldown_period: Duration,
}

impl HeaterOnlyController {
    pub fn new(now: Instant, policy: HeaterOnlyPolicy) -> Self {
        HeaterOnlyController {
            equilibration_period: policy.equilibration_period,
            tick_interval: policy.tick_interval,
            confirm_on_delta: policy.confirm_on_delta,
            confirm_off_delta: policy.confirm_off_delta,
            on_timeout: policy.on_timeout,
            off_timeout: policy.off_timeout,
            degrees_per_second: policy.degrees_per_second,
            max_attempts: policy.max_attempts,
            initial_cooldown_period: policy.initial_cooldown_period,
            state: State::WaitForEquilibration,
            wait_deadline: now + policy.equilibration_period,
            confirm: None,
            planned_duration: Duration::ZERO,
            heat_deadline: now,
            start_attempts: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn ssr_on(&self) -> bool {
        matches!(self.state, State::ConfirmingOn | State::HeatFixed)
    }

    pub fn start_attempts(&self) -> u32 {
        self.start_attempts
    }

    /// `air_temp` is the heater thermocouple reading, standing in for
    /// battery-box air temperature while off long enough to equilibrate;
    /// `band` is the light-mode-selected battery band.
    pub fn tick(
        &mut self,
        now: Instant,
        air_temp: f32,
        band: super::policy::Band,
    ) -> (SsrRequest, Option<HeaterFault>) {
        match self.state {
            State::WaitForEquilibration => {
                if now >= self.wait_deadline {
                    if air_temp < band.low {
                        self.planned_duration =
                            Duration::from_secs_f32(((band.high - air_temp) / self.degrees_per_second).max(0.0));
                        self.confirm = Some(Confirming::start(air_temp, now, self.on_timeout));
                        self.state = State::ConfirmingOn;
                    } else {
                        // Decide: still above the low band, re-check next
                        // supervisor tick rather than waiting a full
                        // equilibration period again (§4.9).
                        self.wait_deadline = now + self.tick_interval;
                    }
                }
            }

            State::ConfirmingOn => {
                let confirm = self.confirm.expect("ConfirmingOn always has a Confirming");
                if confirm.confirmed_rising(air_temp, self.confirm_on_delta) {
                    self.confirm = None;
                    self.heat_deadline = now + self.planned_duration;
                    self.state = State::HeatFixed;
                } else if confirm.expired(now) {
                    self.confirm = None;
                    self.start_attempts += 1;
                    if self.start_attempts >= self.max_attempts {
                        self.state = State::Failed;
                        return (SsrRequest::Off, Some(HeaterFault::FailedToStart));
                    }
                    let cooldown = self.initial_cooldown_period * self.start_attempts.min(5);
                    self.wait_deadline = now + cooldown;
                    self.state = State::WaitForEquilibration;
                }
            }

            State::HeatFixed => {
                if now >= self.heat_deadline {
                    self.confirm = Some(Confirming::start(air_temp, now, self.off_timeout));
                    self.state = State::ConfirmingOff;
                }
            }

            State::ConfirmingOff => {
                let confirm = self.confirm.expect("ConfirmingOff always has a Confirming");
                if confirm.confirmed_falling(air_temp, self.confirm_off_delta) {
                    self.confirm = None;
                    self.start_attempts = 0;
                    self.wait_deadline = now + self.equilibration_period;
                    self.state = State::WaitForEquilibration;
                } else if confirm.expired(now) {
                    self.confirm = None;
                    self.state = State::StuckOn;
                    return (SsrRequest::Off, Some(HeaterFault::StuckOn));
                }
            }

            State::Failed | State::StuckOn => {
                // Terminal: latched until process restart (§4.7/§4.9, §7).
            }
        }

        let request = if self.ssr_on() { SsrRequest::On } else { SsrRequest::Off };
        (request, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> HeaterOnlyPolicy {
        HeaterOnlyPolicy {
            equilibration_period: Duration::from_secs(180),
            tick_interval: Duration::from_secs(5),
            confirm_on_delta: 10.0,
            confirm_off_delta: -10.0,
            on_timeout: Duration::from_secs(45),
            off_timeout: Duration::from_secs(45),
            degrees_per_second: 0.05,
            max_attempts: 4,
            initial_cooldown_period: Duration::from_secs(60),
        }
    }

    fn band() -> super::super::policy::Band {
        super::super::policy::Band { low: 15.0, high: 20.0 }
    }

    #[test]
    fn starts_waiting_for_equilibration() {
        let c = HeaterOnlyController::new(Instant::now(), policy());
        assert_eq!(c.state(), State::WaitForEquilibration);
        assert!(!c.ssr_on());
    }

    #[test]
    fn scenario_3_plans_heat_fixed_after_equilibration() {
        // §8 scenario 3: after battery goes open, mode switches to
        // HeaterOnly; WaitForEquilibration 3 min, then plan HeatFixed
        // using degrees_per_second=0.05.
        let mut now = Instant::now();
        let mut c = HeaterOnlyController::new(now, policy());

        now += Duration::from_secs(179);
        c.tick(now, 10.0, band()); // still equilibrating
        assert_eq!(c.state(), State::WaitForEquilibration);

        now += Duration::from_secs(2);
        c.tick(now, 10.0, band()); // air_temp 10 < low(15) -> ConfirmingOn
        assert_eq!(c.state(), State::ConfirmingOn);

        now += Duration::from_secs(20);
        c.tick(now, 21.0, band()); // rose 11C > confirm_on_delta(10) -> HeatFixed
        assert_eq!(c.state(), State::HeatFixed);
        assert!(c.ssr_on());
    }

    #[test]
    fn re_checks_quickly_when_still_above_low_band() {
        let mut now = Instant::now();
        let mut c = HeaterOnlyController::new(now, policy());
        now += Duration::from_secs(180);
        c.tick(now, 16.0, band()); // air_temp 16 >= low(15): stay waiting
        assert_eq!(c.state(), State::WaitForEquilibration);

        now += Duration::from_secs(5);
        c.tick(now, 16.0, band());
        assert_eq!(c.state(), State::WaitForEquilibration);
    }

    #[test]
    fn heat_fixed_runs_for_planned_duration_then_confirms_off() {
        let mut now = Instant::now();
        let mut c = HeaterOnlyController::new(now, policy());
        now += Duration::from_secs(180);
        c.tick(now, 10.0, band());
        now += Duration::from_secs(1);
        c.tick(now, 21.0, band());
        assert_eq!(c.state(), State::HeatFixed);

        // planned_duration = (20 - 10) / 0.05 = 200s
        now += Duration::from_secs(201);
        c.tick(now, 21.0, band());
        assert_eq!(c.state(), State::ConfirmingOff);

        now += Duration::from_secs(10);
        c.tick(now, 9.0, band()); // fell >= 10C from baseline 21 -> equilibrating again
        assert_eq!(c.state(), State::WaitForEquilibration);
        assert_eq!(c.start_attempts, 0);
    }

    #[test]
    fn confirm_on_timeout_retries_then_fails() {
        let mut p = policy();
        p.on_timeout = Duration::from_secs(1);
        p.max_attempts = 1;
        let mut now = Instant::now();
        let mut c = HeaterOnlyController::new(now, p);
        now += Duration::from_secs(180);
        c.tick(now, 10.0, band());
        assert_eq!(c.state(), State::ConfirmingOn);

        now += Duration::from_secs(2);
        let (req, fault) = c.tick(now, 10.0, band());
        assert_eq!(c.state(), State::Failed);
        assert_eq!(req, SsrRequest::Off);
        assert_eq!(fault, Some(HeaterFault::FailedToStart));
    }

    #[test]
    fn confirm_off_timeout_latches_stuck_on() {
        let mut p = policy();
        p.off_timeout = Duration::from_secs(1);
        let mut now = Instant::now();
        let mut c = HeaterOnlyController::new(now, p);
        now += Duration::from_secs(180);
        c.tick(now, 10.0, band());
        now += Duration::from_secs(1);
        c.tick(now, 21.0, band());
        assert_eq!(c.state(), State::HeatFixed);

        now += Duration::from_secs(201);
        c.tick(now, 21.0, band());
        assert_eq!(c.state(), State::ConfirmingOff);

        now += Duration::from_secs(2);
        let (req, fault) = c.tick(now, 21.0, band());
        assert_eq!(c.state(), State::StuckOn);
        assert_eq!(req, SsrRequest::Off);
        assert_eq!(fault, Some(HeaterFault::StuckOn));
    }
}
