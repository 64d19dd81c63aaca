//! The confirmation-policy parameterized FSM shared by
//! NormalHeaterController and BatteryOnlyHeaterController (§4.7,
//! §4.8; Design Note, spec §9): one state enum driven by a
//! `ConfirmPolicy` record instead of three near-identical classes.
//!
//! `HeaterOnlyController` (§4.9) reuses the same `Confirming` primitive
//! for its `HeatFixed` phase but has a different top-level topology
//! (wait-for-equilibration, then a planned-duration heat rather than a
//! continuously reactive band check), so it lives in its own module.

use std::time::{Duration, Instant};

/// Parameters distinguishing Normal from BatteryOnly (§9 Design Note).
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    /// Temperature change required to prove the heater turned on.
    pub on_delta: f32,
    /// Temperature change required to prove the heater turned off
    /// (negative: the confirm signal must fall by this much).
    pub off_delta: f32,
    pub on_timeout: Duration,
    pub off_timeout: Duration,
}

/// Tracks one confirmation phase: a baseline reading taken on entry
/// and a deadline.
#[derive(Debug, Clone, Copy)]
pub struct Confirming {
    baseline: f32,
    deadline: Instant,
}

impl Confirming {
    pub fn start(baseline: f32, now: Instant, timeout: Duration) -> Self {
        Confirming {
            baseline,
            deadline: now + timeout,
        }
    }

    pub fn confirmed_rising(&self, current: f32, delta: f32) -> bool {
        current >= self.baseline + delta
    }

    pub fn confirmed_falling(&self, current: f32, delta: f32) -> bool {
        current <= self.baseline + delta
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// The battery-temperature band a given `LightMode` selects (§4.5).
#[derive(Debug, Clone, Copy)]
pub struct Band {
    pub low: f32,
    pub high: f32,
}

/// Sub-state of a mode driven by `ConfirmingController` (§4.7 states).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum State {
    Idle,
    ConfirmingOn,
    Heating,
    ConfirmingOff,
    PostCooldown,
    Cooldown,
    Failed,
    StuckOn,
}

/// What a sub-controller wants the supervisor to do with the SSR this
/// tick; the supervisor, not the sub-controller, owns the pin (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrRequest {
    On,
    Off,
}

/// A latched fault a sub-controller can raise; once raised the
/// controller stops making SSR requests other than `Off` (§4.7, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterFault {
    FailedToStart,
    StuckOn,
}

/// Shared NormalHeaterController / BatteryOnlyHeaterController FSM.
///
/// `control_temp` is the thermocouple the band is evaluated against
/// (battery, in both cases); `confirm_temp` is the thermocouple the
/// on/off confirmation delta is measured on (heater-output for
/// Normal, battery for BatteryOnly, since no heater sensor exists
/// there). `heater_temp_limit`, when set, adds Normal's
/// heater-over-temperature safety branch (§4.7); `None` for
/// BatteryOnly, which has no heater sensor to limit on.
pub struct ConfirmingController {
    policy: ConfirmPolicy,
    max_attempts: u32,
    initial_cooldown_period: Duration,
    cooling_time: Duration,
    heater_temp_limit: Option<f32>,

    state: State,
    confirm: Option<Confirming>,
    start_attempts: u32,
    cooldown_deadline: Option<Instant>,
}

impl ConfirmingController {
    pub fn new(
        policy: ConfirmPolicy,
        max_attempts: u32,
        initial_cooldown_period: Duration,
        cooling_time: Duration,
        heater_temp_limit: Option<f32>,
    ) -> Self {
        ConfirmingController {
            policy,
            max_attempts,
            initial_cooldown_period,
            cooling_time,
            heater_temp_limit,
            state: State::Idle,
            confirm: None,
            start_attempts: 0,
            cooldown_deadline: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn ssr_on(&self) -> bool {
        matches!(self.state, State::ConfirmingOn | State::Heating)
    }

    pub fn start_attempts(&self) -> u32 {
        self.start_attempts
    }

    /// Step the FSM one heater tick. Returns the SSR request for this
    /// tick and any newly-raised fault.
    pub fn tick(
        &mut self,
        now: Instant,
        control_temp: f32,
        confirm_temp: f32,
        band: Band,
    ) -> (SsrRequest, Option<HeaterFault>) {
        match self.state {
            State::Idle => {
                if control_temp < band.low {
                    self.confirm = Some(Confirming::start(confirm_temp, now, self.policy.on_timeout));
                    self.state = State::ConfirmingOn;
                }
            }

            State::ConfirmingOn => {
                let confirm = self.confirm.expect("ConfirmingOn always has a Confirming");
                if confirm.confirmed_rising(confirm_temp, self.policy.on_delta) {
                    self.state = State::Heating;
                    self.confirm = None;
                } else if confirm.expired(now) {
                    self.start_attempts += 1;
                    self.confirm = None;
                    if self.start_attempts >= self.max_attempts {
                        self.state = State::Failed;
                        return (SsrRequest::Off, Some(HeaterFault::FailedToStart));
                    }
                    let cooldown = self.initial_cooldown_period * self.start_attempts.min(5);
                    self.cooldown_deadline = Some(now + cooldown);
                    self.state = State::Cooldown;
                }
            }

            State::Heating => {
                let safety_shutoff = self
                    .heater_temp_limit
                    .map(|limit| confirm_temp > limit)
                    .unwrap_or(false);
                if safety_shutoff || control_temp >= band.high {
                    self.confirm = Some(Confirming::start(confirm_temp, now, self.policy.off_timeout));
                    self.state = State::ConfirmingOff;
                }
            }

            State::ConfirmingOff => {
                let confirm = self.confirm.expect("ConfirmingOff always has a Confirming");
                if confirm.confirmed_falling(confirm_temp, self.policy.off_delta) {
                    self.confirm = None;
                    self.cooldown_deadline = Some(now + self.cooling_time);
                    self.state = State::PostCooldown;
                } else if confirm.expired(now) {
                    self.confirm = None;
                    self.state = State::StuckOn;
                    return (SsrRequest::Off, Some(HeaterFault::StuckOn));
                }
            }

            State::PostCooldown => {
                if now >= self.cooldown_deadline.expect("PostCooldown always has a deadline") {
                    self.cooldown_deadline = None;
                    self.start_attempts = 0;
                    self.state = State::Idle;
                }
            }

            State::Cooldown => {
                if now >= self.cooldown_deadline.expect("Cooldown always has a deadline") {
                    self.cooldown_deadline = None;
                    self.confirm = Some(Confirming::start(confirm_temp, now, self.policy.on_timeout));
                    self.state = State::ConfirmingOn;
                }
            }

            State::Failed | State::StuckOn => {
                // Terminal: latched until process restart (§4.7, §7).
            }
        }

        let request = if self.ssr_on() { SsrRequest::On } else { SsrRequest::Off };
        (request, None)
    }
}
