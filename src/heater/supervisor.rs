//! Heater controller supervisor (§4.5, component #7): selects one of
//! four sub-controllers from thermocouple liveness, drives the SSR and
//! heater-power LED through it, cross-checks the SSR sense relay
//! (§4.6), and accounts heater-on-seconds per minute for the logger
//! collaborator.
//!
//! Mode selection is table-driven from `(battery_live, heater_live)`
//! (§4.5); a mode change always reconstructs the sub-controller fresh
//! at its initial state rather than trying to carry state across —
//! matching §4.10's own "no attempt to resume the prior controller's
//! sub-state".

use super::heater_only::{HeaterFault as HeaterOnlyFault, HeaterOnlyController, HeaterOnlyPolicy};
use super::no_temps::{NoTempsController, NoTempsParams};
use super::policy::{Band, ConfirmPolicy, ConfirmingController, HeaterFault as PolicyFault, SsrRequest as PolicySsrRequest};
use crate::collaborators::{Consumed, HeaterCycle, HeaterFaultKind, Published};
use crate::config::HeaterConfig;
use crate::gpio::HeaterGpio;
use crate::light::LightMode;
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Supervisor-level mode (§3 `HeaterState`): which sub-controller is
/// currently active, or `Idle` when a latched SSR fault forces the
/// heater off regardless of sensor liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMode {
    Normal,
    BatteryOnly,
    HeaterOnly,
    NoTemps,
    Idle,
}

enum SubController {
    Normal(ConfirmingController),
    BatteryOnly(ConfirmingController),
    HeaterOnly(HeaterOnlyController),
    NoTemps(NoTempsController),
    Idle,
}

/// Pending expectation for the SSR sense cross-check (§4.6): the
/// commanded state and when it was commanded. Cleared once sense
/// agrees; if it never agrees within `sense_timeout` the mismatch is
/// latched as a fault.
struct SensePending {
    commanded_on: bool,
    since: Instant,
}

/// Tracks `heater_on_seconds_this_minute` (§4.5, §6), reset whenever
/// the wall-clock minute rolls over so the published value is always
/// relative to the current minute rather than a sliding window.
struct MinuteAccumulator {
    minute_key: Option<(chrono::NaiveDate, u32, u32)>,
    seconds: f32,
}

impl MinuteAccumulator {
    fn new() -> Self {
        MinuteAccumulator { minute_key: None, seconds: 0.0 }
    }

    fn add(&mut self, now: DateTime<Local>, on_seconds: f32) -> f32 {
        let key = (now.date_naive(), now.hour(), now.minute());
        if self.minute_key != Some(key) {
            self.minute_key = Some(key);
            self.seconds = 0.0;
        }
        self.seconds += on_seconds;
        self.seconds
    }
}

use chrono::{Datelike, Timelike};

pub struct Supervisor {
    cfg: HeaterConfig,
    sense_timeout: Duration,
    mode: ActiveMode,
    sub: SubController,
    sense_pending: Option<SensePending>,
    ssr_fault_latched: bool,
    minute: MinuteAccumulator,
    cycle: HeaterCycle,
    commanded_on: bool,
}

impl Supervisor {
    pub fn new(cfg: HeaterConfig, sense_timeout: Duration) -> Self {
        Supervisor {
            cfg,
            sense_timeout,
            mode: ActiveMode::Idle,
            sub: SubController::Idle,
            sense_pending: None,
            ssr_fault_latched: false,
            minute: MinuteAccumulator::new(),
            cycle: HeaterCycle::default(),
            commanded_on: false,
        }
    }

    pub fn mode(&self) -> ActiveMode {
        self.mode
    }

    pub fn is_ssr_fault_latched(&self) -> bool {
        self.ssr_fault_latched
    }

    fn normal_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            on_delta: self.cfg.normal_confirm_on_delta,
            off_delta: self.cfg.normal_confirm_off_delta,
            on_timeout: self.cfg.normal_confirm_timeout,
            off_timeout: self.cfg.normal_confirm_timeout,
        }
    }

    fn battery_only_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            on_delta: self.cfg.battery_only_confirm_delta,
            off_delta: -self.cfg.battery_only_confirm_delta,
            on_timeout: self.cfg.battery_only_confirm_timeout,
            off_timeout: self.cfg.battery_only_confirm_timeout,
        }
    }

    fn heater_only_policy(&self) -> HeaterOnlyPolicy {
        HeaterOnlyPolicy {
            // §4.9: WaitForEquilibration reuses the same cooling_time_ms
            // PostCooldown already waits on (§4.7), not a separate
            // parameter (scenario 3: "WaitForEquilibration 3 min").
            equilibration_period: self.cfg.cooling_time_ms,
            tick_interval: self.cfg.tick_interval,
            confirm_on_delta: self.cfg.normal_confirm_on_delta,
            confirm_off_delta: self.cfg.normal_confirm_off_delta,
            on_timeout: self.cfg.normal_confirm_timeout,
            off_timeout: self.cfg.normal_confirm_timeout,
            degrees_per_second: self.cfg.degrees_per_second,
            max_attempts: self.cfg.max_attempts,
            initial_cooldown_period: self.cfg.initial_cooldown_period,
        }
    }

    /// The battery-temperature band the current `LightMode` selects
    /// (§4.5).
    pub fn band(&self, light: LightMode) -> Band {
        use crate::light::LightModeKind;
        match light.kind {
            LightModeKind::Light => Band { low: self.cfg.light_low_temp, high: self.cfg.light_high_temp },
            LightModeKind::Dark => Band { low: self.cfg.dark_low_temp, high: self.cfg.dark_high_temp },
        }
    }

    fn desired_mode(&self, battery_live: bool, heater_live: bool) -> ActiveMode {
        if self.ssr_fault_latched {
            return ActiveMode::Idle;
        }
        match (battery_live, heater_live) {
            (true, true) => ActiveMode::Normal,
            (true, false) => ActiveMode::BatteryOnly,
            (false, true) => ActiveMode::HeaterOnly,
            (false, false) => ActiveMode::NoTemps,
        }
    }

    fn enter_mode(&mut self, mode: ActiveMode, now: Instant, band: Band, outside_temp_c: f32) {
        self.mode = mode;
        self.sub = match mode {
            ActiveMode::Normal => {
                SubController::Normal(ConfirmingController::new(
                    self.normal_policy(),
                    self.cfg.max_attempts,
                    self.cfg.initial_cooldown_period,
                    self.cfg.cooling_time_ms,
                    Some(self.cfg.heater_temp_limit),
                ))
            }
            ActiveMode::BatteryOnly => {
                SubController::BatteryOnly(ConfirmingController::new(
                    self.battery_only_policy(),
                    self.cfg.max_attempts,
                    self.cfg.initial_cooldown_period,
                    self.cfg.cooling_time_ms,
                    None,
                ))
            }
            ActiveMode::HeaterOnly => {
                SubController::HeaterOnly(HeaterOnlyController::new(now, self.heater_only_policy()))
            }
            ActiveMode::NoTemps => SubController::NoTemps(NoTempsController::new(
                now,
                NoTempsParams {
                    low: band.low,
                    high: band.high,
                    outside_temp_c,
                    degrees_per_second: self.cfg.degrees_per_second,
                    thermal_model_k: self.cfg.thermal_model_k,
                    safety_tweak: self.cfg.safety_tweak,
                },
            )),
            ActiveMode::Idle => SubController::Idle,
        };
    }

    /// One heater tick (§4.5/§5 ordering: read InfoViews, decide band,
    /// step the sub-controller, drive the SSR, re-read sense, publish
    /// heater-on-time).
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        now: Instant,
        wall_now: DateTime<Local>,
        published: &Published,
        consumed: &Consumed,
        gpio: &mut impl HeaterGpio,
    ) {
        let battery = published.battery_temperature.snapshot();
        let heater = published.heater_temperature.snapshot();
        let battery_live = battery.live;
        let heater_live = heater.live;

        let light = published
            .light
            .snapshot()
            .value
            .unwrap_or_else(|| LightMode { kind: crate::light::LightModeKind::Dark, since: now });
        let band = self.band(light);

        let outside_temp_c = consumed
            .outside_temperature
            .snapshot()
            .live_value()
            .copied()
            .or_else(|| published.ambient_temperature.snapshot().live_value().copied())
            .unwrap_or(self.cfg.dark_low_temp - 5.0);

        let desired = self.desired_mode(battery_live, heater_live);
        if desired != self.mode {
            self.enter_mode(desired, now, band, outside_temp_c);
        }

        let (ssr_on, fault) = match &mut self.sub {
            SubController::Normal(c) => {
                let b = battery.value.unwrap_or(band.low);
                let h = heater.value.unwrap_or(b);
                let (req, f) = c.tick(now, b, h, band);
                (req == PolicySsrRequest::On, f.map(map_policy_fault))
            }
            SubController::BatteryOnly(c) => {
                let b = battery.value.unwrap_or(band.low);
                let (req, f) = c.tick(now, b, b, band);
                (req == PolicySsrRequest::On, f.map(map_policy_fault))
            }
            SubController::HeaterOnly(c) => {
                let air = heater.value.unwrap_or(band.high);
                let (req, f) = c.tick(now, air, band);
                (req == super::heater_only::SsrRequest::On, f.map(map_heater_only_fault))
            }
            SubController::NoTemps(c) => {
                let params = NoTempsParams {
                    low: band.low,
                    high: band.high,
                    outside_temp_c,
                    degrees_per_second: self.cfg.degrees_per_second,
                    thermal_model_k: self.cfg.thermal_model_k,
                    safety_tweak: self.cfg.safety_tweak,
                };
                c.tick(now, params);
                (c.ssr_on(), None)
            }
            SubController::Idle => (false, None),
        };

        if let Some(fault) = fault {
            tracing::error!(?fault, mode = ?self.mode, "heater sub-controller fault");
            published.heater_fault.publish(Some(fault));
        }

        self.command_ssr(ssr_on, now, gpio);

        let tick_secs = self.cfg.tick_interval.as_secs_f32();
        let on_seconds = if ssr_on { tick_secs } else { 0.0 };
        if ssr_on {
            self.cycle.total_on_duration += self.cfg.tick_interval;
            if self.cycle.on_at.is_none() {
                self.cycle.on_at = Some(wall_now);
                self.cycle.off_at = None;
            }
        } else if self.cycle.on_at.is_some() {
            self.cycle.off_at = Some(wall_now);
            self.cycle.on_at = None;
        }
        self.cycle.start_attempts = self.sub_start_attempts();

        let minute_total = self.minute.add(wall_now, on_seconds);
        published.heater_on.publish(ssr_on);
        published.heater_on_seconds_this_minute.publish(minute_total);
        published.heater_cycle.publish(self.cycle);
    }

    fn sub_start_attempts(&self) -> u32 {
        match &self.sub {
            SubController::Normal(c) | SubController::BatteryOnly(c) => c.start_attempts(),
            SubController::HeaterOnly(c) => c.start_attempts(),
            _ => self.cycle.start_attempts,
        }
    }

    fn command_ssr(&mut self, on: bool, now: Instant, gpio: &mut impl HeaterGpio) {
        let on = on && !self.ssr_fault_latched;
        if on != self.commanded_on || self.sense_pending.is_none() {
            if on {
                gpio.ssr_energize();
            } else {
                gpio.ssr_de_energize();
            }
            self.commanded_on = on;
            self.sense_pending = Some(SensePending { commanded_on: on, since: now });
        }
    }

    /// Cross-check the sense relay against what was last commanded
    /// (§4.6); called from its own ~2s scheduler task, independent of
    /// the 5s heater tick. Latches an SSR fault and forces the heater
    /// off if the mismatch persists past `sense_timeout`.
    pub fn check_sense(&mut self, now: Instant, gpio: &mut impl HeaterGpio) {
        if self.ssr_fault_latched {
            gpio.ssr_de_energize();
            return;
        }
        let Some(pending) = &self.sense_pending else { return };
        let sense_energized = gpio.sense_is_energized();
        if sense_energized == pending.commanded_on {
            self.sense_pending = None;
            return;
        }
        if now.saturating_duration_since(pending.since) >= self.sense_timeout {
            let fault = if pending.commanded_on {
                HeaterFaultKind::SsrStuckOff
            } else {
                HeaterFaultKind::SsrStuckOn
            };
            tracing::error!(?fault, "SSR sense mismatch latched");
            self.ssr_fault_latched = true;
            self.mode = ActiveMode::Idle;
            self.sub = SubController::Idle;
            self.sense_pending = None;
            gpio.ssr_de_energize();
        }
    }
}

fn map_policy_fault(f: PolicyFault) -> HeaterFaultKind {
    match f {
        PolicyFault::FailedToStart => HeaterFaultKind::FailedToStart,
        PolicyFault::StuckOn => HeaterFaultKind::StuckOn,
    }
}

fn map_heater_only_fault(f: HeaterOnlyFault) -> HeaterFaultKind {
    match f {
        HeaterOnlyFault::FailedToStart => HeaterFaultKind::FailedToStart,
        HeaterOnlyFault::StuckOn => HeaterFaultKind::StuckOn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::fake::FakeGpio;
    use crate::light::{LightMode, LightModeKind};

    fn published() -> Published {
        Published::new(Duration::from_secs(120))
    }

    fn consumed() -> Consumed {
        Consumed::new(Duration::from_secs(60), Duration::from_secs(60))
    }

    fn supervisor() -> Supervisor {
        Supervisor::new(HeaterConfig::default(), Duration::from_secs(2))
    }

    #[test]
    fn selects_normal_mode_when_both_sensors_live() {
        let mut sup = supervisor();
        let pub_ = published();
        let con = consumed();
        pub_.battery_temperature.publish(8.0);
        pub_.heater_temperature.publish(20.0);
        pub_.light.publish(LightMode { kind: LightModeKind::Light, since: Instant::now() });

        let mut gpio = FakeGpio::default();
        sup.tick(Instant::now(), Local::now(), &pub_, &con, &mut gpio);
        assert_eq!(sup.mode(), ActiveMode::Normal);
    }

    #[test]
    fn falls_back_to_no_temps_when_both_sensors_dead() {
        let mut sup = supervisor();
        let pub_ = published();
        let con = consumed();
        pub_.light.publish(LightMode { kind: LightModeKind::Dark, since: Instant::now() });
        con.outside_temperature.publish(-4.0);

        let mut gpio = FakeGpio::default();
        sup.tick(Instant::now(), Local::now(), &pub_, &con, &mut gpio);
        assert_eq!(sup.mode(), ActiveMode::NoTemps);
    }

    #[test]
    fn selects_battery_only_when_heater_sensor_dead() {
        let mut sup = supervisor();
        let pub_ = published();
        let con = consumed();
        pub_.battery_temperature.publish(8.0);
        pub_.light.publish(LightMode { kind: LightModeKind::Light, since: Instant::now() });

        let mut gpio = FakeGpio::default();
        sup.tick(Instant::now(), Local::now(), &pub_, &con, &mut gpio);
        assert_eq!(sup.mode(), ActiveMode::BatteryOnly);
    }

    #[test]
    fn selects_heater_only_when_battery_sensor_dead() {
        let mut sup = supervisor();
        let pub_ = published();
        let con = consumed();
        pub_.heater_temperature.publish(20.0);
        pub_.light.publish(LightMode { kind: LightModeKind::Light, since: Instant::now() });

        let mut gpio = FakeGpio::default();
        sup.tick(Instant::now(), Local::now(), &pub_, &con, &mut gpio);
        assert_eq!(sup.mode(), ActiveMode::HeaterOnly);
    }

    #[test]
    fn scenario_5_ssr_stuck_on_latches_fault_and_forces_idle() {
        // §8 scenario 5: command SSR off; sense remains asserted 2s
        // later => SSR fault latched, SSR forced off.
        let mut sup = supervisor();
        let pub_ = published();
        let con = consumed();
        pub_.battery_temperature.publish(20.0); // at high band: stays Idle, commands off
        pub_.heater_temperature.publish(20.0);
        pub_.light.publish(LightMode { kind: LightModeKind::Light, since: Instant::now() });

        let mut gpio = FakeGpio::default();
        let mut now = Instant::now();
        sup.tick(now, Local::now(), &pub_, &con, &mut gpio);
        assert!(!gpio.ssr_energized);

        // Sense relay stuck asserted despite the off command.
        gpio.sense_energized = true;
        now += Duration::from_secs(1);
        sup.check_sense(now, &mut gpio);
        assert!(!sup.is_ssr_fault_latched());

        now += Duration::from_secs(2);
        sup.check_sense(now, &mut gpio);
        assert!(sup.is_ssr_fault_latched());
        assert_eq!(sup.mode(), ActiveMode::Idle);
        assert!(!gpio.ssr_energized);
    }

    #[test]
    fn heater_on_seconds_resets_on_minute_rollover() {
        let mut acc = MinuteAccumulator::new();
        let t0 = Local::now();
        let total = acc.add(t0, 5.0);
        assert_eq!(total, 5.0);
        let total = acc.add(t0, 5.0);
        assert_eq!(total, 10.0);

        let next_minute = t0 + chrono::Duration::minutes(1);
        let total = acc.add(next_minute, 3.0);
        assert_eq!(total, 3.0);
    }
}
