//! Three-source daylight classifier with hysteresis (§4.4).
//!
//! Re-evaluated every `interval`. Ranked sources: panel power (needs a
//! live, not-yet-full Outback reading), pyrometer (live weather
//! irradiance), almanac (sunrise/sunset computed from lat/lon and wall
//! clock) as the last resort. The first source whose precondition
//! holds wins; lower-ranked sources are never consulted that tick.

use crate::collaborators::{Consumed, OutbackSnapshot};
use crate::config::LightConfig;
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use std::time::Instant;

/// Light/dark with the instant the current mode was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LightModeKind {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy)]
pub struct LightMode {
    pub kind: LightModeKind,
    pub since: Instant,
}

impl LightMode {
    fn new(kind: LightModeKind) -> Self {
        LightMode {
            kind,
            since: Instant::now(),
        }
    }
}

/// Which ranked source produced the last bright/dark reading, for
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightSource {
    PanelPower,
    Pyrometer,
    Almanac,
}

/// The hysteresis state machine from §4.4. Initial state is `Dark`.
pub struct LightDetector {
    config: LightConfig,
    kind: LightModeKind,
    since: Instant,
    ticks_bright_seen: u32,
    ticks_dark_seen: u32,
}

impl LightDetector {
    pub fn new(config: LightConfig) -> Self {
        LightDetector {
            config,
            kind: LightModeKind::Dark,
            since: Instant::now(),
            ticks_bright_seen: 0,
            ticks_dark_seen: 0,
        }
    }

    pub fn mode(&self) -> LightMode {
        LightMode {
            kind: self.kind,
            since: self.since,
        }
    }

    /// Evaluate this tick's bright/dark reading from the ranked
    /// sources and step the hysteresis counters. `now` is the
    /// wall-clock instant used for the almanac fallback.
    pub fn tick(&mut self, consumed: &Consumed, now: DateTime<Local>) -> (LightMode, LightSource) {
        let (bright, source) = self.classify(consumed, now);

        if bright {
            self.ticks_bright_seen += 1;
            self.ticks_dark_seen = 0;
        } else {
            self.ticks_dark_seen += 1;
            self.ticks_bright_seen = 0;
        }

        match self.kind {
            LightModeKind::Dark if self.ticks_bright_seen >= self.config.to_light_delay => {
                self.kind = LightModeKind::Light;
                self.since = Instant::now();
            }
            LightModeKind::Light if self.ticks_dark_seen >= self.config.to_dark_delay => {
                self.kind = LightModeKind::Dark;
                self.since = Instant::now();
            }
            _ => {}
        }

        (self.mode(), source)
    }

    fn classify(&self, consumed: &Consumed, now: DateTime<Local>) -> (bool, LightSource) {
        let outback = consumed.outback.snapshot();
        if let Some(snap) = outback.live_value() {
            if snap.soc_percent < self.config.soc_threshold {
                return (panel_bright(snap, self.config.panel_threshold_w), LightSource::PanelPower);
            }
        }

        let irradiance = consumed.solar_irradiance.snapshot();
        if let Some(&w_m2) = irradiance.live_value() {
            return (w_m2 > self.config.pyrometer_threshold, LightSource::Pyrometer);
        }

        (almanac_bright(self.config.latitude_deg, self.config.longitude_deg, now), LightSource::Almanac)
    }
}

fn panel_bright(snap: &OutbackSnapshot, threshold_w: f32) -> bool {
    snap.pv_power_w() > threshold_w
}

/// Approximate sunrise/sunset for `now`'s calendar day at
/// `(lat_deg, lon_deg)`, NOAA's low-precision solar-position formulas.
/// Good to a few minutes, which is ample for a hysteresis fallback
/// that only runs when both richer sources are stale.
fn almanac_bright(lat_deg: f64, lon_deg: f64, now: DateTime<Local>) -> bool {
    let (sunrise, sunset) = sunrise_sunset(lat_deg, lon_deg, now);
    let minutes_of_day = now.hour() as f64 * 60.0 + now.minute() as f64 + now.second() as f64 / 60.0;
    minutes_of_day >= sunrise && minutes_of_day < sunset
}

/// Returns (sunrise, sunset) as minutes-of-local-day.
fn sunrise_sunset(lat_deg: f64, lon_deg: f64, now: DateTime<Local>) -> (f64, f64) {
    let day_of_year = now.ordinal() as f64;
    let lat = lat_deg.to_radians();

    // Fractional year, radians.
    let gamma = 2.0 * std::f64::consts::PI / 365.0 * (day_of_year - 1.0);

    // Equation of time, minutes.
    let eqtime = 229.18
        * (0.000075 + 0.001868 * gamma.cos() - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());

    // Solar declination, radians.
    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    let zenith = 90.833f64.to_radians(); // official sunrise/sunset zenith
    let cos_ha = (zenith.cos() / (lat.cos() * decl.cos())) - (lat.tan() * decl.tan());
    let cos_ha = cos_ha.clamp(-1.0, 1.0);
    let ha = cos_ha.acos().to_degrees();

    // UTC offset of the Local timezone, in minutes, at `now`.
    let utc_offset_minutes = now.offset().fix().local_minus_utc() as f64 / 60.0;

    let solar_noon_minutes = 720.0 - 4.0 * lon_deg - eqtime + utc_offset_minutes;
    let sunrise = solar_noon_minutes - 4.0 * ha;
    let sunset = solar_noon_minutes + 4.0 * ha;
    (sunrise.rem_euclid(1440.0), sunset.rem_euclid(1440.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Consumed;
    use std::time::Duration;

    fn consumed() -> Consumed {
        Consumed::new(Duration::from_secs(60), Duration::from_secs(60))
    }

    #[test]
    fn starts_dark() {
        let d = LightDetector::new(LightConfig::default());
        assert_eq!(d.mode().kind, LightModeKind::Dark);
    }

    #[test]
    fn panel_power_wins_over_pyrometer_when_soc_low() {
        // Scenario 4: Outback live, SOC=95%, pv_power=150W, irradiance=900W/m2
        // => source = panel power => Dark (150 < 200 threshold).
        let mut d = LightDetector::new(LightConfig::default());
        let c = consumed();
        c.outback.publish(OutbackSnapshot {
            pv_voltage_v: 30.0,
            pv_current_a: 5.0, // 150W
            soc_percent: 95.0,
            batt_voltage_v: 13.2,
            inverter_current_a: [0.0, 0.0],
            ac_out_v: [0.0, 0.0],
            fresh: true,
        });
        c.solar_irradiance.publish(900.0);
        let (mode, source) = d.tick(&c, Local::now());
        assert_eq!(source, LightSource::PanelPower);
        assert_eq!(mode.kind, LightModeKind::Dark);
    }

    #[test]
    fn falls_back_to_pyrometer_when_soc_high() {
        let mut d = LightDetector::new(LightConfig::default());
        let c = consumed();
        c.outback.publish(OutbackSnapshot {
            pv_voltage_v: 30.0,
            pv_current_a: 5.0,
            soc_percent: 99.0,
            batt_voltage_v: 13.8,
            inverter_current_a: [0.0, 0.0],
            ac_out_v: [0.0, 0.0],
            fresh: true,
        });
        c.solar_irradiance.publish(900.0);
        let (_mode, source) = d.tick(&c, Local::now());
        assert_eq!(source, LightSource::Pyrometer);
    }

    #[test]
    fn hysteresis_requires_delay_ticks_to_flip() {
        let mut cfg = LightConfig::default();
        cfg.to_light_delay = 5;
        let mut d = LightDetector::new(cfg);
        let c = consumed();
        c.solar_irradiance.publish(900.0); // bright via pyrometer

        for i in 0..4 {
            let (mode, _) = d.tick(&c, Local::now());
            assert_eq!(mode.kind, LightModeKind::Dark, "flipped too early at tick {}", i);
        }
        let (mode, _) = d.tick(&c, Local::now());
        assert_eq!(mode.kind, LightModeKind::Light);
    }

    #[test]
    fn single_bright_tick_does_not_flip_dark_run() {
        let mut cfg = LightConfig::default();
        cfg.to_light_delay = 5;
        let mut d = LightDetector::new(cfg);
        let c = consumed();

        c.solar_irradiance.publish(0.0);
        d.tick(&c, Local::now());
        c.solar_irradiance.publish(900.0);
        let (mode, _) = d.tick(&c, Local::now());
        assert_eq!(mode.kind, LightModeKind::Dark);
    }

    #[test]
    fn almanac_midday_is_bright() {
        let noon = Local.with_ymd_and_hms(2026, 6, 21, 12, 0, 0).unwrap();
        assert!(almanac_bright(40.0, -75.0, noon));
    }

    #[test]
    fn almanac_midnight_is_dark() {
        let midnight = Local.with_ymd_and_hms(2026, 6, 21, 2, 0, 0).unwrap();
        assert!(!almanac_bright(40.0, -75.0, midnight));
    }
}
