//! The narrow interface at which out-of-scope collaborators attach
//! (§6): the database logger, the Outback HTTP client, the weather-bus
//! actor, the message-bus report publisher, the status-code LED
//! blinker, the web status page and the CSV recorder. None of them are
//! implemented here — only the typed `InfoView` handles they read from
//! or write to.

use crate::info_view::InfoView;
use crate::light::LightMode;
use crate::thermocouple::SensorStatus;
use chrono::{DateTime, Local};
use std::time::Duration;

/// A reading of the Outback inverter/charger, as fetched by the (out
/// of scope) HTTP client (§3).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct OutbackSnapshot {
    pub pv_voltage_v: f32,
    pub pv_current_a: f32,
    pub soc_percent: f32,
    pub batt_voltage_v: f32,
    pub inverter_current_a: [f32; 2],
    pub ac_out_v: [f32; 2],
    pub fresh: bool,
}

impl OutbackSnapshot {
    pub fn pv_power_w(&self) -> f32 {
        self.pv_voltage_v * self.pv_current_a
    }
}

/// A reading from the (out of scope) weather bus (§3).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct WeatherSnapshot {
    pub irradiance_w_m2: f32,
    pub outside_temp_c: f32,
}

/// A latched heater/SSR fault (§7), unifying what the source modeled
/// as two separate `HeaterTemperature`-ish event classes and two
/// differently-shaped `SSRSenseFailure` classes (open question a/b) into
/// one reported kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HeaterFaultKind {
    /// §4.7/§4.9: start attempts exhausted without confirmation.
    FailedToStart,
    /// §4.7/§4.9: confirm-off timed out; heater never cooled.
    StuckOn,
    /// §4.6: commanded on, sense never asserted within `sense_timeout`.
    SsrStuckOff,
    /// §4.6: commanded off, sense never cleared within `sense_timeout`.
    SsrStuckOn,
}

/// Heater-on-time accounting for the logger and CSV collaborators
/// (§3). Updated by the supervisor on every heater tick.
#[derive(Debug, Clone, Copy)]
pub struct HeaterCycle {
    pub on_at: Option<DateTime<Local>>,
    pub off_at: Option<DateTime<Local>>,
    pub start_attempts: u32,
    pub total_on_duration: Duration,
}

impl Default for HeaterCycle {
    fn default() -> Self {
        HeaterCycle {
            on_at: None,
            off_at: None,
            start_attempts: 0,
            total_on_duration: Duration::ZERO,
        }
    }
}

/// Handles the core publishes into; consumers (logger, MOP publisher,
/// web page, CSV recorder) subscribe to these and are never
/// constructed here.
#[derive(Clone)]
pub struct Published {
    pub battery_temperature: InfoView<f32>,
    pub battery_temperature_status: InfoView<SensorStatus>,
    pub heater_temperature: InfoView<f32>,
    pub heater_temperature_status: InfoView<SensorStatus>,
    pub ambient_temperature: InfoView<f32>,
    pub light: InfoView<LightMode>,
    pub heater_on: InfoView<bool>,
    pub heater_on_seconds_this_minute: InfoView<f32>,
    pub heater_fault: InfoView<Option<HeaterFaultKind>>,
    pub heater_cycle: InfoView<HeaterCycle>,
}

impl Published {
    pub fn new(stale_window: Duration) -> Self {
        Published {
            battery_temperature: InfoView::new("batteryTemperature", stale_window),
            battery_temperature_status: InfoView::new("batteryTemperatureSensorStatus", stale_window),
            heater_temperature: InfoView::new("heaterTemperature", stale_window),
            heater_temperature_status: InfoView::new("heaterTemperatureSensorStatus", stale_window),
            ambient_temperature: InfoView::new("ambientTemperature", stale_window),
            light: InfoView::new("light", stale_window),
            heater_on: InfoView::new("heaterOn", stale_window),
            heater_on_seconds_this_minute: InfoView::new("heaterOnSecondsThisMinute", stale_window),
            heater_fault: InfoView::new("heaterFault", stale_window),
            heater_cycle: InfoView::new("heaterCycle", stale_window),
        }
    }
}

/// Handles external collaborators publish into; the core only reads
/// these (§6: "consumed from collaborators").
#[derive(Clone)]
pub struct Consumed {
    pub outback: InfoView<OutbackSnapshot>,
    pub solar_irradiance: InfoView<f32>,
    pub outside_temperature: InfoView<f32>,
}

impl Consumed {
    pub fn new(outback_stale_window: Duration, weather_stale_window: Duration) -> Self {
        Consumed {
            outback: InfoView::new("outback", outback_stale_window),
            solar_irradiance: InfoView::new("solarIrradiance", weather_stale_window),
            outside_temperature: InfoView::new("outsideTemperature", weather_stale_window),
        }
    }
}
