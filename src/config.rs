//! Immutable, range-checked configuration.
//!
//! Every threshold, interval and duration named in the component
//! specs lives here with the default the hardware has been tuned
//! against. `Config::validate` is run once, right after
//! deserialization, and a failure there is fatal (§6): nothing downstream
//! re-checks its own inputs.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// (De)serializes a `Duration` as a plain number of seconds, so TOML
/// can write `sense_timeout = 2.0` instead of a `{secs, nanos}` table.
mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gpio: GpioConfig,
    pub temp_reader: TempReaderConfig,
    pub filter: FilterConfig,
    pub light: LightConfig,
    pub heater: HeaterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gpio: GpioConfig::default(),
            temp_reader: TempReaderConfig::default(),
            filter: FilterConfig::default(),
            light: LightConfig::default(),
            heater: HeaterConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: Config = toml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range-check every field. Called once at load time; nothing in
    /// the running core re-validates these.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.gpio;
        if g.spi_bus_battery_ce > 2 || g.spi_bus_heater_ce > 2 {
            return Err(ConfigError::Invalid(
                "gpio.spi_bus_battery_ce/spi_bus_heater_ce must each be 0..=2".into(),
            ));
        }
        if g.spi_bus_battery_ce == g.spi_bus_heater_ce {
            return Err(ConfigError::Invalid(
                "gpio.spi_bus_battery_ce and spi_bus_heater_ce must select different CE lines".into(),
            ));
        }

        let h = &self.heater;
        if !(h.dark_low_temp < h.dark_high_temp
            && h.dark_high_temp < h.light_low_temp
            && h.light_low_temp < h.light_high_temp)
        {
            return Err(ConfigError::Invalid(format!(
                "bands must satisfy dark_low < dark_high < light_low < light_high, got {} < {} < {} < {}",
                h.dark_low_temp, h.dark_high_temp, h.light_low_temp, h.light_high_temp
            )));
        }
        if h.max_attempts == 0 {
            return Err(ConfigError::Invalid("heater.max_attempts must be >= 1".into()));
        }
        if h.heater_temp_limit <= h.light_high_temp {
            return Err(ConfigError::Invalid(
                "heater.heater_temp_limit must exceed the highest battery band".into(),
            ));
        }
        if h.degrees_per_second <= 0.0 {
            return Err(ConfigError::Invalid("heater.degrees_per_second must be > 0".into()));
        }
        if h.thermal_model_k <= 0.0 {
            return Err(ConfigError::Invalid("heater.thermal_model_k must be > 0".into()));
        }

        let f = &self.filter;
        if f.num_samples < 2 {
            return Err(ConfigError::Invalid("filter.num_samples must be >= 2".into()));
        }
        if !(0.0..=1.0).contains(&f.max_ignore_fraction) {
            return Err(ConfigError::Invalid("filter.max_ignore_fraction must be in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&f.max_total_error_ignore_fraction) {
            return Err(ConfigError::Invalid(
                "filter.max_total_error_ignore_fraction must be in [0, 1]".into(),
            ));
        }

        let l = &self.light;
        if !(-90.0..=90.0).contains(&l.latitude_deg) {
            return Err(ConfigError::Invalid("light.latitude_deg out of range".into()));
        }
        if !(-180.0..=180.0).contains(&l.longitude_deg) {
            return Err(ConfigError::Invalid("light.longitude_deg out of range".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub spi_bus_battery_ce: u8,
    pub spi_bus_heater_ce: u8,
    pub ssr_sense_pin: u8,
    pub battery_led_pin: u8,
    pub heater_led_pin: u8,
    pub status_led_pin: u8,
    pub ssr_drive_pin: u8,
    #[serde(with = "duration_secs")]
    pub sense_timeout: Duration,
}

impl Default for GpioConfig {
    fn default() -> Self {
        GpioConfig {
            spi_bus_battery_ce: 0,
            spi_bus_heater_ce: 1,
            ssr_sense_pin: 0,
            battery_led_pin: 2,
            heater_led_pin: 3,
            status_led_pin: 4,
            ssr_drive_pin: 5,
            sense_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TempReaderConfig {
    #[serde(with = "duration_secs")]
    pub normal_interval: Duration,
    #[serde(with = "duration_secs")]
    pub warmup_interval: Duration,
    pub warmup_samples: usize,
    #[serde(with = "duration_secs")]
    pub stale_window: Duration,
}

impl Default for TempReaderConfig {
    fn default() -> Self {
        TempReaderConfig {
            normal_interval: Duration::from_secs(7),
            warmup_interval: Duration::from_millis(250),
            warmup_samples: 41,
            stale_window: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub num_samples: usize,
    pub max_ignore_fraction: f32,
    pub max_total_error_ignore_fraction: f32,
    pub min_sample_error_ignore: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_samples: 41,
            max_ignore_fraction: 0.25,
            max_total_error_ignore_fraction: 1.0,
            min_sample_error_ignore: 0.75,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub soc_threshold: f32,
    pub panel_threshold_w: f32,
    pub pyrometer_threshold: f32,
    pub to_light_delay: u32,
    pub to_dark_delay: u32,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl Default for LightConfig {
    fn default() -> Self {
        LightConfig {
            interval: Duration::from_secs(60),
            soc_threshold: 98.0,
            panel_threshold_w: 200.0,
            pyrometer_threshold: 200.0,
            to_light_delay: 5,
            to_dark_delay: 60,
            latitude_deg: 0.0,
            longitude_deg: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeaterConfig {
    #[serde(with = "duration_secs")]
    pub tick_interval: Duration,

    pub dark_low_temp: f32,
    pub dark_high_temp: f32,
    pub light_low_temp: f32,
    pub light_high_temp: f32,

    pub heater_temp_limit: f32,
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub initial_cooldown_period: Duration,
    #[serde(with = "duration_secs")]
    pub cooling_time_ms: Duration,

    pub normal_confirm_on_delta: f32,
    pub normal_confirm_off_delta: f32,
    #[serde(with = "duration_secs")]
    pub normal_confirm_timeout: Duration,

    pub battery_only_confirm_delta: f32,
    #[serde(with = "duration_secs")]
    pub battery_only_confirm_timeout: Duration,

    pub degrees_per_second: f32,
    pub thermal_model_k: f64,
    pub safety_tweak: f32,

    pub min_led_temp: f32,
    pub max_led_temp: f32,
    #[serde(with = "duration_secs")]
    pub led_period: Duration,
    #[serde(with = "duration_secs")]
    pub led_error_interval: Duration,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        HeaterConfig {
            tick_interval: Duration::from_secs(5),

            dark_low_temp: 0.0,
            dark_high_temp: 5.0,
            light_low_temp: 15.0,
            light_high_temp: 20.0,

            heater_temp_limit: 100.0,
            max_attempts: 4,
            initial_cooldown_period: Duration::from_secs(60),
            cooling_time_ms: Duration::from_secs(180),

            normal_confirm_on_delta: 10.0,
            normal_confirm_off_delta: -10.0,
            normal_confirm_timeout: Duration::from_secs(45),

            battery_only_confirm_delta: 5.0,
            battery_only_confirm_timeout: Duration::from_secs(240),

            degrees_per_second: 0.05,
            thermal_model_k: 0.0004,
            safety_tweak: 1.03,

            min_led_temp: 0.0,
            max_led_temp: 45.0,
            led_period: Duration::from_secs(2),
            led_error_interval: Duration::from_millis(400),
        }
    }
}
