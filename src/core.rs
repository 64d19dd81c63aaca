//! Explicit startup and run loop (§9 Design Note: replaces the
//! source's global singleton `App` with a value-typed `Core` built
//! once at startup and driven by one scheduler loop, rather than a
//! process-wide mutable holder for the timer, GPIO, post office and
//! components).
//!
//! `Core::build` opens every GPIO/SPI handle once; `Core::run` owns
//! them for the rest of the process and drives the four periodic
//! components named in §5 plus the heater-power LED's fast PWM
//! cadence, all from one task so no two ticks for the same component
//! ever overlap. Shutdown — `ctrl_c` or a dropped `Core` — always runs
//! `GpioScope`'s `Drop`, de-energizing the SSR and both LEDs (§5, §7).

use crate::collaborators::{Consumed, Published};
use crate::config::Config;
use crate::error::SpiError;
use crate::gpio::{GpioScope, HeaterGpio, Max31855Bus};
use crate::heater::led::{HeaterLed, HeaterLedConfig};
use crate::heater::Supervisor;
use crate::light::LightDetector;
use crate::reader::Reader;
use crate::scheduler::ReaderSchedule;
use chrono::Local;
use std::time::{Duration, Instant};

pub struct Core {
    cfg: Config,
    gpio: GpioScope,
    published: Published,
    consumed: Consumed,
    reader: Reader<Max31855Bus, Max31855Bus>,
    light: LightDetector,
    supervisor: Supervisor,
    heater_led: HeaterLed,
    reader_schedule: ReaderSchedule,
}

impl Core {
    /// Open every GPIO/SPI handle and build the value-typed component
    /// set. Called once at startup; a failure here is fatal, matching
    /// "validation failures at load are fatal" (§6) for the hardware
    /// surface itself.
    pub fn build(cfg: Config) -> Result<Self, SpiError> {
        let gpio = GpioScope::open(&cfg.gpio)?;
        let battery_bus = Max31855Bus::battery(&cfg.gpio)?;
        let heater_bus = Max31855Bus::heater(&cfg.gpio)?;

        let published = Published::new(cfg.temp_reader.stale_window);
        let consumed = Consumed::new(Duration::from_secs(90), Duration::from_secs(150));

        let reader = Reader::new(battery_bus, heater_bus, &cfg.filter);
        let light = LightDetector::new(cfg.light.clone());
        let supervisor = Supervisor::new(cfg.heater.clone(), cfg.gpio.sense_timeout);
        let heater_led = HeaterLed::new(
            HeaterLedConfig {
                min_temp: cfg.heater.min_led_temp,
                max_temp: cfg.heater.max_led_temp,
                period: cfg.heater.led_period,
                error_interval: cfg.heater.led_error_interval,
            },
            Instant::now(),
        );
        let reader_schedule = ReaderSchedule::new(&cfg.temp_reader);

        Ok(Core {
            cfg,
            gpio,
            published,
            consumed,
            reader,
            light,
            supervisor,
            heater_led,
            reader_schedule,
        })
    }

    pub fn published(&self) -> &Published {
        &self.published
    }

    pub fn consumed(&self) -> &Consumed {
        &self.consumed
    }

    /// Drive every periodic task until a shutdown signal arrives.
    /// Running everything from one task guarantees the tick-ordering
    /// and no-overlap properties in §5 without extra synchronization.
    /// Never returns an error: every fault a tick can hit is folded
    /// into an `InfoView` update rather than propagated (§7).
    pub async fn run(mut self) {
        let mut temp_deadline = tokio::time::Instant::now();
        let mut heater_iv = tokio::time::interval(self.cfg.heater.tick_interval);
        let mut light_iv = tokio::time::interval(self.cfg.light.interval);
        let mut sense_iv = tokio::time::interval(Duration::from_secs(2));
        let mut led_iv = tokio::time::interval(Duration::from_millis(100));

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(temp_deadline) => {
                    self.reader.tick(&self.published);
                    let interval = self.reader_schedule.record_tick_and_next_interval();
                    temp_deadline = tokio::time::Instant::now() + interval;
                }
                _ = heater_iv.tick() => {
                    self.supervisor.tick(Instant::now(), Local::now(), &self.published, &self.consumed, &mut self.gpio);
                }
                _ = light_iv.tick() => {
                    let (mode, source) = self.light.tick(&self.consumed, Local::now());
                    tracing::debug!(mode = ?mode.kind, ?source, "light tick");
                    self.published.light.publish(mode);
                }
                _ = sense_iv.tick() => {
                    self.supervisor.check_sense(Instant::now(), &mut self.gpio);
                }
                _ = led_iv.tick() => {
                    let battery_temp = self.published.battery_temperature.snapshot().live_value().copied();
                    let on = self.heater_led.is_on(Instant::now(), battery_temp);
                    self.gpio.set_heater_led(on);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received, releasing GPIO");
                    break;
                }
            }
        }
    }
}
