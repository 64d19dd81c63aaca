//! Typed wrappers over the board's SPI bus and digital pins.
//!
//! Pin numbers are BCM (§6): SPI SCLK=14, MISO=13, CE0=10 (battery
//! thermocouple), CE1=11 (heater thermocouple); GPIO 0 is the SSR
//! sense input (pull-up, low = conducting); GPIO 2/3/4 are the
//! battery, heater-power and status LEDs (low = on); GPIO 5 drives the
//! SSR (low = on).
//!
//! Everything here is a thin, fallible wrapper around `rppal` so the
//! rest of the crate can be exercised against a fake `ThermocoupleBus`
//! / `DigitalOutput` in tests without touching real hardware.

use crate::config::GpioConfig;
use crate::error::SpiError;
use rppal::gpio::{Gpio, InputPin, Level, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

/// A source of MAX31855 SPI frames. Implemented for the real SPI bus
/// and, in tests, for a queue of canned frames.
pub trait ThermocoupleBus {
    fn read_frame(&mut self) -> Result<[u8; 4], SpiError>;
}

/// One of the two MAX31855 chip selects, each wired to its own CE
/// line on the same physical SPI bus (§6: max ~5 MHz, mode 0).
pub struct Max31855Bus {
    spi: Spi,
}

impl Max31855Bus {
    pub fn open(slave_select: SlaveSelect) -> Result<Self, SpiError> {
        let spi = Spi::new(Bus::Spi0, slave_select, 4_000_000, Mode::Mode0)?;
        Ok(Max31855Bus { spi })
    }

    pub fn battery(cfg: &GpioConfig) -> Result<Self, SpiError> {
        Self::open(slave_select(cfg.spi_bus_battery_ce))
    }

    pub fn heater(cfg: &GpioConfig) -> Result<Self, SpiError> {
        Self::open(slave_select(cfg.spi_bus_heater_ce))
    }
}

/// Map a configured CE line number to the `rppal` slave-select it
/// drives. `GpioConfig::spi_bus_battery_ce`/`spi_bus_heater_ce` are
/// range-checked to 0..=2 by `Config::validate`, so every value
/// reaching here is one of these three.
fn slave_select(ce: u8) -> SlaveSelect {
    match ce {
        0 => SlaveSelect::Ss0,
        1 => SlaveSelect::Ss1,
        2 => SlaveSelect::Ss2,
        _ => unreachable!("Config::validate rejects spi_bus_*_ce outside 0..=2"),
    }
}

impl ThermocoupleBus for Max31855Bus {
    fn read_frame(&mut self) -> Result<[u8; 4], SpiError> {
        let mut buf = [0u8; 4];
        self.spi.read(&mut buf)?;
        Ok(buf)
    }
}

/// The SSR drive line: low-drive energizes the heater.
pub struct SsrDrive(OutputPin);

impl SsrDrive {
    pub fn open(pin: u8) -> Result<Self, SpiError> {
        let pin = Gpio::new()?.get(pin)?.into_output_low();
        Ok(SsrDrive(pin))
    }

    pub fn energize(&mut self) {
        self.0.set_low();
    }

    pub fn de_energize(&mut self) {
        self.0.set_high();
    }

    pub fn is_energized(&self) -> bool {
        self.0.is_set_low()
    }
}

/// The electro-mechanical sense relay: reads low when the SSR is
/// actually conducting (§4.6).
pub struct SenseInput(InputPin);

impl SenseInput {
    pub fn open(pin: u8) -> Result<Self, SpiError> {
        let pin = Gpio::new()?.get(pin)?.into_input_pullup();
        Ok(SenseInput(pin))
    }

    pub fn is_energized(&self) -> bool {
        self.0.read() == Level::Low
    }
}

/// A low-on indicator LED (battery, heater-power, or status).
pub struct Led(OutputPin);

impl Led {
    pub fn open(pin: u8) -> Result<Self, SpiError> {
        let pin = Gpio::new()?.get(pin)?.into_output_high();
        Ok(Led(pin))
    }

    pub fn set_on(&mut self, on: bool) {
        if on {
            self.0.set_low();
        } else {
            self.0.set_high();
        }
    }

    pub fn is_on(&self) -> bool {
        self.0.is_set_low()
    }
}

/// Owns every GPIO handle the heater supervisor drives and guarantees
/// the SSR and both its LEDs are de-energized on every exit path,
/// including an unwind (§5, §7: "a scoped acquisition of GPIO
/// guarantees release on all exit paths including panic").
pub struct GpioScope {
    pub ssr: SsrDrive,
    pub sense: SenseInput,
    pub battery_led: Led,
    pub heater_led: Led,
    pub status_led: Led,
}

impl GpioScope {
    pub fn open(cfg: &GpioConfig) -> Result<Self, SpiError> {
        Ok(GpioScope {
            ssr: SsrDrive::open(cfg.ssr_drive_pin)?,
            sense: SenseInput::open(cfg.ssr_sense_pin)?,
            battery_led: Led::open(cfg.battery_led_pin)?,
            heater_led: Led::open(cfg.heater_led_pin)?,
            status_led: Led::open(cfg.status_led_pin)?,
        })
    }
}

impl Drop for GpioScope {
    fn drop(&mut self) {
        self.ssr.de_energize();
        self.battery_led.set_on(false);
        self.heater_led.set_on(false);
        self.status_led.set_on(false);
    }
}

/// The narrow surface `heater::supervisor::Supervisor` drives: the SSR
/// drive/sense pair and the heater-power LED (§4.5: "the supervisor
/// owns the SSR pin and the heater-power LED"). Implemented for
/// `GpioScope` and, in tests, for an in-memory fake, so the FSM wiring
/// is exercised without real hardware.
pub trait HeaterGpio {
    fn ssr_energize(&mut self);
    fn ssr_de_energize(&mut self);
    fn sense_is_energized(&self) -> bool;
    fn set_heater_led(&mut self, on: bool);
}

impl HeaterGpio for GpioScope {
    fn ssr_energize(&mut self) {
        self.ssr.energize();
    }

    fn ssr_de_energize(&mut self) {
        self.ssr.de_energize();
    }

    fn sense_is_energized(&self) -> bool {
        self.sense.is_energized()
    }

    fn set_heater_led(&mut self, on: bool) {
        self.heater_led.set_on(on);
    }
}
