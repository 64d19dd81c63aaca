//! Periodic temperature sampler (§4.3, component #4): reads both
//! thermocouples every tick, feeds fault-free readings through each
//! channel's noise filter, and publishes the filtered values plus
//! sensor status.
//!
//! Recovery is implicit (§4.3): every fault kind is transient from this
//! module's point of view — there is no retry logic here at all, the
//! next scheduled tick simply reads again. A sensor only becomes
//! "not readable" to downstream consumers via the owning `InfoView`'s
//! own liveness rule once `stale_window` has elapsed with no fresh
//! publish.

use crate::collaborators::Published;
use crate::config::FilterConfig;
use crate::filter::{FilterParams, FilterWindow};
use crate::gpio::ThermocoupleBus;
use crate::thermocouple::{self, Fault, SensorStatus};

pub struct Reader<B1, B2> {
    battery_bus: B1,
    heater_bus: B2,
    battery_filter: FilterWindow,
    heater_filter: FilterWindow,
    battery_status: Option<SensorStatus>,
    heater_status: Option<SensorStatus>,
    params: FilterParams,
}

impl<B1: ThermocoupleBus, B2: ThermocoupleBus> Reader<B1, B2> {
    pub fn new(battery_bus: B1, heater_bus: B2, filter_cfg: &FilterConfig) -> Self {
        Reader {
            battery_bus,
            heater_bus,
            battery_filter: FilterWindow::new(filter_cfg.num_samples),
            heater_filter: FilterWindow::new(filter_cfg.num_samples),
            battery_status: None,
            heater_status: None,
            params: FilterParams::from(filter_cfg),
        }
    }

    /// One read/filter/publish cycle for both channels (§4.3).
    pub fn tick(&mut self, published: &Published) {
        let battery_sample = thermocouple::read(&mut self.battery_bus);
        let heater_sample = thermocouple::read(&mut self.heater_bus);

        self.battery_status = Some(SensorStatus::update(self.battery_status, battery_sample.fault));
        self.heater_status = Some(SensorStatus::update(self.heater_status, heater_sample.fault));
        published.battery_temperature_status.publish(self.battery_status.unwrap());
        published.heater_temperature_status.publish(self.heater_status.unwrap());

        if let Some(t) = battery_sample.usable() {
            self.battery_filter.push(t);
            if let Some(filtered) = self.battery_filter.value(&self.params) {
                published.battery_temperature.publish(filtered);
            }
        } else {
            // Leave the temperature InfoView stale; only the status
            // view is republished this tick (§4.3).
            published.battery_temperature_status.touch();
        }

        if let Some(t) = heater_sample.usable() {
            self.heater_filter.push(t);
            if let Some(filtered) = self.heater_filter.value(&self.params) {
                published.heater_temperature.publish(filtered);
            }
        } else {
            published.heater_temperature_status.touch();
        }

        self.publish_ambient(published, &battery_sample, &heater_sample);
    }

    fn publish_ambient(
        &self,
        published: &Published,
        battery_sample: &thermocouple::Sample,
        heater_sample: &thermocouple::Sample,
    ) {
        let battery_ref = (battery_sample.fault != Fault::IoError).then_some(battery_sample.ref_c);
        let heater_ref = (heater_sample.fault != Fault::IoError).then_some(heater_sample.ref_c);

        let ambient = match (battery_ref, heater_ref) {
            (Some(b), Some(h)) => Some((b + h) / 2.0),
            (Some(b), None) => Some(b),
            (None, Some(h)) => Some(h),
            (None, None) => None,
        };

        if let Some(ambient) = ambient {
            published.ambient_temperature.publish(ambient);
        }
    }
}
