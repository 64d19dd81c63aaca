//! Newtonian-cooling duty-cycle math used by the no-thermocouples
//! controller (§4.10, component #10).
//!
//! `T_b(t) = T_i + T_d * (1 - e^(-t*K))`, where `T_d = T_outside - T_i`.
//! Solved for the time to cool from the high band to the low band, and
//! combined with a flat heating rate for the time to heat back up.

/// Time in seconds to cool from `t_high` down to `t_low` given an
/// initial temperature `t_i` (the high-band temperature, since cooling
/// starts there) and outside temperature `t_outside`.
///
/// Returns `None` when the outside air isn't cooler than the battery
/// box (`t_d >= 0`) or the log argument is non-positive, in which case
/// §4.10 says cooling time is undefined and the heater should simply
/// run 0 and be re-evaluated next tick.
pub fn cooling_seconds(t_i: f64, t_outside: f64, t_low: f64, k: f64) -> Option<f64> {
    let t_d = t_outside - t_i;
    if t_d >= 0.0 {
        return None;
    }
    let arg = 1.0 - (t_low - t_i) / t_d;
    if arg <= 0.0 {
        return None;
    }
    Some(-arg.ln() / k)
}

/// Time in seconds to heat from `t_low` to `t_high` at a flat rate of
/// `degrees_per_second`, inflated by `safety_tweak` to err warm.
pub fn heating_seconds(t_low: f64, t_high: f64, degrees_per_second: f64, safety_tweak: f64) -> f64 {
    ((t_high - t_low) / degrees_per_second) * safety_tweak
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooling_time_matches_scenario_6() {
        // T_outside=-4C, T_i=20C (starts at high band), low=10C, K=0.000841
        // => t_cool ~= 641s +/- 5%.
        let t = cooling_seconds(20.0, -4.0, 10.0, 0.000841).expect("defined");
        assert!((t - 641.0).abs() / 641.0 < 0.05, "got {}", t);
    }

    #[test]
    fn heating_time_applies_safety_tweak() {
        let t = heating_seconds(0.0, 5.0, 0.05, 1.03);
        assert!((t - (5.0 / 0.05) * 1.03).abs() < 1e-9);
    }

    #[test]
    fn cooling_undefined_when_outside_warmer() {
        assert_eq!(cooling_seconds(20.0, 25.0, 10.0, 0.0004), None);
    }

    #[test]
    fn cooling_undefined_when_log_argument_non_positive() {
        // Outside is cooler but not cool enough to ever reach t_low.
        assert_eq!(cooling_seconds(20.0, 15.0, 10.0, 0.0004), None);
    }
}
