pub const MINUTES_PER_HOUR: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const HOURS_PER_DAY: u32 = 24;

/// Convert a power in kW sustained over a timestep (in hours) to an energy in kWh.
pub(crate) fn kwh_from_kw(power: f64, timestep: f64) -> f64 {
    power * timestep
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_convert_power_over_timestep_to_energy() {
        assert_eq!(kwh_from_kw(14., 0.2), 2.8);
        assert_eq!(kwh_from_kw(0., 1.), 0.);
    }
}
