use std::sync::LazyLock;

use serde::Deserialize;

/// This module contains data on the properties of working fluids for the
/// thermal store and heat pump circuits.

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct FluidProperties {
    /// density in kg/m3
    density: f64,
    /// specific heat in kWh/(kg.K)
    specific_heat: f64,
    /// thermal conductivity in kW/(m.K)
    conductivity: f64,
}

impl FluidProperties {
    pub fn new(density: f64, specific_heat: f64, conductivity: f64) -> Self {
        Self {
            density,
            specific_heat,
            conductivity,
        }
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn specific_heat(&self) -> f64 {
        self.specific_heat
    }

    pub fn conductivity(&self) -> f64 {
        self.conductivity
    }

    /// Return energy content of a mass of fluid relative to a base temperature, in kWh
    ///
    /// Arguments:
    /// * `mass` - mass of fluid, in kg
    /// * `temp_high` - temperature for which energy content should be calculated, in deg C
    /// * `temp_base` - temperature which defines "zero energy", in same units as temp_high
    pub fn energy_content(&self, mass: f64, temp_high: f64, temp_base: f64) -> f64 {
        (temp_high - temp_base) * mass * self.specific_heat
    }
}

// 4.186 kJ/(kg.K) expressed in kWh/(kg.K) is 0.0011444
pub static WATER: LazyLock<FluidProperties> =
    LazyLock::new(|| FluidProperties::new(998., 0.0011444, 0.00064));

impl Default for FluidProperties {
    fn default() -> Self {
        *WATER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    pub fn water() -> FluidProperties {
        *WATER
    }

    #[rstest]
    pub fn should_have_correct_density(water: FluidProperties) {
        assert_eq!(water.density(), 998., "incorrect density returned");
    }

    #[rstest]
    pub fn should_have_correct_specific_heat(water: FluidProperties) {
        assert_relative_eq!(water.specific_heat(), 4.186 / 3600., max_relative = 1e-3);
    }

    #[rstest]
    pub fn should_provide_correct_energy_content(water: FluidProperties) {
        // 100kg raised 10K holds roughly 1.14kWh over the base temperature
        assert_relative_eq!(
            water.energy_content(100., 30., 20.),
            1.1444,
            max_relative = 1e-9
        );
        assert_eq!(water.energy_content(100., 20., 20.), 0.);
    }
}
