use crate::compare_floats::min_of_2;
use crate::core::material_properties::FluidProperties;
use crate::core::units::{kwh_from_kw, MINUTES_PER_HOUR};
use crate::errors::Diagnostic;
use serde::Deserialize;
use tracing::warn;

/// This module models heat pump performance, using COP regressions to
/// determine electricity consumption for a given heat output in a timestep.
/// The default characterisation is the Mitsubishi Ecodan PUHZ-HW140V
/// monobloc system, from regression analysis of manufacturer data.

/// At or below this ambient temperature the unit runs in defrost mode and a
/// separate regression applies.
const DEFROST_THRESHOLD: f64 = 2.;

/// Slack allowed over rated capacity before clamping, covering floating
/// point rounding in the heat demand calculation. In kWh.
const CAPACITY_TOLERANCE: f64 = 0.01;

/// COP regression coefficients, applied as a quadratic in ambient
/// temperature, target flow temperature and their cross-term:
/// `c0 + c1.Ta + c2.Ta^2 + c3.Tf + c4.Tf^2 + c5.Ta.Tf`
const DEFROST_COP_COEFFICIENTS: [f64; 6] = [
    3.254509975,
    0.055426116,
    0.007181906,
    -0.001549673,
    -0.000509163,
    -0.00051864,
];

const STANDARD_COP_COEFFICIENTS: [f64; 6] = [
    5.526028912,
    0.1251938,
    -0.000714286,
    -0.054584426,
    -3.17198e-05,
    -0.001400534,
];

/// Performance characteristics of the heat pump, with every option
/// enumerated and defaulted.
///
/// Arguments:
/// * `nominal_power` - rated thermal output, in kW
/// * `max_flow_rate` - rated mass flow, in kg/minute
/// * `target_flow_temp` - fixed target flow temperature, in degrees
/// * `ambient_temp` - external temperature, in degrees (updated per hour
///   while simulating)
/// * `fluid` - working fluid properties
/// * `timestep` - length of one timestep, in hours
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HeatPumpParameters {
    pub nominal_power: f64,
    pub max_flow_rate: f64,
    pub target_flow_temp: f64,
    pub ambient_temp: f64,
    pub fluid: FluidProperties,
    pub timestep: f64,
}

impl Default for HeatPumpParameters {
    fn default() -> Self {
        Self {
            nominal_power: 14.,
            max_flow_rate: 40.,
            target_flow_temp: 60.,
            ambient_temp: 8.2,
            fluid: Default::default(),
            timestep: 1.,
        }
    }
}

/// A heat pump holding no state beyond its configuration; every output is a
/// pure function of the current attributes and call arguments.
#[derive(Clone, Debug)]
pub struct HeatPump {
    nominal_power: f64,
    max_flow_rate: f64,
    target_flow_temp: f64,
    ambient_temp: f64,
    fluid: FluidProperties,
    timestep: f64,
}

impl HeatPump {
    pub fn new(parameters: HeatPumpParameters) -> Self {
        let HeatPumpParameters {
            nominal_power,
            max_flow_rate,
            target_flow_temp,
            ambient_temp,
            fluid,
            timestep,
        } = parameters;
        Self {
            nominal_power,
            max_flow_rate,
            target_flow_temp,
            ambient_temp,
            fluid,
            timestep,
        }
    }

    pub fn target_flow_temp(&self) -> f64 {
        self.target_flow_temp
    }

    pub fn set_ambient_temperature(&mut self, temp: f64) {
        self.ambient_temp = temp;
    }

    pub fn set_timestep(&mut self, timestep: f64) {
        self.timestep = timestep;
    }

    /// Coefficient of performance for the current ambient and target flow
    /// temperatures, switching regressions when in defrost conditions.
    pub fn cop(&self) -> f64 {
        let c = if self.ambient_temp <= DEFROST_THRESHOLD {
            &DEFROST_COP_COEFFICIENTS
        } else {
            &STANDARD_COP_COEFFICIENTS
        };
        c[0] + c[1] * self.ambient_temp
            + c[2] * self.ambient_temp.powi(2)
            + c[3] * self.target_flow_temp
            + c[4] * self.target_flow_temp.powi(2)
            + c[5] * self.ambient_temp * self.target_flow_temp
    }

    /// Electrical energy (kWh) required to raise `mass` kg of fluid from
    /// `t_in` to the target flow temperature within this timestep.
    ///
    /// Heat demand above rated capacity is clamped and the clamped demand is
    /// what gets priced; flow or capacity excursions are reported through
    /// `diagnostics` rather than failing the call.
    pub fn deliver_heat(&self, t_in: f64, mass: f64, diagnostics: &mut Vec<Diagnostic>) -> f64 {
        let flow_limit = self.max_flow_rate * MINUTES_PER_HOUR as f64 * self.timestep;
        if mass > flow_limit {
            warn!(mass, flow_limit, "mass flow exceeds specified range");
            diagnostics.push(Diagnostic::FlowExceeded {
                mass,
                limit: flow_limit,
            });
        }

        let mut heat_required = (self.target_flow_temp - t_in) * mass * self.fluid.specific_heat();
        let max_heat_deliverable = kwh_from_kw(self.nominal_power, self.timestep);

        if (heat_required - max_heat_deliverable) > CAPACITY_TOLERANCE {
            warn!(
                heat_required,
                max_heat_deliverable, "heat demand exceeds capacity"
            );
            diagnostics.push(Diagnostic::CapacityExceeded {
                heat_required,
                limit: max_heat_deliverable,
            });
            heat_required = max_heat_deliverable;
        }

        heat_required / self.cop()
    }

    /// The mass (kg) that can be raised from `t_in` to the target flow
    /// temperature in this timestep without exceeding rated thermal power,
    /// capped by the rated flow.
    pub fn heatable_mass(&self, t_in: f64) -> f64 {
        let delta_t = self.target_flow_temp - t_in;
        if delta_t <= 0. {
            // already at or above the target, nothing useful to heat
            return 0.;
        }

        let mass = kwh_from_kw(self.nominal_power, self.timestep)
            / (self.fluid.specific_heat() * delta_t);
        let max_mass = self.max_flow_rate * MINUTES_PER_HOUR as f64 * self.timestep;

        min_of_2(mass, max_mass)
    }
}

impl Default for HeatPump {
    fn default() -> Self {
        Self::new(Default::default())
    }
}
