use crate::compare_floats::min_of_2;
use crate::core::material_properties::FluidProperties;
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use std::f64::consts::PI;
use thiserror::Error;
use tracing::warn;

/// An object to represent a stratified hot water storage tank.
///
/// The tank is modelled as a stack of equal-mass nodes, numbered from the
/// bottom (0) to the top (N-1). Hotter water floats above cooler water; the
/// manifold injection rule preserves that stratification by construction.
/// Node temperatures are advanced once per timestep by an implicit
/// finite-volume energy balance accounting for wall losses, vertical
/// conduction and upwind advection of the net vertical mass flow.
///
/// Based on "Development of an energy storage tank model" (Buckley, R 2012).

const MIN_NODES: usize = 3;

/// Injection below this temperature differential over the heater draw node
/// delivers no useful heat and is skipped.
const MIN_USEFUL_DIFFERENTIAL: f64 = 5.;

/// Accumulated vertical flow at the top of the tank must close to zero
/// within this tolerance (kg), allowing for floating-point rounding.
const MASS_CLOSURE_TOLERANCE: f64 = 1e-4;

/// Aspect ratio (height over diameter) used when deriving tank dimensions
/// from a volume. Taller is better for stratification (Armstrong 2015).
const TANK_ASPECT_RATIO: f64 = 3.;

const DEFAULT_START_TEMP: f64 = 50.;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum TankFault {
    /// The manifold could not place injected fluid without exceeding total
    /// tank capacity within one timestep. Recoverable within a trial.
    #[error("entire tank has circulated within one timestep while placing {mass:.1}kg")]
    CirculationExceeded { mass: f64 },
    /// Accumulated vertical flow does not close at the top node. This is an
    /// internal bookkeeping invariant and must abort the run.
    #[error("mass imbalance at the top of the tank, remainder {remainder}kg")]
    MassImbalance { remainder: f64 },
}

impl TankFault {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TankFault::MassImbalance { .. })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TankBuildError {
    #[error("cannot model a tank with fewer than {MIN_NODES} nodes (requested {0})")]
    TooFewNodes(usize),
    #[error("expected {expected} initial node temperatures, got {actual}")]
    InitialTemperatureCount { expected: usize, actual: usize },
    #[error("{role} node index {index} is outside the tank (top node is {top})")]
    NodeOutOfRange {
        role: &'static str,
        index: usize,
        top: usize,
    },
}

/// Physical characteristics of the tank, with every option enumerated and
/// defaulted. Dimensions are derived from the volume.
///
/// Arguments:
/// * `nodes` - number of nodes to model (at least 3)
/// * `volume` - tank volume, in m3
/// * `wall_u_value` - U-value of the tank wall, in kW/(m2.K)
/// * `initial_node_temps` - starting temperature per node, bottom first;
///   all nodes start at 50 degrees if omitted
/// * `outflow_node` - node serving the heat network; defaults to the top node
/// * `heater_draw_node` - node the heat source draws from (usually the bottom)
/// * `supply_temp` / `return_temp` - network flow/return temperatures the
///   system aims for, in degrees
/// * `ambient_temp` - temperature surrounding the tank (assumed indoors)
/// * `fluid` - working fluid properties
/// * `timestep` - length of one solver timestep, in hours
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TankParameters {
    pub nodes: usize,
    pub volume: f64,
    pub wall_u_value: f64,
    pub initial_node_temps: Option<Vec<f64>>,
    pub outflow_node: Option<usize>,
    pub heater_draw_node: usize,
    pub supply_temp: f64,
    pub return_temp: f64,
    pub ambient_temp: f64,
    pub fluid: FluidProperties,
    pub timestep: f64,
}

impl Default for TankParameters {
    fn default() -> Self {
        Self {
            nodes: 5,
            volume: 0.55,
            wall_u_value: 0.00011,
            initial_node_temps: None,
            outflow_node: None,
            heater_draw_node: 0,
            supply_temp: 50.,
            return_temp: 20.,
            ambient_temp: 20.,
            fluid: Default::default(),
            timestep: 1.,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tank {
    node_mass: f64,
    node_area: f64,
    node_surface: f64,
    node_height: f64,
    wall_u_value: f64,
    ambient_temp: f64,
    supply_temp: f64,
    return_temp: f64,
    outflow_node: usize,
    heater_draw_node: usize,
    fluid: FluidProperties,
    timestep: f64,
    node_temps: Vec<f64>,
    // mass flows into and out of the tank pending for the current timestep
    input_masses: Vec<f64>,
    input_temps: Vec<f64>,
    output_masses: Vec<f64>,
}

impl Tank {
    pub fn new(parameters: TankParameters) -> Result<Self, TankBuildError> {
        let TankParameters {
            nodes,
            volume,
            wall_u_value,
            initial_node_temps,
            outflow_node,
            heater_draw_node,
            supply_temp,
            return_temp,
            ambient_temp,
            fluid,
            timestep,
        } = parameters;

        if nodes < MIN_NODES {
            return Err(TankBuildError::TooFewNodes(nodes));
        }
        let top = nodes - 1;
        let outflow_node = outflow_node.unwrap_or(top);
        for (role, index) in [
            ("outflow", outflow_node),
            ("heater draw", heater_draw_node),
        ] {
            if index > top {
                return Err(TankBuildError::NodeOutOfRange { role, index, top });
            }
        }

        let node_temps = match initial_node_temps {
            Some(temps) if temps.len() != nodes => {
                return Err(TankBuildError::InitialTemperatureCount {
                    expected: nodes,
                    actual: temps.len(),
                });
            }
            Some(temps) => temps,
            None => vec![DEFAULT_START_TEMP; nodes],
        };

        // dimensions from the volume at the fixed aspect ratio:
        // V = AR * pi * D^3 / 4
        let diameter = (4. * volume / (TANK_ASPECT_RATIO * PI)).powf(1. / 3.);
        let height = TANK_ASPECT_RATIO * diameter;
        let node_area = (diameter / 2.).powi(2) * PI;
        let node_surface = diameter * PI * height / nodes as f64;
        let node_height = height / nodes as f64;
        let node_mass = volume * fluid.density() / nodes as f64;

        Ok(Self {
            node_mass,
            node_area,
            node_surface,
            node_height,
            wall_u_value,
            ambient_temp,
            supply_temp,
            return_temp,
            outflow_node,
            heater_draw_node,
            fluid,
            timestep,
            node_temps,
            input_masses: vec![0.; nodes],
            input_temps: vec![0.; nodes],
            output_masses: vec![0.; nodes],
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_temps.len()
    }

    pub fn node_temperatures(&self) -> &[f64] {
        &self.node_temps
    }

    pub fn node_mass(&self) -> f64 {
        self.node_mass
    }

    pub fn set_ambient_temperature(&mut self, temp: f64) {
        self.ambient_temp = temp;
    }

    pub fn set_timestep(&mut self, timestep: f64) {
        self.timestep = timestep;
    }

    /// Current temperature at the node serving the heat network.
    pub fn outflow_temp(&self) -> f64 {
        self.node_temps[self.outflow_node]
    }

    /// Current temperature at the node the heat source draws from.
    pub fn heater_draw_temp(&self) -> f64 {
        self.node_temps[self.heater_draw_node]
    }

    /// Energy currently held in the tank, in kWh. This is relative to zero
    /// degrees rather than absolute, and not all of it is extractable.
    pub fn energy_stored(&self) -> f64 {
        self.node_temps
            .iter()
            .map(|temp| temp * self.node_mass * self.fluid.specific_heat())
            .sum()
    }

    /// Withdraw `q_out` kWh from the outflow node in this timestep, returning
    /// the mass drawn from the tank to provide it.
    ///
    /// If the outflow node is hotter than the supply setpoint the outflow is
    /// mixed with return water to hit the setpoint exactly; otherwise all
    /// mass is drawn at the outflow temperature, accepting under-temperature
    /// delivery. The drawn mass re-enters at the return temperature via the
    /// manifold.
    pub fn draw_load(&mut self, q_out: f64) -> Result<f64, TankFault> {
        if q_out == 0. {
            return Ok(0.);
        }

        let network_delta = self.supply_temp - self.return_temp;
        let tank_delta = self.outflow_temp() - self.return_temp;

        let mass_from_tank = if self.outflow_temp() > self.supply_temp {
            let mass_in_network = q_out / (network_delta * self.fluid.specific_heat());
            mass_in_network * network_delta / tank_delta
        } else {
            q_out / (tank_delta * self.fluid.specific_heat())
        };

        self.reinject(self.return_temp, mass_from_tank)?;
        self.output_masses[self.outflow_node] += mass_from_tank;

        Ok(mass_from_tank)
    }

    /// Inject `mass_in` kg of fluid at `t_in` degrees in this timestep,
    /// drawing the same mass from the heater draw node. Returns the energy
    /// thus absorbed, in kWh, which is zero (and nothing moves) when the
    /// temperature differential is below the minimum useful threshold.
    pub fn inject_heat(&mut self, mass_in: f64, t_in: f64) -> Result<f64, TankFault> {
        let delta_t = t_in - self.heater_draw_temp();
        if delta_t < MIN_USEFUL_DIFFERENTIAL {
            return Ok(0.);
        }

        let q_in = self.fluid.energy_content(mass_in, t_in, self.heater_draw_temp());

        self.output_masses[self.heater_draw_node] += mass_in;
        self.reinject(t_in, mass_in)?;

        Ok(q_in)
    }

    /// Apportion `mass` kg of fluid at `t_in` degrees between as many nodes
    /// as are required, assuming a perfect low velocity manifold which
    /// prevents any mixing on the way in.
    ///
    /// The target is the lowest node at least as hot as the incoming fluid,
    /// so fluid floats to just above anything cooler than itself. Mass
    /// beyond a node's fixed capacity cascades to the adjacent node on the
    /// side away from the target, first downwards then upwards.
    fn reinject(&mut self, t_in: f64, mass: f64) -> Result<(), TankFault> {
        let top = self.node_count() - 1;
        let target = self
            .node_temps
            .iter()
            .position(|&temp| temp >= t_in)
            .unwrap_or(top);

        let mut injecting_node = target;
        let mut remaining_mass = mass;

        loop {
            // mass already queued for this node counts against its capacity,
            // and the flows mix on a first-come-first-served basis
            let capacity = self.node_mass - self.input_masses[injecting_node];
            let mass_for_this_node = min_of_2(remaining_mass, capacity);
            remaining_mass -= mass_for_this_node;

            self.input_temps[injecting_node] = mix_temperatures(
                (
                    self.input_temps[injecting_node],
                    self.input_masses[injecting_node],
                ),
                (t_in, mass_for_this_node),
            );
            self.input_masses[injecting_node] += mass_for_this_node;

            if remaining_mass <= 0. {
                return Ok(());
            }

            injecting_node = if injecting_node > 0 && injecting_node <= target {
                // iterating downwards with space still to go
                injecting_node - 1
            } else if injecting_node == 0 && target < top {
                // reached the bottom, so overflow above the original target
                target + 1
            } else if injecting_node > target && injecting_node < top {
                injecting_node + 1
            } else {
                return Err(TankFault::CirculationExceeded { mass });
            };
        }
    }

    /// Advance all node temperatures by one timestep, solving the implicit
    /// heat balance A.T = C for the new temperature field and clearing the
    /// pending flows.
    pub fn process_timestep(&mut self) -> Result<(), TankFault> {
        let nodes = self.node_count();
        let cp = self.fluid.specific_heat();
        let conduction_coupling = self.fluid.conductivity() * self.node_area / self.node_height;

        let mut coeffs: DMatrix<f64> = DMatrix::zeros(nodes, nodes);
        let mut rhs: DVector<f64> = DVector::zeros(nodes);

        // net flow up into each node, zero at the bottom of the tank
        let mut mass_upflow_in = 0.;

        for node in 0..nodes {
            let mass_upflow_out =
                mass_upflow_in + self.input_masses[node] - self.output_masses[node];

            if self.input_masses[node] > self.node_mass {
                // the manifold rule cascades before this can happen
                warn!(
                    node,
                    mass = self.input_masses[node],
                    "external flow into node is greater than the node mass"
                );
            }

            // exposed surface is larger for the two end nodes
            let mut loss_area = self.node_surface;
            if node == 0 || node == nodes - 1 {
                loss_area += self.node_area;
            }

            let mut diagonal = self.node_mass * cp / self.timestep
                + self.output_masses[node] * cp
                + conduction_coupling
                + self.wall_u_value * loss_area;

            // interior nodes conduct to a neighbour on both sides
            if node > 0 && node < nodes - 1 {
                diagonal += conduction_coupling;
            }

            if mass_upflow_out > 0. {
                diagonal += mass_upflow_out * cp;
            }
            if mass_upflow_in < 0. {
                diagonal -= mass_upflow_in * cp;
            }
            coeffs[(node, node)] = diagonal;

            if node > 0 {
                coeffs[(node, node - 1)] = -conduction_coupling;
                if mass_upflow_in > 0. {
                    coeffs[(node, node - 1)] -= mass_upflow_in * cp;
                }
            }
            if node < nodes - 1 {
                coeffs[(node, node + 1)] = -conduction_coupling;
                if mass_upflow_out < 0. {
                    coeffs[(node, node + 1)] += mass_upflow_out * cp;
                }
            }

            rhs[node] = self.node_mass * cp * self.node_temps[node] / self.timestep
                + self.wall_u_value * loss_area * self.ambient_temp
                + self.input_masses[node] * cp * self.input_temps[node];

            mass_upflow_in = mass_upflow_out;
        }

        if !is_close!(mass_upflow_in, 0., abs_tol = MASS_CLOSURE_TOLERANCE) {
            return Err(TankFault::MassImbalance {
                remainder: mass_upflow_in,
            });
        }

        // the diagonal carries the node thermal mass over the timestep, so the
        // system is strictly diagonally dominant and LU cannot fail here
        let temps = coeffs
            .lu()
            .solve(&rhs)
            .expect("tank heat balance matrix is non-singular");
        self.node_temps = temps.iter().copied().collect();

        self.input_masses.fill(0.);
        self.input_temps.fill(0.);
        self.output_masses.fill(0.);

        Ok(())
    }
}

/// Temperature of two mixed flows, weighted by mass.
fn mix_temperatures((temp_a, mass_a): (f64, f64), (temp_b, mass_b): (f64, f64)) -> f64 {
    let total_mass = mass_a + mass_b;
    if total_mass == 0. {
        return temp_b;
    }
    (temp_a * mass_a + temp_b * mass_b) / total_mass
}
