use crate::compare_floats::max_of_2;
use crate::core::forecast::WeatherForecast;
use crate::core::heat_pump::HeatPump;
use crate::core::tank::Tank;
use crate::errors::{Diagnostic, PlanningError};
use crate::series::{HourlySeries, Schedule};
use chrono::{DateTime, Utc};

/// Runs a candidate heating schedule forward over the forecast horizon to
/// see whether the comfort criteria are breached before the forecast runs
/// out of road.
///
/// The simulator works on private copies of the tank and heat pump, so a
/// failed trial leaves no trace on the caller's live device state. Each
/// forecast hour is subdivided into equal sub-steps for solver stability,
/// with the hour's demand apportioned evenly across them.

pub const DEFAULT_SUBSTEPS_PER_HOUR: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FailureCause {
    /// Outflow temperature fell below the comfort minimum at the end of an hour.
    ComfortBreach,
    /// More fluid moved through the tank in one sub-step than the tank holds.
    TankCirculationExceeded,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SimulationOutcome {
    /// The full horizon completed without a comfort breach.
    Completed,
    Failed {
        timestamp: DateTime<Utc>,
        cause: FailureCause,
    },
}

impl SimulationOutcome {
    pub fn failure_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SimulationOutcome::Completed => None,
            SimulationOutcome::Failed { timestamp, .. } => Some(*timestamp),
        }
    }
}

/// Result of evaluating one candidate schedule. Energy totals cover the
/// simulated hours up to completion or failure.
#[derive(Clone, Debug)]
pub struct SimulationResult {
    /// electrical energy used by the heat pump, in kWh
    pub electricity_used: f64,
    /// electrical energy not covered by the predicted surplus, in kWh
    pub electricity_imported: f64,
    pub outcome: SimulationOutcome,
    pub diagnostics: Vec<Diagnostic>,
}

/// One row of the per-hour simulation log.
#[derive(Clone, Debug)]
pub struct HourRecord {
    pub node_temps: Vec<f64>,
    pub timestamp: DateTime<Utc>,
    pub ambient_temp: f64,
    pub demand: f64,
    pub energy_stored: f64,
    pub mass_drawn: f64,
    pub heat_injected: f64,
    pub surplus: f64,
    pub electricity_used: f64,
    pub mass_heated: f64,
    pub heating_active: bool,
}

/// Where per-hour log rows go. Formatting is up to the sink.
pub trait HourLogSink {
    fn record(&mut self, record: &HourRecord) -> anyhow::Result<()>;
}

pub struct Simulator {
    heat_pump: HeatPump,
    minimum_temperature: f64,
    substeps_per_hour: usize,
}

impl Simulator {
    /// Arguments:
    /// * `heat_pump` - the heat pump to be used in the simulation
    /// * `minimum_temperature` - the comfort condition on the outflow node
    /// * `substeps_per_hour` - tank solver steps per forecast hour
    pub fn new(heat_pump: HeatPump, minimum_temperature: f64, substeps_per_hour: usize) -> Self {
        Self {
            heat_pump,
            minimum_temperature,
            substeps_per_hour,
        }
    }

    /// Simulate `schedule` against the forecast, demand and surplus series,
    /// starting from the given tank state.
    ///
    /// A comfort breach or tank circulation fault ends the trial with a
    /// failure timestamp; both are expected outcomes that feed the
    /// scheduler's search. Only internal invariant violations (mass
    /// imbalance) propagate as errors.
    pub fn run(
        &self,
        tank: &Tank,
        forecast: &WeatherForecast,
        demand: &HourlySeries,
        schedule: &Schedule,
        surplus: &HourlySeries,
        mut log: Option<&mut (dyn HourLogSink + '_)>,
    ) -> anyhow::Result<SimulationResult> {
        // trial runs must not mutate the caller's real device state
        let mut tank = tank.clone();
        let mut heat_pump = self.heat_pump.clone();

        let substep_length = 1. / self.substeps_per_hour as f64;
        tank.set_timestep(substep_length);
        heat_pump.set_timestep(substep_length);

        let mut total_used = 0.;
        let mut total_imported = 0.;
        let mut diagnostics = vec![];

        for (timestamp, ambient_temp) in forecast.temperature().iter() {
            tank.set_ambient_temperature(ambient_temp);
            heat_pump.set_ambient_temperature(ambient_temp);

            let hour_demand = demand
                .get(timestamp)
                .ok_or(PlanningError::MisalignedSeries { series: "demand" })?;
            let hour_surplus = surplus
                .get(timestamp)
                .ok_or(PlanningError::MisalignedSeries { series: "surplus" })?;

            let substep_demand = hour_demand / self.substeps_per_hour as f64;
            let heating_active = schedule.is_active(timestamp);

            let mut electricity_this_hour = 0.;
            let mut heat_this_hour = 0.;
            let mut mass_drawn_this_hour = 0.;
            let mut mass_heated_this_hour = 0.;
            let mut circulation_fault = false;

            'substeps: for _ in 0..self.substeps_per_hour {
                match tank.draw_load(substep_demand) {
                    Ok(mass) => mass_drawn_this_hour += mass,
                    Err(fault) if fault.is_fatal() => return Err(fault.into()),
                    Err(_) => {
                        circulation_fault = true;
                        break 'substeps;
                    }
                }

                if heating_active {
                    let mass_to_heat = heat_pump.heatable_mass(tank.heater_draw_temp());
                    let q_in =
                        match tank.inject_heat(mass_to_heat, heat_pump.target_flow_temp()) {
                            Ok(q_in) => q_in,
                            Err(fault) if fault.is_fatal() => return Err(fault.into()),
                            Err(_) => {
                                circulation_fault = true;
                                break 'substeps;
                            }
                        };

                    if q_in > 0. {
                        heat_this_hour += q_in;
                        electricity_this_hour += heat_pump.deliver_heat(
                            tank.heater_draw_temp(),
                            mass_to_heat,
                            &mut diagnostics,
                        );
                        mass_heated_this_hour += mass_to_heat;
                    }
                }

                tank.process_timestep()?;
            }

            total_used += electricity_this_hour;
            total_imported += if hour_surplus > 0. {
                max_of_2(0., electricity_this_hour - hour_surplus)
            } else {
                electricity_this_hour
            };

            if circulation_fault {
                return Ok(SimulationResult {
                    electricity_used: total_used,
                    electricity_imported: total_imported,
                    outcome: SimulationOutcome::Failed {
                        timestamp,
                        cause: FailureCause::TankCirculationExceeded,
                    },
                    diagnostics,
                });
            }

            if let Some(sink) = log.as_deref_mut() {
                sink.record(&HourRecord {
                    node_temps: tank.node_temperatures().to_vec(),
                    timestamp,
                    ambient_temp,
                    demand: hour_demand,
                    energy_stored: tank.energy_stored(),
                    mass_drawn: mass_drawn_this_hour,
                    heat_injected: heat_this_hour,
                    surplus: hour_surplus,
                    electricity_used: electricity_this_hour,
                    mass_heated: mass_heated_this_hour,
                    heating_active,
                })?;
            }

            if tank.outflow_temp() < self.minimum_temperature {
                return Ok(SimulationResult {
                    electricity_used: total_used,
                    electricity_imported: total_imported,
                    outcome: SimulationOutcome::Failed {
                        timestamp,
                        cause: FailureCause::ComfortBreach,
                    },
                    diagnostics,
                });
            }
        }

        Ok(SimulationResult {
            electricity_used: total_used,
            electricity_imported: total_imported,
            outcome: SimulationOutcome::Completed,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tank::TankParameters;
    use crate::series::test_support::hourly_index;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    const MINIMUM_TEMPERATURE: f64 = 38.;

    fn simulator() -> Simulator {
        Simulator::new(
            HeatPump::default(),
            MINIMUM_TEMPERATURE,
            DEFAULT_SUBSTEPS_PER_HOUR,
        )
    }

    fn tank() -> Tank {
        Tank::new(TankParameters::default()).unwrap()
    }

    #[fixture]
    fn horizon() -> Vec<DateTime<Utc>> {
        hourly_index(48)
    }

    fn forecast_over(horizon: &[DateTime<Utc>], temp: f64) -> WeatherForecast {
        WeatherForecast::new(HourlySeries::constant(horizon.iter().copied(), temp))
    }

    struct CountingLog {
        rows: Vec<HourRecord>,
    }

    impl HourLogSink for CountingLog {
        fn record(&mut self, record: &HourRecord) -> anyhow::Result<()> {
            self.rows.push(record.clone());
            Ok(())
        }
    }

    #[rstest]
    fn all_off_schedule_with_heavy_demand_should_breach(horizon: Vec<DateTime<Utc>>) {
        let forecast = forecast_over(&horizon, 5.);
        let demand = HourlySeries::constant(horizon.iter().copied(), 6.);
        let surplus = HourlySeries::constant(horizon.iter().copied(), 0.);
        let schedule = Schedule::all_off(horizon.iter().copied());

        let result = simulator()
            .run(&tank(), &forecast, &demand, &schedule, &surplus, None)
            .unwrap();

        let SimulationOutcome::Failed { timestamp, cause } = result.outcome else {
            panic!("expected a comfort breach, got {:?}", result.outcome);
        };
        assert_eq!(cause, FailureCause::ComfortBreach);
        assert!(horizon.contains(&timestamp));
        assert_eq!(result.electricity_used, 0.);
    }

    #[rstest]
    fn always_on_schedule_with_light_demand_should_complete(horizon: Vec<DateTime<Utc>>) {
        let forecast = forecast_over(&horizon, 8.);
        let demand = HourlySeries::constant(horizon.iter().copied(), 2.);
        let surplus = HourlySeries::constant(horizon.iter().copied(), 0.);
        let mut schedule = Schedule::all_off(horizon.iter().copied());
        for timestamp in &horizon {
            schedule.set_active(*timestamp);
        }

        let result = simulator()
            .run(&tank(), &forecast, &demand, &schedule, &surplus, None)
            .unwrap();

        assert_eq!(result.outcome, SimulationOutcome::Completed);
        assert!(result.electricity_used > 0.);
        // no surplus anywhere, so everything used was imported
        assert_relative_eq!(
            result.electricity_imported,
            result.electricity_used,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn surplus_should_offset_imported_electricity(horizon: Vec<DateTime<Utc>>) {
        let forecast = forecast_over(&horizon, 8.);
        let demand = HourlySeries::constant(horizon.iter().copied(), 2.);
        // more surplus than the heat pump can use in any hour
        let surplus = HourlySeries::constant(horizon.iter().copied(), 50.);
        let mut schedule = Schedule::all_off(horizon.iter().copied());
        for timestamp in &horizon {
            schedule.set_active(*timestamp);
        }

        let result = simulator()
            .run(&tank(), &forecast, &demand, &schedule, &surplus, None)
            .unwrap();

        assert_eq!(result.outcome, SimulationOutcome::Completed);
        assert!(result.electricity_used > 0.);
        assert_eq!(result.electricity_imported, 0.);
    }

    #[rstest]
    fn trial_runs_should_not_mutate_the_callers_tank(horizon: Vec<DateTime<Utc>>) {
        let forecast = forecast_over(&horizon, 5.);
        let demand = HourlySeries::constant(horizon.iter().copied(), 6.);
        let surplus = HourlySeries::constant(horizon.iter().copied(), 0.);
        let schedule = Schedule::all_off(horizon.iter().copied());

        let tank = tank();
        let temps_before = tank.node_temperatures().to_vec();
        simulator()
            .run(&tank, &forecast, &demand, &schedule, &surplus, None)
            .unwrap();
        assert_eq!(tank.node_temperatures(), temps_before.as_slice());
    }

    #[rstest]
    fn should_log_one_row_per_completed_hour(horizon: Vec<DateTime<Utc>>) {
        let forecast = forecast_over(&horizon, 8.);
        let demand = HourlySeries::constant(horizon.iter().copied(), 1.);
        let surplus = HourlySeries::constant(horizon.iter().copied(), 3.);
        let mut schedule = Schedule::all_off(horizon.iter().copied());
        schedule.set_active(horizon[0]);

        let mut log = CountingLog { rows: vec![] };
        let result = simulator()
            .run(&tank(), &forecast, &demand, &schedule, &surplus, Some(&mut log))
            .unwrap();

        let simulated_hours = match result.outcome {
            SimulationOutcome::Completed => horizon.len(),
            SimulationOutcome::Failed { timestamp, .. } => {
                horizon.iter().position(|t| *t == timestamp).unwrap() + 1
            }
        };
        assert_eq!(log.rows.len(), simulated_hours);

        let first = &log.rows[0];
        assert_eq!(first.timestamp, horizon[0]);
        assert_eq!(first.demand, 1.);
        assert_eq!(first.surplus, 3.);
        assert!(first.heating_active);
        assert!(first.heat_injected > 0.);
        assert_eq!(first.node_temps.len(), 5);
    }

    #[rstest]
    fn misaligned_demand_series_should_be_an_error(horizon: Vec<DateTime<Utc>>) {
        let forecast = forecast_over(&horizon, 8.);
        // zero demand so the horizon is reached without a breach first
        let demand = HourlySeries::constant(horizon[..24].iter().copied(), 0.);
        let surplus = HourlySeries::constant(horizon.iter().copied(), 0.);
        let schedule = Schedule::all_off(horizon.iter().copied());

        let error = simulator()
            .run(&tank(), &forecast, &demand, &schedule, &surplus, None)
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<PlanningError>(),
            Some(PlanningError::MisalignedSeries { series: "demand" })
        ));
    }
}
