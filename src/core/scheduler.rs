use crate::core::forecast::WeatherForecast;
use crate::core::heat_pump::HeatPump;
use crate::core::simulator::{
    HourLogSink, SimulationOutcome, Simulator, DEFAULT_SUBSTEPS_PER_HOUR,
};
use crate::core::tank::Tank;
use crate::errors::{Diagnostic, PlanningError};
use crate::series::{HourlySeries, Schedule};
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::Deserialize;
use std::cmp::Reverse;
use tracing::{debug, info, warn};

/// Builds the heating schedule for one planning cycle by greedy search:
/// start with no heating at all, simulate, and whenever the comfort
/// condition fails, switch on the not-yet-scheduled hour with the greatest
/// predicted surplus before the failure. Hours are only ever added, so the
/// search finishes in at most horizon-length iterations.

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PlanningParameters {
    /// comfort condition: minimum acceptable network outflow temperature
    pub minimum_temperature: f64,
    pub substeps_per_hour: usize,
}

impl Default for PlanningParameters {
    fn default() -> Self {
        Self {
            minimum_temperature: 38.,
            substeps_per_hour: DEFAULT_SUBSTEPS_PER_HOUR,
        }
    }
}

/// The accepted (or best-effort) plan for one cycle.
#[derive(Clone, Debug)]
pub struct PlanOutcome {
    pub schedule: Schedule,
    pub electricity_used: f64,
    pub electricity_imported: f64,
    /// false when the search exhausted every addable hour and the emitted
    /// schedule may still breach comfort
    pub comfort_guaranteed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanOutcome {
    /// The control signal for the current hour, to be handed to the actual
    /// heat pump by the driver.
    pub fn heat_now(&self) -> bool {
        self.schedule.first_hour_active()
    }
}

pub struct Scheduler {
    simulator: Simulator,
}

impl Scheduler {
    pub fn new(heat_pump: HeatPump, parameters: PlanningParameters) -> Self {
        Self {
            simulator: Simulator::new(
                heat_pump,
                parameters.minimum_temperature,
                parameters.substeps_per_hour,
            ),
        }
    }

    /// Run one planning cycle from the given tank state, producing the
    /// schedule for the forecast horizon together with its predicted
    /// energy use.
    pub fn plan_once(
        &self,
        tank: &Tank,
        forecast: &WeatherForecast,
        demand: &HourlySeries,
        surplus: &HourlySeries,
        mut log: Option<&mut dyn HourLogSink>,
    ) -> anyhow::Result<PlanOutcome> {
        for (name, series) in [("demand", demand), ("surplus", surplus)] {
            if !series.covers(forecast.timestamps()) {
                return Err(PlanningError::MisalignedSeries { series: name }.into());
            }
        }

        let mut schedule = Schedule::all_off(forecast.timestamps());

        loop {
            debug!(
                active_hours = schedule.active_hours(),
                "running scenario"
            );

            let result = self
                .simulator
                .run(tank, forecast, demand, &schedule, surplus, log.as_deref_mut())?;

            let comfort_guaranteed = match result.outcome {
                SimulationOutcome::Completed => true,
                SimulationOutcome::Failed { timestamp, cause } => {
                    debug!(%timestamp, ?cause, "scenario failed");

                    if let Some(added) = add_hour(&mut schedule, surplus, timestamp) {
                        debug!(%added, "scheduling an extra hour of heating");
                        continue;
                    }

                    // no hours left to add before the failure: give up with
                    // the last-evaluated schedule
                    warn!("could not maintain comfort conditions even with continuous heating");
                    false
                }
            };

            info!(
                active_hours = schedule.active_hours(),
                electricity_used = result.electricity_used,
                electricity_imported = result.electricity_imported,
                comfort_guaranteed,
                "planning cycle finished"
            );

            return Ok(PlanOutcome {
                schedule,
                electricity_used: result.electricity_used,
                electricity_imported: result.electricity_imported,
                comfort_guaranteed,
                diagnostics: result.diagnostics,
            });
        }
    }
}

/// Switch on the unscheduled hour with the highest surplus strictly before
/// the failure time, returning the hour added, or `None` when every hour
/// before the failure is already on. Equal surpluses tie-break to the
/// earliest hour, keeping the search deterministic.
fn add_hour(
    schedule: &mut Schedule,
    surplus: &HourlySeries,
    failure_time: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let (to_add, _) = surplus
        .before(failure_time)
        .filter(|(timestamp, _)| !schedule.is_active(*timestamp))
        .min_by_key(|(timestamp, hour_surplus)| {
            (Reverse(OrderedFloat(*hour_surplus)), *timestamp)
        })?;

    schedule.set_active(to_add);
    Some(to_add)
}
