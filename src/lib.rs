mod compare_floats;
pub mod core;
pub mod errors;
pub mod input;
pub mod output;
pub mod series;

#[macro_use]
extern crate is_close;

use crate::core::forecast::WeatherForecast;
use crate::core::heat_pump::HeatPump;
use crate::core::scheduler::{PlanOutcome, Scheduler};
use crate::core::tank::Tank;
use crate::input::ingest_scenario;
use crate::output::{CsvHourLog, Output};
use std::io::Read;
use tracing::info;

/// Run one planning cycle from a scenario document, returning the heating
/// plan for its forecast horizon. Per-hour rows from every trial simulation
/// go to the output under the "simulation" key, unless it is a no-op.
pub fn run_planning_cycle(
    scenario: impl Read,
    output: impl Output,
) -> Result<PlanOutcome, anyhow::Error> {
    let scenario = ingest_scenario(scenario)?;

    let tank = Tank::new(scenario.tank)?;
    let heat_pump = HeatPump::new(scenario.heat_pump);
    let scheduler = Scheduler::new(heat_pump, scenario.planning);
    let forecast = WeatherForecast::new(scenario.forecast);

    let outcome = if output.is_noop() {
        scheduler.plan_once(&tank, &forecast, &scenario.demand, &scenario.surplus, None)?
    } else {
        let mut log = CsvHourLog::new(output.writer_for_location_key("simulation")?);
        let outcome = scheduler.plan_once(
            &tank,
            &forecast,
            &scenario.demand,
            &scenario.surplus,
            Some(&mut log),
        )?;
        log.flush()?;
        outcome
    };

    info!(
        heat_now = outcome.heat_now(),
        "planned {} heating hours over a {} hour horizon",
        outcome.schedule.active_hours(),
        forecast.len()
    );

    Ok(outcome)
}
