use crate::core::heat_pump::HeatPumpParameters;
use crate::core::scheduler::PlanningParameters;
use crate::core::tank::TankParameters;
use crate::errors::PlanningError;
use crate::series::HourlySeries;
use serde::Deserialize;
use std::io::{BufReader, Read};

pub fn ingest_scenario(json: impl Read) -> Result<Scenario, anyhow::Error> {
    let reader = BufReader::new(json);
    let scenario: Scenario = serde_json::from_reader(reader)?;
    scenario.validate()?;
    Ok(scenario)
}

/// One planning cycle's worth of input: device parameters plus the hourly
/// forecast, demand and surplus series over the horizon. Device sections may
/// be omitted to take the reference equipment defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub tank: TankParameters,
    #[serde(default)]
    pub heat_pump: HeatPumpParameters,
    #[serde(default)]
    pub planning: PlanningParameters,
    pub forecast: HourlySeries,
    pub demand: HourlySeries,
    pub surplus: HourlySeries,
}

impl Scenario {
    fn validate(&self) -> Result<(), PlanningError> {
        for (name, series) in [("demand", &self.demand), ("surplus", &self.surplus)] {
            if !series.covers(self.forecast.timestamps()) {
                return Err(PlanningError::MisalignedSeries { series: name });
            }
        }
        Ok(())
    }
}
