use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Errors that prevent a planning cycle from running at all, as opposed to
/// trial failures (which feed back into the scheduler's search) or advisory
/// diagnostics (which are reported alongside normal results).
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("no weather forecast is available and none was previously cached")]
    ForecastUnavailable,
    #[error("previously cached forecast has no hours left to plan over")]
    HorizonExhausted,
    #[error("{series} series does not share the forecast's hourly index")]
    MisalignedSeries { series: &'static str },
    #[error("series timestamps must be strictly ascending (saw {timestamp} out of order)")]
    NonMonotonicIndex { timestamp: DateTime<Utc> },
}

/// Advisory conditions raised while simulating. These clamp or warn rather
/// than abort, so they are carried as values in results rather than errors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Diagnostic {
    /// Heat pump mass flow exceeded the rated flow for the timestep.
    FlowExceeded { mass: f64, limit: f64 },
    /// Heat demanded of the heat pump exceeded rated capacity and was clamped.
    CapacityExceeded { heat_required: f64, limit: f64 },
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::FlowExceeded { mass, limit } => write!(
                f,
                "mass flow of {mass:.1}kg exceeds rated flow of {limit:.1}kg for this timestep"
            ),
            Diagnostic::CapacityExceeded {
                heat_required,
                limit,
            } => write!(
                f,
                "heat demand of {heat_required:.2}kWh exceeds rated capacity of {limit:.2}kWh"
            ),
        }
    }
}
