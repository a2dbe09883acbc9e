use crate::errors::PlanningError;
use crate::series::HourlySeries;
use chrono::NaiveDate;
use indexmap::IndexMap;
use itertools::Itertools;
use tracing::warn;

/// The weather data a planning cycle consumes: hourly ambient temperature
/// over the horizon, plus a daily-average temperature derived from it for
/// collaborators (such as the demand model) that work per day.
///
/// How the forecast is obtained is a boundary concern; this module only
/// covers the shape of the data and the fallback behaviour when retrieval
/// fails.
#[derive(Clone, Debug, PartialEq)]
pub struct WeatherForecast {
    temperature: HourlySeries,
}

impl WeatherForecast {
    pub fn new(temperature: HourlySeries) -> Self {
        Self { temperature }
    }

    pub fn temperature(&self) -> &HourlySeries {
        &self.temperature
    }

    pub fn timestamps(&self) -> impl Iterator<Item = chrono::DateTime<chrono::Utc>> + '_ {
        self.temperature.timestamps()
    }

    pub fn len(&self) -> usize {
        self.temperature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty()
    }

    /// The mean forecast temperature of each calendar day, indexed by the
    /// same hourly timestamps as the forecast itself.
    pub fn daily_average_temperature(&self) -> HourlySeries {
        let day_means: IndexMap<NaiveDate, f64> = self
            .temperature
            .iter()
            .chunk_by(|(timestamp, _)| timestamp.date_naive())
            .into_iter()
            .map(|(day, hours)| {
                let temps: Vec<f64> = hours.map(|(_, temp)| temp).collect();
                (day, temps.iter().sum::<f64>() / temps.len() as f64)
            })
            .collect();

        HourlySeries::from_pairs(
            self.temperature
                .timestamps()
                .map(|timestamp| (timestamp, day_means[&timestamp.date_naive()])),
        )
        .expect("forecast index is already strictly ascending")
    }

    fn drop_first_hour(&mut self) {
        self.temperature.drop_first();
    }
}

/// Keeps the most recent forecast so that a planning cycle can still run
/// when retrieval fails, on a horizon shortened from the front. With no
/// history at all the cycle cannot proceed.
#[derive(Debug, Default)]
pub struct ForecastCache {
    previous: Option<WeatherForecast>,
}

impl ForecastCache {
    pub fn new() -> Self {
        Default::default()
    }

    /// Store and return the latest forecast, or fall back to the cached one
    /// with its oldest hour dropped.
    pub fn refresh(
        &mut self,
        latest: Option<WeatherForecast>,
    ) -> Result<WeatherForecast, PlanningError> {
        match latest {
            Some(forecast) => {
                self.previous = Some(forecast.clone());
                Ok(forecast)
            }
            None => {
                let previous = self
                    .previous
                    .as_mut()
                    .ok_or(PlanningError::ForecastUnavailable)?;
                warn!("could not retrieve forecast, planning on previous one with shortened horizon");
                previous.drop_first_hour();
                if previous.is_empty() {
                    return Err(PlanningError::HorizonExhausted);
                }
                Ok(previous.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::hourly_index;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn forecast() -> WeatherForecast {
        // 26 hours, so the horizon spans two calendar days
        let index = hourly_index(26);
        WeatherForecast::new(
            HourlySeries::from_pairs(
                index
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (*t, if i < 24 { 4. } else { 10. })),
            )
            .unwrap(),
        )
    }

    #[rstest]
    fn should_derive_daily_average_per_calendar_day(forecast: WeatherForecast) {
        let averages = forecast.daily_average_temperature();
        assert_eq!(averages.len(), forecast.len());
        let index = hourly_index(26);
        assert_eq!(averages.get(index[0]), Some(4.));
        assert_eq!(averages.get(index[23]), Some(4.));
        assert_eq!(averages.get(index[25]), Some(10.));
    }

    #[rstest]
    fn cache_should_pass_through_and_remember_a_fresh_forecast(forecast: WeatherForecast) {
        let mut cache = ForecastCache::new();
        let returned = cache.refresh(Some(forecast.clone())).unwrap();
        assert_eq!(returned, forecast);
    }

    #[test]
    fn cache_should_fail_with_no_forecast_and_no_history() {
        let mut cache = ForecastCache::new();
        assert!(matches!(
            cache.refresh(None),
            Err(PlanningError::ForecastUnavailable)
        ));
    }

    #[rstest]
    fn cache_should_shorten_the_horizon_when_retrieval_fails(forecast: WeatherForecast) {
        let mut cache = ForecastCache::new();
        cache.refresh(Some(forecast.clone())).unwrap();

        let degraded = cache.refresh(None).unwrap();
        assert_eq!(degraded.len(), forecast.len() - 1);
        assert_eq!(
            degraded.timestamps().next(),
            forecast.timestamps().nth(1),
            "oldest hour should have been dropped"
        );

        // each further failure shaves another hour
        let degraded = cache.refresh(None).unwrap();
        assert_eq!(degraded.len(), forecast.len() - 2);
    }

    #[test]
    fn cache_should_report_an_exhausted_horizon() {
        let mut cache = ForecastCache::new();
        let one_hour = WeatherForecast::new(HourlySeries::constant(hourly_index(1), 5.));
        cache.refresh(Some(one_hour)).unwrap();
        assert!(matches!(
            cache.refresh(None),
            Err(PlanningError::HorizonExhausted)
        ));
    }
}
