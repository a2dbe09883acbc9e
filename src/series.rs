use crate::errors::PlanningError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;

/// Timestamp-indexed numeric and binary sequences covering the planning
/// horizon. All series consumed in one planning cycle are expected to share
/// the forecast's hourly index; values are looked up by timestamp rather
/// than by position so that a shortened (degraded) horizon still lines up.

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(try_from = "Vec<(DateTime<Utc>, f64)>")]
pub struct HourlySeries {
    values: IndexMap<DateTime<Utc>, f64>,
}

impl HourlySeries {
    /// Build a series from (timestamp, value) pairs, which must be supplied
    /// in strictly ascending timestamp order.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (DateTime<Utc>, f64)>,
    ) -> Result<Self, PlanningError> {
        let mut values = IndexMap::new();
        let mut previous: Option<DateTime<Utc>> = None;
        for (timestamp, value) in pairs {
            if previous.is_some_and(|p| timestamp <= p) {
                return Err(PlanningError::NonMonotonicIndex { timestamp });
            }
            previous = Some(timestamp);
            values.insert(timestamp, value);
        }
        Ok(Self { values })
    }

    /// Build a series holding the same value at every timestamp of the given index.
    pub fn constant(index: impl IntoIterator<Item = DateTime<Utc>>, value: f64) -> Self {
        Self {
            values: index.into_iter().map(|t| (t, value)).collect(),
        }
    }

    pub fn get(&self, timestamp: DateTime<Utc>) -> Option<f64> {
        self.values.get(&timestamp).copied()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.values.iter().map(|(t, v)| (*t, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.values.keys().next().copied()
    }

    /// Whether this series is defined at every timestamp of the given index.
    /// A series longer than the index is still usable as lookups go by
    /// timestamp, so only missing entries count as misalignment.
    pub fn covers(&self, index: impl IntoIterator<Item = DateTime<Utc>>) -> bool {
        index.into_iter().all(|t| self.values.contains_key(&t))
    }

    /// Entries strictly before the given timestamp, in index order.
    pub fn before(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.iter().take_while(move |(t, _)| *t < cutoff)
    }

    /// Remove the earliest entry, shortening the horizon from the front.
    pub fn drop_first(&mut self) {
        self.values.shift_remove_index(0);
    }
}

impl TryFrom<Vec<(DateTime<Utc>, f64)>> for HourlySeries {
    type Error = PlanningError;

    fn try_from(pairs: Vec<(DateTime<Utc>, f64)>) -> Result<Self, Self::Error> {
        Self::from_pairs(pairs)
    }
}

/// The on/off heating plan over the forecast horizon. Created all-off each
/// planning cycle; the scheduler's search only ever switches hours on, so
/// the count of active hours grows monotonically within a cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule {
    entries: IndexMap<DateTime<Utc>, bool>,
}

impl Schedule {
    pub fn all_off(index: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self {
            entries: index.into_iter().map(|t| (t, false)).collect(),
        }
    }

    pub fn is_active(&self, timestamp: DateTime<Utc>) -> bool {
        self.entries.get(&timestamp).copied().unwrap_or(false)
    }

    /// Switch an hour on. Entries are never switched back off within a
    /// planning cycle. Timestamps outside the horizon are ignored.
    pub fn set_active(&mut self, timestamp: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(&timestamp) {
            *entry = true;
        }
    }

    pub fn active_hours(&self) -> usize {
        self.entries.values().filter(|on| **on).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the first hour of the horizon is scheduled for heating. This
    /// is the control signal handed to the actual heat pump each cycle.
    pub fn first_hour_active(&self) -> bool {
        self.entries.values().next().copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, bool)> + '_ {
        self.entries.iter().map(|(t, on)| (*t, *on))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// An hourly index of the given length starting at an arbitrary fixed hour.
    pub(crate) fn hourly_index(hours: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2019, 2, 1, 0, 0, 0).unwrap();
        (0..hours)
            .map(|h| start + chrono::Duration::hours(h as i64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::hourly_index;
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn index() -> Vec<DateTime<Utc>> {
        hourly_index(4)
    }

    #[rstest]
    fn should_reject_out_of_order_timestamps(index: Vec<DateTime<Utc>>) {
        let pairs = vec![(index[1], 1.), (index[0], 2.)];
        assert!(matches!(
            HourlySeries::from_pairs(pairs),
            Err(PlanningError::NonMonotonicIndex { timestamp }) if timestamp == index[0]
        ));
    }

    #[rstest]
    fn should_look_up_values_by_timestamp(index: Vec<DateTime<Utc>>) {
        let series =
            HourlySeries::from_pairs(index.iter().enumerate().map(|(i, t)| (*t, i as f64)))
                .unwrap();
        assert_eq!(series.get(index[2]), Some(2.));
        assert_eq!(series.len(), 4);
        assert_eq!(series.first_timestamp(), Some(index[0]));
    }

    #[rstest]
    fn should_report_coverage_of_an_index(index: Vec<DateTime<Utc>>) {
        let series = HourlySeries::constant(index.clone(), 1.5);
        assert!(series.covers(index.clone()));
        let mut shortened = series.clone();
        shortened.drop_first();
        assert!(!shortened.covers(index.clone()));
        // the other way round a longer series still covers a shortened index
        assert!(series.covers(index[1..].iter().copied()));
    }

    #[rstest]
    fn should_iterate_entries_strictly_before_a_cutoff(index: Vec<DateTime<Utc>>) {
        let series = HourlySeries::constant(index.clone(), 0.);
        let before: Vec<_> = series.before(index[2]).map(|(t, _)| t).collect();
        assert_eq!(before, vec![index[0], index[1]]);
    }

    #[rstest]
    fn schedule_should_start_all_off_and_only_switch_on(index: Vec<DateTime<Utc>>) {
        let mut schedule = Schedule::all_off(index.clone());
        assert_eq!(schedule.active_hours(), 0);
        assert!(!schedule.first_hour_active());

        schedule.set_active(index[0]);
        schedule.set_active(index[2]);
        assert_eq!(schedule.active_hours(), 2);
        assert!(schedule.is_active(index[2]));
        assert!(schedule.first_hour_active());

        // out-of-horizon timestamps are ignored
        schedule.set_active(index[3] + chrono::Duration::hours(10));
        assert_eq!(schedule.active_hours(), 2);
    }
}
