//! Read-only reporting over the day buckets: daily, ISO-week and monthly
//! series, oldest first.
//!
//! Series are windows over the days present in storage. Days without a
//! record are absent, not zero-filled.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Datelike;

use crate::{
    clock::parse_day_key,
    models::{DayRecord, PeriodSummary, UsageTotals},
    persistence::{error::PersistenceError, keys, traits::KeyValueStore},
};

/// Builds usage reports from the stored day buckets. Never writes.
pub struct Aggregator<T: KeyValueStore> {
    store: Arc<T>,
}

impl<T: KeyValueStore> Aggregator<T> {
    /// Creates an aggregator over the given store.
    pub fn new(store: Arc<T>) -> Self {
        Self { store }
    }

    /// Every stored day in chronological order. Malformed records read as
    /// zero.
    pub async fn all_days(&self) -> Result<Vec<DayRecord>, PersistenceError> {
        let entries = self.store.get_all_raw_states_by_prefix(keys::DAILY_PREFIX).await?;
        let mut days: Vec<DayRecord> = entries
            .into_iter()
            .filter_map(|(key, raw)| {
                let date = key.strip_prefix(keys::DAILY_PREFIX)?.to_string();
                Some(DayRecord { date, totals: UsageTotals::decode(&raw) })
            })
            .collect();
        days.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(days)
    }

    /// The last `limit` stored days, oldest first.
    pub async fn daily_series(&self, limit: usize) -> Result<Vec<DayRecord>, PersistenceError> {
        Ok(last_n(self.all_days().await?, limit))
    }

    /// The last `weeks * 7` stored days grouped by ISO week, oldest first.
    pub async fn weekly_series(&self, weeks: usize) -> Result<Vec<PeriodSummary>, PersistenceError> {
        Ok(weekly_rollup(&self.daily_series(weeks.saturating_mul(7)).await?))
    }

    /// The last `months * 31` stored days grouped by calendar month, oldest
    /// first.
    pub async fn monthly_series(
        &self,
        months: usize,
    ) -> Result<Vec<PeriodSummary>, PersistenceError> {
        Ok(monthly_rollup(&self.daily_series(months.saturating_mul(31)).await?))
    }
}

fn last_n(mut days: Vec<DayRecord>, n: usize) -> Vec<DayRecord> {
    let skip = days.len().saturating_sub(n);
    days.drain(..skip);
    days
}

/// Groups days by ISO week (`YYYY-Www`, week-year aware). A day key that does
/// not parse forms a group of its own.
pub fn weekly_rollup(days: &[DayRecord]) -> Vec<PeriodSummary> {
    rollup(days, |date| match parse_day_key(date) {
        Some(day) => {
            let week = day.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        None => date.to_string(),
    })
}

/// Groups days by calendar month (`YYYY-MM`).
pub fn monthly_rollup(days: &[DayRecord]) -> Vec<PeriodSummary> {
    rollup(days, |date| match parse_day_key(date) {
        Some(day) => format!("{}-{:02}", day.year(), day.month()),
        None => date.to_string(),
    })
}

/// Sums days per period, ordered by period key.
fn rollup(days: &[DayRecord], period_of: impl Fn(&str) -> String) -> Vec<PeriodSummary> {
    let mut groups: BTreeMap<String, UsageTotals> = BTreeMap::new();
    for day in days {
        *groups.entry(period_of(&day.date)).or_default() += day.totals;
    }
    groups.into_iter().map(|(period, totals)| PeriodSummary { period, totals }).collect()
}
