//! Public operations and the reshaping each applies to the nested result

use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

use super::{SeriesQuery, TsdbEngine};
use crate::error::{Error, Result};
use crate::keys::Key;
use crate::nest::Nested;
use crate::query::Aggregation;

/// `{group: [(timestamp, count), ...]}`
pub type Series = HashMap<Key, Vec<(i64, u64)>>;
/// `{group: count}`
pub type Totals = HashMap<Key, u64>;
/// `{group: [(value, score), ...]}`, lowest score first
pub type RankedValues = HashMap<Key, Vec<(Key, f64)>>;
/// `{group: [(timestamp, {value: score}), ...]}`
pub type RankedSeries = HashMap<Key, Vec<(i64, BTreeMap<Key, f64>)>>;
/// `{group: [(timestamp, nested), ...]}` in nesting order
pub type FrequencySeries = HashMap<Key, Vec<(i64, Nested)>>;
/// `{group: nested}`
pub type FrequencyTotals = HashMap<Key, Nested>;

impl TsdbEngine {
    #[instrument(skip_all, fields(model = %query.model))]
    pub async fn get_range(&self, query: &SeriesQuery) -> Result<Option<Series>> {
        let Some(nested) = self.get_data(query, Aggregation::Count, true, true).await? else {
            return Ok(None);
        };
        sorted_series(nested).map(Some)
    }

    /// Total of each group's range series
    #[instrument(skip_all, fields(model = %query.model))]
    pub async fn get_sums(&self, query: &SeriesQuery) -> Result<Option<Totals>> {
        let Some(series) = self.get_range(query).await? else {
            return Ok(None);
        };
        Ok(Some(
            series
                .into_iter()
                .map(|(key, points)| (key, points.iter().map(|(_, count)| count).sum::<u64>()))
                .collect(),
        ))
    }

    #[instrument(skip_all, fields(model = %query.model))]
    pub async fn get_distinct_counts_series(&self, query: &SeriesQuery) -> Result<Option<Series>> {
        let Some(nested) = self.get_data(query, Aggregation::Uniq, true, true).await? else {
            return Ok(None);
        };
        sorted_series(nested).map(Some)
    }

    #[instrument(skip_all, fields(model = %query.model))]
    pub async fn get_distinct_counts_totals(&self, query: &SeriesQuery) -> Result<Option<Totals>> {
        let Some(nested) = self.get_data(query, Aggregation::Uniq, true, false).await? else {
            return Ok(None);
        };
        totals(nested).map(Some)
    }

    /// Distinct count across every key, without per-group breakdown
    #[instrument(skip_all, fields(model = %query.model))]
    pub async fn get_distinct_counts_union(&self, query: &SeriesQuery) -> Result<Option<u64>> {
        let Some(nested) = self.get_data(query, Aggregation::Uniq, false, false).await? else {
            return Ok(None);
        };
        nested.count().map(Some)
    }

    #[instrument(skip_all, fields(model = %query.model, limit = limit))]
    pub async fn get_most_frequent(
        &self,
        query: &SeriesQuery,
        limit: usize,
    ) -> Result<Option<RankedValues>> {
        let aggregation = Aggregation::TopK(limit);
        let Some(nested) = self.get_data(query, aggregation, true, false).await? else {
            return Ok(None);
        };

        let mut result = RankedValues::new();
        for (key, child) in nested.into_groups() {
            result.insert(key, score_ranked(child.ranked()?));
        }
        Ok(Some(result))
    }

    #[instrument(skip_all, fields(model = %query.model, limit = limit))]
    pub async fn get_most_frequent_series(
        &self,
        query: &SeriesQuery,
        limit: usize,
    ) -> Result<Option<RankedSeries>> {
        let aggregation = Aggregation::TopK(limit);
        let Some(nested) = self.get_data(query, aggregation, true, true).await? else {
            return Ok(None);
        };

        let mut result = RankedSeries::new();
        for (key, child) in nested.into_groups() {
            let mut points = Vec::new();
            for (ts, topk) in child.into_groups() {
                let scores: BTreeMap<Key, f64> = score_ranked(topk.ranked()?).into_iter().collect();
                points.push((timestamp(&ts)?, scores));
            }
            points.sort_by_key(|(ts, _)| *ts);
            result.insert(key, points);
        }
        Ok(Some(result))
    }

    /// Per-timestamp frequencies, left in the order the rows arrived
    #[instrument(skip_all, fields(model = %query.model))]
    pub async fn get_frequency_series(
        &self,
        query: &SeriesQuery,
    ) -> Result<Option<FrequencySeries>> {
        let Some(nested) = self.get_data(query, Aggregation::Count, true, true).await? else {
            return Ok(None);
        };

        let mut result = FrequencySeries::new();
        for (key, child) in nested.into_groups() {
            let points = child
                .into_groups()
                .into_iter()
                .map(|(ts, value)| Ok((timestamp(&ts)?, value)))
                .collect::<Result<Vec<_>>>()?;
            result.insert(key, points);
        }
        Ok(Some(result))
    }

    #[instrument(skip_all, fields(model = %query.model))]
    pub async fn get_frequency_totals(
        &self,
        query: &SeriesQuery,
    ) -> Result<Option<FrequencyTotals>> {
        let Some(nested) = self.get_data(query, Aggregation::Count, true, false).await? else {
            return Ok(None);
        };
        Ok(Some(nested.into_groups().into_iter().collect()))
    }
}

/// Floor `timestamp` to the start of its `seconds`-wide bucket
pub fn normalize_to_rollup(timestamp: i64, seconds: u64) -> i64 {
    let width = seconds.max(1) as i64;
    timestamp - timestamp.rem_euclid(width)
}

fn timestamp(key: &Key) -> Result<i64> {
    key.as_i64()
        .ok_or_else(|| Error::InvalidResponse(format!("invalid time bucket: {}", key)))
}

/// Each time bucket is reduced to one count. Models counted by their
/// aggregate column carry one more grouping level, which is summed.
fn sorted_series(nested: Nested) -> Result<Series> {
    let mut result = Series::new();
    for (key, child) in nested.into_groups() {
        let mut points = child
            .into_groups()
            .into_iter()
            .map(|(ts, value)| Ok((timestamp(&ts)?, value.total()?)))
            .collect::<Result<Vec<_>>>()?;
        points.sort();
        result.insert(key, points);
    }
    Ok(result)
}

fn totals(nested: Nested) -> Result<Totals> {
    nested
        .into_groups()
        .into_iter()
        .map(|(key, value)| Ok((key, value.count()?)))
        .collect()
}

/// Score a top-K list given most frequent first.
///
/// With `k` values the most frequent scores `k` and the least scores `1`.
/// The result is ordered by ascending score.
pub(crate) fn score_ranked(ranked: Vec<Key>) -> Vec<(Key, f64)> {
    ranked
        .into_iter()
        .rev()
        .enumerate()
        .map(|(i, value)| (value, (i + 1) as f64))
        .collect()
}
