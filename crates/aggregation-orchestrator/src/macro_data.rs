use crate::AggregationOrchestrator;
use cache_manager::NS_MACRO;
use chrono::{Datelike, NaiveDate, Utc};
use futures_util::future::join_all;
use market_core::{days_before, MacroPoint, MacroSnapshot};
use std::collections::BTreeMap;

pub const DEFAULT_MACRO_YEARS: u32 = 20;

/// Indicator label and FRED series id
pub const INDICATORS: [(&str, &str); 7] = [
    ("GDP (Real)", "GDPC1"),
    ("CPI (All Items)", "CPIAUCSL"),
    ("Unemployment Rate", "UNRATE"),
    ("Fed Funds Rate", "FEDFUNDS"),
    ("10Y Treasury Yield", "DGS10"),
    ("Oil Prices", "DCOILWTICO"),
    ("S&P 500", "SP500"),
];

impl AggregationOrchestrator {
    /// Month-end series for every indicator over the last `years` years.
    ///
    /// A failing indicator is left out; an all-failed snapshot is returned empty and not cached.
    pub async fn get_macro_snapshot(&self, years: u32) -> MacroSnapshot {
        let key = format!("indicators_{}", years);
        if let Some(cached) = self.cache_lookup::<MacroSnapshot>(NS_MACRO, &key).await {
            return cached;
        }

        let Some(source) = &self.macro_source else {
            tracing::warn!("No macro source configured; returning empty snapshot");
            return MacroSnapshot::default();
        };

        let since = days_before(Utc::now().date_naive(), u64::from(years) * 365);
        let results = join_all(
            INDICATORS
                .iter()
                .map(|(_, series_id)| source.series(series_id, since)),
        )
        .await;

        let mut snapshot = MacroSnapshot::default();
        for ((label, series_id), result) in INDICATORS.iter().zip(results) {
            match result {
                Ok(points) => {
                    let recent: Vec<MacroPoint> = points.into_iter().filter(|p| p.date >= since).collect();
                    snapshot.insert(*label, resample_month_end(&recent));
                }
                Err(e) => tracing::warn!("Skipping {} ({}): {}", label, series_id, e),
            }
        }

        if snapshot.is_empty() {
            tracing::warn!("Every macro indicator failed; snapshot not cached");
        } else {
            tracing::info!("Macro snapshot built with {}/{} indicators", snapshot.len(), INDICATORS.len());
            self.cache_store(NS_MACRO, &key, &snapshot).await;
        }
        snapshot
    }
}

/// Last non-null observation per calendar month, dated the month's last day.
///
/// Every month between the first and last observation is present; months without a value are null.
pub fn resample_month_end(points: &[MacroPoint]) -> Vec<MacroPoint> {
    let mut by_month: BTreeMap<(i32, u32), Option<f64>> = BTreeMap::new();
    let mut sorted: Vec<&MacroPoint> = points.iter().collect();
    sorted.sort_by_key(|p| p.date);

    for point in sorted {
        let slot = by_month.entry((point.date.year(), point.date.month())).or_insert(None);
        if point.value.is_some() {
            *slot = point.value;
        }
    }

    let (Some(&first), Some(&last)) = (by_month.keys().next(), by_month.keys().next_back()) else {
        return Vec::new();
    };

    let mut resampled = Vec::new();
    let mut month = first;
    while month <= last {
        if let Some(date) = month_end(month.0, month.1) {
            resampled.push(MacroPoint {
                date,
                value: by_month.get(&month).copied().flatten(),
            });
        }
        month = if month.1 == 12 { (month.0 + 1, 1) } else { (month.0, month.1 + 1) };
    }
    resampled
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
}
