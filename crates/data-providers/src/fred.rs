//! FRED (St. Louis Fed) series observations.

use crate::http::{get_json, unavailable};
use async_trait::async_trait;
use chrono::NaiveDate;
use market_core::{MacroPoint, MacroSource, SourceFailure, SourceResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

pub const SOURCE_ID: &str = "fred";
const OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

#[derive(Clone)]
pub struct FredSource {
    client: Client,
    api_key: String,
}

impl FredSource {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

#[async_trait]
impl MacroSource for FredSource {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    async fn series(&self, series_id: &str, since: NaiveDate) -> SourceResult<Vec<MacroPoint>> {
        if self.api_key.is_empty() {
            return Err(unavailable(SOURCE_ID, SourceFailure::MissingCredentials));
        }

        let start = since.format("%Y-%m-%d").to_string();
        let body = get_json(
            SOURCE_ID,
            self.client.get(OBSERVATIONS_URL).query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
                ("observation_start", start.as_str()),
            ]),
        )
        .await?;

        parse_observations(body)
    }
}

/// FRED marks missing observations with "."
pub(crate) fn parse_observations(body: Value) -> SourceResult<Vec<MacroPoint>> {
    let response: ObservationsResponse = serde_json::from_value(body)
        .map_err(|e| unavailable(SOURCE_ID, SourceFailure::Parse(e.to_string())))?;

    let mut points: Vec<MacroPoint> = response
        .observations
        .into_iter()
        .filter_map(|obs| {
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").ok()?;
            let value = obs.value.trim().parse::<f64>().ok().filter(|v| v.is_finite());
            Some(MacroPoint { date, value })
        })
        .collect();
    points.sort_by_key(|p| p.date);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_observations() {
        let points = parse_observations(json!({
            "realtime_start": "2024-05-01",
            "count": 3,
            "observations": [
                {"realtime_start": "2024-05-01", "date": "2024-01-02", "value": "3.95"},
                {"realtime_start": "2024-05-01", "date": "2024-01-01", "value": "."},
                {"realtime_start": "2024-05-01", "date": "bad-date", "value": "1.0"}
            ]
        }))
        .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(points[0].value, None);
        assert_eq!(points[1].value, Some(3.95));
    }

    #[test]
    fn test_parse_observations_wrong_shape() {
        let err = parse_observations(json!({"error_code": 400})).unwrap_err();
        assert!(matches!(err.failure, SourceFailure::Parse(_)));
    }
}
