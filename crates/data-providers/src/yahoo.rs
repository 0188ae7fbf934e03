//! Dividend history from Yahoo's public chart endpoint. No API key required.

use crate::http::{get_json, number, unavailable};
use async_trait::async_trait;
use chrono::DateTime;
use market_core::{
    Dividends, FetchRequest, PartialRecord, Section, SourceAdapter, SourceFailure, SourceResult,
};
use reqwest::Client;
use serde_json::Value;

pub const SOURCE_ID: &str = "yahoo";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const DIVIDEND_WINDOW: usize = 10;

#[derive(Clone)]
pub struct YahooDividendsAdapter {
    client: Client,
}

impl YahooDividendsAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for YahooDividendsAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn sections(&self) -> &'static [Section] {
        &[Section::Dividends]
    }

    async fn fetch(&self, request: &FetchRequest) -> SourceResult<PartialRecord> {
        let url = format!("{}/{}", CHART_URL, request.symbol);
        let body = get_json(
            SOURCE_ID,
            self.client
                .get(&url)
                .query(&[("range", "10y"), ("interval", "1mo"), ("events", "div")]),
        )
        .await?;

        let dividends = parse_chart_dividends(&body)?;
        if dividends.is_empty() {
            return Err(unavailable(SOURCE_ID, SourceFailure::Empty));
        }

        let mut record = PartialRecord::new(SOURCE_ID);
        record.dividends = dividends;
        Ok(record)
    }
}

pub(crate) fn parse_chart_dividends(body: &Value) -> SourceResult<Dividends> {
    let chart = body
        .get("chart")
        .ok_or_else(|| unavailable(SOURCE_ID, SourceFailure::Parse("missing chart".to_string())))?;

    if let Some(error) = chart.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("chart error");
        return Err(unavailable(SOURCE_ID, SourceFailure::Api(message.to_string())));
    }

    let events = chart
        .get("result")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|result| result.get("events"))
        .and_then(|events| events.get("dividends"))
        .and_then(Value::as_object);

    let mut dividends: Dividends = events
        .into_iter()
        .flatten()
        .filter_map(|(_, event)| {
            let date = DateTime::from_timestamp(event.get("date")?.as_i64()?, 0)?.date_naive();
            Some((date, number(event.get("amount"))?))
        })
        .collect();
    dividends.trim_to_recent(DIVIDEND_WINDOW);
    Ok(dividends)
}
