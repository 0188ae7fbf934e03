//! TwelveData quote fallback.

use crate::http::{get_json, number, unavailable};
use async_trait::async_trait;
use market_core::{
    FetchRequest, PartialRecord, Quote, Section, SourceAdapter, SourceFailure, SourceResult,
};
use reqwest::Client;
use serde_json::Value;

pub const SOURCE_ID: &str = "twelvedata";
const BASE_URL: &str = "https://api.twelvedata.com";

#[derive(Clone)]
pub struct TwelveDataAdapter {
    client: Client,
    api_key: String,
}

impl TwelveDataAdapter {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SourceAdapter for TwelveDataAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn sections(&self) -> &'static [Section] {
        &[Section::Quote]
    }

    async fn fetch(&self, request: &FetchRequest) -> SourceResult<PartialRecord> {
        if self.api_key.is_empty() {
            return Err(unavailable(SOURCE_ID, SourceFailure::MissingCredentials));
        }

        let url = format!("{}/quote", BASE_URL);
        let body = get_json(
            SOURCE_ID,
            self.client.get(&url).query(&[
                ("symbol", request.symbol.as_str()),
                ("apikey", self.api_key.as_str()),
            ]),
        )
        .await?;

        let quote = parse_quote(&body);
        if quote.is_empty() {
            return Err(unavailable(SOURCE_ID, SourceFailure::Empty));
        }

        let mut record = PartialRecord::new(SOURCE_ID);
        record.quote = quote;
        Ok(record)
    }
}

/// TwelveData sends every number as a string
pub(crate) fn parse_quote(body: &Value) -> Quote {
    Quote {
        current_price: number(body.get("close")),
        change: number(body.get("change")),
        percent_change: number(body.get("percent_change")),
        day_high: number(body.get("high")),
        day_low: number(body.get("low")),
        open: number(body.get("open")),
        previous_close: number(body.get("previous_close")),
        timestamp: body.get("timestamp").and_then(Value::as_i64),
        ..Default::default()
    }
}
