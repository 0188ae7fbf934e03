//! Finnhub: company profile, quote, basic financials, recommendation trends and company news.

use crate::http::{get_json, number, text, unavailable};
use async_trait::async_trait;
use chrono::DateTime;
use market_core::{
    AnalystData, CompanyInfo, DateRange, FetchRequest, NewsArticle, NewsSource, PartialRecord,
    Quote, RecommendationTrend, Section, SourceAdapter, SourceFailure, SourceResult,
};
use reqwest::Client;
use serde_json::Value;

pub const SOURCE_ID: &str = "finnhub";
const BASE_URL: &str = "https://finnhub.io/api/v1";

/// Finnhub reports market capitalization in millions
const MARKET_CAP_UNIT: f64 = 1_000_000.0;

#[derive(Clone)]
pub struct FinnhubAdapter {
    client: Client,
    api_key: String,
}

impl FinnhubAdapter {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> SourceResult<Value> {
        if self.api_key.is_empty() {
            return Err(unavailable(SOURCE_ID, SourceFailure::MissingCredentials));
        }
        let url = format!("{}{}", BASE_URL, path);
        let request = self
            .client
            .get(&url)
            .query(query)
            .query(&[("token", self.api_key.as_str())]);
        get_json(SOURCE_ID, request).await
    }
}

#[async_trait]
impl SourceAdapter for FinnhubAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn sections(&self) -> &'static [Section] {
        &[Section::Profile, Section::Metrics, Section::Quote, Section::AnalystData]
    }

    async fn fetch(&self, request: &FetchRequest) -> SourceResult<PartialRecord> {
        let symbol = request.symbol.as_str();
        let by_symbol = [("symbol", symbol)];
        let metric_query = [("symbol", symbol), ("metric", "all")];

        let (profile, quote, metrics, recommendations) = tokio::join!(
            self.get("/stock/profile2", &by_symbol),
            self.get("/quote", &by_symbol),
            self.get("/stock/metric", &metric_query),
            self.get("/stock/recommendation", &by_symbol),
        );

        let mut record = PartialRecord::new(SOURCE_ID);
        let mut first_failure = None;

        match profile {
            Ok(body) => {
                record.info.fill_profile_from(&parse_profile(&body));
            }
            Err(e) => {
                tracing::debug!("Finnhub profile failed for {}: {}", symbol, e);
                first_failure.get_or_insert(e);
            }
        }
        match metrics {
            Ok(body) => {
                record.info.fill_metrics_from(&parse_metrics(&body));
            }
            Err(e) => {
                tracing::debug!("Finnhub metrics failed for {}: {}", symbol, e);
                first_failure.get_or_insert(e);
            }
        }
        match quote {
            Ok(body) => record.quote = parse_quote(&body),
            Err(e) => {
                tracing::debug!("Finnhub quote failed for {}: {}", symbol, e);
                first_failure.get_or_insert(e);
            }
        }
        match recommendations {
            Ok(body) => {
                let trends = parse_recommendations(&body);
                if !trends.is_empty() {
                    record.analyst_data = Some(AnalystData {
                        recommendation_trends: trends,
                        price_target: None,
                    });
                }
            }
            Err(e) => {
                tracing::debug!("Finnhub recommendations failed for {}: {}", symbol, e);
                first_failure.get_or_insert(e);
            }
        }

        if record.is_empty() {
            return Err(first_failure.unwrap_or_else(|| unavailable(SOURCE_ID, SourceFailure::Empty)));
        }
        Ok(record)
    }
}

#[async_trait]
impl NewsSource for FinnhubAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    async fn company_news(&self, symbol: &str, range: &DateRange) -> SourceResult<Vec<NewsArticle>> {
        let from = range.from.format("%Y-%m-%d").to_string();
        let to = range.to.format("%Y-%m-%d").to_string();
        let body = self
            .get(
                "/company-news",
                &[("symbol", symbol), ("from", from.as_str()), ("to", to.as_str())],
            )
            .await?;
        parse_news(symbol, &body)
    }
}

pub(crate) fn parse_profile(body: &Value) -> CompanyInfo {
    CompanyInfo {
        short_name: text(body.get("name")),
        sector: text(body.get("finnhubIndustry")),
        country: text(body.get("country")),
        currency: text(body.get("currency")),
        ..Default::default()
    }
}

pub(crate) fn parse_metrics(body: &Value) -> CompanyInfo {
    let Some(metric) = body.get("metric") else {
        return CompanyInfo::default();
    };
    CompanyInfo {
        market_cap: number(metric.get("marketCapitalization")).map(|m| m * MARKET_CAP_UNIT),
        trailing_pe: number(metric.get("peBasicExclExtraTTM")),
        price_to_book: number(metric.get("pbAnnual")),
        price_to_sales: number(metric.get("psTTM")),
        beta: number(metric.get("beta")),
        roe: number(metric.get("roeTTM")),
        gross_margin: number(metric.get("grossMarginTTM")),
        ..Default::default()
    }
}

/// Finnhub answers unknown symbols with an all-zero quote; that counts as empty
pub(crate) fn parse_quote(body: &Value) -> Quote {
    let current_price = number(body.get("c")).filter(|c| *c != 0.0);
    if current_price.is_none() {
        return Quote::default();
    }
    Quote {
        current_price,
        change: number(body.get("d")),
        percent_change: number(body.get("dp")),
        day_high: number(body.get("h")),
        day_low: number(body.get("l")),
        open: number(body.get("o")),
        previous_close: number(body.get("pc")),
        timestamp: body.get("t").and_then(Value::as_i64).filter(|t| *t > 0),
        ..Default::default()
    }
}

pub(crate) fn parse_recommendations(body: &Value) -> Vec<RecommendationTrend> {
    body.as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| serde_json::from_value::<RecommendationTrend>(row.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_news(symbol: &str, body: &Value) -> SourceResult<Vec<NewsArticle>> {
    let rows = body.as_array().ok_or_else(|| {
        unavailable(SOURCE_ID, SourceFailure::Parse("company-news is not a list".to_string()))
    })?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let published_at = DateTime::from_timestamp(row.get("datetime")?.as_i64()?, 0)?;
            Some(NewsArticle {
                id: row.get("id").and_then(Value::as_i64),
                headline: text(row.get("headline"))?,
                url: text(row.get("url")).unwrap_or_default(),
                source: text(row.get("source")).unwrap_or_default(),
                published_at,
                summary: text(row.get("summary")).unwrap_or_default(),
                symbol: symbol.to_string(),
                category: text(row.get("category")),
                image: text(row.get("image")),
            })
        })
        .collect())
}
