//! Financial Modeling Prep: ratios, income statement and dividend history.
//!
//! This is the primary fundamentals source and the only adapter that retries.

use crate::http::{get_json, number, scalar_items, unavailable};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use chrono::NaiveDate;
use market_core::{
    CompanyInfo, Dividends, FetchRequest, Financials, PartialRecord, Period, Section,
    SourceAdapter, SourceFailure, SourceResult, Statement,
};
use reqwest::Client;
use serde_json::Value;

pub const SOURCE_ID: &str = "fmp";
const BASE_URL: &str = "https://financialmodelingprep.com/api/v3";
const DIVIDEND_WINDOW: usize = 10;

#[derive(Clone)]
pub struct FmpAdapter {
    client: Client,
    api_key: String,
    retry: RetryPolicy,
}

impl FmpAdapter {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get(&self, path: &str, extra: &[(&str, &str)]) -> SourceResult<Value> {
        let url = format!("{}{}", BASE_URL, path);
        let request = self
            .client
            .get(&url)
            .query(extra)
            .query(&[("apikey", self.api_key.as_str())]);
        get_json(SOURCE_ID, request).await
    }

    /// One attempt: all three endpoints concurrently. Empty counts as failure.
    async fn fetch_once(&self, symbol: &str) -> SourceResult<PartialRecord> {
        let ratios_path = format!("/ratios/{}", symbol);
        let income_path = format!("/income-statement/{}", symbol);
        let dividends_path = format!("/historical-price-full/stock_dividend/{}", symbol);

        let (ratios, income, dividends) = tokio::join!(
            self.get(&ratios_path, &[]),
            self.get(&income_path, &[("limit", "1")]),
            self.get(&dividends_path, &[]),
        );

        let mut record = PartialRecord::new(SOURCE_ID);
        let mut first_failure = None;

        match ratios {
            Ok(body) => {
                record.info.fill_metrics_from(&parse_ratios(&body));
            }
            Err(e) => {
                first_failure.get_or_insert(e);
            }
        }
        match income {
            Ok(body) => record.financials = parse_income_statement(&body),
            Err(e) => {
                first_failure.get_or_insert(e);
            }
        }
        match dividends {
            Ok(body) => record.dividends = parse_dividends(&body),
            Err(e) => {
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
impl SourceAdapter for FmpAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn sections(&self) -> &'static [Section] {
        &[Section::Metrics, Section::Financials, Section::Dividends]
    }

    async fn fetch(&self, request: &FetchRequest) -> SourceResult<PartialRecord> {
        if self.api_key.is_empty() {
            return Err(unavailable(SOURCE_ID, SourceFailure::MissingCredentials));
        }
        let symbol = request.symbol.as_str();
        retry_with_backoff(SOURCE_ID, self.retry, |_| self.fetch_once(symbol)).await
    }
}

/// Latest entry of `/ratios`
pub(crate) fn parse_ratios(body: &Value) -> CompanyInfo {
    let Some(latest) = body.as_array().and_then(|rows| rows.first()) else {
        return CompanyInfo::default();
    };
    CompanyInfo {
        trailing_pe: number(latest.get("priceEarningsRatio")),
        peg_ratio: number(latest.get("priceEarningsToGrowthRatio")),
        price_to_book: number(latest.get("priceToBookRatio")),
        price_to_sales: number(latest.get("priceToSalesRatio")),
        debt_to_equity: number(latest.get("debtEquityRatio")),
        dividend_yield: number(latest.get("dividendYield")),
        roe: number(latest.get("returnOnEquity")),
        gross_margin: number(latest.get("grossProfitMargin")),
        ..Default::default()
    }
}

/// Latest annual income statement
pub(crate) fn parse_income_statement(body: &Value) -> Financials {
    let mut financials = Financials::default();
    if let Some(latest) = body.as_array().and_then(|rows| rows.first()) {
        financials.insert(Statement::IncomeStatement, Period::Annual, scalar_items(latest));
    }
    financials
}

pub(crate) fn parse_dividends(body: &Value) -> Dividends {
    let rows = body
        .get("historical")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut dividends: Dividends = rows
        .iter()
        .filter_map(|row| {
            let date = NaiveDate::parse_from_str(row.get("date")?.as_str()?, "%Y-%m-%d").ok()?;
            let amount = number(row.get("dividend")).or_else(|| number(row.get("adjDividend")))?;
            Some((date, amount))
        })
        .collect();
    dividends.trim_to_recent(DIVIDEND_WINDOW);
    dividends
}
