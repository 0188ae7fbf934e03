//! YH Finance on RapidAPI: the final fallback for profile, valuation, quote,
//! headline financials and price targets.

use crate::http::{get_json, raw_number, text, unavailable};
use async_trait::async_trait;
use market_core::{
    AnalystData, CompanyInfo, FetchRequest, Financials, LineItems, PartialRecord, Period,
    PriceTarget, Quote, Section, SourceAdapter, SourceFailure, SourceResult, Statement,
};
use reqwest::Client;
use serde_json::Value;

pub const SOURCE_ID: &str = "yh_finance";
const RAPIDAPI_HOST: &str = "yh-finance.p.rapidapi.com";

#[derive(Clone)]
pub struct YhFinanceAdapter {
    client: Client,
    api_key: String,
}

impl YhFinanceAdapter {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    /// `quoteSummary.result[0].{module}` of one endpoint
    async fn module(&self, endpoint: &str, module: &str, symbol: &str) -> SourceResult<Value> {
        let url = format!("https://{}/v1/stock/{}", RAPIDAPI_HOST, endpoint);
        let body = get_json(
            SOURCE_ID,
            self.client
                .get(&url)
                .header("x-rapidapi-key", &self.api_key)
                .header("x-rapidapi-host", RAPIDAPI_HOST)
                .query(&[("symbol", symbol)]),
        )
        .await?;
        Ok(summary_module(&body, module))
    }
}

#[async_trait]
impl SourceAdapter for YhFinanceAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn sections(&self) -> &'static [Section] {
        &[
            Section::Profile,
            Section::Metrics,
            Section::Quote,
            Section::Financials,
            Section::AnalystData,
        ]
    }

    async fn fetch(&self, request: &FetchRequest) -> SourceResult<PartialRecord> {
        if self.api_key.is_empty() {
            return Err(unavailable(SOURCE_ID, SourceFailure::MissingCredentials));
        }
        let symbol = request.symbol.as_str();

        let (profile, financial_data, statistics) = tokio::join!(
            self.module("profile", "assetProfile", symbol),
            self.module("financial-data", "financialData", symbol),
            self.module("statistics", "defaultKeyStatistics", symbol),
        );

        let mut first_failure = None;
        let mut take = |result: SourceResult<Value>| match result {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("YH Finance call failed for {}: {}", symbol, e);
                first_failure.get_or_insert(e);
                Value::Null
            }
        };
        let profile = take(profile);
        let financial_data = take(financial_data);
        let statistics = take(statistics);

        let record = parse_summary(&profile, &financial_data, &statistics);
        if record.is_empty() {
            return Err(first_failure.unwrap_or_else(|| unavailable(SOURCE_ID, SourceFailure::Empty)));
        }
        Ok(record)
    }
}

fn summary_module(body: &Value, module: &str) -> Value {
    body.get("quoteSummary")
        .and_then(|s| s.get("result"))
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|result| result.get(module))
        .cloned()
        .unwrap_or(Value::Null)
}

pub(crate) fn parse_summary(profile: &Value, fin: &Value, stats: &Value) -> PartialRecord {
    let mut record = PartialRecord::new(SOURCE_ID);

    record.info = CompanyInfo {
        sector: text(profile.get("sector")),
        industry: text(profile.get("industry")),
        country: text(profile.get("country")),
        currency: text(fin.get("financialCurrency")),
        market_cap: raw_number(fin.get("marketCap")).or_else(|| raw_number(stats.get("marketCap"))),
        trailing_pe: raw_number(stats.get("trailingPE")),
        forward_pe: raw_number(stats.get("forwardPE")),
        peg_ratio: raw_number(stats.get("pegRatio")),
        price_to_book: raw_number(stats.get("priceToBook")),
        debt_to_equity: raw_number(fin.get("debtToEquity")),
        dividend_yield: raw_number(fin.get("dividendYield")),
        beta: raw_number(stats.get("beta")),
        roe: raw_number(fin.get("returnOnEquity")),
        gross_margin: raw_number(fin.get("grossMargins")),
        ..Default::default()
    };

    record.quote = Quote {
        current_price: raw_number(fin.get("currentPrice")),
        target_mean_price: raw_number(fin.get("targetMeanPrice")),
        recommendation_mean: raw_number(fin.get("recommendationMean")),
        ..Default::default()
    };
    if record.quote.current_price.is_none() {
        record.quote = Quote::default();
    }

    record.financials = parse_financial_blocks(fin);

    let target = PriceTarget {
        high: raw_number(fin.get("targetHighPrice")),
        low: raw_number(fin.get("targetLowPrice")),
        mean: raw_number(fin.get("targetMeanPrice")),
        median: raw_number(fin.get("targetMedianPrice")),
    };
    if !target.is_empty() {
        record.analyst_data = Some(AnalystData {
            recommendation_trends: Vec::new(),
            price_target: Some(target),
        });
    }

    record
}

/// Trailing totals and latest balance figures reported by `financialData`
fn parse_financial_blocks(fin: &Value) -> Financials {
    let pick = |fields: &[&str]| -> LineItems {
        fields
            .iter()
            .filter_map(|field| Some((field.to_string(), Value::from(raw_number(fin.get(*field))?))))
            .collect()
    };

    let mut financials = Financials::default();
    financials.insert(
        Statement::IncomeStatement,
        Period::Ttm,
        pick(&["totalRevenue", "grossProfits", "ebitda", "netIncomeToCommon"]),
    );
    financials.insert(
        Statement::CashFlow,
        Period::Ttm,
        pick(&["operatingCashflow", "freeCashflow"]),
    );
    financials.insert(
        Statement::BalanceSheet,
        Period::Quarterly,
        pick(&["totalCash", "totalDebt"]),
    );
    financials
}
