pub mod error;
pub mod openai;

pub use error::{ScoringError, ScoringResult};
pub use openai::OpenAiScorer;

use async_trait::async_trait;
use market_core::{
    to_safe_json, AnalystData, Financials, MacroSnapshot, MergedFinancialRecord, NewsArticle,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 20_000;
pub const DEFAULT_MAX_NEWS_ITEMS: usize = 20;

/// External black-box model that scores a serialized payload.
///
/// Returns the model's raw JSON answer; parsing happens in [`ScoringGateway`].
#[async_trait]
pub trait ScoringFunction: Send + Sync {
    async fn score_payload(&self, payload: &str) -> ScoringResult<String>;

    fn backend_name(&self) -> &'static str;
}

/// Structured scoring outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// 0-100 by contract of the scorer; not re-validated
    pub score: i64,
    pub summary: String,
    #[serde(default)]
    pub positives: Vec<String>,
    #[serde(default)]
    pub negatives: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CompanyOverview<'a> {
    symbol: &'a str,
    name: Option<&'a str>,
    sector: Option<&'a str>,
    industry: Option<&'a str>,
    country: Option<&'a str>,
    currency: Option<&'a str>,
    market_cap: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ValuationMetrics {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<f64>,
    peg_ratio: Option<f64>,
    price_to_book: Option<f64>,
    price_to_sales: Option<f64>,
    dividend_yield: Option<f64>,
    beta: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ScoringPayload<'a> {
    company_overview: CompanyOverview<'a>,
    valuation_metrics: ValuationMetrics,
    financials: &'a Financials,
    analyst_data: Option<&'a AnalystData>,
    news_data: &'a [NewsArticle],
    economical_data: &'a MacroSnapshot,
}

/// Packages record, news and macro data into a bounded payload and calls the scorer
pub struct ScoringGateway {
    scorer: Arc<dyn ScoringFunction>,
    max_payload_bytes: usize,
    max_news_items: usize,
}

impl ScoringGateway {
    pub fn new(scorer: Arc<dyn ScoringFunction>, max_payload_bytes: usize) -> Self {
        Self {
            scorer,
            max_payload_bytes,
            max_news_items: DEFAULT_MAX_NEWS_ITEMS,
        }
    }

    /// Sanitized, serialized and truncated payload, exactly as handed to the scorer
    pub fn build_payload(
        &self,
        record: &MergedFinancialRecord,
        news: &[NewsArticle],
        macro_snapshot: &MacroSnapshot,
    ) -> ScoringResult<String> {
        let info = &record.info;
        let payload = ScoringPayload {
            company_overview: CompanyOverview {
                symbol: &record.symbol,
                name: info.short_name.as_deref(),
                sector: info.sector.as_deref(),
                industry: info.industry.as_deref(),
                country: info.country.as_deref(),
                currency: info.currency.as_deref(),
                market_cap: info.market_cap,
            },
            valuation_metrics: ValuationMetrics {
                trailing_pe: info.trailing_pe,
                forward_pe: info.forward_pe,
                peg_ratio: info.peg_ratio,
                price_to_book: info.price_to_book,
                price_to_sales: info.price_to_sales,
                dividend_yield: info.dividend_yield,
                beta: info.beta,
            },
            financials: &record.financials,
            analyst_data: record.analyst_data.as_ref(),
            news_data: &news[..news.len().min(self.max_news_items)],
            economical_data: macro_snapshot,
        };

        let json = serde_json::to_string(&to_safe_json(&payload)?)?;
        Ok(truncate_utf8(json, self.max_payload_bytes))
    }

    /// Score one symbol. Any scorer failure or unparseable answer is an error, never a default score.
    pub async fn score(
        &self,
        record: &MergedFinancialRecord,
        news: &[NewsArticle],
        macro_snapshot: &MacroSnapshot,
    ) -> ScoringResult<ScoreResult> {
        let payload = self.build_payload(record, news, macro_snapshot)?;
        tracing::info!(
            "Scoring {} via {} ({} payload bytes)",
            record.symbol,
            self.scorer.backend_name(),
            payload.len()
        );

        let raw = self.scorer.score_payload(&payload).await?;
        parse_score(&raw)
    }
}

pub(crate) fn parse_score(raw: &str) -> ScoringResult<ScoreResult> {
    serde_json::from_str(raw).map_err(|e| ScoringError::InvalidResponse(format!("{}: {}", e, raw)))
}

/// Cut `text` to at most `max_bytes`, backing off to the previous character boundary
pub(crate) fn truncate_utf8(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Months, NaiveDate, TimeZone, Utc};
    use market_core::MacroPoint;
    use std::sync::Mutex;
    use tokio_test::assert_err;

    struct FakeScorer {
        answer: ScoringResult<String>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeScorer {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Ok(answer.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err(ScoringError::ServiceUnavailable("HTTP 503".to_string())),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScoringFunction for FakeScorer {
        async fn score_payload(&self, payload: &str) -> ScoringResult<String> {
            self.seen.lock().unwrap().push(payload.to_string());
            match &self.answer {
                Ok(answer) => Ok(answer.clone()),
                Err(e) => Err(ScoringError::ServiceUnavailable(e.to_string())),
            }
        }

        fn backend_name(&self) -> &'static str {
            "fake"
        }
    }

    fn article(i: usize) -> NewsArticle {
        NewsArticle {
            id: Some(i as i64),
            headline: format!("Headline {} with ünïcödé text", i),
            url: format!("https://example.com/{}", i),
            source: "Reuters".to_string(),
            published_at: Utc.timestamp_opt(1_710_000_000 + i as i64, 0).unwrap(),
            summary: "é".repeat(200),
            symbol: "AAPL".to_string(),
            category: None,
            image: None,
        }
    }

    fn record() -> MergedFinancialRecord {
        let mut record = MergedFinancialRecord::empty("AAPL");
        record.info.sector = Some("Technology".to_string());
        record.info.market_cap = Some(3.0e12);
        record.info.beta = Some(f64::NAN);
        record
    }

    /// Twenty years of month-end points per series, with gaps and a NaN
    fn macro_snapshot() -> MacroSnapshot {
        let start = NaiveDate::from_ymd_opt(2005, 1, 31).unwrap();
        let mut snapshot = MacroSnapshot::default();
        for (label, base) in [("Unemployment Rate", 4.0), ("Fed Funds Rate", 2.5), ("Oil Prices", 70.0)] {
            let points = (0..240u32)
                .map(|m| MacroPoint {
                    date: start.checked_add_months(Months::new(m)).unwrap(),
                    value: match m % 12 {
                        0 => None,
                        6 => Some(f64::NAN),
                        _ => Some(base + f64::from(m) / 100.0),
                    },
                })
                .collect();
            snapshot.insert(label, points);
        }
        snapshot
    }

    #[tokio::test]
    async fn test_payload_is_bounded() {
        let scorer = Arc::new(FakeScorer::answering(r#"{"score": 72, "summary": "Solid"}"#));
        let gateway = ScoringGateway::new(scorer.clone(), 5_000);
        let news: Vec<NewsArticle> = (0..500).map(article).collect();

        gateway.score(&record(), &news, &macro_snapshot()).await.unwrap();

        let seen = scorer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].len() <= 5_000);
    }

    #[test]
    fn test_macro_series_are_bounded_and_sanitized() {
        let scorer = Arc::new(FakeScorer::answering("{}"));
        let unbounded = ScoringGateway::new(scorer.clone(), usize::MAX);
        let snapshot = macro_snapshot();

        let payload = unbounded.build_payload(&record(), &[], &snapshot).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let unrate = value["economical_data"]["Unemployment Rate"].as_array().unwrap();
        assert_eq!(unrate.len(), 240);
        assert!(unrate[0]["value"].is_null());
        assert!(unrate[6]["value"].is_null());
        assert!((unrate[1]["value"].as_f64().unwrap() - 4.01).abs() < 1e-9);
        assert_eq!(value["economical_data"].as_object().unwrap().len(), 3);

        // Macro data alone exceeds the bound; the cut still lands on a valid boundary
        assert!(payload.len() > 2_000);
        let bounded = ScoringGateway::new(scorer, 2_000);
        let cut = bounded.build_payload(&record(), &[], &snapshot).unwrap();
        assert!(cut.len() <= 2_000);
        assert!(payload.starts_with(&cut));
    }

    #[test]
    fn test_payload_caps_news_and_nulls_nan() {
        let gateway = ScoringGateway::new(Arc::new(FakeScorer::answering("{}")), usize::MAX);
        let news: Vec<NewsArticle> = (0..50).map(article).collect();

        let payload = gateway.build_payload(&record(), &news, &MacroSnapshot::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["news_data"].as_array().unwrap().len(), DEFAULT_MAX_NEWS_ITEMS);
        assert_eq!(value["company_overview"]["sector"], "Technology");
        assert!(value["valuation_metrics"]["beta"].is_null());
        assert!(value["analyst_data"].is_null());
    }

    #[tokio::test]
    async fn test_missing_lists_default_to_empty() {
        let gateway = ScoringGateway::new(
            Arc::new(FakeScorer::answering(r#"{"score": 55, "summary": "Mixed signals"}"#)),
            DEFAULT_MAX_PAYLOAD_BYTES,
        );

        let result = gateway.score(&record(), &[], &MacroSnapshot::default()).await.unwrap();
        assert_eq!(result.score, 55);
        assert!(result.positives.is_empty());
        assert!(result.negatives.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_answer_is_error() {
        let gateway = ScoringGateway::new(
            Arc::new(FakeScorer::answering("I think it's a buy")),
            DEFAULT_MAX_PAYLOAD_BYTES,
        );

        let err = assert_err!(gateway.score(&record(), &[], &MacroSnapshot::default()).await);
        assert!(matches!(err, ScoringError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_scorer_failure_is_error() {
        let gateway = ScoringGateway::new(Arc::new(FakeScorer::failing()), DEFAULT_MAX_PAYLOAD_BYTES);
        let err = assert_err!(gateway.score(&record(), &[], &MacroSnapshot::default()).await);
        assert!(matches!(err, ScoringError::ServiceUnavailable(_)));
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let text = "aé".repeat(10);
        let cut = truncate_utf8(text.clone(), 4);
        assert_eq!(cut, "aéa");
        assert_eq!(truncate_utf8(text.clone(), 1_000), text);
        assert_eq!(truncate_utf8("é".to_string(), 1), "");
    }

    #[test]
    fn test_parse_score_full() {
        let result = parse_score(
            r#"{"score": 81, "summary": "Strong", "positives": ["margins"], "negatives": ["valuation"]}"#,
        )
        .unwrap();
        assert_eq!(result.positives, vec!["margins".to_string()]);
        assert!(parse_score(r#"{"summary": "no score"}"#).is_err());
    }
}
