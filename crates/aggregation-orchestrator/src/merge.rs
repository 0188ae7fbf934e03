//! Field-level, priority-ordered merge of adapter outputs.

use chrono::Utc;
use market_core::{MergedFinancialRecord, PartialRecord, Section};
use std::collections::BTreeMap;

/// Dividend payments kept in a merged record
pub const DIVIDEND_WINDOW: usize = 10;

/// Explicit source priority per section. Unlisted sources rank after listed ones,
/// in the order they were passed to the merge.
#[derive(Debug, Clone)]
pub struct MergePolicy {
    priorities: BTreeMap<Section, Vec<&'static str>>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::empty()
            .with_priority(Section::Profile, &["finnhub", "yh_finance", "fmp"])
            .with_priority(Section::Metrics, &["finnhub", "fmp", "yh_finance"])
            .with_priority(Section::Quote, &["finnhub", "twelvedata", "yh_finance"])
            .with_priority(Section::Financials, &["fmp", "yh_finance"])
            .with_priority(Section::Dividends, &["yahoo", "fmp"])
            .with_priority(Section::AnalystData, &["finnhub", "yh_finance"])
    }
}

impl MergePolicy {
    /// No declared priorities: every section falls back to input order
    pub fn empty() -> Self {
        Self {
            priorities: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, section: Section, sources: &[&'static str]) -> Self {
        self.priorities.insert(section, sources.to_vec());
        self
    }

    fn rank(&self, section: Section, source: &str) -> usize {
        let listed = self.priorities.get(&section).map(Vec::as_slice).unwrap_or_default();
        listed
            .iter()
            .position(|s| *s == source)
            .unwrap_or(listed.len())
    }

    /// Partials ordered for one section; the sort is stable so ties keep input order
    fn ordered<'a>(&self, section: Section, partials: &'a [PartialRecord]) -> Vec<&'a PartialRecord> {
        let mut ordered: Vec<&PartialRecord> = partials.iter().collect();
        ordered.sort_by_key(|p| self.rank(section, p.source));
        ordered
    }
}

/// First contributor to a section is the one recorded
fn note_source(record: &mut MergedFinancialRecord, section: Section, source: &str) {
    record
        .sources
        .entry(section)
        .or_insert_with(|| source.to_string());
}

#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    policy: MergePolicy,
}

impl MergeEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// Combine partial records into one canonical record.
    ///
    /// Total: with no partials (or only empty ones) the result is a well-formed empty record.
    /// A filled field is never overwritten by a lower-priority source.
    pub fn merge(&self, symbol: &str, partials: &[PartialRecord]) -> MergedFinancialRecord {
        let mut record = MergedFinancialRecord::empty(symbol);

        for partial in self.policy.ordered(Section::Profile, partials) {
            if record.info.fill_profile_from(&partial.info) {
                note_source(&mut record, Section::Profile, partial.source);
            }
        }

        for partial in self.policy.ordered(Section::Metrics, partials) {
            if record.info.fill_metrics_from(&partial.info) {
                note_source(&mut record, Section::Metrics, partial.source);
            }
        }

        // A quote is a snapshot; it is taken whole from one source
        if let Some(partial) = self
            .policy
            .ordered(Section::Quote, partials)
            .into_iter()
            .find(|p| !p.quote.is_empty())
        {
            record.quote = partial.quote.clone();
            note_source(&mut record, Section::Quote, partial.source);
        }

        for partial in self.policy.ordered(Section::Financials, partials) {
            if record.financials.fill_from(&partial.financials) {
                note_source(&mut record, Section::Financials, partial.source);
            }
        }

        if let Some(partial) = self
            .policy
            .ordered(Section::Dividends, partials)
            .into_iter()
            .find(|p| !p.dividends.is_empty())
        {
            record.dividends = partial.dividends.clone();
            record.dividends.trim_to_recent(DIVIDEND_WINDOW);
            note_source(&mut record, Section::Dividends, partial.source);
        }

        if let Some((partial, analyst)) = self
            .policy
            .ordered(Section::AnalystData, partials)
            .into_iter()
            .find_map(|p| {
                p.analyst_data
                    .as_ref()
                    .filter(|a| !a.is_empty())
                    .map(|a| (p, a))
            })
        {
            record.analyst_data = Some(analyst.clone());
            note_source(&mut record, Section::AnalystData, partial.source);
        }

        record.retain_finite();
        record.fetched_at = Utc::now();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use market_core::{
        AnalystData, CompanyInfo, LineItems, Period, PriceTarget, Quote, RecommendationTrend,
        Statement,
    };
    use serde_json::json;

    fn partial(source: &'static str) -> PartialRecord {
        PartialRecord::new(source)
    }

    #[test]
    fn test_merge_of_nothing_is_empty_record() {
        let record = MergeEngine::default().merge("ZZZZ", &[]);

        assert_eq!(record.symbol, "ZZZZ");
        assert!(record.is_empty());
        assert!(record.sources.is_empty());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["info"], json!({}));
        assert_eq!(json["quote"], json!({}));
        assert_eq!(json["financials"], json!({}));
    }

    #[test]
    fn test_higher_priority_wins_per_field() {
        let mut finnhub = partial("finnhub");
        finnhub.info = CompanyInfo {
            sector: Some("Technology".to_string()),
            ..Default::default()
        };
        let mut yh = partial("yh_finance");
        yh.info = CompanyInfo {
            sector: Some("Tech".to_string()),
            market_cap: Some(3_000_000_000_000.0),
            ..Default::default()
        };

        // Input order must not matter, only priority
        let record = MergeEngine::default().merge("AAPL", &[yh, finnhub]);

        assert_eq!(record.info.sector.as_deref(), Some("Technology"));
        assert_eq!(record.info.market_cap, Some(3_000_000_000_000.0));
        assert_eq!(record.sources[&Section::Profile], "finnhub");
        assert_eq!(record.sources[&Section::Metrics], "yh_finance");
    }

    #[test]
    fn test_quote_taken_whole_from_first_non_empty() {
        let mut finnhub = partial("finnhub");
        finnhub.quote = Quote::default();
        let mut twelve = partial("twelvedata");
        twelve.quote = Quote {
            current_price: Some(101.0),
            open: Some(99.0),
            ..Default::default()
        };
        let mut yh = partial("yh_finance");
        yh.quote = Quote {
            current_price: Some(100.5),
            target_mean_price: Some(130.0),
            ..Default::default()
        };

        let record = MergeEngine::default().merge("MSFT", &[finnhub, yh, twelve]);

        assert_eq!(record.quote.current_price, Some(101.0));
        assert_eq!(record.quote.target_mean_price, None);
        assert_eq!(record.sources[&Section::Quote], "twelvedata");
    }

    #[test]
    fn test_financials_merge_per_block() {
        let mut fmp = partial("fmp");
        let mut annual = LineItems::new();
        annual.insert("revenue".to_string(), json!(383.0));
        fmp.financials.insert(Statement::IncomeStatement, Period::Annual, annual);

        let mut yh = partial("yh_finance");
        let mut ttm = LineItems::new();
        ttm.insert("totalRevenue".to_string(), json!(390.0));
        yh.financials.insert(Statement::IncomeStatement, Period::Ttm, ttm.clone());
        yh.financials.insert(Statement::IncomeStatement, Period::Annual, ttm);

        let record = MergeEngine::default().merge("AAPL", &[yh, fmp]);

        let annual = record.financials.get(Statement::IncomeStatement, Period::Annual).unwrap();
        assert_eq!(annual["revenue"], json!(383.0));
        assert!(record.financials.get(Statement::IncomeStatement, Period::Ttm).is_some());
        assert_eq!(record.sources[&Section::Financials], "fmp");
    }

    #[test]
    fn test_dividends_and_analyst_data() {
        let mut fmp = partial("fmp");
        fmp.dividends.insert(NaiveDate::from_ymd_opt(2024, 2, 9).unwrap(), 0.24);
        let mut yahoo = partial("yahoo");
        for month in 1..=12 {
            yahoo.dividends.insert(NaiveDate::from_ymd_opt(2023, month, 10).unwrap(), 0.23);
        }

        let mut finnhub = partial("finnhub");
        finnhub.analyst_data = Some(AnalystData {
            recommendation_trends: vec![RecommendationTrend {
                period: "2024-03-01".to_string(),
                strong_buy: 13,
                buy: 24,
                hold: 7,
                sell: 0,
                strong_sell: 0,
            }],
            price_target: None,
        });
        let mut yh = partial("yh_finance");
        yh.analyst_data = Some(AnalystData {
            recommendation_trends: Vec::new(),
            price_target: Some(PriceTarget {
                mean: Some(210.0),
                ..Default::default()
            }),
        });

        let record = MergeEngine::default().merge("AAPL", &[fmp, yh, yahoo, finnhub]);

        assert_eq!(record.dividends.len(), DIVIDEND_WINDOW);
        assert_eq!(record.sources[&Section::Dividends], "yahoo");
        assert_eq!(record.analyst_data.unwrap().recommendation_trends.len(), 1);
        assert_eq!(record.sources[&Section::AnalystData], "finnhub");
    }

    #[test]
    fn test_unlisted_sources_rank_last_in_input_order() {
        let mut first = partial("custom_a");
        first.info.country = Some("US".to_string());
        let mut second = partial("custom_b");
        second.info.country = Some("CA".to_string());
        let mut listed = partial("fmp");
        listed.info.currency = Some("USD".to_string());

        let record = MergeEngine::default().merge("X", &[first, second, listed]);

        assert_eq!(record.info.country.as_deref(), Some("US"));
        assert_eq!(record.sources[&Section::Profile], "fmp");
    }

    #[test]
    fn test_nan_and_blank_values_are_skipped() {
        let mut finnhub = partial("finnhub");
        finnhub.info.sector = Some(String::new());
        finnhub.info.beta = Some(f64::NAN);
        let mut fmp = partial("fmp");
        fmp.info.sector = Some("Energy".to_string());
        fmp.info.beta = Some(0.9);

        let record = MergeEngine::default().merge("XOM", &[finnhub, fmp]);
        assert_eq!(record.info.sector.as_deref(), Some("Energy"));
        assert_eq!(record.info.beta, Some(0.9));
    }

    #[test]
    fn test_custom_policy() {
        let policy = MergePolicy::empty().with_priority(Section::Profile, &["b", "a"]);
        let mut a = partial("a");
        a.info.industry = Some("Semis".to_string());
        let mut b = partial("b");
        b.info.industry = Some("Semiconductors".to_string());

        let record = MergeEngine::new(policy).merge("NVDA", &[a, b]);
        assert_eq!(record.info.industry.as_deref(), Some("Semiconductors"));
    }
}
