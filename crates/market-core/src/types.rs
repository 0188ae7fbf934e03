use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical section of a merged record, used as the provenance key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Profile,
    Metrics,
    Quote,
    Financials,
    Dividends,
    AnalystData,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Profile,
        Section::Metrics,
        Section::Quote,
        Section::Financials,
        Section::Dividends,
        Section::AnalystData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Profile => "profile",
            Section::Metrics => "metrics",
            Section::Quote => "quote",
            Section::Financials => "financials",
            Section::Dividends => "dividends",
            Section::AnalystData => "analyst_data",
        }
    }
}

fn text_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn number_present(value: &Option<f64>) -> bool {
    value.is_some_and(f64::is_finite)
}

/// Copy `source` into `target` when target is still empty. Returns true if it did.
fn fill_text(target: &mut Option<String>, source: &Option<String>) -> bool {
    if !text_present(target) && text_present(source) {
        *target = source.clone();
        return true;
    }
    false
}

fn fill_number(target: &mut Option<f64>, source: &Option<f64>) -> bool {
    if !number_present(target) && number_present(source) {
        *target = *source;
        return true;
    }
    false
}

fn drop_non_finite(value: &mut Option<f64>) {
    if value.is_some_and(|v| !v.is_finite()) {
        *value = None;
    }
}

/// Scalar company and valuation attributes.
///
/// Absent data is an omitted field, so an empty `CompanyInfo` serializes to `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    // Profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    // Metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, rename = "trailingPE", skip_serializing_if = "Option::is_none")]
    pub trailing_pe: Option<f64>,
    #[serde(default, rename = "forwardPE", skip_serializing_if = "Option::is_none")]
    pub forward_pe: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peg_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_to_book: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_to_sales: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_to_equity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roe: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_margin: Option<f64>,
}

impl CompanyInfo {
    /// Fill still-empty profile fields from a lower-priority source
    pub fn fill_profile_from(&mut self, other: &CompanyInfo) -> bool {
        let mut filled = false;
        filled |= fill_text(&mut self.short_name, &other.short_name);
        filled |= fill_text(&mut self.sector, &other.sector);
        filled |= fill_text(&mut self.industry, &other.industry);
        filled |= fill_text(&mut self.country, &other.country);
        filled |= fill_text(&mut self.currency, &other.currency);
        filled
    }

    /// Fill still-empty valuation fields from a lower-priority source
    pub fn fill_metrics_from(&mut self, other: &CompanyInfo) -> bool {
        let mut filled = false;
        filled |= fill_number(&mut self.market_cap, &other.market_cap);
        filled |= fill_number(&mut self.trailing_pe, &other.trailing_pe);
        filled |= fill_number(&mut self.forward_pe, &other.forward_pe);
        filled |= fill_number(&mut self.peg_ratio, &other.peg_ratio);
        filled |= fill_number(&mut self.price_to_book, &other.price_to_book);
        filled |= fill_number(&mut self.price_to_sales, &other.price_to_sales);
        filled |= fill_number(&mut self.debt_to_equity, &other.debt_to_equity);
        filled |= fill_number(&mut self.dividend_yield, &other.dividend_yield);
        filled |= fill_number(&mut self.beta, &other.beta);
        filled |= fill_number(&mut self.roe, &other.roe);
        filled |= fill_number(&mut self.gross_margin, &other.gross_margin);
        filled
    }

    pub fn is_empty(&self) -> bool {
        // Destructured so a new field cannot be forgotten here
        let Self {
            short_name,
            sector,
            industry,
            country,
            currency,
            market_cap,
            trailing_pe,
            forward_pe,
            peg_ratio,
            price_to_book,
            price_to_sales,
            debt_to_equity,
            dividend_yield,
            beta,
            roe,
            gross_margin,
        } = self;

        ![short_name, sector, industry, country, currency]
            .into_iter()
            .any(text_present)
            && ![
                market_cap,
                trailing_pe,
                forward_pe,
                peg_ratio,
                price_to_book,
                price_to_sales,
                debt_to_equity,
                dividend_yield,
                beta,
                roe,
                gross_margin,
            ]
            .into_iter()
            .any(number_present)
    }

    /// Null out NaN / infinite values and blank strings
    pub fn retain_finite(&mut self) {
        let Self {
            short_name,
            sector,
            industry,
            country,
            currency,
            market_cap,
            trailing_pe,
            forward_pe,
            peg_ratio,
            price_to_book,
            price_to_sales,
            debt_to_equity,
            dividend_yield,
            beta,
            roe,
            gross_margin,
        } = self;

        for text in [short_name, sector, industry, country, currency] {
            if !text_present(text) {
                *text = None;
            }
        }
        for number in [
            market_cap,
            trailing_pe,
            forward_pe,
            peg_ratio,
            price_to_book,
            price_to_sales,
            debt_to_equity,
            dividend_yield,
            beta,
            roe,
            gross_margin,
        ] {
            drop_non_finite(number);
        }
    }
}

/// Current / recent price fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_mean_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation_mean: Option<f64>,
    /// Unix seconds of the quote, as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Quote {
    pub fn is_empty(&self) -> bool {
        let Self {
            current_price,
            change,
            percent_change,
            day_high,
            day_low,
            open,
            previous_close,
            target_mean_price,
            recommendation_mean,
            timestamp: _,
        } = self;

        ![
            current_price,
            change,
            percent_change,
            day_high,
            day_low,
            open,
            previous_close,
            target_mean_price,
            recommendation_mean,
        ]
        .into_iter()
        .any(number_present)
    }

    pub fn retain_finite(&mut self) {
        let Self {
            current_price,
            change,
            percent_change,
            day_high,
            day_low,
            open,
            previous_close,
            target_mean_price,
            recommendation_mean,
            timestamp: _,
        } = self;

        for number in [
            current_price,
            change,
            percent_change,
            day_high,
            day_low,
            open,
            previous_close,
            target_mean_price,
            recommendation_mean,
        ] {
            drop_non_finite(number);
        }
    }
}

/// Financial statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

/// Reporting period of a statement block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Annual,
    Quarterly,
    Ttm,
}

/// Open-ended provider line items (revenue, netIncome, ...) for one statement block
pub type LineItems = BTreeMap<String, serde_json::Value>;

/// statement -> period -> line items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Financials(BTreeMap<Statement, BTreeMap<Period, LineItems>>);

impl Financials {
    /// Insert a block; empty blocks are ignored so emptiness stays meaningful
    pub fn insert(&mut self, statement: Statement, period: Period, items: LineItems) {
        if items.is_empty() {
            return;
        }
        self.0.entry(statement).or_default().insert(period, items);
    }

    pub fn get(&self, statement: Statement, period: Period) -> Option<&LineItems> {
        self.0.get(&statement).and_then(|periods| periods.get(&period))
    }

    pub fn statement(&self, statement: Statement) -> Option<&BTreeMap<Period, LineItems>> {
        self.0.get(&statement)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|periods| periods.values().all(|items| items.is_empty()))
    }

    /// Take every (statement, period) block that is still missing
    pub fn fill_from(&mut self, other: &Financials) -> bool {
        let mut filled = false;
        for (statement, periods) in &other.0 {
            for (period, items) in periods {
                if items.is_empty() || self.get(*statement, *period).is_some() {
                    continue;
                }
                self.insert(*statement, *period, items.clone());
                filled = true;
            }
        }
        filled
    }
}

/// Ex-dividend date -> cash amount
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dividends(BTreeMap<NaiveDate, f64>);

impl Dividends {
    pub fn insert(&mut self, date: NaiveDate, amount: f64) {
        if amount.is_finite() {
            self.0.insert(date, amount);
        }
    }

    pub fn get(&self, date: &NaiveDate) -> Option<f64> {
        self.0.get(date).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep only the `keep` most recent payments
    pub fn trim_to_recent(&mut self, keep: usize) {
        while self.0.len() > keep {
            self.0.pop_first();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &f64)> {
        self.0.iter()
    }
}

impl FromIterator<(NaiveDate, f64)> for Dividends {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, f64)>>(iter: I) -> Self {
        let mut dividends = Dividends::default();
        for (date, amount) in iter {
            dividends.insert(date, amount);
        }
        dividends
    }
}

/// Monthly analyst recommendation counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationTrend {
    pub period: String,
    #[serde(default)]
    pub strong_buy: u32,
    #[serde(default)]
    pub buy: u32,
    #[serde(default)]
    pub hold: u32,
    #[serde(default)]
    pub sell: u32,
    #[serde(default)]
    pub strong_sell: u32,
}

/// Consensus analyst price target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTarget {
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

impl PriceTarget {
    pub fn is_empty(&self) -> bool {
        [self.high, self.low, self.mean, self.median]
            .iter()
            .all(|v| !number_present(v))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystData {
    #[serde(default)]
    pub recommendation_trends: Vec<RecommendationTrend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_target: Option<PriceTarget>,
}

impl AnalystData {
    pub fn is_empty(&self) -> bool {
        self.recommendation_trends.is_empty()
            && self.price_target.as_ref().map_or(true, PriceTarget::is_empty)
    }
}

/// What one adapter managed to fetch for one symbol
#[derive(Debug, Clone, Default)]
pub struct PartialRecord {
    pub source: &'static str,
    pub info: CompanyInfo,
    pub quote: Quote,
    pub financials: Financials,
    pub dividends: Dividends,
    pub analyst_data: Option<AnalystData>,
}

impl PartialRecord {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
            && self.quote.is_empty()
            && self.financials.is_empty()
            && self.dividends.is_empty()
            && self.analyst_data.as_ref().map_or(true, AnalystData::is_empty)
    }
}

/// Canonical per-symbol record produced by the merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedFinancialRecord {
    pub symbol: String,
    #[serde(default)]
    pub info: CompanyInfo,
    #[serde(default)]
    pub quote: Quote,
    #[serde(default)]
    pub financials: Financials,
    #[serde(default)]
    pub dividends: Dividends,
    #[serde(default)]
    pub analyst_data: Option<AnalystData>,
    /// Which adapter supplied each section (debugging only)
    #[serde(default)]
    pub sources: BTreeMap<Section, String>,
    pub fetched_at: DateTime<Utc>,
}

impl MergedFinancialRecord {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            info: CompanyInfo::default(),
            quote: Quote::default(),
            financials: Financials::default(),
            dividends: Dividends::default(),
            analyst_data: None,
            sources: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    /// True when no adapter contributed anything
    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
            && self.quote.is_empty()
            && self.financials.is_empty()
            && self.dividends.is_empty()
            && self.analyst_data.is_none()
    }

    pub fn retain_finite(&mut self) {
        self.info.retain_finite();
        self.quote.retain_finite();
        if let Some(target) = self.analyst_data.as_mut().and_then(|a| a.price_target.as_mut()) {
            drop_non_finite(&mut target.high);
            drop_non_finite(&mut target.low);
            drop_non_finite(&mut target.mean);
            drop_non_finite(&mut target.median);
        }
    }
}

/// Inclusive calendar range for date-scoped fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// The `days` days up to and including today (UTC); clamps at the earliest representable date
    pub fn last_days(days: u32) -> Self {
        let to = Utc::now().date_naive();
        Self {
            from: days_before(to, u64::from(days)),
            to,
        }
    }
}

/// `date` minus `days`, or [`NaiveDate::MIN`] when that leaves the calendar range
pub fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

/// Input to a source adapter
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub symbol: String,
    pub range: Option<DateRange>,
}

impl FetchRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            range: None,
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// News article summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    #[serde(default)]
    pub id: Option<i64>,
    pub headline: String,
    pub url: String,
    /// Publisher name
    pub source: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    /// Ticker the article was fetched for
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Articles for one symbol or a group of symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub symbols: Vec<String>,
    pub days: u32,
    pub articles: Vec<NewsArticle>,
}

impl NewsRecord {
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Per-symbol article lists
pub type GroupedNews = BTreeMap<String, Vec<NewsArticle>>;

/// One observation of a macro series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Indicator label -> time-ordered observations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroSnapshot(BTreeMap<String, Vec<MacroPoint>>);

impl MacroSnapshot {
    pub fn insert(&mut self, label: impl Into<String>, points: Vec<MacroPoint>) {
        self.0.insert(label.into(), points);
    }

    pub fn get(&self, label: &str) -> Option<&[MacroPoint]> {
        self.0.get(label).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
