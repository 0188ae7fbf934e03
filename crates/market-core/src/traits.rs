use crate::error::SourceResult;
use crate::types::{DateRange, FetchRequest, MacroPoint, NewsArticle, PartialRecord, Section};
use async_trait::async_trait;
use chrono::NaiveDate;

/// One upstream market-data provider.
///
/// Implementations turn provider payloads into a [`PartialRecord`] and report any failure as
/// `SourceUnavailable`; they never panic across this boundary.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier used in merge priority lists and provenance
    fn id(&self) -> &'static str;

    /// Sections this adapter can fill
    fn sections(&self) -> &'static [Section];

    async fn fetch(&self, request: &FetchRequest) -> SourceResult<PartialRecord>;
}

/// Provider of company news articles
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn id(&self) -> &'static str;

    async fn company_news(&self, symbol: &str, range: &DateRange) -> SourceResult<Vec<NewsArticle>>;
}

/// Provider of macroeconomic time series
#[async_trait]
pub trait MacroSource: Send + Sync {
    fn id(&self) -> &'static str;

    /// Observations of `series_id` on or after `since`, oldest first
    async fn series(&self, series_id: &str, since: NaiveDate) -> SourceResult<Vec<MacroPoint>>;
}
