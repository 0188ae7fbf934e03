//! Company news: single symbol, per-symbol groups and one mixed river.

use crate::symbols::{group_key, normalize_symbol, parse_symbols};
use crate::AggregationOrchestrator;
use cache_manager::NS_NEWS;
use futures_util::future::join_all;
use market_core::{DateRange, GroupedNews, NewsArticle, NewsRecord};

pub const DEFAULT_NEWS_DAYS: u32 = 3;
pub const DEFAULT_NEWS_MAX_ITEMS: usize = 8;
pub const DEFAULT_GROUPED_DAYS: u32 = 7;
pub const DEFAULT_GROUPED_MAX_ITEMS: usize = 50;
pub const DEFAULT_MIXED_DAYS: u32 = 3;
pub const DEFAULT_MIXED_MAX_ITEMS: usize = 10;

impl AggregationOrchestrator {
    /// Latest `max_items` articles for one symbol over the last `days` days
    pub async fn get_news(&self, symbol: &str, days: u32, max_items: usize) -> NewsRecord {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return NewsRecord {
                symbols: Vec::new(),
                days,
                articles: Vec::new(),
            };
        }
        let key = format!("{}_{}d_{}", symbol, days, max_items);

        if let Some(cached) = self.cache_lookup::<NewsRecord>(NS_NEWS, &key).await {
            return cached;
        }

        let (articles, complete) = self.fetch_news(&symbol, days, max_items).await;
        let record = NewsRecord {
            symbols: vec![symbol],
            days,
            articles,
        };
        if complete {
            self.cache_store(NS_NEWS, &key, &record).await;
        }
        record
    }

    /// Articles per symbol; the cache entry is shared by any ordering of the same symbols
    pub async fn get_news_grouped(&self, symbols: &str, days: u32, max_items: usize) -> GroupedNews {
        let symbols = parse_symbols(symbols);
        if symbols.is_empty() {
            return GroupedNews::new();
        }
        let key = format!("{}_{}d_{}", group_key(&symbols), days, max_items);

        if let Some(cached) = self.cache_lookup::<GroupedNews>(NS_NEWS, &key).await {
            return cached;
        }

        let results = join_all(
            symbols
                .iter()
                .map(|symbol| self.fetch_news(symbol, days, max_items)),
        )
        .await;

        let mut complete = true;
        let mut grouped = GroupedNews::new();
        for (symbol, (articles, ok)) in symbols.into_iter().zip(results) {
            complete &= ok;
            grouped.insert(symbol, articles);
        }

        if complete {
            self.cache_store(NS_NEWS, &key, &grouped).await;
        }
        grouped
    }

    /// One list across all symbols, oldest first; each symbol contributes at most `max_items`
    pub async fn get_news_mixed(&self, symbols: &str, days: u32, max_items: usize) -> NewsRecord {
        let symbols = parse_symbols(symbols);
        if symbols.is_empty() {
            return NewsRecord {
                symbols,
                days,
                articles: Vec::new(),
            };
        }
        let key = format!("{}_{}d_{}_mixed", group_key(&symbols), days, max_items);

        if let Some(cached) = self.cache_lookup::<NewsRecord>(NS_NEWS, &key).await {
            return cached;
        }

        let results = join_all(
            symbols
                .iter()
                .map(|symbol| self.fetch_news(symbol, days, max_items)),
        )
        .await;

        let complete = results.iter().all(|(_, ok)| *ok);
        let mut articles: Vec<NewsArticle> = results.into_iter().flat_map(|(a, _)| a).collect();
        articles.sort_by_key(|a| a.published_at);

        let record = NewsRecord {
            symbols,
            days,
            articles,
        };
        if complete {
            self.cache_store(NS_NEWS, &key, &record).await;
        }
        record
    }

    /// Articles for one symbol plus whether the fetch succeeded
    async fn fetch_news(&self, symbol: &str, days: u32, max_items: usize) -> (Vec<NewsArticle>, bool) {
        let Some(source) = &self.news_source else {
            tracing::warn!("No news source configured; returning no articles for {}", symbol);
            return (Vec::new(), false);
        };

        match source.company_news(symbol, &DateRange::last_days(days)).await {
            Ok(mut articles) => {
                articles.truncate(max_items);
                tracing::debug!("{} news articles for {}", articles.len(), symbol);
                (articles, true)
            }
            Err(e) => {
                tracing::warn!("News fetch for {} failed: {}", symbol, e);
                (Vec::new(), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cache_manager::CacheManager;
    use chrono::{TimeZone, Utc};
    use market_core::{NewsSource, SourceFailure, SourceResult, SourceUnavailable};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeNews {
        fail_for: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FakeNews {
        fn new() -> Self {
            Self {
                fail_for: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    fn article(symbol: &str, n: i64) -> NewsArticle {
        NewsArticle {
            id: Some(n),
            headline: format!("{} headline {}", symbol, n),
            url: format!("https://news.example/{}/{}", symbol, n),
            source: "Reuters".to_string(),
            published_at: Utc.timestamp_opt(1_700_000_000 + n * 60, 0).unwrap(),
            summary: String::new(),
            symbol: symbol.to_string(),
            category: None,
            image: None,
        }
    }

    #[async_trait]
    impl NewsSource for FakeNews {
        fn id(&self) -> &'static str {
            "fake_news"
        }

        async fn company_news(&self, symbol: &str, _range: &DateRange) -> SourceResult<Vec<NewsArticle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for == Some(symbol) {
                return Err(SourceUnavailable::new("fake_news", SourceFailure::Status(429)));
            }
            // Newest first, the way providers return them
            let offset = if symbol == "AAPL" { 0 } else { 1 };
            Ok((0..20).rev().map(|n| article(symbol, n * 2 + offset)).collect())
        }
    }

    fn orchestrator(news: Arc<FakeNews>) -> AggregationOrchestrator {
        AggregationOrchestrator::new(Arc::new(CacheManager::in_memory())).with_news_source(news)
    }

    #[tokio::test]
    async fn test_single_symbol_is_capped_and_cached() {
        let news = Arc::new(FakeNews::new());
        let orchestrator = orchestrator(news.clone());

        let record = orchestrator.get_news(" aapl ", 3, 8).await;
        assert_eq!(record.symbols, vec!["AAPL"]);
        assert_eq!(record.articles.len(), 8);

        let again = orchestrator.get_news("AAPL", 3, 8).await;
        assert_eq!(record, again);
        assert_eq!(news.calls.load(Ordering::SeqCst), 1);

        orchestrator.get_news("AAPL", 7, 8).await;
        assert_eq!(news.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_empty_and_not_cached() {
        let news = Arc::new(FakeNews {
            fail_for: Some("MSFT"),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(news.clone());

        assert!(orchestrator.get_news("MSFT", 3, 8).await.is_empty());
        assert!(orchestrator.get_news("MSFT", 3, 8).await.is_empty());
        assert_eq!(news.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_grouped_shares_cache_across_orderings() {
        let news = Arc::new(FakeNews::new());
        let orchestrator = orchestrator(news.clone());

        let grouped = orchestrator.get_news_grouped("msft,aapl", 7, 50).await;
        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["AAPL", "MSFT"]);
        assert_eq!(grouped["AAPL"].len(), 20);

        let again = orchestrator.get_news_grouped("AAPL MSFT", 7, 50).await;
        assert_eq!(grouped, again);
        assert_eq!(news.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_grouped_with_a_failure_is_not_cached() {
        let news = Arc::new(FakeNews {
            fail_for: Some("MSFT"),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(news.clone());

        let grouped = orchestrator.get_news_grouped("AAPL,MSFT", 7, 50).await;
        assert!(grouped["MSFT"].is_empty());
        assert_eq!(grouped["AAPL"].len(), 20);

        orchestrator.get_news_grouped("AAPL,MSFT", 7, 50).await;
        assert_eq!(news.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_mixed_is_sorted_oldest_first() {
        let orchestrator = orchestrator(Arc::new(FakeNews::new()));

        let record = orchestrator.get_news_mixed("AAPL,MSFT", 3, 10).await;

        assert_eq!(record.articles.len(), 20);
        assert!(record
            .articles
            .windows(2)
            .all(|w| w[0].published_at <= w[1].published_at));
        assert!(record.articles.iter().any(|a| a.symbol == "MSFT"));
        assert!(record.articles.iter().any(|a| a.symbol == "AAPL"));
    }

    #[tokio::test]
    async fn test_blank_symbol_skips_provider_and_cache() {
        let news = Arc::new(FakeNews::new());
        let cache = Arc::new(CacheManager::in_memory());
        let orchestrator = AggregationOrchestrator::new(cache.clone()).with_news_source(news.clone());

        let record = orchestrator.get_news("   ", 3, 8).await;

        assert!(record.is_empty());
        assert!(record.symbols.is_empty());
        assert_eq!(news.calls.load(Ordering::SeqCst), 0);
        assert!(cache.identifiers(NS_NEWS, "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_days_does_not_panic() {
        let orchestrator = orchestrator(Arc::new(FakeNews::new()));
        let record = orchestrator.get_news("AAPL", u32::MAX, 8).await;
        assert_eq!(record.articles.len(), 8);
    }

    #[tokio::test]
    async fn test_no_news_source_returns_empty() {
        let orchestrator = AggregationOrchestrator::new(Arc::new(CacheManager::in_memory()));
        assert!(orchestrator.get_news("AAPL", 3, 8).await.is_empty());
        assert!(orchestrator.get_news_grouped("", 7, 50).await.is_empty());
    }
}
