use cache_manager::{CacheManager, CacheStats, NS_NEWS, NS_STOCKS};
use data_providers::{
    build_http_client, FinnhubAdapter, FmpAdapter, FredSource, TwelveDataAdapter,
    YahooDividendsAdapter, YhFinanceAdapter,
};
use futures_util::future::join_all;
use market_core::{
    FetchRequest, MacroSource, MergedFinancialRecord, NewsSource, PartialRecord, Section,
    SourceAdapter, SourceFailure,
};
use scoring_client::{OpenAiScorer, ScoreResult, ScoringError, ScoringGateway, ScoringResult};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod macro_data;
pub mod merge;
pub mod news;
pub mod symbols;

pub use config::MarketlyConfig;
pub use macro_data::{DEFAULT_MACRO_YEARS, INDICATORS};
pub use merge::{MergeEngine, MergePolicy};
pub use news::{
    DEFAULT_GROUPED_DAYS, DEFAULT_GROUPED_MAX_ITEMS, DEFAULT_MIXED_DAYS, DEFAULT_MIXED_MAX_ITEMS,
    DEFAULT_NEWS_DAYS, DEFAULT_NEWS_MAX_ITEMS,
};
pub use symbols::{group_key, news_key_covers, normalize_symbol, parse_symbols};

const DEFAULT_ADAPTER_DEADLINE: Duration = Duration::from_secs(45);

/// Cache-checked aggregation of every registered source.
///
/// Shared handles (cache, adapters, scorer) are built once and injected; nothing here
/// re-creates a client mid-request.
pub struct AggregationOrchestrator {
    cache: Arc<CacheManager>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    news_source: Option<Arc<dyn NewsSource>>,
    macro_source: Option<Arc<dyn MacroSource>>,
    merge_engine: MergeEngine,
    scoring: Option<ScoringGateway>,
    adapter_deadline: Duration,
}

impl AggregationOrchestrator {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            adapters: Vec::new(),
            news_source: None,
            macro_source: None,
            merge_engine: MergeEngine::default(),
            scoring: None,
            adapter_deadline: DEFAULT_ADAPTER_DEADLINE,
        }
    }

    /// Register every provider that has credentials; log the ones that are skipped
    pub fn from_config(config: &MarketlyConfig, cache: Arc<CacheManager>) -> anyhow::Result<Self> {
        let http = build_http_client(config.provider_timeout)?;
        let mut orchestrator = Self::new(cache).with_adapter_deadline(config.adapter_deadline);

        match &config.finnhub_api_key {
            Some(key) => {
                let finnhub = Arc::new(FinnhubAdapter::new(http.clone(), key.clone()));
                orchestrator = orchestrator
                    .with_adapter(finnhub.clone())
                    .with_news_source(finnhub);
            }
            None => tracing::warn!("FINNHUB_API_KEY missing: Finnhub profile, quote and news disabled"),
        }
        match &config.twelve_api_key {
            Some(key) => {
                orchestrator = orchestrator
                    .with_adapter(Arc::new(TwelveDataAdapter::new(http.clone(), key.clone())));
            }
            None => tracing::warn!("TWELVE_API_KEY missing: TwelveData quote disabled"),
        }
        match &config.fmp_api_key {
            Some(key) => {
                orchestrator = orchestrator.with_adapter(Arc::new(FmpAdapter::new(http.clone(), key.clone())));
            }
            None => tracing::warn!("FMPSDK_API_KEY missing: FMP fundamentals disabled"),
        }
        orchestrator = orchestrator.with_adapter(Arc::new(YahooDividendsAdapter::new(http.clone())));
        match &config.rapidapi_key {
            Some(key) => {
                orchestrator = orchestrator
                    .with_adapter(Arc::new(YhFinanceAdapter::new(http.clone(), key.clone())));
            }
            None => tracing::warn!("RAPIDAPI_KEY missing: YH Finance fallback disabled"),
        }
        match &config.fred_api_key {
            Some(key) => {
                orchestrator = orchestrator.with_macro_source(Arc::new(FredSource::new(http.clone(), key.clone())));
            }
            None => tracing::warn!("FRED_API_KEY missing: macro snapshot disabled"),
        }
        match &config.openai_api_key {
            Some(key) => {
                let scorer = OpenAiScorer::new(
                    key.clone(),
                    config.openai_base_url.clone(),
                    config.openai_model.clone(),
                    config.scoring_timeout,
                )?;
                orchestrator = orchestrator.with_scoring(ScoringGateway::new(
                    Arc::new(scorer),
                    config.scoring_max_payload_bytes,
                ));
            }
            None => tracing::warn!("OPENAI_API_KEY missing: scoring disabled"),
        }

        tracing::info!(
            "Aggregation ready with {} adapters: {}",
            orchestrator.adapters.len(),
            orchestrator.adapters.iter().map(|a| a.id()).collect::<Vec<_>>().join(", ")
        );
        for (section, sources) in orchestrator.coverage() {
            if sources.is_empty() {
                tracing::warn!("No registered adapter can fill {}; it will stay empty", section.as_str());
            } else {
                tracing::info!("{} <- {}", section.as_str(), sources.join(", "));
            }
        }
        Ok(orchestrator)
    }

    /// Registered adapters that declare each section, in registration order
    pub fn coverage(&self) -> BTreeMap<Section, Vec<&'static str>> {
        Section::ALL
            .iter()
            .map(|section| {
                let sources = self
                    .adapters
                    .iter()
                    .filter(|a| a.sections().contains(section))
                    .map(|a| a.id())
                    .collect();
                (*section, sources)
            })
            .collect()
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        tracing::debug!(source = adapter.id(), sections = ?adapter.sections(), "registered adapter");
        self.adapters.push(adapter);
        self
    }

    pub fn with_news_source(mut self, source: Arc<dyn NewsSource>) -> Self {
        self.news_source = Some(source);
        self
    }

    pub fn with_macro_source(mut self, source: Arc<dyn MacroSource>) -> Self {
        self.macro_source = Some(source);
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_engine = MergeEngine::new(policy);
        self
    }

    pub fn with_scoring(mut self, gateway: ScoringGateway) -> Self {
        self.scoring = Some(gateway);
        self
    }

    pub fn with_adapter_deadline(mut self, deadline: Duration) -> Self {
        self.adapter_deadline = deadline;
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Merged record for `symbol`, served from cache unless `force_refresh`.
    ///
    /// Never fails: when every source is down the record comes back empty (check
    /// [`MergedFinancialRecord::is_empty`]) and is not cached.
    pub async fn get_financial_record(&self, symbol: &str, force_refresh: bool) -> MergedFinancialRecord {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return MergedFinancialRecord::empty(symbol);
        }

        if force_refresh {
            tracing::info!("Force-refreshing {}", symbol);
        } else if let Some(cached) = self.cache_lookup::<MergedFinancialRecord>(NS_STOCKS, &symbol).await {
            tracing::info!("Loaded {} from {} cache", symbol, self.cache.backend_name());
            return cached;
        }

        let record = self.aggregate(&symbol).await;

        if record.is_empty() {
            tracing::warn!("All sources failed for {}; returning empty record without caching", symbol);
            return record;
        }

        self.cache_store(NS_STOCKS, &symbol, &record).await;
        tracing::info!(
            "{}: merged from {} sections ({:?})",
            symbol,
            record.sources.len(),
            record.sources
        );
        record
    }

    /// Run every adapter concurrently, wait for all of them, then merge
    async fn aggregate(&self, symbol: &str) -> MergedFinancialRecord {
        let request = FetchRequest::new(symbol);
        let results = join_all(
            self.adapters
                .iter()
                .map(|adapter| self.fetch_from(adapter.as_ref(), &request)),
        )
        .await;

        let partials: Vec<PartialRecord> = results.into_iter().flatten().collect();
        self.merge_engine.merge(symbol, &partials)
    }

    /// One adapter under the adapter deadline; any failure is logged and becomes `None`
    async fn fetch_from(&self, adapter: &dyn SourceAdapter, request: &FetchRequest) -> Option<PartialRecord> {
        let outcome = match tokio::time::timeout(self.adapter_deadline, adapter.fetch(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(market_core::SourceUnavailable::new(adapter.id(), SourceFailure::Timeout)),
        };

        match outcome {
            Ok(partial) => {
                tracing::debug!(source = adapter.id(), symbol = %request.symbol, "adapter returned data");
                Some(partial)
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(source = adapter.id(), symbol = %request.symbol, "adapter timed out");
                None
            }
            Err(e) => {
                tracing::warn!(source = adapter.id(), symbol = %request.symbol, "{}", e);
                None
            }
        }
    }

    /// Drop the symbol's cached record and every news entry whose symbol group contains it
    pub async fn invalidate_symbol(&self, symbol: &str) -> usize {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return 0;
        }

        let mut removed = usize::from(self.invalidate_entry(NS_STOCKS, &symbol).await);

        match self.cache.identifiers(NS_NEWS, "").await {
            Ok(identifiers) => {
                for identifier in identifiers.iter().filter(|id| news_key_covers(id, &symbol)) {
                    removed += usize::from(self.invalidate_entry(NS_NEWS, identifier).await);
                }
            }
            Err(e) => tracing::warn!("Failed to list news entries for {}: {}", symbol, e),
        }

        tracing::info!("Invalidated {} cache entries for {}", removed, symbol);
        removed
    }

    async fn invalidate_entry(&self, namespace: &str, identifier: &str) -> bool {
        match self.cache.delete_entry(namespace, identifier).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Failed to invalidate {}:{}: {}", namespace, identifier, e);
                false
            }
        }
    }

    /// Fetch macro snapshot, record and news concurrently, then score them
    pub async fn score_symbol(&self, symbol: &str) -> ScoringResult<ScoreResult> {
        let gateway = self
            .scoring
            .as_ref()
            .ok_or_else(|| ScoringError::ServiceUnavailable("no scoring function configured".to_string()))?;
        let symbol = normalize_symbol(symbol);

        let (macro_snapshot, record, news) = tokio::join!(
            self.get_macro_snapshot(DEFAULT_MACRO_YEARS),
            self.get_financial_record(&symbol, false),
            self.get_news(&symbol, DEFAULT_NEWS_DAYS, DEFAULT_NEWS_MAX_ITEMS),
        );

        gateway.score(&record, &news.articles, &macro_snapshot).await
    }

    /// Cache read that fails open: store errors are logged and treated as a miss
    pub(crate) async fn cache_lookup<T: DeserializeOwned>(&self, namespace: &str, identifier: &str) -> Option<T> {
        match self.cache.get(namespace, identifier).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Cache read for {}:{} failed, fetching live: {}", namespace, identifier, e);
                None
            }
        }
    }

    /// Cache write after a complete result; failures are logged only
    pub(crate) async fn cache_store<T: Serialize + ?Sized>(&self, namespace: &str, identifier: &str, value: &T) {
        if let Err(e) = self.cache.set(namespace, identifier, value, None).await {
            tracing::warn!("Cache write for {}:{} failed: {}", namespace, identifier, e);
        }
    }
}
