//! Data acquisition layer: provider registry, adapters and the static
//! catalogue. The active provider is chosen once at startup by capability
//! probing (tushare → tinyshare → akshare); there is no per-call failover.

pub mod akshare;
pub mod catalog;
pub mod news;
pub mod northbound;
pub mod wire;
pub mod wire_provider;

pub use akshare::AkshareProvider;
pub use catalog::Catalog;
pub use news::WireNewsSource;
pub use wire_provider::WireProvider;

use analysis_core::{AnalysisError, MarketDataProvider, NewsSource, Settings};
use std::sync::Arc;

pub struct DataHub {
    provider: Arc<dyn MarketDataProvider>,
    news: Option<Arc<dyn NewsSource>>,
    catalog: Catalog,
}

/// Stand-in provider installed when no real provider passed the startup
/// probe; every fetch surfaces a structured unavailable error.
pub struct UnavailableProvider;

#[async_trait::async_trait]
impl MarketDataProvider for UnavailableProvider {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn fetch(
        &self,
        _kind: analysis_core::FetchKind,
        _symbol: &str,
        _end_date: Option<&str>,
    ) -> Result<analysis_core::Table, AnalysisError> {
        Err(AnalysisError::ProviderUnavailable(
            "数据提供者未初始化".to_string(),
        ))
    }

    async fn probe(&self) -> bool {
        false
    }
}

impl DataHub {
    /// Probe providers in the fixed order and retain the first that answers
    /// the representative call with a non-empty table. The news source is
    /// probed independently.
    pub async fn initialize(settings: &Settings) -> Result<Self, AnalysisError> {
        let mut provider: Option<Arc<dyn MarketDataProvider>> = None;

        if settings.tushare_configured() {
            let candidate = WireProvider::tushare(settings.tushare_token.clone());
            if candidate.probe().await {
                tracing::info!("provider selected: tushare (primary)");
                provider = Some(Arc::new(candidate));
            } else {
                tracing::warn!("tushare probe failed");
            }
        }

        if provider.is_none() && settings.tinyshare_configured() {
            let candidate = WireProvider::tinyshare(settings.tinyshare_token.clone());
            if candidate.probe().await {
                tracing::info!("provider selected: tinyshare (first fallback)");
                provider = Some(Arc::new(candidate));
            } else {
                tracing::warn!("tinyshare probe failed");
            }
        }

        if provider.is_none() {
            let candidate = AkshareProvider::new();
            if candidate.probe().await {
                tracing::info!("provider selected: akshare (second fallback)");
                provider = Some(Arc::new(candidate));
            } else {
                tracing::warn!("akshare probe failed");
            }
        }

        let provider = provider.ok_or_else(|| {
            AnalysisError::ProviderUnavailable(
                "所有数据提供者初始化失败：tushare、tinyshare、akshare 均不可用".to_string(),
            )
        })?;

        let news: Option<Arc<dyn NewsSource>> = if settings.news_configured() {
            let candidate = WireNewsSource::new(settings.news_token.clone());
            if candidate.probe().await {
                tracing::info!("news source available");
                Some(Arc::new(candidate))
            } else {
                tracing::warn!("news source probe failed");
                None
            }
        } else {
            tracing::info!("news source disabled or unconfigured");
            None
        };

        let catalog = Catalog::load(&settings.database_url).await;

        Ok(Self {
            provider,
            news,
            catalog,
        })
    }

    /// Degraded hub used when initialization failed: fetches return
    /// structured unavailable errors instead of data.
    pub fn unavailable() -> Self {
        Self {
            provider: Arc::new(UnavailableProvider),
            news: None,
            catalog: Catalog::default(),
        }
    }

    /// Assembly from preconstructed parts; the seam used by tests and by
    /// deployments with custom adapters.
    pub fn with_parts(
        provider: Arc<dyn MarketDataProvider>,
        news: Option<Arc<dyn NewsSource>>,
        catalog: Catalog,
    ) -> Self {
        Self {
            provider,
            news,
            catalog,
        }
    }

    pub fn provider(&self) -> Arc<dyn MarketDataProvider> {
        Arc::clone(&self.provider)
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn news_source(&self) -> Option<Arc<dyn NewsSource>> {
        self.news.as_ref().map(Arc::clone)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn stock_name(&self, symbol: &str) -> String {
        self.catalog.stock_name(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Cell, FetchKind, Table};
    use async_trait::async_trait;

    struct FixedProvider {
        name: &'static str,
        empty: bool,
    }

    #[async_trait]
    impl MarketDataProvider for FixedProvider {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn fetch(
            &self,
            _kind: FetchKind,
            _symbol: &str,
            _end_date: Option<&str>,
        ) -> Result<Table, AnalysisError> {
            let mut t = Table::new(vec!["trade_date".into()]);
            if !self.empty {
                t.push_row(vec![Cell::Str("20250912".into())]);
            }
            Ok(t)
        }
    }

    #[tokio::test]
    async fn probe_requires_non_empty_table() {
        let empty = FixedProvider { name: "a", empty: true };
        assert!(!empty.probe().await);
        let full = FixedProvider { name: "b", empty: false };
        assert!(full.probe().await);
    }

    #[tokio::test]
    async fn hub_exposes_pinned_provider() {
        let provider = Arc::new(FixedProvider { name: "fixture", empty: false });
        let hub = DataHub::with_parts(provider, None, Catalog::default());
        assert_eq!(hub.provider_name(), "fixture");
        assert!(hub.news_source().is_none());
    }
}
