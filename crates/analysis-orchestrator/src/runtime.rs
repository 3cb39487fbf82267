//! The process-wide runtime: provider hub, LLM client, summarization
//! engine, artifact store, news config and the background-task map. Built
//! once at startup and threaded through the pipeline.

use analysis_core::{AnalysisError, ChatModel, Settings};
use artifact_store::ArtifactStore;
use dashmap::DashMap;
use llm_client::LlmClient;
use market_data::DataHub;
use news_enrichment::{NewsConfigLoader, NewsEnrichment};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use summarizer::Summarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskEntry {
    pub status: TaskStatus,
    pub result: Option<Value>,
}

pub struct Runtime {
    pub settings: Settings,
    pub hub: DataHub,
    pub llm: Arc<dyn ChatModel>,
    pub summarizer: Summarizer,
    pub store: ArtifactStore,
    pub news_config: Arc<NewsConfigLoader>,
    pub news_enrichment: NewsEnrichment,
    /// Background (non-streaming) task map, keyed by task id.
    pub tasks: DashMap<String, TaskEntry>,
}

impl Runtime {
    /// Production wiring: probe providers, select the LLM, load the static
    /// catalogue.
    pub async fn initialize(settings: Settings) -> Result<Arc<Self>, AnalysisError> {
        let hub = DataHub::initialize(&settings).await?;
        let llm: Arc<dyn ChatModel> = Arc::new(LlmClient::from_settings(&settings)?);
        let news_config = Arc::new(NewsConfigLoader::new(
            settings.news_cfg_path.clone().map(PathBuf::from),
        ));
        Ok(Arc::new(Self::assemble(settings, hub, llm, news_config)))
    }

    /// Like `initialize`, but a failed provider probe degrades to the
    /// unavailable hub instead of refusing to start: every fetch then
    /// surfaces a structured unavailable error.
    pub async fn initialize_or_degraded(settings: Settings) -> Result<Arc<Self>, AnalysisError> {
        match Self::initialize(settings.clone()).await {
            Ok(rt) => Ok(rt),
            Err(AnalysisError::ProviderUnavailable(msg)) => {
                tracing::warn!(%msg, "starting degraded: no data provider available");
                let llm: Arc<dyn ChatModel> = Arc::new(LlmClient::from_settings(&settings)?);
                let news_config = Arc::new(NewsConfigLoader::new(
                    settings.news_cfg_path.clone().map(PathBuf::from),
                ));
                Ok(Arc::new(Self::assemble(
                    settings,
                    DataHub::unavailable(),
                    llm,
                    news_config,
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Assembly from preconstructed parts; tests inject mock providers and
    /// scripted models here.
    pub fn with_parts(
        settings: Settings,
        hub: DataHub,
        llm: Arc<dyn ChatModel>,
        store: ArtifactStore,
        news_config: Arc<NewsConfigLoader>,
    ) -> Arc<Self> {
        let summarizer = Summarizer::new(Arc::clone(&llm));
        let news_enrichment =
            NewsEnrichment::new(Summarizer::new(Arc::clone(&llm)), Arc::clone(&news_config));
        Arc::new(Self {
            settings,
            hub,
            llm,
            summarizer,
            store,
            news_config,
            news_enrichment,
            tasks: DashMap::new(),
        })
    }

    fn assemble(
        settings: Settings,
        hub: DataHub,
        llm: Arc<dyn ChatModel>,
        news_config: Arc<NewsConfigLoader>,
    ) -> Self {
        let summarizer = Summarizer::new(Arc::clone(&llm));
        let news_enrichment =
            NewsEnrichment::new(Summarizer::new(Arc::clone(&llm)), Arc::clone(&news_config));
        let store = ArtifactStore::new(settings.result_dir.clone());
        Self {
            settings,
            hub,
            llm,
            summarizer,
            store,
            news_config,
            news_enrichment,
            tasks: DashMap::new(),
        }
    }
}
