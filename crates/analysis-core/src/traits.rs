use crate::error::AnalysisError;
use crate::protocol::{ToolCall, ToolCallChunk};
use crate::table::Table;
use async_trait::async_trait;

/// The closed set of fetch operations every tabular provider implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    // Fundamentals
    FinaIndicator,
    DailyBasic,
    Dividend,
    Income,
    Balance,
    Cashflow,
    Forecast,
    Express,
    MainBusiness,
    // Technicals
    ProBarDaily,
    ProBarWeekly,
    ProBarMonthly,
    StkFactor,
    DailyBasicEnhanced,
    LimitList,
    // Fund flow
    Top10Holders,
    Top10FloatHolders,
    HolderNumber,
    MoneyflowStock,
    MoneyflowSector,
    MoneyflowIndustry,
    MoneyflowMarket,
    MoneyflowIndustryDc,
    TopList,
    TopInst,
    MoneyflowNorthbound,
    ChipDistribution,
}

impl FetchKind {
    /// Interface name used as the key in tool results and artifacts.
    pub fn name(&self) -> &'static str {
        match self {
            FetchKind::FinaIndicator => "fina_indicator",
            FetchKind::DailyBasic => "daily_basic",
            FetchKind::Dividend => "dividend",
            FetchKind::Income => "income",
            FetchKind::Balance => "balance",
            FetchKind::Cashflow => "cashflow",
            FetchKind::Forecast => "forecast",
            FetchKind::Express => "express",
            FetchKind::MainBusiness => "mainbz",
            FetchKind::ProBarDaily => "pro_bar_D",
            FetchKind::ProBarWeekly => "pro_bar_W",
            FetchKind::ProBarMonthly => "pro_bar_M",
            FetchKind::StkFactor => "stk_factor",
            FetchKind::DailyBasicEnhanced => "daily_basic",
            FetchKind::LimitList => "limit_list",
            FetchKind::Top10Holders => "top10_holders",
            FetchKind::Top10FloatHolders => "top10_floatholders",
            FetchKind::HolderNumber => "stk_holdernumber",
            FetchKind::MoneyflowStock => "moneyflow_ths",
            FetchKind::MoneyflowSector => "moneyflow_cnt_ths",
            FetchKind::MoneyflowIndustry => "moneyflow_ind_ths",
            FetchKind::MoneyflowMarket => "moneyflow_mkt_dc",
            FetchKind::MoneyflowIndustryDc => "moneyflow_ind_dc",
            FetchKind::TopList => "top_list",
            FetchKind::TopInst => "top_inst",
            FetchKind::MoneyflowNorthbound => "moneyflow_hsgt",
            FetchKind::ChipDistribution => "cyq_perf",
        }
    }

    /// Interfaces keyed by a single trade date; on an empty result these
    /// retry up to five preceding calendar days.
    pub fn is_trade_date_keyed(&self) -> bool {
        matches!(
            self,
            FetchKind::MoneyflowSector
                | FetchKind::MoneyflowIndustry
                | FetchKind::MoneyflowMarket
                | FetchKind::MoneyflowIndustryDc
                | FetchKind::TopList
                | FetchKind::TopInst
                | FetchKind::ChipDistribution
        )
    }

    /// Market-wide interfaces that take no symbol argument.
    pub fn is_symbol_free(&self) -> bool {
        matches!(
            self,
            FetchKind::MoneyflowNorthbound
                | FetchKind::MoneyflowSector
                | FetchKind::MoneyflowIndustry
                | FetchKind::MoneyflowMarket
        )
    }
}

/// A tabular market-data provider. One is selected at startup; there is no
/// per-call failover because providers are not bit-compatible.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(
        &self,
        kind: FetchKind,
        symbol: &str,
        end_date: Option<&str>,
    ) -> Result<Table, AnalysisError>;

    /// Availability probe: one representative call returning a non-empty
    /// table marks the provider usable.
    async fn probe(&self) -> bool {
        match self.fetch(FetchKind::DailyBasic, "000001.SZ", None).await {
            Ok(table) => !table.is_empty(),
            Err(_) => false,
        }
    }
}

/// The independent news source, probed separately from the tabular provider.
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ticker flash news within the trailing `days` window.
    async fn fetch_news(&self, end_date: Option<&str>, days: i64) -> Result<Table, AnalysisError>;

    /// Major market news within the trailing `days` window.
    async fn fetch_major_news(
        &self,
        end_date: Option<&str>,
        days: i64,
    ) -> Result<Table, AnalysisError>;

    /// National broadcast news for the last `days` days.
    async fn fetch_cctv_news(&self, days: i64) -> Result<Table, AnalysisError>;

    async fn probe(&self) -> bool {
        matches!(self.fetch_news(None, 3).await, Ok(t) if !t.columns.is_empty())
    }
}

/// One delta of a streamed LLM response.
#[derive(Debug, Clone, Default)]
pub struct ChatChunk {
    pub content: String,
    pub finish_reason: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_chunks: Vec<ToolCallChunk>,
}

/// Chat-completion seam. Concrete clients live in `llm-client`; tests use
/// scripted implementations.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AnalysisError>;

    /// Streaming completion: each delta is handed to `on_chunk` as it
    /// arrives and the accumulated text is returned. Implementations without
    /// a streaming transport degrade to a single terminal chunk.
    async fn complete_streaming(
        &self,
        prompt: &str,
        on_chunk: &(dyn Fn(ChatChunk) + Send + Sync),
    ) -> Result<String, AnalysisError> {
        let text = self.complete(prompt).await?;
        on_chunk(ChatChunk {
            content: text.clone(),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        });
        Ok(text)
    }
}
