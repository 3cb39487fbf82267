//! The per-perspective analyst nodes. Each node acquires data through the
//! hub, summarizes per interface, persists the assembled tool result, calls
//! the LLM with a perspective-specific prompt and saves the parsed report.

use crate::events::EventSink;
use crate::parsers;
use crate::prompts;
use crate::runtime::Runtime;
use analysis_core::dates;
use analysis_core::{
    AnalysisError, ChatChunk, FetchKind, InterfaceResult, NewsSource, ToolData,
};
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub struct NodeContext {
    pub symbol: String,
    pub end_date: Option<String>,
    pub thread_id: String,
    pub events: EventSink,
    pub state: Arc<Mutex<Map<String, Value>>>,
}

impl NodeContext {
    pub fn state_value(&self, key: &str) -> Value {
        self.state
            .lock()
            .expect("state lock poisoned")
            .get(key)
            .cloned()
            .unwrap_or(Value::Object(Map::new()))
    }

    pub fn state_snapshot(&self) -> Map<String, Value> {
        self.state.lock().expect("state lock poisoned").clone()
    }
}

#[derive(Clone, Copy)]
enum SummaryStyle {
    TwoStage,
    Tech,
    Fund,
}

struct InterfaceSpec {
    kind: FetchKind,
    objective: &'static str,
    style: SummaryStyle,
    empty_note: &'static str,
}

const fn iface(kind: FetchKind, objective: &'static str, style: SummaryStyle) -> InterfaceSpec {
    InterfaceSpec {
        kind,
        objective,
        style,
        empty_note: "",
    }
}

const FUNDAMENTAL_INTERFACES: &[InterfaceSpec] = &[
    iface(FetchKind::FinaIndicator, "盈利能力与财务指标", SummaryStyle::TwoStage),
    iface(FetchKind::DailyBasic, "每日估值水平", SummaryStyle::TwoStage),
    iface(FetchKind::Dividend, "股东分红回报", SummaryStyle::TwoStage),
    iface(FetchKind::Income, "营业收入与利润构成", SummaryStyle::TwoStage),
    iface(FetchKind::Balance, "资产与负债结构", SummaryStyle::TwoStage),
    iface(FetchKind::Cashflow, "现金流量质量", SummaryStyle::TwoStage),
    iface(FetchKind::Forecast, "未来业绩预期", SummaryStyle::TwoStage),
    iface(FetchKind::MainBusiness, "主营业务构成", SummaryStyle::TwoStage),
];

const TECH_INTERFACES: &[InterfaceSpec] = &[
    iface(FetchKind::ProBarDaily, "短期（日线K线与均线走势）", SummaryStyle::Tech),
    iface(FetchKind::ProBarWeekly, "中期（周线K线与均线走势）", SummaryStyle::Tech),
    iface(FetchKind::ProBarMonthly, "长期（月线K线与均线走势）", SummaryStyle::Tech),
    iface(FetchKind::StkFactor, "技术指标（MACD/RSI/KDJ等）", SummaryStyle::Tech),
    iface(FetchKind::DailyBasicEnhanced, "估值与成交特征", SummaryStyle::Tech),
    iface(FetchKind::LimitList, "涨跌停与市场情绪", SummaryStyle::Tech),
];

const FUND_INTERFACES: &[InterfaceSpec] = &[
    iface(FetchKind::Top10Holders, "前十大股东持股情况", SummaryStyle::Fund),
    iface(FetchKind::Top10FloatHolders, "前十大流通股东持股情况", SummaryStyle::Fund),
    iface(FetchKind::HolderNumber, "股东人数", SummaryStyle::Fund),
    iface(FetchKind::MoneyflowStock, "个股主力动向", SummaryStyle::Fund),
    InterfaceSpec {
        kind: FetchKind::MoneyflowSector,
        objective: "板块主力动向",
        style: SummaryStyle::Fund,
        empty_note: "。板块主力动向数据通常有1-2天延迟，建议查询前一个交易日的数据。",
    },
    iface(FetchKind::MoneyflowIndustry, "行业主力动向", SummaryStyle::Fund),
    iface(FetchKind::MoneyflowMarket, "大盘资金流向", SummaryStyle::Fund),
    iface(FetchKind::MoneyflowIndustryDc, "板块资金流向", SummaryStyle::Fund),
    iface(FetchKind::TopList, "龙虎榜每日统计", SummaryStyle::Fund),
    iface(FetchKind::TopInst, "龙虎榜机构明细", SummaryStyle::Fund),
    InterfaceSpec {
        kind: FetchKind::MoneyflowNorthbound,
        objective: "北向资金",
        style: SummaryStyle::Fund,
        empty_note: "。北向资金数据通常有1天延迟，建议查询前一个交易日的数据。",
    },
    iface(FetchKind::ChipDistribution, "每日筹码分布", SummaryStyle::Fund),
];

async fn process_interface(
    rt: &Runtime,
    symbol: &str,
    end_date: Option<&str>,
    item: &InterfaceSpec,
) -> InterfaceResult {
    let objective = item.objective;
    match rt.hub.provider().fetch(item.kind, symbol, end_date).await {
        Ok(table) if !table.is_empty() => {
            let summary = match item.style {
                SummaryStyle::TwoStage => {
                    rt.summarizer.process_and_summarize(&table, objective).await
                }
                SummaryStyle::Tech => format!(
                    "【{objective}】\n{}",
                    rt.summarizer.analyze_tech_table(&table, objective).await
                ),
                SummaryStyle::Fund => format!(
                    "【{objective}】\n{}",
                    rt.summarizer.analyze_fund_table(&table, objective).await
                ),
            };
            InterfaceResult::from_summary(objective, summary, table.to_records())
        }
        Ok(_) => {
            // A valid empty window is success, with the window in the summary.
            let window = dates::window_description(end_date, None);
            tracing::info!(interface = item.kind.name(), "empty table (not an error)");
            InterfaceResult::from_summary(
                objective,
                format!("【{objective}】: {window}{objective}数据为空{}", item.empty_note),
                Vec::new(),
            )
        }
        Err(e) => {
            tracing::error!(interface = item.kind.name(), error = %e, "interface fetch failed");
            InterfaceResult::error(objective, format!("【{objective}】: 数据获取失败 - {e}"))
        }
    }
}

/// Fan the interface set out over a bounded worker pool; results are keyed
/// by interface name regardless of completion order.
async fn run_interfaces(
    rt: &Runtime,
    symbol: &str,
    end_date: Option<&str>,
    specs: &'static [InterfaceSpec],
    pool: usize,
) -> BTreeMap<String, InterfaceResult> {
    fn make<'a>(
        rt: &'a Runtime,
        symbol: &'a str,
        end_date: Option<&'a str>,
        item: &'static InterfaceSpec,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = (String, InterfaceResult)> + Send + 'a>>
    {
        Box::pin(async move {
            let result = process_interface(rt, symbol, end_date, item).await;
            (item.kind.name().to_string(), result)
        })
    }

    let mut pending = stream::FuturesUnordered::new();
    let mut remaining = specs.iter();
    let mut out = Vec::with_capacity(specs.len());
    for item in remaining.by_ref().take(pool) {
        pending.push(make(rt, symbol, end_date, item));
    }
    while let Some(entry) = pending.next().await {
        out.push(entry);
        if let Some(item) = remaining.next() {
            pending.push(make(rt, symbol, end_date, item));
        }
    }
    out.into_iter().collect()
}

/// LLM call that forwards stream chunks to the event sink and returns the
/// full response text.
async fn complete_with_stream(
    rt: &Runtime,
    ctx: &NodeContext,
    node: &str,
    run_id: &str,
    prompt: &str,
) -> Result<String, AnalysisError> {
    let events = ctx.events.clone();
    let node = node.to_string();
    let run_id = run_id.to_string();
    let on_chunk = move |chunk: ChatChunk| {
        events.llm_chunk(&node, &run_id, chunk);
    };
    rt.llm.complete_streaming(prompt, &on_chunk).await
}

pub async fn run_fundamental(
    rt: &Runtime,
    ctx: &NodeContext,
    run_id: &str,
) -> Result<Value, AnalysisError> {
    const NODE: &str = "fundamental_analysis";
    let symbol = ctx.symbol.as_str();
    let end_date = ctx.end_date.as_deref();
    let period = dates::analysis_period(end_date);

    ctx.events.tool_start(NODE, run_id, "get_fundamental_data");
    let pool = (FUNDAMENTAL_INTERFACES.len() + 1).min(10);
    let interfaces = run_interfaces(rt, symbol, end_date, FUNDAMENTAL_INTERFACES, pool).await;
    let mut data = ToolData::new("基本面数据分析", interfaces);

    let (basic, detail) = rt.hub.catalog().company_basic_info(symbol);
    let has_info = basic.as_object().map(|m| !m.is_empty()).unwrap_or(false)
        || detail.as_object().map(|m| !m.is_empty()).unwrap_or(false);
    if has_info {
        data.company_overview
            .push(rt.summarizer.process_company_info(&basic, &detail).await);
    }

    let text = data.to_prompt_text();
    rt.store
        .save_tool_result(symbol, "fundamental_data", &serde_json::to_value(&data)?, end_date)?;
    ctx.events.tool_end(NODE, run_id, "get_fundamental_data", &text);

    let prompt = prompts::fundamental(symbol, &period, &text);
    let response = complete_with_stream(rt, ctx, NODE, run_id, &prompt).await?;
    let report = serde_json::to_value(parsers::parse_analyst_report(&response))?;
    rt.store
        .save_report(symbol, "fundamental", &report, Some("fundamental_report"), end_date)?;
    Ok(json!({ "fundamental_report": report }))
}

pub async fn run_technical(
    rt: &Runtime,
    ctx: &NodeContext,
    run_id: &str,
) -> Result<Value, AnalysisError> {
    const NODE: &str = "technical_analysis";
    let symbol = ctx.symbol.as_str();
    let end_date = ctx.end_date.as_deref();
    let period = dates::analysis_period(end_date);

    ctx.events.tool_start(NODE, run_id, "get_tech_data");
    let interfaces = run_interfaces(rt, symbol, end_date, TECH_INTERFACES, 4).await;
    let data = ToolData::new("技术数据分析", interfaces);
    let text = data.to_prompt_text();
    rt.store
        .save_tool_result(symbol, "tech_data", &serde_json::to_value(&data)?, end_date)?;
    ctx.events.tool_end(NODE, run_id, "get_tech_data", &text);

    let prompt = prompts::technical(symbol, &period, &text);
    let response = complete_with_stream(rt, ctx, NODE, run_id, &prompt).await?;
    let report = serde_json::to_value(parsers::parse_analyst_report(&response))?;
    rt.store
        .save_report(symbol, "technical", &report, Some("technical_report"), end_date)?;
    Ok(json!({ "technical_report": report }))
}

pub async fn run_fund(rt: &Runtime, ctx: &NodeContext, run_id: &str) -> Result<Value, AnalysisError> {
    const NODE: &str = "fund_analysis";
    let symbol = ctx.symbol.as_str();
    let end_date = ctx.end_date.as_deref();
    let period = dates::analysis_period(end_date);

    let inner = async {
        ctx.events.tool_start(NODE, run_id, "get_fund_data");
        let pool = (FUND_INTERFACES.len() + 1).min(10);
        let interfaces = run_interfaces(rt, symbol, end_date, FUND_INTERFACES, pool).await;
        let data = ToolData::new("资金流向数据分析", interfaces);
        let text = data.to_prompt_text();
        rt.store
            .save_tool_result(symbol, "fund_data", &serde_json::to_value(&data)?, end_date)?;
        ctx.events.tool_end(NODE, run_id, "get_fund_data", &text);

        let prompt = prompts::fund(symbol, &period, &text);
        let response = complete_with_stream(rt, ctx, NODE, run_id, &prompt).await?;
        let report = serde_json::to_value(parsers::parse_analyst_report(&response))?;
        Ok::<Value, AnalysisError>(report)
    };

    let report = match inner.await {
        Ok(report) => report,
        Err(e) => {
            // The fund node degrades to a zero-scored neutral report.
            tracing::error!(error = %e, "fund analysis failed");
            json!({
                "analyst_name": "资金流向分析师",
                "viewpoint": "中性",
                "reason": format!("资金面数据获取失败: {e}"),
                "scores": {"main_capital": 0, "institution_capital": 0, "retail_capital": 0},
                "detailed_analysis": format!("资金面数据工具调用失败，错误信息: {e}"),
            })
        }
    };
    rt.store
        .save_report(symbol, "fund", &report, Some("fund_report"), end_date)?;
    Ok(json!({ "fund_report": report }))
}

/// News interfaces via the dedicated provider: flash, major and broadcast
/// news, each batch-summarized under its own token ratio.
async fn news_from_provider(
    rt: &Runtime,
    source: Arc<dyn NewsSource>,
    end_date: Option<&str>,
) -> Result<ToolData, AnalysisError> {
    const LOOKBACK_DAYS: i64 = 3;

    let summarize = |table: analysis_core::Table, objective: &'static str, ratio: f64| async move {
        if table.is_empty() {
            let window = dates::window_description(end_date, Some(LOOKBACK_DAYS));
            return InterfaceResult::from_summary(
                objective,
                format!("【{objective}】: {window}{objective}数据为空"),
                Vec::new(),
            );
        }
        let raw = table.to_records();
        match rt.summarizer.analyze_news_batched(&table, objective, 65_000, ratio).await {
            Ok(summary) => {
                InterfaceResult::from_summary(objective, format!("【{objective}】\n{summary}"), raw)
            }
            Err(e) => InterfaceResult::error(objective, format!("【{objective}】: 数据获取失败 - {e}")),
        }
    };

    let fetch_err = |objective: &'static str, e: AnalysisError| {
        InterfaceResult::error(objective, format!("【{objective}】: 数据获取失败 - {e}"))
    };

    let (flash, major, cctv) = tokio::join!(
        async {
            match source.fetch_news(end_date, LOOKBACK_DAYS).await {
                Ok(t) => summarize(t, "快讯新闻分析", 0.55).await,
                Err(e) => fetch_err("快讯新闻分析", e),
            }
        },
        async {
            match source.fetch_major_news(end_date, LOOKBACK_DAYS).await {
                Ok(t) => summarize(t, "重要新闻分析", 0.65).await,
                Err(e) => fetch_err("重要新闻分析", e),
            }
        },
        async {
            match source.fetch_cctv_news(LOOKBACK_DAYS).await {
                Ok(t) => summarize(t, "央视新闻分析", 0.65).await,
                Err(e) => fetch_err("央视新闻分析", e),
            }
        },
    );

    let mut interfaces = BTreeMap::new();
    interfaces.insert("news".to_string(), flash);
    interfaces.insert("major_news".to_string(), major);
    interfaces.insert("cctv_news".to_string(), cctv);

    let combined: Vec<String> = ["news", "major_news", "cctv_news"]
        .iter()
        .filter_map(|k| interfaces.get(*k))
        .map(|r| r.result.clone())
        .filter(|s| !s.is_empty())
        .collect();
    let combined = if combined.is_empty() {
        "暂无新闻摘要".to_string()
    } else {
        combined.join("\n\n====\n\n")
    };

    let mut data = ToolData::new("新闻数据分析", interfaces);
    data.combined_summary = Some(combined);
    Ok(data)
}

/// Fallback path when no news provider probed successfully: crawl the open
/// web through the enrichment sub-pipeline.
async fn news_from_crawler(rt: &Runtime, ctx: &NodeContext) -> Result<ToolData, AnalysisError> {
    let symbol = ctx.symbol.as_str();
    let end_date = ctx.end_date.as_deref();
    let company_name = rt.hub.stock_name(symbol);
    let company = if company_name == "未知股票" {
        None
    } else {
        Some(company_name.as_str())
    };
    let industry: Vec<String> = rt.hub.catalog().industry(symbol).into_iter().collect();

    let digest = rt
        .news_enrichment
        .run(symbol, company, end_date, 7, &industry, &[])
        .await;

    let raw: Vec<Value> = digest
        .items
        .iter()
        .filter_map(|it| serde_json::to_value(it).ok())
        .collect();
    let mut interfaces = BTreeMap::new();
    interfaces.insert(
        "crawler".to_string(),
        InterfaceResult::from_summary("新闻舆情分析", digest.summary.clone(), raw),
    );

    if digest
        .structured
        .as_object()
        .map(|m| !m.is_empty())
        .unwrap_or(false)
    {
        rt.store.save_tool_result(
            symbol,
            "news_sentiment_structured",
            &digest.structured,
            end_date,
        )?;
    }

    let mut data = ToolData::new("新闻数据分析", interfaces);
    data.combined_summary = Some(digest.summary);
    Ok(data)
}

pub async fn run_news(rt: &Runtime, ctx: &NodeContext, run_id: &str) -> Result<Value, AnalysisError> {
    const NODE: &str = "news_analysis";
    let symbol = ctx.symbol.as_str();
    let end_date = ctx.end_date.as_deref();
    let period = dates::analysis_period(end_date);

    ctx.events.tool_start(NODE, run_id, "get_news");
    let data = match rt.hub.news_source() {
        Some(source) => news_from_provider(rt, source, end_date).await?,
        None => news_from_crawler(rt, ctx).await?,
    };
    let data_value = serde_json::to_value(&data)?;
    rt.store
        .save_tool_result(symbol, "news_data", &data_value, end_date)?;
    let combined = data.combined_summary.clone().unwrap_or_default();
    ctx.events.tool_end(NODE, run_id, "get_news", &combined);

    let prompt = prompts::news(symbol, &period, &serde_json::to_string(&data_value)?);
    let response = complete_with_stream(rt, ctx, NODE, run_id, &prompt).await?;
    let report = serde_json::to_value(parsers::parse_analyst_report(&response))?;
    rt.store
        .save_report(symbol, "news", &report, Some("news_report"), end_date)?;
    Ok(json!({ "news_report": report }))
}

/// The sentiment node reads finalized artifacts, never in-memory handles:
/// the news combined summary and the fundamental per-interface summaries.
pub async fn run_sentiment(
    rt: &Runtime,
    ctx: &NodeContext,
    run_id: &str,
) -> Result<Value, AnalysisError> {
    const NODE: &str = "sentiment_analysis";
    let symbol = ctx.symbol.as_str();
    let end_date = ctx.end_date.as_deref();
    let period = dates::analysis_period(end_date);

    let news_combined_summary = rt
        .store
        .load_tool_result(symbol, "news_data", end_date)
        .and_then(|v| {
            v.get("data")
                .and_then(|d| d.get("combined_summary"))
                .or_else(|| v.get("combined_summary"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();

    let mut fundamental_result = rt
        .store
        .load_tool_result(symbol, "fundamental_data", end_date)
        .map(|v| {
            let interfaces = v
                .get("data")
                .and_then(|d| d.get("interfaces"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let mut parts: Vec<String> = Vec::new();
            for (name, iface) in interfaces {
                let result = iface.get("result").and_then(Value::as_str).unwrap_or("");
                if result.trim().is_empty() {
                    continue;
                }
                let objective = iface
                    .get("objective")
                    .and_then(Value::as_str)
                    .unwrap_or(name.as_str());
                parts.push(format!("【{objective}】\n{result}"));
            }
            parts.join("\n\n")
        })
        .unwrap_or_default();

    if fundamental_result.is_empty() {
        let backup = ctx.state_value("fundamental_report");
        fundamental_result = backup
            .get("reason")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| backup.get("detailed_analysis").and_then(Value::as_str))
            .unwrap_or("")
            .to_string();
    }

    tracing::info!(
        news_len = news_combined_summary.chars().count(),
        fundamental_len = fundamental_result.chars().count(),
        "sentiment inputs assembled"
    );

    let sentiment_input = json!({
        "stock_code": symbol,
        "end_date": end_date,
        "news_combined_summary": news_combined_summary,
        "fundamental_result": fundamental_result,
    });
    if let Err(e) = rt
        .store
        .save_tool_result(symbol, "sentiment_input", &sentiment_input, end_date)
    {
        tracing::warn!(error = %e, "sentiment input snapshot not saved");
    }

    let prompt = prompts::sentiment(symbol, &period, &serde_json::to_string(&sentiment_input)?);
    let response = complete_with_stream(rt, ctx, NODE, run_id, &prompt).await?;
    let report = serde_json::to_value(parsers::parse_analyst_report(&response))?;
    rt.store
        .save_report(symbol, "sentiment", &report, Some("sentiment_report"), end_date)?;
    Ok(json!({ "sentiment_report": report }))
}

pub async fn run_supervisor(
    rt: &Runtime,
    ctx: &NodeContext,
    run_id: &str,
) -> Result<Value, AnalysisError> {
    const NODE: &str = "supervisor";
    let symbol = ctx.symbol.as_str();
    let end_date = ctx.end_date.as_deref();
    let period = dates::analysis_period(end_date);

    // The supervisor consumes the news combined summary, not the news report.
    let news_summary = rt
        .store
        .load_tool_result(symbol, "news_data", end_date)
        .and_then(|v| {
            v.get("data")
                .and_then(|d| d.get("combined_summary"))
                .or_else(|| v.get("combined_summary"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();

    let prompt = prompts::supervisor(
        symbol,
        &period,
        &serde_json::to_string(&ctx.state_value("fundamental_report"))?,
        &serde_json::to_string(&ctx.state_value("technical_report"))?,
        &serde_json::to_string(&ctx.state_value("sentiment_report"))?,
        &serde_json::to_string(&ctx.state_value("fund_report"))?,
        &news_summary,
    );
    let response = complete_with_stream(rt, ctx, NODE, run_id, &prompt).await?;
    let report = parsers::parse_supervisor_report(&response);
    rt.store
        .save_report(symbol, "supervisor", &report, Some("supervisor_report"), end_date)?;
    Ok(json!({ "supervisor_report": report }))
}

/// Terminal node: persist every report in the state and write the index
/// summary artifact.
pub async fn run_final_save(
    rt: &Runtime,
    ctx: &NodeContext,
    _run_id: &str,
) -> Result<Value, AnalysisError> {
    let symbol = ctx.symbol.as_str();
    let end_date = ctx.end_date.as_deref();

    let state = ctx.state_snapshot();
    let saved = rt.store.save_all_reports(symbol, &state, end_date);
    let summary = rt.store.result_summary(symbol);
    let summary_path = rt.store.save_report(
        symbol,
        "summary",
        &Value::String(summary),
        Some("analysis_summary"),
        end_date,
    )?;

    let saved_files: Map<String, Value> = saved
        .into_iter()
        .map(|(k, p)| (k, Value::String(p.display().to_string())))
        .collect();

    tracing::info!(count = saved_files.len(), "all reports saved");
    Ok(json!({
        "saved_files": saved_files,
        "summary_filepath": summary_path.display().to_string(),
        "final_report": format!(
            "分析完成！所有结果已保存到 {}/{symbol}/ 目录",
            rt.store.root().display()
        ),
    }))
}

/// Dispatch by node name; unknown names are a pipeline error.
pub async fn run_node(
    rt: &Runtime,
    ctx: &NodeContext,
    node: &str,
    run_id: &str,
) -> Result<Value, AnalysisError> {
    match node {
        "start" => Ok(json!({})),
        "fundamental_analysis" => run_fundamental(rt, ctx, run_id).await,
        "technical_analysis" => run_technical(rt, ctx, run_id).await,
        "fund_analysis" => run_fund(rt, ctx, run_id).await,
        "news_analysis" => run_news(rt, ctx, run_id).await,
        "sentiment_analysis" => run_sentiment(rt, ctx, run_id).await,
        "supervisor" => run_supervisor(rt, ctx, run_id).await,
        "final_result_save" => run_final_save(rt, ctx, run_id).await,
        other => Err(AnalysisError::PipelineError(format!("unknown node: {other}"))),
    }
}
