//! End-to-end pipeline runs against a mocked provider and a pattern-matched
//! chat model: full artifact set, empty-window handling, DAG ordering,
//! sentinel reports and stream termination.

use analysis_core::{
    AnalysisError, AnalystReport, Cell, ChatModel, FetchKind, MarketDataProvider, NewsSource,
    Settings, Table,
};
use analysis_orchestrator::{
    run_background_analysis, run_pipeline, spawn_stream_analysis, EventSink, PipelineEvent,
    Runtime,
};
use artifact_store::ArtifactStore;
use async_trait::async_trait;
use market_data::{Catalog, DataHub};
use news_enrichment::NewsConfigLoader;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

struct MockProvider {
    empty: bool,
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(
        &self,
        _kind: FetchKind,
        _symbol: &str,
        _end_date: Option<&str>,
    ) -> Result<Table, AnalysisError> {
        let mut t = Table::new(vec!["trade_date".into(), "open".into(), "close".into()]);
        if !self.empty {
            t.push_row(vec![
                Cell::Str("20250912".into()),
                Cell::Float(10.2),
                Cell::Float(10.5),
            ]);
            t.push_row(vec![
                Cell::Str("20250911".into()),
                Cell::Float(10.0),
                Cell::Float(10.2),
            ]);
        }
        Ok(t)
    }
}

struct MockNews;

#[async_trait]
impl NewsSource for MockNews {
    fn name(&self) -> &'static str {
        "mock-news"
    }

    async fn fetch_news(&self, _end_date: Option<&str>, _days: i64) -> Result<Table, AnalysisError> {
        let mut t = Table::new(vec!["datetime".into(), "title".into(), "content".into()]);
        t.push_row(vec![
            Cell::Str("2025-09-12 08:00".into()),
            Cell::Str("公司发布回购公告".into()),
            Cell::Str("拟回购不超过2亿元".into()),
        ]);
        Ok(t)
    }

    async fn fetch_major_news(
        &self,
        _end_date: Option<&str>,
        _days: i64,
    ) -> Result<Table, AnalysisError> {
        Ok(Table::new(vec![
            "datetime".into(),
            "title".into(),
            "content".into(),
        ]))
    }

    async fn fetch_cctv_news(&self, _days: i64) -> Result<Table, AnalysisError> {
        Ok(Table::new(vec![
            "date".into(),
            "title".into(),
            "content".into(),
        ]))
    }
}

/// Pattern-matched chat model: answers by recognizing which template the
/// prompt came from. `technical_prose` forces a malformed response for the
/// technical analyst.
struct PatternModel {
    technical_prose: bool,
}

fn analyst_json(name: &str, scores: &[&str]) -> String {
    let score_body = scores
        .iter()
        .map(|k| format!("\"{k}\": 4"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"```json
{{"analyst_name": "{name}", "viewpoint": "看多", "reason": "数据向好", "scores": {{{score_body}}}, "detailed_analysis": "整体表现稳健"}}
```"#
    )
}

#[async_trait]
impl ChatModel for PatternModel {
    async fn complete(&self, prompt: &str) -> Result<String, AnalysisError> {
        if prompt.contains("请只返回一个包含你选择的最相关列名的JSON列表") {
            return Ok(r#"["trade_date", "close", "datetime", "title", "content"]"#.to_string());
        }
        if prompt.contains("\"analyst_name\": \"总决策分析师\"") {
            return Ok(r#"```json
{"analyst_name": "总决策分析师", "summary": "多方共振",
 "forecast": {
   "short_term": {"bias": "看多", "prediction": "震荡上行", "suggestion": "波段参与", "reason": "情绪回暖", "risks": ["回调风险"]},
   "mid_term": {"bias": "看多", "prediction": "趋势延续", "suggestion": "分批建仓", "reason": "基本面稳健", "risks": ["政策变化"]},
   "long_term": {"bias": "中性", "prediction": "区间运行", "suggestion": "长期持有需观察", "reason": "行业格局未定", "risks": ["宏观不确定性"]}
 }}
```"#
                .to_string());
        }
        if prompt.contains("\"analyst_name\": \"基本面分析师\"") {
            return Ok(analyst_json(
                "基本面分析师",
                &["profitability", "solvency", "growth_potential"],
            ));
        }
        if prompt.contains("\"analyst_name\": \"技术分析师\"") {
            if self.technical_prose {
                return Ok("这只股票技术面看起来还不错，建议关注。".to_string());
            }
            return Ok(analyst_json(
                "技术分析师",
                &[
                    "trend_strength",
                    "momentum",
                    "support_resistance",
                    "volume_analysis",
                    "pattern_analysis",
                ],
            ));
        }
        if prompt.contains("\"analyst_name\": \"情绪分析师\"") {
            return Ok(analyst_json(
                "情绪分析师",
                &["market_heat", "investor_sentiment", "institution_opinion"],
            ));
        }
        if prompt.contains("\"analyst_name\": \"新闻分析师\"") {
            return Ok(analyst_json(
                "新闻分析师",
                &["sentiment_score", "news_impact", "market_attention"],
            ));
        }
        if prompt.contains("\"analyst_name\": \"资金流向分析师\"") {
            return Ok(analyst_json(
                "资金流向分析师",
                &["main_capital", "institution_capital", "retail_capital"],
            ));
        }
        if prompt.contains("生成一段简洁、专业的公司概况描述") {
            return Ok("一家经营稳健的上市公司。".to_string());
        }
        // Table/news summaries.
        Ok("数据显示经营态势平稳，无显著异常。".to_string())
    }
}

fn runtime(provider_empty: bool, technical_prose: bool, with_news: bool) -> (TempDir, Arc<Runtime>) {
    let tmp = TempDir::new().unwrap();
    let provider: Arc<dyn MarketDataProvider> = Arc::new(MockProvider {
        empty: provider_empty,
    });
    let news: Option<Arc<dyn NewsSource>> = if with_news {
        Some(Arc::new(MockNews))
    } else {
        None
    };
    let hub = DataHub::with_parts(provider, news, Catalog::default());
    let llm: Arc<dyn ChatModel> = Arc::new(PatternModel { technical_prose });
    let store = ArtifactStore::new(tmp.path());
    let config = Arc::new(NewsConfigLoader::new(None));
    let rt = Runtime::with_parts(Settings::from_env(), hub, llm, store, config);
    (tmp, rt)
}

const SYMBOL: &str = "000001.SZ";
const END_DATE: &str = "20250914";

fn artifact(tmp: &TempDir, name: &str) -> Value {
    let path = tmp.path().join(SYMBOL).join(END_DATE).join(format!("{name}.json"));
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing artifact {}: {e}", path.display()));
    serde_json::from_str(&text).unwrap()
}

const EXPECTED_FILES: &[&str] = &[
    "fundamental_data",
    "tech_data",
    "fund_data",
    "news_data",
    "sentiment_input",
    "fundamental_report",
    "technical_report",
    "fund_report",
    "news_report",
    "sentiment_report",
    "supervisor_report",
    "analysis_summary",
];

#[tokio::test]
async fn happy_path_produces_all_artifacts() {
    let (tmp, rt) = runtime(false, false, true);
    let state =
        run_background_analysis(rt, SYMBOL.to_string(), Some(END_DATE.to_string())).await;

    for name in EXPECTED_FILES {
        artifact(&tmp, name);
    }
    // No unexpected files in the run directory.
    let dir = tmp.path().join(SYMBOL).join(END_DATE);
    let mut files: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    files.sort();
    assert_eq!(files.len(), EXPECTED_FILES.len());

    for report_name in [
        "fundamental_report",
        "technical_report",
        "fund_report",
        "news_report",
        "sentiment_report",
    ] {
        let value = artifact(&tmp, report_name);
        let report: AnalystReport = serde_json::from_value(value["data"].clone()).unwrap();
        assert!(
            ["看多", "看空", "中性"].contains(&report.viewpoint.as_str()),
            "{report_name} viewpoint {}",
            report.viewpoint
        );
        assert!(report.scores.values().all(|s| (0..=5).contains(s)));
    }

    let supervisor = artifact(&tmp, "supervisor_report");
    for horizon in ["short_term", "mid_term", "long_term"] {
        let bias = supervisor["data"]["forecast"][horizon]["bias"].as_str().unwrap();
        assert!(!bias.is_empty());
    }

    assert!(state["final_report"].as_str().unwrap().starts_with("分析完成"));
}

#[tokio::test]
async fn empty_fundamentals_count_as_success() {
    let (tmp, rt) = runtime(true, false, true);
    run_background_analysis(rt, SYMBOL.to_string(), Some(END_DATE.to_string())).await;

    let data = artifact(&tmp, "fundamental_data");
    let summary = &data["data"]["summary"];
    assert_eq!(summary["total_interfaces"], 8);
    assert_eq!(summary["successful_interfaces"], 8);
    assert_eq!(summary["error_interfaces"], 0);

    // Empty summaries carry the window string.
    let interfaces = data["data"]["interfaces"].as_object().unwrap();
    for iface in interfaces.values() {
        let text = iface["result"].as_str().unwrap();
        assert!(text.contains("20230914到20250914之间"), "summary: {text}");
        assert_eq!(iface["status"], "success");
    }

    for name in EXPECTED_FILES {
        artifact(&tmp, name);
    }
}

#[tokio::test]
async fn malformed_technical_response_yields_sentinel() {
    let (tmp, rt) = runtime(false, true, true);
    run_background_analysis(rt, SYMBOL.to_string(), Some(END_DATE.to_string())).await;

    let report = artifact(&tmp, "technical_report");
    assert_eq!(report["data"]["analyst_name"], "分析失败");
    assert_eq!(report["data"]["viewpoint"], "中性");
    assert!(report["data"]["detailed_analysis"]
        .as_str()
        .unwrap()
        .starts_with("解析失败:"));
}

#[tokio::test]
async fn dag_ordering_is_respected() {
    let (_tmp, rt) = runtime(false, false, true);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let events = EventSink::new(tx);
    run_pipeline(rt, SYMBOL, Some(END_DATE.to_string()), "thread", events).await;

    let mut sequence: Vec<(String, String)> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            PipelineEvent::ChainStart { node, .. } => sequence.push(("start".into(), node)),
            PipelineEvent::ChainEnd { node, .. } => sequence.push(("end".into(), node)),
            _ => {}
        }
    }
    let position = |kind: &str, node: &str| {
        sequence
            .iter()
            .position(|(k, n)| k == kind && n == node)
            .unwrap_or_else(|| panic!("missing {kind} of {node}"))
    };

    assert!(position("start", "sentiment_analysis") > position("end", "fundamental_analysis"));
    assert!(position("start", "sentiment_analysis") > position("end", "news_analysis"));
    for dep in ["sentiment_analysis", "technical_analysis", "fund_analysis"] {
        assert!(position("start", "supervisor") > position("end", dep));
    }
    assert!(position("start", "final_result_save") > position("end", "supervisor"));
}

#[tokio::test]
async fn stream_terminates_with_single_stop_frame() {
    let (_tmp, rt) = runtime(false, false, true);
    let mut frames = spawn_stream_analysis(rt, SYMBOL.to_string(), Some(END_DATE.to_string()));

    let mut collected: Vec<String> = Vec::new();
    while let Some(frame) = frames.recv().await {
        collected.push(frame);
    }
    assert!(!collected.is_empty());

    let last = collected.last().unwrap();
    assert!(last.contains("\"agent\":\"system\""));
    assert!(last.contains("\"finish_reason\":\"stop\""));
    assert!(last.contains("分析流程已结束。"));

    let terminal_count = collected
        .iter()
        .filter(|f| f.contains("\"agent\":\"system\"") && f.contains("分析流程已结束。"))
        .count();
    assert_eq!(terminal_count, 1);

    // Lifecycle frames made it through the formatter.
    assert!(collected.iter().any(|f| f.contains("\"event_type\":\"node_complete\"")));
    assert!(collected.iter().any(|f| f.contains("\"event_type\":\"analysis_result\"")));
}

#[tokio::test]
async fn unavailable_provider_still_completes_the_dag() {
    let tmp = TempDir::new().unwrap();
    let hub = DataHub::with_parts(
        Arc::new(market_data::UnavailableProvider),
        Some(Arc::new(MockNews)),
        Catalog::default(),
    );
    let llm: Arc<dyn ChatModel> = Arc::new(PatternModel {
        technical_prose: false,
    });
    let store = ArtifactStore::new(tmp.path());
    let rt = Runtime::with_parts(
        Settings::from_env(),
        hub,
        llm,
        store,
        Arc::new(NewsConfigLoader::new(None)),
    );

    run_background_analysis(rt, SYMBOL.to_string(), Some(END_DATE.to_string())).await;

    let data = artifact(&tmp, "fundamental_data");
    let summary = &data["data"]["summary"];
    assert_eq!(summary["total_interfaces"], 8);
    assert_eq!(summary["error_interfaces"], 8);
    let interfaces = data["data"]["interfaces"].as_object().unwrap();
    for iface in interfaces.values() {
        assert_eq!(iface["status"], "error");
        assert!(iface["result"].as_str().unwrap().contains("数据获取失败"));
    }

    // The DAG still runs to completion and persists the supervisor report.
    artifact(&tmp, "supervisor_report");
    artifact(&tmp, "analysis_summary");
}
