pub mod budget;
pub mod prompts;

use analysis_core::{AnalysisError, ChatModel, Table};
use serde_json::Value;
use std::sync::Arc;

pub use budget::{batch_strings_by_chars, calc_batch_char_cap, cjk_ratio, default_char_cap};

/// Column names recognized as a news timestamp, lowercase.
const TIME_COLUMNS: &[&str] = &["datetime", "pub_time", "published_at", "date"];

/// Two-stage table reduction engine over an LLM seam.
#[derive(Clone)]
pub struct Summarizer {
    llm: Arc<dyn ChatModel>,
}

/// Extract the JSON payload from an LLM response that may wrap it in a
/// fenced block.
pub fn extract_json_text(content: &str) -> &str {
    let cleaned = content.trim();
    if let Some(start) = cleaned.find("```json") {
        let rest = &cleaned[start + 7..];
        match rest.rfind("```") {
            Some(end) => rest[..end].trim(),
            None => rest.trim(),
        }
    } else {
        cleaned
    }
}

fn parse_string_array(content: &str) -> Option<Vec<String>> {
    let text = extract_json_text(content);
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    serde_json::from_str::<Vec<String>>(&text[start..=end]).ok()
}

impl Summarizer {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Stage one: ask the LLM which columns matter for the objective.
    /// Hallucinated names are discarded; a failed call keeps all columns.
    pub async fn select_important_columns(&self, table: &Table, objective: &str) -> Vec<String> {
        if table.is_empty() {
            return Vec::new();
        }
        let prompt = prompts::column_selector(objective, &table.columns);
        match self.llm.complete(&prompt).await {
            Ok(response) => match parse_string_array(&response) {
                Some(selected) => {
                    tracing::info!(objective, ?selected, "selected columns");
                    selected
                        .into_iter()
                        .filter(|c| table.columns.iter().any(|col| col == c))
                        .collect()
                }
                None => {
                    tracing::warn!(objective, "column selection unparseable, keeping all columns");
                    table.columns.clone()
                }
            },
            Err(e) => {
                tracing::warn!(objective, error = %e, "column selection failed, keeping all columns");
                table.columns.clone()
            }
        }
    }

    /// Stage two: generic insight summary of a (sub-)table.
    pub async fn summarize_table(&self, table: &Table, objective: &str) -> String {
        if table.is_empty() {
            return "无可用数据。".to_string();
        }
        let prompt = prompts::table_summarizer(objective, &table.to_compact_text());
        match self.llm.complete(&prompt).await {
            Ok(summary) => summary,
            Err(e) => format!("生成摘要时出错: {e}"),
        }
    }

    /// Full two-stage flow used by the fundamental interfaces.
    pub async fn process_and_summarize(&self, table: &Table, objective: &str) -> String {
        let important = self.select_important_columns(table, objective).await;
        if important.is_empty() {
            return format!("【{objective}】: 未找到相关数据列。");
        }
        let sub = table.select_columns(&important);
        let summary = self.summarize_table(&sub, objective).await;
        format!("【{objective}】\n{summary}")
    }

    /// Technical-analysis summary over the full table.
    pub async fn analyze_tech_table(&self, table: &Table, objective: &str) -> String {
        if table.is_empty() {
            return "无可用数据。".to_string();
        }
        let prompt = prompts::tech_table_analyzer(objective, &table.to_compact_text());
        match self.llm.complete(&prompt).await {
            Ok(report) => report,
            Err(e) => format!("生成报告时出错: {e}"),
        }
    }

    /// Fund-flow summary: column selection first, then the most recent 100
    /// rows at most.
    pub async fn analyze_fund_table(&self, table: &Table, objective: &str) -> String {
        if table.is_empty() {
            return "无可用数据。".to_string();
        }
        let important = self.select_important_columns(table, objective).await;
        if important.is_empty() {
            return format!("【{objective}】: 未找到相关数据列。");
        }
        let sub = table.select_columns(&important).tail(100);
        let prompt = prompts::fund_table_analyzer(objective, &sub.to_compact_text());
        match self.llm.complete(&prompt).await {
            Ok(report) => report,
            Err(e) => format!("生成报告时出错: {e}"),
        }
    }

    /// Company profile from catalogue rows, with a deterministic fallback
    /// when the LLM is unavailable.
    pub async fn process_company_info(&self, stock_basic: &Value, company_detail: &Value) -> String {
        let prompt = prompts::company_info(stock_basic, company_detail);
        match self.llm.complete(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "company profile generation failed, using fallback");
                fallback_company_summary(stock_basic, company_detail)
            }
        }
    }

    /// LLM expansion of an industry term into at most five deduped upper
    /// terms; failures yield an empty list.
    pub async fn propose_upper_industry_terms(&self, term: &str) -> Vec<String> {
        if term.is_empty() {
            return Vec::new();
        }
        let prompt = prompts::upper_industry_terms(term);
        let Ok(response) = self.llm.complete(&prompt).await else {
            return Vec::new();
        };
        let mut out: Vec<String> = Vec::new();
        for part in response.split(['，', ',', '\n']) {
            let cand = part.trim().trim_matches(['。', '；', ';', ' ']).to_string();
            if cand.is_empty() || cand == term || cand.chars().count() > 12 {
                continue;
            }
            if !out.contains(&cand) {
                out.push(cand);
            }
            if out.len() >= 5 {
                break;
            }
        }
        out
    }

    /// Summarize one batch of news corpus text.
    pub async fn summarize_news_corpus(
        &self,
        corpus: &str,
        time_range: &str,
        stat_line: &str,
    ) -> String {
        let prompt = prompts::news_corpus(corpus, time_range, stat_line);
        match self.llm.complete(&prompt).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => format!("生成新闻语料摘要时出错: {e}"),
        }
    }

    /// Structured corpus summary; `None` when the response is not the
    /// expected JSON shape (callers fall back to the plain summary).
    pub async fn summarize_news_corpus_structured(
        &self,
        corpus: &str,
        time_range: &str,
        stat_line: &str,
    ) -> Option<Value> {
        let prompt = prompts::news_corpus_structured(corpus, time_range, stat_line);
        let response = self.llm.complete(&prompt).await.ok()?;
        serde_json::from_str::<Value>(extract_json_text(&response))
            .ok()
            .filter(|v| v.is_object())
    }

    /// Per-item enrichment for priority / high-impact news.
    pub async fn summarize_single_news(
        &self,
        title: &str,
        snippet: &str,
        page_text: &str,
    ) -> Option<Value> {
        let prompt = prompts::single_news(title, snippet, page_text);
        let response = self.llm.complete(&prompt).await.ok()?;
        serde_json::from_str::<Value>(extract_json_text(&response))
            .ok()
            .filter(|v| v.is_object())
    }

    /// Cost-bounded batched news summarization: select columns, order by
    /// time, pack items under the adaptive char cap, one LLM call per batch.
    pub async fn analyze_news_batched(
        &self,
        table: &Table,
        objective: &str,
        model_max_tokens: u64,
        input_ratio: f64,
    ) -> Result<String, AnalysisError> {
        if table.is_empty() {
            return Ok("无可用新闻数据。".to_string());
        }

        let important = self.select_important_columns(table, objective).await;
        let mut used = if important.is_empty() {
            table.clone()
        } else {
            table.select_columns(&important)
        };

        if let Some(ts_col) = used
            .columns
            .iter()
            .find(|c| TIME_COLUMNS.contains(&c.to_lowercase().as_str()))
            .cloned()
        {
            used.sort_desc_by(&ts_col);
        }

        let parts = format_news_rows(&used);
        if parts.is_empty() {
            return Ok("无可用新闻数据。".to_string());
        }

        let cap = default_char_cap(&parts, model_max_tokens, input_ratio);
        let batches = batch_strings_by_chars(&parts, cap);
        let stat_line = format!("样本数:{} 批次数:{}（按长度合并摘要）", parts.len(), batches.len());
        let time_range = news_time_range(&used);

        let mut summaries: Vec<String> = Vec::with_capacity(batches.len());
        for (i, corpus) in batches.iter().enumerate() {
            let head = format!("【批次 {}/{}】{objective}", i + 1, batches.len());
            let sub = self.summarize_news_corpus(corpus, &time_range, &stat_line).await;
            summaries.push(format!("{head}\n{sub}"));
        }

        Ok(summaries.join("\n\n---\n\n"))
    }
}

/// Render each news row as a compact corpus item:
/// `【time | source】title\ncontent`.
pub fn format_news_rows(table: &Table) -> Vec<String> {
    let lower: Vec<String> = table.columns.iter().map(|c| c.to_lowercase()).collect();
    let find = |keys: &[&str]| -> Option<usize> {
        keys.iter().find_map(|k| lower.iter().position(|c| c == k))
    };
    let title_idx = find(&["title", "t"]);
    let content_idx = find(&["content", "snippet", "summary", "desc"]);
    let src_idx = find(&["src", "source"]);
    let dt_idx = find(TIME_COLUMNS);

    let mut items = Vec::new();
    for row in &table.rows {
        let pick = |idx: Option<usize>| idx.map(|i| row[i].display()).unwrap_or_default();
        let title = pick(title_idx);
        let content = pick(content_idx);
        let src = pick(src_idx);
        let dt = pick(dt_idx);
        let piece = format!("【{dt} | {src}】{}\n{}", title.trim(), content.trim());
        if !piece.trim().is_empty() && (!title.is_empty() || !content.is_empty()) {
            items.push(piece.trim().to_string());
        }
    }
    items
}

/// "{earliest} 到 {latest}" over the table's time column, dates only.
fn news_time_range(table: &Table) -> String {
    let Some(idx) = table
        .columns
        .iter()
        .position(|c| TIME_COLUMNS.contains(&c.to_lowercase().as_str()))
    else {
        return String::new();
    };
    let mut values: Vec<String> = table
        .rows
        .iter()
        .map(|r| r[idx].display().chars().take(10).collect::<String>())
        .filter(|s| !s.is_empty())
        .collect();
    values.sort();
    match (values.first(), values.last()) {
        (Some(a), Some(b)) => format!("{a} 到 {b}"),
        _ => String::new(),
    }
}

fn field_str<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Deterministic company summary assembled from catalogue fields, used when
/// the LLM call fails.
pub fn fallback_company_summary(stock_basic: &Value, company_detail: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();

    if stock_basic.is_object() && !stock_basic.as_object().map(|m| m.is_empty()).unwrap_or(true) {
        let name = if field_str(stock_basic, "name").is_empty() {
            "该公司"
        } else {
            field_str(stock_basic, "name")
        };
        let area = if field_str(stock_basic, "area").is_empty() {
            "未知地区"
        } else {
            field_str(stock_basic, "area")
        };
        let industry = if field_str(stock_basic, "industry").is_empty() {
            "未知行业"
        } else {
            field_str(stock_basic, "industry")
        };
        parts.push(format!("{name}是一家位于{area}的{industry}公司"));
        let list_date = if field_str(stock_basic, "list_date").is_empty() {
            "未知日期"
        } else {
            field_str(stock_basic, "list_date")
        };
        let market = if field_str(stock_basic, "market").is_empty() {
            "未知市场"
        } else {
            field_str(stock_basic, "market")
        };
        parts.push(format!("于{list_date}在{market}上市"));
    }

    if company_detail.is_object() {
        let chairman = field_str(company_detail, "chairman");
        if !chairman.is_empty() {
            parts.push(format!("现任董事长为{chairman}"));
        }
        let main_business = field_str(company_detail, "main_business");
        if !main_business.is_empty() {
            parts.push(format!("主营业务为{main_business}"));
        }
        let province = field_str(company_detail, "province");
        let city = field_str(company_detail, "city");
        if !province.is_empty() && !city.is_empty() {
            parts.push(format!("注册地为{province}{city}"));
        }
    }

    if parts.is_empty() {
        "公司基本信息暂不可用。".to_string()
    } else {
        format!("{}。", parts.join("。"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::Cell;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted model: pops canned responses in order; errors when empty.
    struct ScriptedModel {
        responses: Mutex<Vec<Result<String, String>>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> Result<String, AnalysisError> {
            let mut guard = self.responses.lock().unwrap();
            if guard.is_empty() {
                return Err(AnalysisError::LlmError("script exhausted".into()));
            }
            guard.remove(0).map_err(AnalysisError::LlmError)
        }
    }

    fn news_table() -> Table {
        let mut t = Table::new(vec!["datetime".into(), "title".into(), "content".into()]);
        t.push_row(vec![
            Cell::Str("2025-09-12 08:00".into()),
            Cell::Str("公司发布回购公告".into()),
            Cell::Str("拟回购不超过2亿元".into()),
        ]);
        t.push_row(vec![
            Cell::Str("2025-09-13 09:30".into()),
            Cell::Str("行业景气度回升".into()),
            Cell::Str("上游订单改善".into()),
        ]);
        t
    }

    #[tokio::test]
    async fn hallucinated_columns_are_dropped() {
        let model = ScriptedModel::new(vec![Ok(r#"["title", "ghost_column"]"#.into())]);
        let s = Summarizer::new(model);
        let cols = s.select_important_columns(&news_table(), "快讯新闻分析").await;
        assert_eq!(cols, vec!["title".to_string()]);
    }

    #[tokio::test]
    async fn failed_selection_keeps_all_columns() {
        let model = ScriptedModel::new(vec![Err("boom".into())]);
        let s = Summarizer::new(model);
        let cols = s.select_important_columns(&news_table(), "快讯新闻分析").await;
        assert_eq!(cols.len(), 3);
    }

    #[tokio::test]
    async fn no_matching_columns_yields_fixed_sentence() {
        let model = ScriptedModel::new(vec![Ok(r#"["nothing_real"]"#.into())]);
        let s = Summarizer::new(model);
        let out = s.process_and_summarize(&news_table(), "盈利能力与财务指标").await;
        assert_eq!(out, "【盈利能力与财务指标】: 未找到相关数据列。");
    }

    #[tokio::test]
    async fn empty_table_short_circuits() {
        let model = ScriptedModel::new(vec![]);
        let s = Summarizer::new(model);
        let empty = Table::new(vec!["a".into()]);
        assert_eq!(s.summarize_table(&empty, "x").await, "无可用数据。");
        assert_eq!(s.analyze_news_batched(&empty, "x", 65000, 0.6).await.unwrap(), "无可用新闻数据。");
    }

    #[tokio::test]
    async fn batched_news_joins_batch_summaries() {
        // One selection call + one corpus call (all items fit one batch).
        let model = ScriptedModel::new(vec![
            Ok(r#"["datetime", "title", "content"]"#.into()),
            Ok("整体情绪偏正面".into()),
        ]);
        let s = Summarizer::new(model);
        let out = s.analyze_news_batched(&news_table(), "快讯新闻分析", 65000, 0.55).await.unwrap();
        assert!(out.starts_with("【批次 1/1】快讯新闻分析"));
        assert!(out.contains("整体情绪偏正面"));
    }

    #[test]
    fn news_rows_format_and_filter() {
        let items = format_news_rows(&news_table());
        assert_eq!(items.len(), 2);
        assert!(items[0].starts_with("【2025-09-12 08:00 | 】公司发布回购公告"));
    }

    #[test]
    fn fallback_summary_mentions_known_fields() {
        let basic = serde_json::json!({"name": "平安银行", "area": "深圳", "industry": "银行", "market": "主板", "list_date": "19910403"});
        let detail = serde_json::json!({"main_business": "商业银行业务"});
        let text = fallback_company_summary(&basic, &detail);
        assert!(text.contains("平安银行"));
        assert!(text.contains("主营业务为商业银行业务"));
        let empty = fallback_company_summary(&serde_json::json!({}), &serde_json::json!({}));
        assert_eq!(empty, "公司基本信息暂不可用。");
    }

    #[test]
    fn fenced_json_extraction() {
        let fenced = "前言\n```json\n{\"a\": 1}\n```\n后记";
        assert_eq!(extract_json_text(fenced), "{\"a\": 1}");
        assert_eq!(extract_json_text("{\"a\": 1}"), "{\"a\": 1}");
    }
}
