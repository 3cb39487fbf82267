//! The news enrichment pipeline: layered search, bounded article crawl,
//! time resolution, de-duplication, scoring, selection and summarization.
//! Any error inside the pipeline is caught at this boundary and yields an
//! empty selection with an explanatory summary.

use crate::config::{NewsConfig, NewsConfigLoader};
use crate::enrich;
use crate::search::{self, SearchJob};
use crate::text;
use crate::time as news_time;
use analysis_core::dates;
use analysis_core::{AnalysisError, NewsItem};
use chrono::{DateTime, Duration, FixedOffset, Local, TimeZone};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use summarizer::Summarizer;
use tokio::sync::Semaphore;

/// Hosts never cited as evidence (search-engine redirectors and similar).
const BAD_EVIDENCE_HOSTS: &[&str] = &["bing.com", "microsoft.com", "onedrive.live.com"];

/// Crawl stage concurrency.
const CRAWL_CONCURRENCY: usize = 4;
/// Per-item enrichment cap.
const MAX_PER_ITEM_SUMMARIES: usize = 24;

pub struct NewsDigest {
    pub summary: String,
    pub items: Vec<NewsItem>,
    pub structured: Value,
}

pub struct NewsEnrichment {
    client: Client,
    summarizer: Summarizer,
    config: Arc<NewsConfigLoader>,
}

impl NewsEnrichment {
    pub fn new(summarizer: Summarizer, config: Arc<NewsConfigLoader>) -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            summarizer,
            config,
        }
    }

    /// Run the full sub-pipeline for one symbol.
    pub async fn run(
        &self,
        symbol: &str,
        company_name: Option<&str>,
        end_date: Option<&str>,
        lookback_days: i64,
        industry_keywords: &[String],
        macro_keywords: &[String],
    ) -> NewsDigest {
        match self
            .try_run(
                symbol,
                company_name,
                end_date,
                lookback_days,
                industry_keywords,
                macro_keywords,
            )
            .await
        {
            Ok(digest) => digest,
            Err(e) => {
                tracing::error!(symbol, error = %e, "news enrichment failed");
                NewsDigest {
                    summary: format!("【新闻分析】: 分析过程中出错 - {e}"),
                    items: Vec::new(),
                    structured: json!({}),
                }
            }
        }
    }

    async fn try_run(
        &self,
        symbol: &str,
        company_name: Option<&str>,
        end_date: Option<&str>,
        lookback_days: i64,
        industry_keywords: &[String],
        macro_keywords: &[String],
    ) -> Result<NewsDigest, AnalysisError> {
        let cfg = self.config.get();

        // A future end date searches around now instead.
        let today = Local::now().date_naive();
        let mut end_day = dates::canonical_end_date(end_date);
        if end_day > today {
            tracing::warn!(%end_day, "end date is in the future, searching around today");
            end_day = today;
        }
        let end_dt = news_time::china_tz()
            .from_local_datetime(&end_day.and_hms_opt(23, 59, 0).expect("valid time"))
            .single()
            .ok_or_else(|| AnalysisError::InvalidRequest("bad end date".to_string()))?;
        let start_dt = end_dt - Duration::days(lookback_days);

        let industry_terms = self.expanded_industry_terms(industry_keywords, &cfg).await;
        let jobs = search::build_search_jobs(
            symbol,
            company_name,
            &industry_terms,
            macro_keywords,
            &cfg,
        );
        tracing::info!(symbol, jobs = jobs.len(), "news search starting");

        let mut items = self.crawl_search_pages(&jobs, &cfg).await;
        self.crawl_articles(&mut items, end_dt).await;

        // Only items with a usable Chinese body survive.
        items.retain(|it| text::has_enough_chinese(&it.page_text));

        let items = enrich::group_events(items, &cfg);
        let mut items = enrich::score_items(items, &cfg);
        enrich::sort_for_selection(&mut items);

        let mut selected =
            enrich::select_recent(&items, end_dt, cfg.news_window_days, cfg.news_topk);

        if selected.is_empty() {
            let query_desc = match company_name {
                Some(name) if !name.is_empty() => format!("{symbol}({name})"),
                _ => symbol.to_string(),
            };
            return Ok(NewsDigest {
                summary: format!(
                    "【新闻分析】: 近{lookback_days}天内未抓到与 {query_desc} 相关的新闻摘要"
                ),
                items,
                structured: json!({}),
            });
        }

        self.enrich_selected(&mut selected).await;

        let (corpus, stat_line, detail_lines) = build_corpus(&selected);
        let time_range = format!(
            "{} 到 {}",
            start_dt.format("%Y-%m-%d"),
            end_dt.format("%Y-%m-%d")
        );

        let structured = self
            .summarizer
            .summarize_news_corpus_structured(&corpus, &time_range, &stat_line)
            .await;

        let digest = match structured {
            Some(mut structured) => {
                let evidence = build_evidence(&selected);
                structured["evidence"] = Value::Array(evidence.clone());
                let summary_text = render_structured_summary(&structured);
                let evidence_text = render_evidence(&evidence);
                let summary = format!(
                    "【新闻分析】\n{summary_text}{evidence_text}\n\n【可溯源明细(Top{})】\n{}",
                    cfg.news_topk,
                    detail_lines.join("\n")
                );
                NewsDigest {
                    summary,
                    items,
                    structured,
                }
            }
            None => {
                let summary_text = self
                    .summarizer
                    .summarize_news_corpus(&corpus, &time_range, &stat_line)
                    .await;
                let summary = format!(
                    "【新闻分析】\n{summary_text}\n\n【可溯源明细(Top{})】\n{}",
                    cfg.news_topk,
                    detail_lines.join("\n")
                );
                NewsDigest {
                    summary,
                    items,
                    structured: json!({}),
                }
            }
        };
        Ok(digest)
    }

    /// Industry seeds expanded via the config map; unmapped seeds go through
    /// the LLM when enabled.
    async fn expanded_industry_terms(&self, raw: &[String], cfg: &NewsConfig) -> Vec<String> {
        let (mut expanded, unmapped) = search::expand_industry_keywords(raw, cfg);
        for seed in unmapped {
            for upper in self.summarizer.propose_upper_industry_terms(&seed).await {
                if !expanded.contains(&upper) {
                    expanded.push(upper);
                }
            }
        }
        expanded
    }

    async fn fetch_page(&self, url: &str, sem: &Semaphore, retries: u32) -> Option<String> {
        let url = search::normalize_article_url(url);
        let mut delay = StdDuration::from_millis(600);
        for _ in 0..retries {
            {
                let _permit = sem.acquire().await.ok()?;
                match self.client.get(&url).send().await {
                    Ok(response) if response.status().is_success() => {
                        if let Ok(text) = response.text().await {
                            return Some(text);
                        }
                    }
                    Ok(response) => {
                        tracing::debug!(url, status = %response.status(), "page fetch rejected");
                    }
                    Err(e) => {
                        tracing::debug!(url, error = %e, "page fetch failed");
                    }
                }
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(StdDuration::from_secs(5));
        }
        None
    }

    /// Stage one: fetch every search page concurrently (bounded) and parse
    /// result links, de-duplicated by URL.
    async fn crawl_search_pages(&self, jobs: &[SearchJob], cfg: &NewsConfig) -> Vec<NewsItem> {
        let sem = Semaphore::new(CRAWL_CONCURRENCY);
        let pages = futures_util::future::join_all(
            jobs.iter().map(|job| self.fetch_page(&job.url, &sem, 3)),
        )
        .await;

        let mut seen: Vec<String> = Vec::new();
        let mut items: Vec<NewsItem> = Vec::new();
        for (job, page) in jobs.iter().zip(pages) {
            let Some(html) = page else { continue };
            let md = search::html_to_markdown(&html);
            for hit in search::parse_search_markdown(&md) {
                let url = search::normalize_article_url(&hit.url);
                if url.is_empty() || hit.title.is_empty() || seen.contains(&url) {
                    continue;
                }
                seen.push(url.clone());
                let source_norm = text::normalize_source_name(&hit.source_raw, &url, cfg);
                items.push(NewsItem {
                    title: hit.title.chars().take(200).collect(),
                    snippet: hit.snippet.chars().take(400).collect(),
                    url: url.clone(),
                    source: if hit.source_raw.is_empty() {
                        source_norm.clone()
                    } else {
                        hit.source_raw.clone()
                    },
                    source_norm,
                    published_at: news_time::parse_dt_from_url(&url).unwrap_or_default(),
                    level: job.level.to_string(),
                    ..Default::default()
                });
            }
        }
        tracing::info!(count = items.len(), "search pages parsed");
        items
    }

    /// Stage two: fetch each article page, resolve the publish time by
    /// priority (structured fields, visible regex, URL date, relative
    /// phrase) and keep the cleaned Chinese body.
    async fn crawl_articles(&self, items: &mut [NewsItem], end_dt: DateTime<FixedOffset>) {
        let sem = Semaphore::new(CRAWL_CONCURRENCY);
        let pages = futures_util::future::join_all(
            items.iter().map(|item| self.fetch_page(&item.url, &sem, 2)),
        )
        .await;

        for (item, page) in items.iter_mut().zip(pages) {
            if let Some(html) = page {
                if let Some(t) = news_time::extract_structured_time(&html) {
                    item.published_at = t;
                }
                let cleaned = text::clean_page_text(&html);
                if item.published_at.is_empty() {
                    if let Some(t) = news_time::extract_visible_time(&cleaned) {
                        item.published_at = t;
                    }
                }
                if text::has_enough_chinese(&cleaned) {
                    item.page_text = cleaned.chars().take(120_000).collect();
                }
            }
            if item.published_at.is_empty() {
                if let Some(t) = news_time::parse_dt_from_url(&item.url) {
                    item.published_at = t;
                }
            }
            if item.published_at.is_empty() {
                let hint = format!("{} {}", item.snippet, item.title);
                if let Some(t) = news_time::infer_relative_time(&hint, end_dt) {
                    item.published_at = t;
                }
            }
        }
    }

    /// Per-item summaries only for priority or high-impact items, capped to
    /// bound LLM cost.
    async fn enrich_selected(&self, selected: &mut [NewsItem]) {
        let mut budget = MAX_PER_ITEM_SUMMARIES;
        for item in selected.iter_mut() {
            if budget == 0 {
                break;
            }
            if !(item.priority || item.impact > 60) {
                continue;
            }
            budget -= 1;
            if let Some(analysis) = self
                .summarizer
                .summarize_single_news(&item.title, &item.snippet, &item.page_text)
                .await
            {
                item.summary_per_item = analysis
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                item.analysis_per_item = Some(json!({
                    "key_points": analysis.get("key_points").cloned().unwrap_or(json!([])),
                    "sentiment": analysis
                        .get("sentiment")
                        .and_then(Value::as_str)
                        .unwrap_or(&item.sentiment),
                    "confidence": analysis.get("confidence").and_then(Value::as_i64),
                }));
            }
        }
    }
}

fn sources_display(item: &NewsItem) -> String {
    let list: Vec<&str> = if item.sources.is_empty() {
        vec![item.source_norm.as_str()]
    } else {
        item.sources.iter().map(String::as_str).collect()
    };
    let mut s = list
        .iter()
        .take(4)
        .copied()
        .collect::<Vec<_>>()
        .join(",");
    if list.len() > 4 {
        s.push('…');
    }
    s
}

/// Corpus text, statistics line and the traceable per-item detail lines.
fn build_corpus(selected: &[NewsItem]) -> (String, String, Vec<String>) {
    let mut news_texts: Vec<String> = Vec::new();
    let mut detail_lines: Vec<String> = Vec::new();
    let (mut pos, mut neu, mut neg) = (0usize, 0usize, 0usize);

    for item in selected {
        match item.sentiment.as_str() {
            "正面" => pos += 1,
            "负面" => neg += 1,
            _ => neu += 1,
        }
        let body = if item.page_text.is_empty() {
            &item.snippet
        } else {
            &item.page_text
        };
        let src_str = sources_display(item);
        let macro_tag = if item.macro_event { "★宏观事件" } else { "" };
        let line: Vec<String> = [
            item.title.clone(),
            body.clone(),
            format!("来源:{src_str}"),
            format!("时间:{}", item.published_at),
            format!("情绪:{}", item.sentiment),
            format!("影响分:{}", item.impact),
            item.url.clone(),
            macro_tag.to_string(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
        news_texts.push(line.join("\n"));

        let one_url = item.urls.first().cloned().unwrap_or_else(|| item.url.clone());
        detail_lines.push(format!(
            "- [{}][{}][{}] {} | {} | {} | {} {}",
            item.sentiment, item.impact, item.level, item.title, src_str, item.published_at, one_url, macro_tag
        ));
    }

    let corpus = news_texts.join("\n\n");
    let stat_line = format!(
        "统计：正面{pos} | 中性{neu} | 负面{neg}（样本数:{}）",
        pos + neu + neg
    );
    (corpus, stat_line, detail_lines)
}

/// Evidence citations: hostile hosts excluded, priority first, then impact
/// and recency, at most six.
fn build_evidence(selected: &[NewsItem]) -> Vec<Value> {
    let mut candidates: Vec<&NewsItem> = selected
        .iter()
        .filter(|item| {
            let url = item.url.to_lowercase();
            !BAD_EVIDENCE_HOSTS.iter().any(|h| url.contains(h))
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.impact.cmp(&a.impact))
            .then_with(|| b.published_at.cmp(&a.published_at))
    });
    candidates
        .into_iter()
        .take(6)
        .map(|item| {
            let url = item.urls.first().cloned().unwrap_or_else(|| item.url.clone());
            json!({
                "title": item.title,
                "url": url,
                "source": if item.source_norm.is_empty() { &item.source } else { &item.source_norm },
                "sentiment": item.sentiment,
                "impact": item.impact,
                "published_at": item.published_at,
            })
        })
        .collect()
}

fn render_evidence(evidence: &[Value]) -> String {
    if evidence.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = evidence
        .iter()
        .map(|ev| {
            format!(
                "- {}: {}\n  {}",
                ev["source"].as_str().unwrap_or(""),
                ev["title"].as_str().unwrap_or(""),
                ev["url"].as_str().unwrap_or("")
            )
        })
        .collect();
    format!("\n【结论依据（示例）】\n{}", lines.join("\n"))
}

fn format_points(points: Option<&Value>) -> String {
    let Some(Value::Array(arr)) = points else {
        return String::new();
    };
    let lines: Vec<String> = arr
        .iter()
        .filter_map(|x| match x {
            Value::Object(o) => Some(format!(
                "- {}（{}期）",
                o.get("point").and_then(Value::as_str).unwrap_or(""),
                o.get("horizon").and_then(Value::as_str).unwrap_or("")
            )),
            Value::String(s) => Some(format!("- {s}")),
            _ => None,
        })
        .filter(|s| s.trim() != "-")
        .collect();
    lines.join("\n")
}

/// Readable rendering of the structured summary block.
fn render_structured_summary(structured: &Value) -> String {
    let overall = structured["overall_sentiment"].as_str().unwrap_or("");
    let score = match &structured["score"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    };
    let reasons: Vec<&str> = structured["reasons"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).take(3).collect())
        .unwrap_or_default();
    let props = &structured["proportions"];
    let one = structured["one_liner"].as_str().unwrap_or("");
    let policy: Vec<&str> = structured["policy_points"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("总体情绪：{overall}（情绪分：{score}）"));
    if !reasons.is_empty() {
        parts.push(format!("理由：\n- {}", reasons.join("\n- ")));
    }
    if props.is_object() {
        parts.push(format!(
            "占比解读：正面{} / 中性{} / 负面{}",
            props["positive"].as_str().unwrap_or(""),
            props["neutral"].as_str().unwrap_or(""),
            props["negative"].as_str().unwrap_or("")
        ));
    }
    let cats = format_points(structured.get("catalysts"));
    if !cats.is_empty() {
        parts.push(format!("催化：\n{cats}"));
    }
    let risks = format_points(structured.get("risks"));
    if !risks.is_empty() {
        parts.push(format!("风险：\n{risks}"));
    }
    if !policy.is_empty() {
        parts.push(format!("政策/监管要点：\n- {}", policy.join("\n- ")));
    }
    if !one.is_empty() {
        parts.push(format!("一句话：{one}"));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str, sentiment: &str, impact: i64, priority: bool) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            url: url.to_string(),
            sentiment: sentiment.to_string(),
            impact,
            priority,
            published_at: "2025-09-13 10:00".to_string(),
            level: "company".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn evidence_excludes_hostile_hosts_and_caps_at_six() {
        let mut selected = vec![item("被排除", "https://www.bing.com/x", "正面", 90, true)];
        for i in 0..8 {
            selected.push(item(
                &format!("新闻{i}"),
                &format!("https://news.example.com/{i}"),
                "中性",
                50 + i,
                false,
            ));
        }
        let evidence = build_evidence(&selected);
        assert_eq!(evidence.len(), 6);
        assert!(evidence.iter().all(|e| !e["url"].as_str().unwrap().contains("bing.com")));
        // Highest impact first among non-priority items.
        assert_eq!(evidence[0]["title"], "新闻7");
    }

    #[test]
    fn corpus_counts_sentiments() {
        let selected = vec![
            item("a", "https://x/1", "正面", 70, false),
            item("b", "https://x/2", "负面", 30, false),
            item("c", "https://x/3", "中性", 50, false),
        ];
        let (corpus, stat_line, details) = build_corpus(&selected);
        assert!(stat_line.contains("正面1 | 中性1 | 负面1（样本数:3）"));
        assert_eq!(details.len(), 3);
        assert!(corpus.contains("影响分:70"));
    }

    #[test]
    fn structured_summary_renders_all_sections() {
        let structured = json!({
            "overall_sentiment": "正面",
            "score": 72,
            "reasons": ["回购落地", "订单增长"],
            "proportions": {"positive": "60%", "neutral": "30%", "negative": "10%"},
            "catalysts": [{"point": "产能释放", "horizon": "中"}],
            "risks": ["解禁压力"],
            "policy_points": ["监管问询已回复"],
            "one_liner": "基本面与舆情共振偏多"
        });
        let text = render_structured_summary(&structured);
        assert!(text.contains("总体情绪：正面（情绪分：72）"));
        assert!(text.contains("- 回购落地"));
        assert!(text.contains("占比解读：正面60% / 中性30% / 负面10%"));
        assert!(text.contains("- 产能释放（中期）"));
        assert!(text.contains("- 解禁压力"));
        assert!(text.contains("一句话：基本面与舆情共振偏多"));
    }
}
