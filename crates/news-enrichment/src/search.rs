//! Search-side helpers: layered query construction, the single search entry
//! point, HTML→markdown-ish link rendering and result-line parsing.

use crate::config::NewsConfig;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source_raw: String,
}

#[derive(Debug, Clone)]
pub struct SearchJob {
    pub url: String,
    pub level: &'static str,
}

static LINK_LINE: OnceLock<Regex> = OnceLock::new();
static TAIL_SRC: OnceLock<Regex> = OnceLock::new();
static DY163: OnceLock<Regex> = OnceLock::new();

fn link_line_re() -> &'static Regex {
    LINK_LINE.get_or_init(|| {
        Regex::new(r"^[#\-\*\s]*\[([^\]]{3,200})\]\((https?://[^)\s]+)\)").expect("static regex")
    })
}

fn tail_src_re() -> &'static Regex {
    TAIL_SRC.get_or_init(|| {
        Regex::new(r"\|\s*([一-龥A-Za-z0-9_.·\-]{2,20})\s*(?:\||$)").expect("static regex")
    })
}

/// Search-operator internals and non-HTTP links are dropped.
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() || url.starts_with("javascript:") {
        return false;
    }
    const BAD_PARTS: &[&str] = &[
        "bing.com/rebates",
        "bing.com/copilotsearch",
        "bing.com/maps",
        "bing.com/shop",
        "bing.com/travel",
        "bing.com/videos",
        "bing.com/images",
        "/rebates/",
        "/payouts",
        "form=PTFTNR",
    ];
    if BAD_PARTS.iter().any(|p| url.contains(p)) {
        return false;
    }
    url.starts_with("http")
}

/// Rewrite article domains known to fail: dy.163.com → www.163.com.
pub fn normalize_article_url(url: &str) -> String {
    let regex = DY163.get_or_init(|| {
        Regex::new(r"^https?://dy\.163\.com/article/([A-Za-z0-9]+)\.html").expect("static regex")
    });
    match regex.captures(url) {
        Some(c) => format!("https://www.163.com/dy/article/{}.html", &c[1]),
        None => url.to_string(),
    }
}

/// Render a search result page to markdown-ish lines: one `- [title](url)`
/// line per anchor, followed by the anchor's surrounding text as a snippet
/// candidate.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let anchor = Selector::parse("a[href]").expect("static selector");
    let mut lines: Vec<String> = Vec::new();
    for a in document.select(&anchor) {
        let href = a.value().attr("href").unwrap_or_default().trim();
        let title: String = a.text().collect::<String>().trim().to_string();
        if href.is_empty() || title.is_empty() {
            continue;
        }
        lines.push(format!("- [{title}]({href})"));
        if let Some(parent) = a.parent().and_then(scraper::ElementRef::wrap) {
            let context: String = parent.text().collect::<String>();
            let context = context.replace(&title, " ");
            let context = context.split_whitespace().collect::<Vec<_>>().join(" ");
            if context.chars().count() > 10 {
                lines.push(context);
            }
        }
    }
    lines.join("\n")
}

/// Extract (title, url, snippet, source) tuples from rendered markdown.
/// The snippet is the following plain-text line; the source is grabbed from
/// a trailing `| 媒体 |` segment when present.
pub fn parse_search_markdown(md: &str) -> Vec<SearchHit> {
    let mut out = Vec::new();
    if md.is_empty() {
        return out;
    }
    let lines: Vec<&str> = md.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    for (i, line) in lines.iter().enumerate() {
        let Some(m) = link_line_re().captures(line) else {
            continue;
        };
        let title = m[1].trim().to_string();
        let url = m[2].trim().to_string();
        if !is_valid_url(&url) {
            continue;
        }
        let mut snippet = String::new();
        if let Some(next) = lines.get(i + 1) {
            if !next.contains("http") && next.chars().count() > 10 {
                snippet = next.chars().take(240).collect();
            }
        }
        let tail = &line[m.get(0).map(|g| g.end()).unwrap_or(0)..];
        let source_raw = tail_src_re()
            .captures(tail)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        out.push(SearchHit {
            title,
            url,
            snippet,
            source_raw,
        });
    }
    out
}

fn search_url(query: &str) -> String {
    // Single fixed search entry point.
    match reqwest::Url::parse_with_params("https://www.baidu.com/s", &[("wd", query)]) {
        Ok(u) => u.to_string(),
        Err(_) => format!("https://www.baidu.com/s?wd={query}"),
    }
}

const COMPANY_TAILS: &[&str] = &[
    "公告", "新闻", "研报", "投资者关系", "定增", "并购", "利润预警", "中报", "年报", "分红",
    "回购", "减持",
];

/// Three query layers: company (symbol + name + fixed suffixes), industry
/// (expanded terms × industry tails), macro (bases × macro tails). Each
/// layer is capped to keep the crawl bounded.
pub fn build_search_jobs(
    symbol: &str,
    company_name: Option<&str>,
    industry_terms: &[String],
    macro_keywords: &[String],
    cfg: &NewsConfig,
) -> Vec<SearchJob> {
    let mut jobs: Vec<SearchJob> = Vec::new();

    let mut comp_terms: Vec<&str> = Vec::new();
    if let Some(name) = company_name {
        if !name.is_empty() {
            comp_terms.push(name);
        }
    }
    if !symbol.is_empty() {
        comp_terms.push(symbol);
    }
    let comp_base = comp_terms.join(" ");
    let comp_queries: Vec<String> = if comp_base.is_empty() {
        Vec::new()
    } else {
        COMPANY_TAILS.iter().map(|t| format!("{comp_base} {t}")).collect()
    };

    let ind_queries: Vec<String> = industry_terms
        .iter()
        .flat_map(|b| cfg.industry_query_tails.iter().map(move |t| format!("{b} {t}")))
        .collect();

    let mac_bases: Vec<String> = {
        let filtered: Vec<String> = macro_keywords.iter().filter(|k| !k.is_empty()).cloned().collect();
        if filtered.is_empty() {
            vec![String::new()]
        } else {
            filtered
        }
    };
    let mac_queries: Vec<String> = mac_bases
        .iter()
        .flat_map(|b| {
            cfg.macro_query_tails
                .iter()
                .map(move |t| format!("{b} {t}").trim().to_string())
        })
        .collect();

    let mut add = |queries: &[String], level: &'static str, limit: usize| {
        for q in queries.iter().take(limit) {
            jobs.push(SearchJob {
                url: search_url(q),
                level,
            });
        }
    };
    add(&comp_queries, "company", 5);
    add(&ind_queries, "industry", 5);
    add(&mac_queries, "macro", 4);
    jobs
}

/// Expand industry seeds through the configured upper-word map; seeds keep
/// their position, expansions follow, duplicates dropped.
pub fn expand_industry_keywords(raw: &[String], cfg: &NewsConfig) -> (Vec<String>, Vec<String>) {
    let mut out: Vec<String> = Vec::new();
    let mut unmapped: Vec<String> = Vec::new();
    let mut emit = |term: &str, out: &mut Vec<String>| {
        if !term.is_empty() && !out.iter().any(|t| t == term) {
            out.push(term.to_string());
        }
    };
    for seed in raw {
        if seed.is_empty() {
            continue;
        }
        emit(seed, &mut out);
        match cfg.industry_upper_map.get(seed) {
            Some(uppers) => {
                for u in uppers {
                    emit(u, &mut out);
                }
            }
            None => {
                if cfg.industry_upper_llm_enabled {
                    unmapped.push(seed.clone());
                }
            }
        }
    }
    (out, unmapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_filter_drops_search_internals() {
        assert!(is_valid_url("https://news.example.com/a"));
        assert!(!is_valid_url("https://www.bing.com/rebates/x"));
        assert!(!is_valid_url("javascript:void(0)"));
        assert!(!is_valid_url("ftp://example.com"));
    }

    #[test]
    fn dy163_rewrite() {
        assert_eq!(
            normalize_article_url("https://dy.163.com/article/G1PJLCNG051986N4.html"),
            "https://www.163.com/dy/article/G1PJLCNG051986N4.html"
        );
        assert_eq!(normalize_article_url("https://other.example.com/x"), "https://other.example.com/x");
    }

    #[test]
    fn markdown_parse_extracts_hits() {
        let md = "\
## [某公司发布回购公告](https://news.example.com/2025/09/12/a.html) | 证券时报 | 2小时前\n\
拟回购金额不超过人民币二亿元，用于员工持股计划。\n\
- [无效链接](https://www.bing.com/rebates/abc)\n\
- [另一条新闻](https://news.example.com/b.html)";
        let hits = parse_search_markdown(md);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "某公司发布回购公告");
        assert_eq!(hits[0].source_raw, "证券时报");
        assert!(hits[0].snippet.starts_with("拟回购金额"));
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn html_rendering_feeds_the_parser() {
        let html = r#"<div><a href="https://news.example.com/a.html">公司获得重大订单公告</a><span>订单金额十亿元，占去年营收三成以上。</span></div>"#;
        let md = html_to_markdown(html);
        let hits = parse_search_markdown(&md);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://news.example.com/a.html");
        assert!(hits[0].snippet.contains("订单金额"));
    }

    #[test]
    fn layered_jobs_are_capped() {
        let cfg = NewsConfig::default();
        let jobs = build_search_jobs(
            "000001.SZ",
            Some("平安银行"),
            &["银行".to_string()],
            &[],
            &cfg,
        );
        let company = jobs.iter().filter(|j| j.level == "company").count();
        let industry = jobs.iter().filter(|j| j.level == "industry").count();
        let macro_n = jobs.iter().filter(|j| j.level == "macro").count();
        assert_eq!(company, 5);
        assert_eq!(industry, 5);
        assert_eq!(macro_n, 4);
        assert!(jobs[0].url.starts_with("https://www.baidu.com/s?wd="));
        assert!(jobs[0].url.contains("%E5%B9%B3%E5%AE%89%E9%93%B6%E8%A1%8C"));
    }

    #[test]
    fn industry_expansion_uses_upper_map() {
        let mut cfg = NewsConfig::default();
        cfg.industry_upper_map
            .insert("白酒".to_string(), vec!["食品饮料".to_string(), "消费".to_string()]);
        let (expanded, unmapped) = expand_industry_keywords(&["白酒".to_string()], &cfg);
        assert_eq!(expanded, vec!["白酒", "食品饮料", "消费"]);
        assert!(unmapped.is_empty());

        cfg.industry_upper_llm_enabled = true;
        let (_, unmapped) = expand_industry_keywords(&["新材料".to_string()], &cfg);
        assert_eq!(unmapped, vec!["新材料"]);
    }
}
