//! Text cleaning, Chinese-content gating, title canonicalization, lexicon
//! sentiment and source normalization.

use crate::config::NewsConfig;
use regex::Regex;
use std::sync::OnceLock;

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

static HTML_TAG: OnceLock<Regex> = OnceLock::new();
static MD_IMAGE: OnceLock<Regex> = OnceLock::new();
static MD_LINK: OnceLock<Regex> = OnceLock::new();
static BARE_URL: OnceLock<Regex> = OnceLock::new();
static MULTI_WS: OnceLock<Regex> = OnceLock::new();
static TITLE_STRIP: OnceLock<Regex> = OnceLock::new();
static LONG_DIGITS: OnceLock<Regex> = OnceLock::new();
static WS_RUN: OnceLock<Regex> = OnceLock::new();

/// Keep only body text: strip HTML tags, drop markdown images, collapse
/// `[text](url)` to `text`, remove bare URLs, compact whitespace.
pub fn clean_page_text(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let t = re(&HTML_TAG, r"<[^>]+>").replace_all(input, " ");
    let t = re(&MD_IMAGE, r"!\[[^\]]*\]\([^)]+\)").replace_all(&t, " ");
    let t = re(&MD_LINK, r"\[([^\]]+)\]\(https?://[^)]+\)").replace_all(&t, "$1");
    let t = re(&BARE_URL, r"https?://\S+").replace_all(&t, " ");
    let t = re(&MULTI_WS, r"\s{2,}").replace_all(&t, " ");
    t.trim().to_string()
}

pub fn cjk_count(text: &str) -> usize {
    text.chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count()
}

/// At least 30 CJK characters and a CJK ratio of 5%.
pub fn has_enough_chinese(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let cjk = cjk_count(text);
    if cjk < 30 {
        return false;
    }
    cjk as f64 / text.chars().count().max(1) as f64 >= 0.05
}

/// Canonical event key: lowercase, long digit runs removed, punctuation to
/// spaces, filler words pruned. Items sharing a key form one event group.
pub fn canonical_event_key(title: &str) -> String {
    if title.is_empty() {
        return String::new();
    }
    let t = title.trim().to_lowercase();
    let t = re(&LONG_DIGITS, r"\d{2,}").replace_all(&t, "");
    let t = re(&TITLE_STRIP, r"[\s\-_|【】\[\]（）()：:，,。.!！?？]+").replace_all(&t, " ");
    let t = re(&WS_RUN, r"\s+").replace_all(&t, " ");
    t.replace("快讯", "").replace("最新", "").trim().to_string()
}

pub fn contains_keywords(text: &str, words: &[String]) -> bool {
    words.iter().any(|w| !w.is_empty() && text.contains(w.as_str()))
}

/// Sign of positive-minus-negative word hits; ties are neutral.
pub fn simple_cn_sentiment(text: &str, cfg: &NewsConfig) -> &'static str {
    let pos = contains_keywords(text, &cfg.pos_words);
    let neg = contains_keywords(text, &cfg.neg_words);
    match (pos, neg) {
        (true, false) => "正面",
        (false, true) => "负面",
        _ => "中性",
    }
}

fn url_domain(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1)?;
    let host = rest.split(['/', '?', '#']).next()?;
    Some(host.split(':').next().unwrap_or(host).to_string())
}

/// Canonical source name: domain aliases take precedence over text aliases.
pub fn normalize_source_name(source: &str, url: &str, cfg: &NewsConfig) -> String {
    if !url.is_empty() {
        if let Some(domain) = url_domain(url) {
            for (d, canon) in &cfg.domain_aliases {
                if domain.contains(d.as_str()) {
                    return canon.clone();
                }
            }
        }
    }
    let s = source.trim();
    for (alias, canon) in &cfg.source_aliases {
        if !alias.is_empty() && s.contains(alias.as_str()) {
            return canon.clone();
        }
    }
    s.to_string()
}

/// Source weight: the maximum of matching source-name and domain weights,
/// floored at 1.0.
pub fn source_weight(source: &str, url: &str, cfg: &NewsConfig) -> f64 {
    let mut w: f64 = 1.0;
    let norm = normalize_source_name(source, url, cfg);
    if !norm.is_empty() {
        for (k, v) in &cfg.source_weights {
            if norm.contains(k.as_str()) {
                w = w.max(*v);
            }
        }
    }
    if let Some(domain) = url_domain(url) {
        for (k, v) in &cfg.domain_weights {
            if domain.contains(k.as_str()) {
                w = w.max(*v);
            }
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_collapses_links_and_tags() {
        let raw = "<p>公司公告</p> ![图](http://x/a.png) [详情](https://example.com/a) https://bare.example.com  多  空格";
        let cleaned = clean_page_text(raw);
        assert!(cleaned.contains("公司公告"));
        assert!(cleaned.contains("详情"));
        assert!(!cleaned.contains("http"));
        assert!(!cleaned.contains("!["));
    }

    #[test]
    fn chinese_gate() {
        assert!(!has_enough_chinese("short"));
        let long_cn = "这是一段足够长的中文正文内容，用来验证正文过滤器的行为是否符合预期，再补充一些文字凑够数量。";
        assert!(has_enough_chinese(long_cn));
        let diluted = format!("{}{}", "x".repeat(2000), "中文只有一点点");
        assert!(!has_enough_chinese(&diluted));
    }

    #[test]
    fn event_keys_collapse_variants() {
        let a = canonical_event_key("快讯：某公司回购35亿元股份！");
        let b = canonical_event_key("某公司回购12亿元股份（最新）");
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn sentiment_sign() {
        let cfg = NewsConfig::default();
        assert_eq!(simple_cn_sentiment("公司宣布回购计划", &cfg), "正面");
        assert_eq!(simple_cn_sentiment("股东减持公告", &cfg), "负面");
        // Both positive and negative hits tie to neutral.
        assert_eq!(simple_cn_sentiment("回购与减持并存", &cfg), "中性");
        assert_eq!(simple_cn_sentiment("公司召开说明会", &cfg), "中性");
    }

    #[test]
    fn source_normalization_prefers_domain() {
        let cfg = NewsConfig::default();
        assert_eq!(
            normalize_source_name("某转载号", "https://www.cls.cn/detail/1", &cfg),
            "财联社"
        );
        assert_eq!(normalize_source_name("上证报", "", &cfg), "上海证券报");
        assert_eq!(normalize_source_name("无名小站", "", &cfg), "无名小站");
    }

    #[test]
    fn weights_take_max_of_source_and_domain() {
        let cfg = NewsConfig::default();
        let w = source_weight("财联社", "https://www.csrc.gov.cn/x", &cfg);
        assert_eq!(w, 1.3);
        assert_eq!(source_weight("无名", "https://unknown.example.com", &cfg), 1.0);
    }
}
