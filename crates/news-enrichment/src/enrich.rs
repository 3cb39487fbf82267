//! Event de-duplication, sentiment/impact scoring and window selection.

use crate::config::NewsConfig;
use crate::text;
use crate::time as news_time;
use analysis_core::NewsItem;
use chrono::{DateTime, Duration, FixedOffset};
use std::collections::BTreeMap;

fn item_timestamp(item: &NewsItem) -> i64 {
    news_time::parse_any_dt_cn(&item.published_at)
        .map(|dt| dt.timestamp())
        .unwrap_or(i64::MIN)
}

/// Collapse multi-source coverage: items sharing a canonical title key form
/// one event group. The representative is chosen by (priority-keyword match,
/// recency, source weight); the group's sources and urls are merged into it.
pub fn group_events(items: Vec<NewsItem>, cfg: &NewsConfig) -> Vec<NewsItem> {
    let priority_re = cfg.priority_regex();
    let mut groups: BTreeMap<String, Vec<NewsItem>> = BTreeMap::new();
    for item in items {
        let key = {
            let k = text::canonical_event_key(&item.title);
            if k.is_empty() {
                item.url.clone()
            } else {
                k
            }
        };
        groups.entry(key).or_default().push(item);
    }

    let mut merged: Vec<NewsItem> = Vec::new();
    for (_, group) in groups {
        if group.is_empty() {
            continue;
        }
        let mut sources: Vec<String> = Vec::new();
        let mut urls: Vec<String> = Vec::new();
        for item in &group {
            let s = {
                let norm = text::normalize_source_name(&item.source, &item.url, cfg);
                if norm.is_empty() {
                    item.source.clone()
                } else {
                    norm
                }
            };
            if !s.is_empty() && !sources.contains(&s) {
                sources.push(s);
            }
            if !item.url.is_empty() && !urls.contains(&item.url) {
                urls.push(item.url.clone());
            }
        }

        let mut representative = group
            .into_iter()
            .max_by(|a, b| {
                let score = |x: &NewsItem| {
                    (
                        priority_re.is_match(&x.title),
                        item_timestamp(x),
                        // f64 weight as an ordered integer key
                        (text::source_weight(&x.source, &x.url, cfg) * 100.0) as i64,
                    )
                };
                score(a).cmp(&score(b))
            })
            .expect("non-empty group");
        representative.sources = sources;
        representative.urls = urls;
        merged.push(representative);
    }
    merged
}

/// Per-item tagging: sentiment label, source weight, priority flag, layer
/// weight with macro-event boost, and the 0..100 impact score.
pub fn score_items(items: Vec<NewsItem>, cfg: &NewsConfig) -> Vec<NewsItem> {
    let priority_re = cfg.priority_regex();
    items
        .into_iter()
        .map(|mut item| {
            let base_text = format!("{}\n{}", item.title, item.snippet);
            let label = text::simple_cn_sentiment(&base_text, cfg);
            let weight = text::source_weight(&item.source, &item.url, cfg);
            let priority = priority_re.is_match(&item.title);
            let sign: f64 = match label {
                "正面" => 1.0,
                "负面" => -1.0,
                _ => 0.0,
            };

            let mut layer_w = cfg.layer_weight(if item.level.is_empty() {
                "company"
            } else {
                &item.level
            });
            if item.level == "macro" && text::contains_keywords(&base_text, &cfg.macro_event_keywords)
            {
                layer_w *= cfg.macro_event_boost;
                item.macro_event = true;
            } else {
                item.macro_event = false;
            }

            let impact = (sign * weight * layer_w * 20.0 + 50.0) as i64;
            item.sentiment = label.to_string();
            item.reason = if label == "中性" {
                "无明显情感关键词".to_string()
            } else {
                "关键词命中".to_string()
            };
            item.weight = (weight * 100.0).round() / 100.0;
            item.priority = priority;
            item.impact = impact.clamp(0, 100);
            item.source_norm = text::normalize_source_name(&item.source, &item.url, cfg);
            if item.level.is_empty() {
                item.level = "company".to_string();
            }
            item
        })
        .collect()
}

/// Global ordering: priority items first, then newest, then highest impact.
pub fn sort_for_selection(items: &mut [NewsItem]) {
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| item_timestamp(b).cmp(&item_timestamp(a)))
            .then_with(|| b.impact.cmp(&a.impact))
    });
}

/// Keep items whose resolved time falls within the last `window_days` before
/// `end`, newest first, at most `topk`. An empty window stays empty; older
/// items are never back-filled.
pub fn select_recent(
    items: &[NewsItem],
    end: DateTime<FixedOffset>,
    window_days: i64,
    topk: usize,
) -> Vec<NewsItem> {
    let cutoff = end - Duration::days(window_days);
    let mut recent: Vec<NewsItem> = items
        .iter()
        .filter(|item| {
            news_time::parse_any_dt_cn(&item.published_at)
                .map(|dt| dt >= cutoff)
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    recent.sort_by_key(|item| std::cmp::Reverse(item_timestamp(item)));
    recent.truncate(topk);
    recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(title: &str, url: &str, source: &str, published_at: &str, level: &str) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            url: url.to_string(),
            source: source.to_string(),
            published_at: published_at.to_string(),
            level: level.to_string(),
            ..Default::default()
        }
    }

    fn end() -> DateTime<FixedOffset> {
        news_time::china_tz().with_ymd_and_hms(2025, 9, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn colliding_titles_merge_sources_and_urls() {
        let cfg = NewsConfig::default();
        let a = item("某公司回购35亿元", "https://a.example.com/1", "财联社", "2025-09-13 10:00", "company");
        let b = item("某公司回购12亿元", "https://b.example.com/2", "证券时报", "2025-09-13 12:00", "company");
        let merged = group_events(vec![a, b], &cfg);
        assert_eq!(merged.len(), 1);
        let rep = &merged[0];
        assert_eq!(rep.sources.len(), 2);
        assert_eq!(rep.urls.len(), 2);
        // Both share the priority keyword, so recency picks the later one.
        assert_eq!(rep.published_at, "2025-09-13 12:00");
    }

    #[test]
    fn distinct_titles_stay_separate() {
        let cfg = NewsConfig::default();
        let a = item("回购公告", "https://a/1", "", "", "company");
        let b = item("行业景气度回升", "https://b/2", "", "", "industry");
        assert_eq!(group_events(vec![a, b], &cfg).len(), 2);
    }

    #[test]
    fn impact_formula_and_clamping() {
        let cfg = NewsConfig::default();
        // Positive company item from an unweighted source: 1*1*1*20+50 = 70.
        let scored = score_items(vec![item("利好 签约", "https://x/1", "", "", "company")], &cfg);
        assert_eq!(scored[0].impact, 70);
        assert_eq!(scored[0].sentiment, "正面");

        // Neutral item sits at 50.
        let scored = score_items(vec![item("公司召开说明会", "https://x/2", "", "", "company")], &cfg);
        assert_eq!(scored[0].impact, 50);

        // Macro item without hot keywords: 1*1*0.6*20+50 = 62.
        let scored = score_items(vec![item("政策支持 增长", "https://x/3", "", "", "macro")], &cfg);
        assert_eq!(scored[0].impact, 62);
        assert!(!scored[0].macro_event);

        // Macro hot keyword boosts the layer weight: 1*1*0.84*20+50 = 66.
        let scored = score_items(vec![item("降准 利好", "https://x/4", "", "", "macro")], &cfg);
        assert!(scored[0].macro_event);
        assert_eq!(scored[0].impact, 66);
    }

    #[test]
    fn window_selection_never_backfills() {
        let fresh = item("新闻A", "https://x/1", "", "2025-09-13 08:00", "company");
        let stale = item("新闻B", "https://x/2", "", "2025-09-01 08:00", "company");
        let untimed = item("新闻C", "https://x/3", "", "", "company");
        let picked = select_recent(&[fresh.clone(), stale, untimed], end(), 3, 10);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].title, "新闻A");

        let none = select_recent(&[], end(), 3, 10);
        assert!(none.is_empty());
    }

    #[test]
    fn selection_orders_newest_first_and_caps() {
        let mut items = Vec::new();
        for h in 1..=5 {
            items.push(item(
                &format!("新闻{h}"),
                &format!("https://x/{h}"),
                "",
                &format!("2025-09-14 0{h}:00"),
                "company",
            ));
        }
        let picked = select_recent(&items, end(), 3, 3);
        assert_eq!(picked.len(), 3);
        assert_eq!(picked[0].title, "新闻5");
    }

    #[test]
    fn priority_sorts_first() {
        let mut items = vec![
            item("普通新闻", "https://x/1", "", "2025-09-14 11:00", "company"),
            item("监管处罚公告", "https://x/2", "", "2025-09-13 08:00", "company"),
        ];
        let cfg = NewsConfig::default();
        items = score_items(items, &cfg);
        sort_for_selection(&mut items);
        assert_eq!(items[0].title, "监管处罚公告");
    }
}
