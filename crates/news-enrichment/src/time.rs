//! Publish-time resolution. All times are Asia/Shanghai with minute
//! precision, formatted "YYYY-MM-DD HH:MM". Resolution priority: structured
//! page fields, visible date text, URL-embedded date, relative phrase.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use std::sync::OnceLock;

pub fn china_tz() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("UTC+8 offset")
}

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Structured fields checked in article pages, in order.
pub const TIME_KEYS: &[&str] = &[
    "datePublished",
    "dateModified",
    "pubdate",
    "publishdate",
    "published_time",
    "发布时间",
    "发表时间",
    "时间",
    "datetime",
    "content_time",
];

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

static EMBEDDED_DT: OnceLock<Regex> = OnceLock::new();
static URL_DT_DASH: OnceLock<Regex> = OnceLock::new();
static URL_DT_COMPACT: OnceLock<Regex> = OnceLock::new();
static REL_MIN: OnceLock<Regex> = OnceLock::new();
static REL_HOUR: OnceLock<Regex> = OnceLock::new();
static REL_DAY: OnceLock<Regex> = OnceLock::new();
static REL_MONTH: OnceLock<Regex> = OnceLock::new();
static PREFIX: OnceLock<Regex> = OnceLock::new();

const DT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M",
    "%Y年%m月%d日 %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Parse common Chinese/ISO date-time spellings and numeric timestamps into
/// a UTC+8 datetime.
pub fn parse_any_dt_cn(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let s = re(&PREFIX, r"^[\s　]*发布时间[:：]\s*").replace(s, "").to_string();

    for fmt in DT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            return china_tz().from_local_datetime(&dt).single();
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&s, fmt) {
            let dt = d.and_hms_opt(0, 0, 0)?;
            return china_tz().from_local_datetime(&dt).single();
        }
    }

    // Numeric second/millisecond timestamps.
    if s.len() >= 10 && s.len() <= 13 && s.chars().all(|c| c.is_ascii_digit()) {
        let millis: i64 = if s.len() == 10 {
            s.parse::<i64>().ok()? * 1000
        } else {
            s[..13].parse().ok()?
        };
        return Some(
            DateTime::from_timestamp_millis(millis)?.with_timezone(&china_tz()),
        );
    }

    // Last resort: an embedded "2025-09-05 08:10"-like fragment.
    let m = re(
        &EMBEDDED_DT,
        r"(20\d{2}[-/.年]\d{1,2}[-/.月]\d{1,2}日?(?:[ T]\d{1,2}:\d{2}(?::\d{2})?)?)",
    )
    .captures(&s)?;
    let fragment = m.get(1)?.as_str();
    if fragment == s {
        return None;
    }
    parse_any_dt_cn(fragment)
}

/// Date embedded in the URL path (`/2025/08/12/` or `/20250812/`), midnight
/// Beijing time.
pub fn parse_dt_from_url(url: &str) -> Option<String> {
    let try_build = |y: i64, m: i64, d: i64| -> Option<String> {
        let date = NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32)?;
        Some(format!("{} 00:00", date.format("%Y-%m-%d")))
    };
    if let Some(c) = re(&URL_DT_DASH, r"/(20\d{2})[-/](\d{1,2})[-/](\d{1,2})(?:/|\b)").captures(url) {
        return try_build(
            c[1].parse().ok()?,
            c[2].parse().ok()?,
            c[3].parse().ok()?,
        );
    }
    if let Some(c) = re(&URL_DT_COMPACT, r"/(20\d{2})(\d{2})(\d{2})(?:/|\b)").captures(url) {
        return try_build(
            c[1].parse().ok()?,
            c[2].parse().ok()?,
            c[3].parse().ok()?,
        );
    }
    None
}

/// Resolve "N 分钟/小时/天/个月前" phrases against a reference time (months
/// approximate to 30 days).
pub fn infer_relative_time(text: &str, reference: DateTime<FixedOffset>) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let base = reference.with_timezone(&china_tz());
    let grab = |regex: &Regex| -> Option<i64> {
        regex
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    };
    if let Some(n) = grab(re(&REL_MIN, r"(\d+)\s*分钟前?")) {
        return Some((base - Duration::minutes(n)).format(TIME_FORMAT).to_string());
    }
    if let Some(n) = grab(re(&REL_HOUR, r"(\d+)\s*小时前?")) {
        return Some((base - Duration::hours(n)).format(TIME_FORMAT).to_string());
    }
    if let Some(n) = grab(re(&REL_DAY, r"(\d+)\s*天前?")) {
        return Some((base - Duration::days(n)).format(TIME_FORMAT).to_string());
    }
    if let Some(n) = grab(re(&REL_MONTH, r"(\d+)\s*个月前?")) {
        return Some((base - Duration::days(30 * n)).format(TIME_FORMAT).to_string());
    }
    None
}

/// Structured time fields in raw article HTML: `"datePublished": "..."`,
/// `content="..."` meta properties and labeled visible fields.
pub fn extract_structured_time(html: &str) -> Option<String> {
    for key in TIME_KEYS {
        let pattern = format!(
            r#"["']?{}["']?\s*[:=：]\s*["']([^"'<>]{{4,40}})["']"#,
            regex::escape(key)
        );
        let Ok(regex) = Regex::new(&pattern) else {
            continue;
        };
        if let Some(c) = regex.captures(html) {
            if let Some(dt) = parse_any_dt_cn(&c[1]) {
                return Some(dt.format(TIME_FORMAT).to_string());
            }
        }
    }
    None
}

/// Visible date regex over page text, the second resolution stage.
pub fn extract_visible_time(text: &str) -> Option<String> {
    let m = re(
        &EMBEDDED_DT,
        r"(20\d{2}[-/.年]\d{1,2}[-/.月]\d{1,2}日?(?:[ T]\d{1,2}:\d{2}(?::\d{2})?)?)",
    )
    .captures(text)?;
    parse_any_dt_cn(m.get(1)?.as_str()).map(|dt| dt.format(TIME_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DateTime<FixedOffset> {
        china_tz().with_ymd_and_hms(2025, 9, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_common_spellings() {
        for s in [
            "2025-09-05 08:10:00",
            "2025-09-05 08:10",
            "2025/09/05 08:10",
            "2025年09月05日 08:10",
        ] {
            let dt = parse_any_dt_cn(s).unwrap();
            assert_eq!(dt.format(TIME_FORMAT).to_string(), "2025-09-05 08:10");
        }
        assert_eq!(
            parse_any_dt_cn("2025年09月05日").unwrap().format(TIME_FORMAT).to_string(),
            "2025-09-05 00:00"
        );
    }

    #[test]
    fn parses_numeric_timestamps() {
        // 2025-09-05 00:10 UTC+8 == 1756995000 UTC seconds.
        let dt = parse_any_dt_cn("1756995000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2025-09-04");
    }

    #[test]
    fn parses_embedded_fragment_with_prefix() {
        let dt = parse_any_dt_cn("发布时间：2025-09-05 08:10 来源：证券时报").unwrap();
        assert_eq!(dt.format(TIME_FORMAT).to_string(), "2025-09-05 08:10");
    }

    #[test]
    fn url_dates_both_shapes() {
        assert_eq!(
            parse_dt_from_url("https://news.example.com/2025/08/12/article.html").unwrap(),
            "2025-08-12 00:00"
        );
        assert_eq!(
            parse_dt_from_url("https://news.example.com/20250812/article.html").unwrap(),
            "2025-08-12 00:00"
        );
        assert!(parse_dt_from_url("https://news.example.com/article.html").is_none());
    }

    #[test]
    fn relative_phrases_resolve_against_reference() {
        assert_eq!(
            infer_relative_time("2 小时前", reference()).unwrap(),
            "2025-09-14 10:00"
        );
        assert_eq!(
            infer_relative_time("3 天前更新", reference()).unwrap(),
            "2025-09-11 12:00"
        );
        assert_eq!(
            infer_relative_time("1 个月前", reference()).unwrap(),
            "2025-08-15 12:00"
        );
        assert!(infer_relative_time("没有时间信息", reference()).is_none());
    }

    #[test]
    fn structured_beats_visible() {
        let html = r#"<script>{"datePublished": "2025-09-05 08:10"}</script>正文写于 2025-09-01 09:00"#;
        assert_eq!(extract_structured_time(html).unwrap(), "2025-09-05 08:10");
        // Without the structured field the visible regex wins.
        let visible_only = "正文写于 2025-09-01 09:00";
        assert!(extract_structured_time(visible_only).is_none());
        assert_eq!(extract_visible_time(visible_only).unwrap(), "2025-09-01 09:00");
    }
}
