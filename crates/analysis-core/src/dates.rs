use chrono::{Datelike, Local, NaiveDate};

/// Accepted end-date formats, tried in order.
const DATE_FORMATS: &[&str] = &["%Y%m%d", "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Parse a caller-supplied date in any accepted format.
pub fn parse_flexible(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Canonicalize an optional end-date to a concrete date; invalid or missing
/// strings fall back to today.
pub fn canonical_end_date(end_date: Option<&str>) -> NaiveDate {
    end_date
        .and_then(parse_flexible)
        .unwrap_or_else(|| Local::now().date_naive())
}

pub fn to_compact(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Start of the trailing window: end minus `years` calendar years, preserving
/// month/day (Feb 29 degrades to Feb 28).
pub fn years_back(end: NaiveDate, years: i32) -> NaiveDate {
    let year = end.year() - years;
    NaiveDate::from_ymd_opt(year, end.month(), end.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, end.month(), 28))
        .unwrap_or(end)
}

/// Two-year [start, end] window as compact strings, the default for tabular
/// fetches.
pub fn analysis_window(end_date: Option<&str>) -> (String, String) {
    window_years(end_date, 2)
}

pub fn window_years(end_date: Option<&str>, years: i32) -> (String, String) {
    let end = canonical_end_date(end_date);
    let start = years_back(end, years);
    (to_compact(start), to_compact(end))
}

/// Human-readable analysis period used in report envelopes and prompts.
pub fn analysis_period(end_date: Option<&str>) -> String {
    match end_date.and_then(parse_flexible) {
        Some(end) => {
            let start = years_back(end, 2);
            format!("{} 至 {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
        }
        None => "近两年数据".to_string(),
    }
}

/// Window description used inside empty-data summaries.
pub fn window_description(end_date: Option<&str>, days: Option<i64>) -> String {
    match end_date.and_then(parse_flexible) {
        Some(end) => {
            let start = match days {
                Some(d) => end - chrono::Duration::days(d),
                None => years_back(end, 2),
            };
            format!("{}到{}之间", to_compact(start), to_compact(end))
        }
        None => match days {
            Some(d) => format!("近{d}天内"),
            None => "近两年内".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_formats_canonicalize_to_same_day() {
        for s in ["20250819", "2025-08-19", "2025/08/19", "2025.08.19", "2025年08月19日"] {
            let d = parse_flexible(s).unwrap();
            assert_eq!(to_compact(d), "20250819", "format {s}");
        }
    }

    #[test]
    fn round_trip_is_idempotent() {
        let d = parse_flexible("2025-08-19").unwrap();
        let compact = to_compact(d);
        assert_eq!(to_compact(parse_flexible(&compact).unwrap()), compact);
    }

    #[test]
    fn invalid_dates_fall_back_to_today() {
        let today = Local::now().date_naive();
        assert_eq!(canonical_end_date(Some("not-a-date")), today);
        assert_eq!(canonical_end_date(None), today);
    }

    #[test]
    fn window_preserves_month_and_day() {
        let (start, end) = analysis_window(Some("20250914"));
        assert_eq!(start, "20230914");
        assert_eq!(end, "20250914");
    }

    #[test]
    fn leap_day_degrades_to_feb_28() {
        let end = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(to_compact(years_back(end, 2)), "20220228");
    }

    #[test]
    fn period_strings() {
        assert_eq!(analysis_period(Some("20250914")), "2023-09-14 至 2025-09-14");
        assert_eq!(analysis_period(None), "近两年数据");
    }
}
