//! Parsers for LLM-produced reports. Responses arrive as JSON, usually
//! wrapped in a fenced block; missing envelope fields are defaulted and
//! unparseable responses become sentinel reports so the DAG always
//! completes.

use analysis_core::{AnalystReport, DebaterReport};
use serde_json::{json, Value};
use summarizer::extract_json_text;

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Parse an analyst response into the five-field envelope. On failure the
/// sentinel carries a neutral viewpoint and the truncated raw content.
pub fn parse_analyst_report(content: &str) -> AnalystReport {
    let text = extract_json_text(content);
    match serde_json::from_str::<AnalystReport>(text) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "analyst report JSON parse failed");
            AnalystReport {
                analyst_name: "分析失败".to_string(),
                viewpoint: "中性".to_string(),
                reason: "数据解析失败".to_string(),
                scores: Default::default(),
                detailed_analysis: format!("解析失败: {}...", truncate_chars(content, 200)),
                extra: Default::default(),
            }
        }
    }
}

/// Parse a debater response; the sentinel keeps the caller-provided name.
pub fn parse_debater_report(content: &str, default_name: &str) -> DebaterReport {
    let text = extract_json_text(content);
    match serde_json::from_str::<DebaterReport>(text) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "debater report JSON parse failed");
            DebaterReport {
                analyst_name: default_name.to_string(),
                viewpoint: "中性".to_string(),
                core_arguments: vec!["解析失败".to_string()],
                rebuttals: vec!["解析失败".to_string()],
                final_statement: format!("解析失败: {}...", truncate_chars(content, 200)),
                extra: Default::default(),
            }
        }
    }
}

/// Supervisor responses are passed through as JSON; failures surface as an
/// error object with the truncated raw content.
pub fn parse_supervisor_report(content: &str) -> Value {
    let text = extract_json_text(content);
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => value,
        _ => {
            tracing::error!("supervisor report JSON parse failed");
            json!({
                "error": "Failed to parse supervisor report JSON",
                "raw_content": truncate_chars(content, 200),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_analyst_report_parses() {
        let content = r#"分析如下：
```json
{
  "analyst_name": "技术分析师",
  "viewpoint": "看多",
  "reason": "均线多头排列",
  "scores": {"trend_strength": 4, "momentum": 3, "support_resistance": 3, "volume_analysis": 4, "pattern_analysis": 3},
  "detailed_analysis": "量价配合良好"
}
```"#;
        let report = parse_analyst_report(content);
        assert_eq!(report.analyst_name, "技术分析师");
        assert_eq!(report.viewpoint, "看多");
        assert_eq!(report.scores.len(), 5);
        assert_eq!(report.scores["trend_strength"], 4);
    }

    #[test]
    fn missing_fields_default() {
        let report = parse_analyst_report(r#"{"viewpoint": "看空"}"#);
        assert_eq!(report.viewpoint, "看空");
        assert_eq!(report.analyst_name, "");
        assert!(report.scores.is_empty());
    }

    #[test]
    fn prose_becomes_sentinel() {
        let report = parse_analyst_report("这只股票看起来不错，建议买入。");
        assert_eq!(report.analyst_name, "分析失败");
        assert_eq!(report.viewpoint, "中性");
        assert!(report.detailed_analysis.starts_with("解析失败:"));
    }

    #[test]
    fn sentinel_truncates_long_content() {
        let long = "坏".repeat(500);
        let report = parse_analyst_report(&long);
        // "解析失败: " + 200 chars + "..."
        assert_eq!(report.detailed_analysis.chars().count(), 6 + 200 + 3);
    }

    #[test]
    fn debater_sentinel_keeps_name() {
        let report = parse_debater_report("not json", "多头辩论者");
        assert_eq!(report.analyst_name, "多头辩论者");
        assert_eq!(report.core_arguments, vec!["解析失败"]);
    }

    #[test]
    fn debater_report_parses() {
        let content = r#"{"analyst_name": "看涨派分析师", "viewpoint": "看多", "core_arguments": ["a"], "rebuttals": [], "final_statement": "坚定看多"}"#;
        let report = parse_debater_report(content, "多头辩论者");
        assert_eq!(report.analyst_name, "看涨派分析师");
        assert_eq!(report.final_statement, "坚定看多");
    }

    #[test]
    fn supervisor_passthrough_and_error() {
        let ok = parse_supervisor_report(r#"{"analyst_name": "总决策分析师", "forecast": {}}"#);
        assert_eq!(ok["analyst_name"], "总决策分析师");

        let bad = parse_supervisor_report("plain prose");
        assert_eq!(bad["error"], "Failed to parse supervisor report JSON");
        assert_eq!(bad["raw_content"], "plain prose");
    }
}
