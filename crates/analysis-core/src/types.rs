use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Summary markers that flag a per-interface summary as failed. Matching the
/// summary text against these decides `InterfaceStatus`.
pub const ERROR_MARKERS: &[&str] = &["生成报告时出错", "生成摘要时出错", "数据获取失败", "Error code:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceStatus {
    Success,
    Error,
}

/// Result of one fetched interface: the summarized text plus the raw rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceResult {
    pub objective: String,
    pub result: String,
    #[serde(default)]
    pub raw: Vec<Value>,
    pub status: InterfaceStatus,
}

impl InterfaceResult {
    /// Build from a summary + raw rows, deriving status from error markers.
    pub fn from_summary(objective: &str, summary: String, raw: Vec<Value>) -> Self {
        let status = if ERROR_MARKERS.iter().any(|m| summary.contains(m)) {
            InterfaceStatus::Error
        } else {
            InterfaceStatus::Success
        };
        Self {
            objective: objective.to_string(),
            result: summary,
            raw,
            status,
        }
    }

    pub fn error(objective: &str, summary: String) -> Self {
        Self {
            objective: objective.to_string(),
            result: summary,
            raw: Vec::new(),
            status: InterfaceStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub total_interfaces: usize,
    pub successful_interfaces: usize,
    pub error_interfaces: usize,
}

/// Assembled output of one analyst tool run, persisted as `<kind>_data.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolData {
    pub analysis_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub company_overview: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_summary: Option<String>,
    pub interfaces: BTreeMap<String, InterfaceResult>,
    pub summary: InterfaceStats,
}

impl ToolData {
    pub fn new(analysis_type: &str, interfaces: BTreeMap<String, InterfaceResult>) -> Self {
        let stats = InterfaceStats {
            total_interfaces: interfaces.len(),
            successful_interfaces: interfaces
                .values()
                .filter(|r| r.status == InterfaceStatus::Success)
                .count(),
            error_interfaces: interfaces
                .values()
                .filter(|r| r.status == InterfaceStatus::Error)
                .count(),
        };
        Self {
            analysis_type: analysis_type.to_string(),
            company_overview: Vec::new(),
            combined_summary: None,
            interfaces,
            summary: stats,
        }
    }

    /// Text rendering kept for prompt assembly: status-tagged per-interface
    /// summaries joined by separators.
    pub fn to_prompt_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.company_overview.is_empty() {
            parts.push(format!("公司概况：\n{}", self.company_overview.join("\n---\n")));
        }
        let mut interface_texts: Vec<String> = Vec::new();
        for item in self.interfaces.values() {
            let prefix = match item.status {
                InterfaceStatus::Success => "✅",
                InterfaceStatus::Error => "❌",
            };
            interface_texts.push(format!("{prefix}【{}】\n{}", item.objective, item.result));
        }
        if !interface_texts.is_empty() {
            parts.push(format!(
                "{}：\n{}",
                self.analysis_type,
                interface_texts.join("\n---\n")
            ));
        }
        parts.join("\n---\n")
    }
}

/// The uniform five-field analyst report envelope. Unknown fields from the
/// LLM are preserved in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystReport {
    #[serde(default)]
    pub analyst_name: String,
    #[serde(default)]
    pub viewpoint: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub scores: BTreeMap<String, i64>,
    #[serde(default)]
    pub detailed_analysis: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AnalystReport {
    /// Neutral default used when a predecessor node produced nothing.
    pub fn neutral(analyst_name: &str, reason: &str) -> Self {
        Self {
            analyst_name: analyst_name.to_string(),
            viewpoint: "中性".to_string(),
            reason: reason.to_string(),
            scores: BTreeMap::new(),
            detailed_analysis: reason.to_string(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebaterReport {
    #[serde(default)]
    pub analyst_name: String,
    #[serde(default)]
    pub viewpoint: String,
    #[serde(default)]
    pub core_arguments: Vec<String>,
    #[serde(default)]
    pub rebuttals: Vec<String>,
    #[serde(default)]
    pub final_statement: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HorizonForecast {
    #[serde(default)]
    pub bias: String,
    #[serde(default)]
    pub prediction: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(default)]
    pub short_term: HorizonForecast,
    #[serde(default)]
    pub mid_term: HorizonForecast,
    #[serde(default)]
    pub long_term: HorizonForecast,
}

/// Terminal reasoning node output: a three-horizon forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorReport {
    #[serde(default)]
    pub analyst_name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub forecast: Forecast,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One enriched news item flowing through the news sub-pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub page_text: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_norm: String,
    /// "YYYY-MM-DD HH:MM" in Asia/Shanghai, empty when unresolved.
    #[serde(default)]
    pub published_at: String,
    /// company | industry | macro
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub impact: i64,
    #[serde(default)]
    pub macro_event: bool,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_per_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_per_item: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_derivation_flags_error_markers() {
        let ok = InterfaceResult::from_summary("每日估值水平", "【每日估值水平】估值合理".into(), vec![]);
        assert_eq!(ok.status, InterfaceStatus::Success);
        let bad =
            InterfaceResult::from_summary("每日估值水平", "【每日估值水平】: 数据获取失败 - 超时".into(), vec![]);
        assert_eq!(bad.status, InterfaceStatus::Error);
    }

    #[test]
    fn tool_data_counts_statuses() {
        let mut map = BTreeMap::new();
        map.insert(
            "daily_basic".to_string(),
            InterfaceResult::from_summary("每日估值水平", "ok".into(), vec![]),
        );
        map.insert(
            "income".to_string(),
            InterfaceResult::error("营业收入与利润构成", "处理失败: boom".into()),
        );
        let data = ToolData::new("基本面数据分析", map);
        assert_eq!(data.summary.total_interfaces, 2);
        assert_eq!(data.summary.successful_interfaces, 1);
        assert_eq!(data.summary.error_interfaces, 1);
    }

    #[test]
    fn analyst_report_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "analyst_name": "基本面分析师",
            "viewpoint": "看多",
            "reason": "r",
            "scores": {"profitability": 4},
            "detailed_analysis": "d",
            "confidence": 0.8
        });
        let report: AnalystReport = serde_json::from_value(raw).unwrap();
        assert_eq!(report.scores["profitability"], 4);
        assert!(report.extra.contains_key("confidence"));
        let back = serde_json::to_value(&report).unwrap();
        assert_eq!(back["confidence"], serde_json::json!(0.8));
    }
}
