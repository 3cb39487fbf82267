//! On-disk artifact store: `<root>/<symbol>/<YYYYMMDD>/<name>.json`.
//!
//! Persists tool outputs and analyst reports and serves them back as a
//! read-through cache for later pipeline stages. Writes are last-write-wins
//! within a run.

use analysis_core::dates;
use analysis_core::AnalysisError;
use chrono::Local;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn date_dir(&self, symbol: &str, end_date: Option<&str>) -> Result<PathBuf, AnalysisError> {
        let date = dates::canonical_end_date(end_date);
        let dir = self.root.join(symbol).join(dates::to_compact(date));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn write_json(path: &Path, payload: &Value) -> Result<(), AnalysisError> {
        let text = serde_json::to_string_pretty(payload)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Persist a tool output under `<name>.json`. String payloads land in
    /// `text`, structured payloads in `data`.
    pub fn save_tool_result(
        &self,
        symbol: &str,
        tool_name: &str,
        result: &Value,
        end_date: Option<&str>,
    ) -> Result<PathBuf, AnalysisError> {
        let dir = self.date_dir(symbol, end_date)?;
        let path = dir.join(format!("{tool_name}.json"));

        let mut payload = json!({
            "tool": tool_name,
            "timestamp": Self::timestamp(),
            "analysis_period": dates::analysis_period(end_date),
        });
        match result {
            Value::String(s) => {
                // A JSON-encoded string payload is unwrapped into data.
                match serde_json::from_str::<Value>(s) {
                    Ok(parsed) if parsed.is_object() || parsed.is_array() => {
                        payload["data"] = parsed;
                    }
                    _ => {
                        payload["text"] = Value::String(s.clone());
                    }
                }
            }
            other => {
                payload["data"] = other.clone();
            }
        }

        Self::write_json(&path, &payload)?;
        tracing::info!(path = %path.display(), "tool result saved");
        Ok(path)
    }

    /// Persist an analyst report under `<report_name|{type}_report>.json`.
    pub fn save_report(
        &self,
        symbol: &str,
        report_type: &str,
        report: &Value,
        report_name: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<PathBuf, AnalysisError> {
        let dir = self.date_dir(symbol, end_date)?;
        let name = report_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{report_type}_report"));
        let path = dir.join(format!("{name}.json"));

        let payload = json!({
            "report_type": report_type,
            "timestamp": Self::timestamp(),
            "analysis_period": dates::analysis_period(end_date),
            "data": report,
        });
        Self::write_json(&path, &payload)?;
        tracing::info!(path = %path.display(), "report saved");
        Ok(path)
    }

    /// Read-through load of a previously saved tool result.
    pub fn load_tool_result(
        &self,
        symbol: &str,
        tool_name: &str,
        end_date: Option<&str>,
    ) -> Option<Value> {
        let date = dates::canonical_end_date(end_date);
        let path = self
            .root
            .join(symbol)
            .join(dates::to_compact(date))
            .join(format!("{tool_name}.json"));
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "tool result unreadable");
                None
            }
        }
    }

    /// Save every report present in the pipeline state, keyed `{kind}_report`.
    pub fn save_all_reports(
        &self,
        symbol: &str,
        state: &serde_json::Map<String, Value>,
        end_date: Option<&str>,
    ) -> Vec<(String, PathBuf)> {
        const REPORT_KEYS: &[(&str, &str)] = &[
            ("fundamental_report", "fundamental"),
            ("technical_report", "technical"),
            ("sentiment_report", "sentiment"),
            ("news_report", "news"),
            ("fund_report", "fund"),
            ("supervisor_report", "supervisor"),
        ];
        let mut saved = Vec::new();
        for (key, report_type) in REPORT_KEYS {
            let Some(report) = state.get(*key) else {
                continue;
            };
            if report.is_null() {
                continue;
            }
            match self.save_report(symbol, report_type, report, Some(key), end_date) {
                Ok(path) => saved.push((key.to_string(), path)),
                Err(e) => tracing::error!(key, error = %e, "report save failed"),
            }
        }
        saved
    }

    /// Enumerate produced files for a symbol, newest date first.
    pub fn result_summary(&self, symbol: &str) -> String {
        let stock_dir = self.root.join(symbol);
        if !stock_dir.is_dir() {
            return format!("股票 {symbol} 暂无结果文件");
        }

        let mut summary = format!("# 股票 {symbol} 分析结果摘要\n\n");
        let mut date_dirs: Vec<PathBuf> = fs::read_dir(&stock_dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect()
            })
            .unwrap_or_default();
        date_dirs.sort();
        date_dirs.reverse();

        for date_dir in date_dirs {
            let date_name = date_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            summary.push_str(&format!("## {date_name} 分析结果\n\n"));

            let mut files: Vec<String> = fs::read_dir(&date_dir)
                .map(|rd| {
                    rd.filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().to_string())
                        .filter(|n| n.ends_with(".json") || n.ends_with(".md"))
                        .collect()
                })
                .unwrap_or_default();
            files.sort();

            summary.push_str(&format!("**文件总数**: {}\n\n", files.len()));
            for file in files {
                summary.push_str(&format!("- {file}\n"));
            }
            summary.push('\n');
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn tool_result_round_trip() {
        let (_tmp, store) = store();
        let data = json!({"analysis_type": "新闻数据分析", "combined_summary": "暂无新闻摘要"});
        store
            .save_tool_result("000001.SZ", "news_data", &data, Some("20250914"))
            .unwrap();

        let loaded = store.load_tool_result("000001.SZ", "news_data", Some("20250914")).unwrap();
        assert_eq!(loaded["tool"], "news_data");
        assert_eq!(loaded["analysis_period"], "2023-09-14 至 2025-09-14");
        assert_eq!(loaded["data"]["combined_summary"], "暂无新闻摘要");
    }

    #[test]
    fn date_formats_map_to_same_directory() {
        let (_tmp, store) = store();
        let data = json!({"x": 1});
        let a = store.save_tool_result("000001.SZ", "a", &data, Some("2025-09-14")).unwrap();
        let b = store.save_tool_result("000001.SZ", "b", &data, Some("20250914")).unwrap();
        assert_eq!(a.parent(), b.parent());
        assert!(a.to_string_lossy().contains("20250914"));
    }

    #[test]
    fn string_payload_lands_in_text() {
        let (_tmp, store) = store();
        let path = store
            .save_tool_result("000001.SZ", "tech_data", &json!("获取技术数据时出错: x"), Some("20250914"))
            .unwrap();
        let loaded: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded["text"], "获取技术数据时出错: x");
        assert!(loaded.get("data").is_none());
    }

    #[test]
    fn missing_tool_result_is_none() {
        let (_tmp, store) = store();
        assert!(store.load_tool_result("000001.SZ", "nothing", Some("20250914")).is_none());
    }

    #[test]
    fn reports_and_summary_enumeration() {
        let (_tmp, store) = store();
        let mut state = serde_json::Map::new();
        state.insert(
            "fundamental_report".to_string(),
            json!({"analyst_name": "基本面分析师", "viewpoint": "看多"}),
        );
        state.insert("supervisor_report".to_string(), json!({"analyst_name": "总决策分析师"}));
        state.insert("bogus".to_string(), json!(1));

        let saved = store.save_all_reports("000001.SZ", &state, Some("20250914"));
        assert_eq!(saved.len(), 2);

        let summary = store.result_summary("000001.SZ");
        assert!(summary.contains("# 股票 000001.SZ 分析结果摘要"));
        assert!(summary.contains("## 20250914 分析结果"));
        assert!(summary.contains("- fundamental_report.json"));
        assert!(summary.contains("**文件总数**: 2"));
    }

    #[test]
    fn unknown_symbol_summary() {
        let (_tmp, store) = store();
        assert_eq!(store.result_summary("999999.SZ"), "股票 999999.SZ 暂无结果文件");
    }
}
