//! Independent news source, served over the same wire protocol with its own
//! authorization token and probed separately from the tabular provider.

use crate::wire::TabularApiClient;
use analysis_core::dates;
use analysis_core::{AnalysisError, NewsSource, Table};
use async_trait::async_trait;
use chrono::{Duration, Local};
use serde_json::json;

const NEWS_ENDPOINT: &str = "https://api.tinyshare.com/pro";

pub struct WireNewsSource {
    api: TabularApiClient,
}

impl WireNewsSource {
    pub fn new(token: String) -> Self {
        Self {
            api: TabularApiClient::new(NEWS_ENDPOINT, token),
        }
    }

    fn window(end_date: Option<&str>, days: i64) -> (String, String) {
        let end = dates::canonical_end_date(end_date);
        let start = end - Duration::days(days);
        (
            format!("{} 00:00:00", start.format("%Y-%m-%d")),
            format!("{} 23:59:59", end.format("%Y-%m-%d")),
        )
    }
}

#[async_trait]
impl NewsSource for WireNewsSource {
    fn name(&self) -> &'static str {
        "tinyshare-news"
    }

    async fn fetch_news(&self, end_date: Option<&str>, days: i64) -> Result<Table, AnalysisError> {
        let (start, end) = Self::window(end_date, days);
        self.api
            .call("news", json!({"src": "cls", "start_date": start, "end_date": end}))
            .await
    }

    async fn fetch_major_news(
        &self,
        end_date: Option<&str>,
        days: i64,
    ) -> Result<Table, AnalysisError> {
        let (start, end) = Self::window(end_date, days);
        self.api
            .call("major_news", json!({"start_date": start, "end_date": end}))
            .await
    }

    async fn fetch_cctv_news(&self, days: i64) -> Result<Table, AnalysisError> {
        // Per-date interface; merge the last `days` days into one table.
        let today = Local::now().date_naive();
        let mut merged = Table::default();
        for offset in 0..days {
            let date = today - Duration::days(offset);
            let table = self
                .api
                .call("cctv_news", json!({"date": dates::to_compact(date)}))
                .await?;
            if merged.columns.is_empty() {
                merged = table;
            } else if table.columns == merged.columns {
                merged.rows.extend(table.rows);
            }
        }
        Ok(merged)
    }
}
