//! HTTP wire client for the tushare-style tabular API, shared by the
//! primary and secondary providers (same protocol, different endpoints).

use analysis_core::{AnalysisError, Cell, Table};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Clone)]
pub struct TabularApiClient {
    client: Client,
    endpoint: String,
    token: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<ApiData>,
}

#[derive(Deserialize)]
struct ApiData {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

impl TabularApiClient {
    pub fn new(endpoint: &str, token: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.to_string(),
            token,
        }
    }

    /// One API call returning a row-oriented table. `code != 0` is a fetch
    /// failure; an empty `items` array is a valid empty table.
    pub async fn call(&self, api_name: &str, params: Value) -> Result<Table, AnalysisError> {
        let body = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": "",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::FetchFailed(format!("{api_name}: {e}")))?;

        if !response.status().is_success() {
            return Err(AnalysisError::FetchFailed(format!(
                "{api_name}: HTTP {}",
                response.status()
            )));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::FetchFailed(format!("{api_name}: {e}")))?;

        if parsed.code != 0 {
            return Err(AnalysisError::FetchFailed(format!(
                "{api_name}: {}",
                parsed.msg.unwrap_or_else(|| format!("code {}", parsed.code))
            )));
        }

        let Some(data) = parsed.data else {
            return Ok(Table::default());
        };

        let mut table = Table::new(data.fields);
        for item in data.items {
            let row: Vec<Cell> = (0..table.columns.len())
                .map(|i| item.get(i).map(Cell::from_json).unwrap_or(Cell::Null))
                .collect();
            table.push_row(row);
        }
        tracing::debug!(api_name, rows = table.len(), "tabular api call ok");
        Ok(table)
    }
}
