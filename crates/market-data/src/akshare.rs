//! Tertiary adapter scraping the EastMoney public endpoints (the data source
//! behind akshare). Responses carry localized column names; everything is
//! renamed to the canonical English names before leaving the adapter.
//! Interfaces with no EastMoney counterpart return empty tables, which the
//! acquisition layer treats as a valid empty-window result.

use crate::northbound;
use analysis_core::dates;
use analysis_core::{AnalysisError, Cell, FetchKind, MarketDataProvider, Table};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const DATACENTER_URL: &str = "https://datacenter-web.eastmoney.com/api/data/v1/get";

pub struct AkshareProvider {
    client: Client,
}

impl AkshareProvider {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// EastMoney security id: exchange prefix + bare code.
    fn secid(symbol: &str) -> String {
        let code = symbol.split('.').next().unwrap_or(symbol);
        let market = if symbol.ends_with(".SH") { "1" } else { "0" };
        format!("{market}.{code}")
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, AnalysisError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AnalysisError::FetchFailed(format!("akshare: {e}")))?;
        if !response.status().is_success() {
            return Err(AnalysisError::FetchFailed(format!(
                "akshare: HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AnalysisError::FetchFailed(format!("akshare: {e}")))
    }

    /// K-line history, `klt` 101/102/103 for daily/weekly/monthly.
    async fn fetch_kline(
        &self,
        symbol: &str,
        klt: &str,
        end_date: Option<&str>,
    ) -> Result<Table, AnalysisError> {
        let (start, end) = dates::analysis_window(end_date);
        let query = [
            ("secid", Self::secid(symbol)),
            ("klt", klt.to_string()),
            ("fqt", "1".to_string()),
            ("beg", start),
            ("end", end),
            ("fields1", "f1,f2,f3".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61".to_string()),
        ];
        let body = self.get_json(KLINE_URL, &query).await?;

        // Each kline is a comma-joined record:
        // 日期,开盘,收盘,最高,最低,成交量,成交额,振幅,涨跌幅,涨跌额,换手率
        let mut table = Table::new(
            [
                "trade_date",
                "open",
                "close",
                "high",
                "low",
                "vol",
                "amount",
                "amplitude",
                "pct_chg",
                "change",
                "turnover_rate",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        );
        let Some(klines) = body
            .get("data")
            .and_then(|d| d.get("klines"))
            .and_then(Value::as_array)
        else {
            return Ok(table);
        };
        for line in klines {
            let Some(line) = line.as_str() else { continue };
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < table.columns.len() {
                continue;
            }
            let mut row = vec![Cell::Str(fields[0].replace('-', ""))];
            for f in &fields[1..table.columns.len()] {
                row.push(match f.parse::<f64>() {
                    Ok(v) => Cell::Float(v),
                    Err(_) => Cell::Null,
                });
            }
            table.push_row(row);
        }
        Ok(table)
    }

    /// K-line extended with simple moving averages, standing in for the
    /// factor-indicator interface.
    async fn fetch_factors(
        &self,
        symbol: &str,
        end_date: Option<&str>,
    ) -> Result<Table, AnalysisError> {
        let mut table = self.fetch_kline(symbol, "101", end_date).await?;
        let close_idx = match table.column_index("close") {
            Some(i) => i,
            None => return Ok(table),
        };
        let closes: Vec<f64> = table
            .rows
            .iter()
            .map(|r| r[close_idx].as_f64().unwrap_or(f64::NAN))
            .collect();
        for window in [5usize, 10, 20] {
            table.columns.push(format!("ma{window}"));
            for (i, row) in table.rows.iter_mut().enumerate() {
                if i + 1 >= window {
                    let slice = &closes[i + 1 - window..=i];
                    let ma = slice.iter().sum::<f64>() / window as f64;
                    row.push(Cell::Float(ma));
                } else {
                    row.push(Cell::Null);
                }
            }
        }
        Ok(table)
    }

    /// Datacenter report query returning record-oriented rows.
    async fn fetch_datacenter(
        &self,
        report_name: &str,
        filter: String,
    ) -> Result<Table, AnalysisError> {
        let query = [
            ("reportName", report_name.to_string()),
            ("columns", "ALL".to_string()),
            ("pageSize", "500".to_string()),
            ("filter", filter),
        ];
        let body = self.get_json(DATACENTER_URL, &query).await?;
        let records = body
            .get("result")
            .and_then(|r| r.get("data"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(Table::from_records(&records))
    }

    async fn fetch_northbound(&self, end_date: Option<&str>) -> Result<Table, AnalysisError> {
        let table = self
            .fetch_datacenter(
                "RPT_MUTUAL_DEAL_HISTORY",
                "(MUTUAL_TYPE=\"005\")".to_string(),
            )
            .await?;
        let mut table = table;
        table.rename_columns(&[
            ("TRADE_DATE", "trade_date"),
            ("NET_DEAL_AMT", "当日成交净买额"),
            ("BUY_AMT", "买入成交额"),
            ("SELL_AMT", "卖出成交额"),
            ("ACCUM_DEAL_AMT", "历史累计净买额"),
            ("FUNDS_INFLOW", "当日资金流入"),
        ]);
        let norm = northbound::homogenize(&table);

        // One-year window with unfiltered data as the last resort.
        let (start, end) = dates::window_years(end_date, 1);
        let filtered = norm.filter_date_range("trade_date", &start, &end);
        if filtered.is_empty() && !norm.is_empty() {
            tracing::warn!("northbound window empty, returning unfiltered normalized data");
            return Ok(norm);
        }
        Ok(filtered)
    }

    async fn fetch_dividend(&self, symbol: &str) -> Result<Table, AnalysisError> {
        let code = symbol.split('.').next().unwrap_or(symbol);
        let mut table = self
            .fetch_datacenter(
                "RPT_SHAREBONUS_DET",
                format!("(SECURITY_CODE=\"{code}\")"),
            )
            .await?;
        table.rename_columns(&[
            ("SECURITY_CODE", "ts_code"),
            ("NOTICE_DATE", "ann_date"),
            ("EX_DIVIDEND_DATE", "ex_date"),
            ("EQUITY_RECORD_DATE", "record_date"),
            ("PRETAX_BONUS_RMB", "cash_div_tax"),
            ("IMPL_PLAN_PROFILE", "div_proc"),
        ]);
        Ok(table)
    }

    async fn fetch_top10_holders(&self, symbol: &str) -> Result<Table, AnalysisError> {
        let code = symbol.split('.').next().unwrap_or(symbol);
        let mut table = self
            .fetch_datacenter(
                "RPT_F10_EH_HOLDERS",
                format!("(SECUCODE=\"{code}\")"),
            )
            .await?;
        table.rename_columns(&[
            ("HOLDER_NAME", "holder_name"),
            ("HOLD_NUM", "hold_amount"),
            ("HOLD_NUM_RATIO", "hold_ratio"),
            ("END_DATE", "end_date"),
        ]);
        Ok(table)
    }
}

impl Default for AkshareProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for AkshareProvider {
    fn name(&self) -> &'static str {
        "akshare"
    }

    async fn fetch(
        &self,
        kind: FetchKind,
        symbol: &str,
        end_date: Option<&str>,
    ) -> Result<Table, AnalysisError> {
        match kind {
            FetchKind::ProBarDaily => self.fetch_kline(symbol, "101", end_date).await,
            FetchKind::ProBarWeekly => self.fetch_kline(symbol, "102", end_date).await,
            FetchKind::ProBarMonthly => self.fetch_kline(symbol, "103", end_date).await,
            FetchKind::DailyBasic | FetchKind::DailyBasicEnhanced => {
                self.fetch_kline(symbol, "101", end_date).await
            }
            FetchKind::StkFactor => self.fetch_factors(symbol, end_date).await,
            FetchKind::MoneyflowNorthbound => self.fetch_northbound(end_date).await,
            FetchKind::Dividend => self.fetch_dividend(symbol).await,
            FetchKind::Top10Holders | FetchKind::Top10FloatHolders => {
                self.fetch_top10_holders(symbol).await
            }
            other => {
                tracing::debug!(kind = other.name(), "no akshare source for interface");
                Ok(Table::default())
            }
        }
    }
}
