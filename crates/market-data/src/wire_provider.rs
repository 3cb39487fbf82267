//! Provider over the tushare wire protocol. The primary (tushare) and
//! secondary (tinyshare) sources speak the same protocol against different
//! endpoints, so both are instances of this adapter.

use crate::northbound;
use crate::wire::TabularApiClient;
use analysis_core::dates;
use analysis_core::{AnalysisError, FetchKind, MarketDataProvider, Table};
use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use serde_json::{json, Value};

const TUSHARE_ENDPOINT: &str = "https://api.tushare.pro";
const TINYSHARE_ENDPOINT: &str = "https://api.tinyshare.com/pro";

pub struct WireProvider {
    name: &'static str,
    api: TabularApiClient,
}

impl WireProvider {
    pub fn tushare(token: String) -> Self {
        Self {
            name: "tushare",
            api: TabularApiClient::new(TUSHARE_ENDPOINT, token),
        }
    }

    pub fn tinyshare(token: String) -> Self {
        Self {
            name: "tinyshare",
            api: TabularApiClient::new(TINYSHARE_ENDPOINT, token),
        }
    }

    /// Retry a trade-date-keyed call on up to five preceding calendar days
    /// when the first response is empty. The only automatic retry in the
    /// acquisition layer.
    async fn trade_date_with_fallback(
        &self,
        api_name: &str,
        base_params: Value,
        end: NaiveDate,
    ) -> Result<Table, AnalysisError> {
        for offset in 0..=5i64 {
            let date = end - Duration::days(offset);
            let mut params = base_params.clone();
            params["trade_date"] = json!(dates::to_compact(date));
            let table = self.api.call(api_name, params).await?;
            if !table.is_empty() {
                if offset > 0 {
                    tracing::info!(api_name, fallback_days = offset, rows = table.len(), "trade-date fallback hit");
                }
                return Ok(table);
            }
        }
        tracing::info!(api_name, "no data within trade-date fallback window");
        Ok(Table::default())
    }

    /// Northbound fund flow: one-year window, end pulled back a day when it
    /// is today (the upstream publishes with a delay), five-day fallback,
    /// six-field homogenization.
    async fn northbound(&self, end_date: Option<&str>) -> Result<Table, AnalysisError> {
        let mut end = dates::canonical_end_date(end_date);
        if end == Local::now().date_naive() {
            end -= Duration::days(1);
        }
        for offset in 0..=5i64 {
            let e = end - Duration::days(offset);
            let s = e - Duration::days(365);
            let table = self
                .api
                .call(
                    "moneyflow_hsgt",
                    json!({"start_date": dates::to_compact(s), "end_date": dates::to_compact(e)}),
                )
                .await?;
            if !table.is_empty() {
                return Ok(northbound::homogenize(&table));
            }
        }
        Ok(northbound::homogenize(&Table::default()))
    }
}

#[async_trait]
impl MarketDataProvider for WireProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(
        &self,
        kind: FetchKind,
        symbol: &str,
        end_date: Option<&str>,
    ) -> Result<Table, AnalysisError> {
        let (start, end) = dates::analysis_window(end_date);
        let windowed = json!({"ts_code": symbol, "start_date": start, "end_date": end});
        let end_day = dates::canonical_end_date(end_date);

        match kind {
            FetchKind::FinaIndicator => self.api.call("fina_indicator", windowed).await,
            FetchKind::DailyBasic | FetchKind::DailyBasicEnhanced => {
                self.api.call("daily_basic", windowed).await
            }
            FetchKind::Dividend => self.api.call("dividend", json!({"ts_code": symbol})).await,
            FetchKind::Income => self.api.call("income", windowed).await,
            FetchKind::Balance => self.api.call("balancesheet", windowed).await,
            FetchKind::Cashflow => self.api.call("cashflow", windowed).await,
            FetchKind::Forecast => self.api.call("forecast", windowed).await,
            FetchKind::Express => self.api.call("express", windowed).await,
            FetchKind::MainBusiness => self.api.call("fina_mainbz", windowed).await,
            FetchKind::ProBarDaily => self.api.call("daily", windowed).await,
            FetchKind::ProBarWeekly => self.api.call("weekly", windowed).await,
            FetchKind::ProBarMonthly => self.api.call("monthly", windowed).await,
            FetchKind::StkFactor => self.api.call("stk_factor", windowed).await,
            FetchKind::LimitList => {
                self.api.call("limit_list_d", json!({"ts_code": symbol})).await
            }
            FetchKind::Top10Holders => self.api.call("top10_holders", windowed).await,
            FetchKind::Top10FloatHolders => self.api.call("top10_floatholders", windowed).await,
            FetchKind::HolderNumber => self.api.call("stk_holdernumber", windowed).await,
            FetchKind::MoneyflowStock => self.api.call("moneyflow_ths", windowed).await,
            FetchKind::MoneyflowSector => {
                self.trade_date_with_fallback("moneyflow_cnt_ths", json!({}), end_day)
                    .await
            }
            FetchKind::MoneyflowIndustry => {
                self.trade_date_with_fallback("moneyflow_ind_ths", json!({}), end_day)
                    .await
            }
            FetchKind::MoneyflowMarket => {
                self.trade_date_with_fallback("moneyflow_mkt_dc", json!({}), end_day)
                    .await
            }
            FetchKind::MoneyflowIndustryDc => {
                self.trade_date_with_fallback("moneyflow_ind_dc", json!({}), end_day)
                    .await
            }
            FetchKind::TopList => {
                self.trade_date_with_fallback("top_list", json!({"ts_code": symbol}), end_day)
                    .await
            }
            FetchKind::TopInst => {
                self.trade_date_with_fallback("top_inst", json!({"ts_code": symbol}), end_day)
                    .await
            }
            FetchKind::MoneyflowNorthbound => self.northbound(end_date).await,
            FetchKind::ChipDistribution => {
                self.trade_date_with_fallback("cyq_perf", json!({"ts_code": symbol}), end_day)
                    .await
            }
        }
    }
}
