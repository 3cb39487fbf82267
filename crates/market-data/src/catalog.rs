//! Static catalogue loaded once at initialization from the bootstrap
//! database (stock_basic, stock_company). Missing tables degrade to an
//! empty catalogue; the pipeline then reports unknown names.

use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    stock_basic: HashMap<String, Value>,
    stock_company: HashMap<String, Value>,
}

impl Catalog {
    pub async fn load(database_url: &str) -> Self {
        match Self::try_load(database_url).await {
            Ok(catalog) => {
                tracing::info!(
                    stocks = catalog.stock_basic.len(),
                    companies = catalog.stock_company.len(),
                    "static catalogue loaded"
                );
                catalog
            }
            Err(e) => {
                tracing::warn!(error = %e, "static catalogue unavailable, continuing without it");
                Self::default()
            }
        }
    }

    async fn try_load(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        let mut stock_basic = HashMap::new();
        let rows = sqlx::query(
            "SELECT ts_code, name, area, industry, market, list_date FROM stock_basic",
        )
        .fetch_all(&pool)
        .await?;
        for row in rows {
            let ts_code: String = row.try_get("ts_code")?;
            let entry = json!({
                "name": row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
                "area": row.try_get::<Option<String>, _>("area")?.unwrap_or_default(),
                "industry": row.try_get::<Option<String>, _>("industry")?.unwrap_or_default(),
                "market": row.try_get::<Option<String>, _>("market")?.unwrap_or_default(),
                "list_date": row.try_get::<Option<String>, _>("list_date")?.unwrap_or_default(),
            });
            stock_basic.insert(ts_code, entry);
        }

        // Company details are optional in older bootstrap databases.
        let mut stock_company = HashMap::new();
        match sqlx::query(
            "SELECT ts_code, chairman, main_business, province, city, reg_capital, employees FROM stock_company",
        )
        .fetch_all(&pool)
        .await
        {
            Ok(rows) => {
                for row in rows {
                    let ts_code: String = row.try_get("ts_code")?;
                    let entry = json!({
                        "chairman": row.try_get::<Option<String>, _>("chairman")?.unwrap_or_default(),
                        "main_business": row.try_get::<Option<String>, _>("main_business")?.unwrap_or_default(),
                        "province": row.try_get::<Option<String>, _>("province")?.unwrap_or_default(),
                        "city": row.try_get::<Option<String>, _>("city")?.unwrap_or_default(),
                        "reg_capital": row.try_get::<Option<f64>, _>("reg_capital")?,
                        "employees": row.try_get::<Option<i64>, _>("employees")?,
                    });
                    stock_company.insert(ts_code, entry);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "stock_company table unavailable");
            }
        }

        Ok(Self {
            stock_basic,
            stock_company,
        })
    }

    pub fn from_maps(
        stock_basic: HashMap<String, Value>,
        stock_company: HashMap<String, Value>,
    ) -> Self {
        Self {
            stock_basic,
            stock_company,
        }
    }

    pub fn stock_name(&self, symbol: &str) -> String {
        self.stock_basic
            .get(symbol)
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("未知股票")
            .to_string()
    }

    pub fn industry(&self, symbol: &str) -> Option<String> {
        self.stock_basic
            .get(symbol)
            .and_then(|v| v.get("industry"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// (stock_basic, company_detail) rows for a symbol; empty objects when
    /// unknown.
    pub fn company_basic_info(&self, symbol: &str) -> (Value, Value) {
        let basic = self.stock_basic.get(symbol).cloned().unwrap_or(json!({}));
        let detail = self.stock_company.get(symbol).cloned().unwrap_or(json!({}));
        (basic, detail)
    }

    pub fn is_empty(&self) -> bool {
        self.stock_basic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbol_degrades() {
        let catalog = Catalog::default();
        assert_eq!(catalog.stock_name("000001.SZ"), "未知股票");
        let (basic, detail) = catalog.company_basic_info("000001.SZ");
        assert_eq!(basic, json!({}));
        assert_eq!(detail, json!({}));
    }

    #[test]
    fn known_symbol_resolves() {
        let mut basic = HashMap::new();
        basic.insert(
            "000001.SZ".to_string(),
            json!({"name": "平安银行", "industry": "银行"}),
        );
        let catalog = Catalog::from_maps(basic, HashMap::new());
        assert_eq!(catalog.stock_name("000001.SZ"), "平安银行");
        assert_eq!(catalog.industry("000001.SZ").as_deref(), Some("银行"));
    }
}
