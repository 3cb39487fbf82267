//! One-shot bootstrap of the static catalogue (stock_basic, trade_cal,
//! stock_company) from the primary provider into the sqlite database the
//! pipeline reads at initialization.

use analysis_core::{Settings, Table};
use market_data::wire::TabularApiClient;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const TABLES: &[(&str, &str)] = &[
    ("stock_basic", "ts_code, symbol, name, area, industry, market, list_date"),
    ("trade_cal", "exchange, cal_date, is_open, pretrade_date"),
    (
        "stock_company",
        "ts_code, chairman, manager, reg_capital, setup_date, province, city, employees, main_business",
    ),
];

async fn replace_table(pool: &SqlitePool, name: &str, columns: &str, table: &Table) -> anyhow::Result<()> {
    let column_list: Vec<&str> = columns.split(", ").collect();
    let create = format!(
        "CREATE TABLE IF NOT EXISTS {name} ({})",
        column_list
            .iter()
            .map(|c| format!("{c} TEXT"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    sqlx::query(&create).execute(pool).await?;
    sqlx::query(&format!("DELETE FROM {name}")).execute(pool).await?;

    let placeholders = vec!["?"; column_list.len()].join(", ");
    let insert = format!("INSERT INTO {name} ({columns}) VALUES ({placeholders})");

    let indices: Vec<Option<usize>> = column_list
        .iter()
        .map(|c| table.column_index(c))
        .collect();
    let mut inserted = 0usize;
    for row in &table.rows {
        let mut query = sqlx::query(&insert);
        for idx in &indices {
            match idx {
                Some(i) => query = query.bind(row[*i].display()),
                None => query = query.bind(Option::<String>::None),
            }
        }
        query.execute(pool).await?;
        inserted += 1;
    }
    tracing::info!(table = name, rows = inserted, "catalogue table refreshed");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    if !settings.tushare_configured() {
        anyhow::bail!("TUSHARE_TOKEN is required for the static data bootstrap");
    }

    let options = SqliteConnectOptions::from_str(&settings.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    let api = TabularApiClient::new("https://api.tushare.pro", settings.tushare_token.clone());
    for (name, columns) in TABLES {
        let params = match *name {
            "trade_cal" => serde_json::json!({"exchange": "SSE"}),
            _ => serde_json::json!({}),
        };
        let table = api.call(name, params).await?;
        tracing::info!(table = name, rows = table.len(), "fetched");
        replace_table(&pool, name, columns, &table).await?;
    }

    tracing::info!("static data bootstrap complete");
    Ok(())
}
