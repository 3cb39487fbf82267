use std::env;

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Environment-backed settings. Read once at startup; `.env` is honored when
/// present.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub db_path: String,

    pub tushare_token: String,
    pub tushare_enabled: bool,

    pub tinyshare_token: String,

    pub news_token: String,
    pub news_enabled: bool,

    pub deepseek_api_key: String,
    pub deepseek_base_url: String,
    pub deepseek_enabled: bool,

    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub openai_enabled: bool,

    pub result_dir: String,
    pub news_cfg_path: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            database_url: var_or("DATABASE_URL", "sqlite://./persistence/tushare_data.db"),
            db_path: var_or("DB_PATH", "./persistence/tushare_data.db"),
            tushare_token: var_or("TUSHARE_TOKEN", "default_token"),
            tushare_enabled: flag("TUSHARE_ENABLED", true),
            tinyshare_token: var_or("TINYSHARE_TOKEN", "default_token"),
            news_token: var_or("NEWS_TOKEN", "default_token"),
            news_enabled: flag("NEWS_ENABLED", true),
            deepseek_api_key: var_or("DEEPSEEK_API_KEY", "default_key"),
            deepseek_base_url: var_or("DEEPSEEK_BASE_URL", "https://api.deepseek.com"),
            deepseek_enabled: flag("DEEPSEEK_ENABLED", true),
            openai_api_key: var_or("OPENAI_API_KEY", "default_key"),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            openai_enabled: flag("OPENAI_ENABLED", false),
            result_dir: var_or("RESULT_DIR", "result"),
            news_cfg_path: env::var("NEWS_CFG_PATH").ok(),
        }
    }

    pub fn tushare_configured(&self) -> bool {
        self.tushare_enabled && self.tushare_token != "default_token"
    }

    pub fn tinyshare_configured(&self) -> bool {
        self.tinyshare_token != "default_token"
    }

    pub fn news_configured(&self) -> bool {
        self.news_enabled && self.news_token != "default_token"
    }
}
