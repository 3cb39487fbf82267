//! News behavior configuration: built-in defaults, deep-merged YAML
//! overrides, reloaded when the file's mtime changes. The value handed out
//! is immutable per call.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub news_window_days: i64,
    pub news_topk: usize,
    pub source_weights: BTreeMap<String, f64>,
    pub domain_weights: BTreeMap<String, f64>,
    pub source_aliases: BTreeMap<String, String>,
    pub domain_aliases: BTreeMap<String, String>,
    pub pos_words: Vec<String>,
    pub neg_words: Vec<String>,
    pub neu_words: Vec<String>,
    pub priority_keywords: Vec<String>,
    pub industry_upper_map: BTreeMap<String, Vec<String>>,
    pub industry_upper_llm_enabled: bool,
    pub industry_query_tails: Vec<String>,
    pub macro_query_tails: Vec<String>,
    pub layer_weights: BTreeMap<String, f64>,
    pub macro_event_boost: f64,
    pub macro_event_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn weight_map(items: &[(&str, f64)]) -> BTreeMap<String, f64> {
    items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn alias_map(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            news_window_days: 3,
            news_topk: 10,
            source_weights: weight_map(&[
                ("上海证券报", 1.2),
                ("证券时报", 1.2),
                ("中国证券报", 1.2),
                ("上证报", 1.2),
                ("中国证监会", 1.3),
                ("交易所", 1.25),
                ("深圳证券交易所", 1.25),
                ("上海证券交易所", 1.25),
                ("财联社", 1.15),
                ("券商中国", 1.1),
                ("同花顺", 1.05),
                ("东方财富", 1.05),
            ]),
            domain_weights: weight_map(&[
                ("cs.com.cn", 1.2),
                ("cnstock.com", 1.2),
                ("csrc.gov.cn", 1.3),
                ("sse.com.cn", 1.25),
                ("szse.cn", 1.25),
                ("cls.cn", 1.15),
                ("10jqka.com.cn", 1.05),
                ("eastmoney.com", 1.05),
            ]),
            source_aliases: alias_map(&[
                ("上证报", "上海证券报"),
                ("上海证券报", "上海证券报"),
                ("中国证券网", "上海证券报"),
                ("证券时报", "证券时报"),
                ("证券时报网", "证券时报"),
                ("中国证券报", "中国证券报"),
                ("中证网", "中国证券报"),
                ("东方财富", "东方财富"),
                ("东方财富网", "东方财富"),
                ("同花顺", "同花顺"),
                ("同花顺财经", "同花顺"),
                ("财联社", "财联社"),
                ("CLS", "财联社"),
                ("券商中国", "券商中国"),
                ("证券日报", "证券日报"),
                ("上交所", "上海证券交易所"),
                ("上海证券交易所", "上海证券交易所"),
                ("深交所", "深圳证券交易所"),
                ("深圳证券交易所", "深圳证券交易所"),
                ("证监会", "中国证监会"),
                ("中国证监会", "中国证监会"),
            ]),
            domain_aliases: alias_map(&[
                ("cnstock.com", "上海证券报"),
                ("cs.com.cn", "证券时报"),
                ("csrc.gov.cn", "中国证监会"),
                ("sse.com.cn", "上海证券交易所"),
                ("szse.cn", "深圳证券交易所"),
                ("eastmoney.com", "东方财富"),
                ("10jqka.com.cn", "同花顺"),
                ("cls.cn", "财联社"),
                ("people.cn", "人民网"),
                ("xinhuanet.com", "新华社"),
            ]),
            pos_words: strings(&[
                "增持", "回购", "超预期", "上调", "利好", "签约", "中标", "获批", "突破", "增长",
                "创新高", "涨停", "提价", "盈利改善", "产能扩张", "政策支持", "订单充足",
            ]),
            neg_words: strings(&[
                "减持", "限售解禁", "下调", "利空", "亏损", "违规", "问询函", "处罚", "被调查",
                "下滑", "爆雷", "停牌", "诉讼", "资产减值", "延期", "产线停工", "业绩预亏",
            ]),
            neu_words: strings(&["发布", "公告", "披露", "召开", "回复", "说明", "说明会"]),
            priority_keywords: strings(&[
                "公告", "停复牌", "停牌", "复牌", "问询函", "回购", "减持", "增持", "限售解禁",
                "监管", "处罚", "核查", "业绩预告", "业绩快报", "中报", "年报", "分红", "配股",
                "定增", "并购", "重组",
            ]),
            industry_upper_map: BTreeMap::new(),
            industry_upper_llm_enabled: false,
            industry_query_tails: strings(&[
                "政策", "消费数据", "价格", "行业报告", "库存", "销量", "景气度",
            ]),
            macro_query_tails: strings(&[
                "中国经济", "消费政策", "监管措施", "货币政策", "财政政策", "房地产政策",
                "通胀", "社零", "制造业PMI",
            ]),
            layer_weights: weight_map(&[("company", 1.0), ("industry", 0.8), ("macro", 0.6)]),
            macro_event_boost: 1.4,
            macro_event_keywords: strings(&[
                "国常会", "中期借贷便利", "MLF", "降准", "降息", "地产新政", "房贷利率",
                "汇率稳定", "特别国债",
            ]),
        }
    }
}

impl NewsConfig {
    pub fn layer_weight(&self, level: &str) -> f64 {
        self.layer_weights.get(level).copied().unwrap_or(1.0)
    }

    pub fn priority_regex(&self) -> Regex {
        if self.priority_keywords.is_empty() {
            return Regex::new("$^").expect("static regex");
        }
        let pattern = self
            .priority_keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$^").expect("static regex"))
    }
}

fn deep_update(dst: &mut serde_json::Value, src: serde_json::Value) {
    match (dst, src) {
        (serde_json::Value::Object(d), serde_json::Value::Object(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(slot) if slot.is_object() && v.is_object() => deep_update(slot, v),
                    _ => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

struct LoaderState {
    mtime: Option<SystemTime>,
    config: Arc<NewsConfig>,
    loaded_once: bool,
}

/// Hands out the current config, re-reading the YAML file when its mtime
/// changes. A missing or unparseable file yields the defaults.
pub struct NewsConfigLoader {
    path: PathBuf,
    state: Mutex<LoaderState>,
}

impl NewsConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(|| PathBuf::from("config/news_config.yml"));
        Self {
            path,
            state: Mutex::new(LoaderState {
                mtime: None,
                config: Arc::new(NewsConfig::default()),
                loaded_once: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Arc<NewsConfig> {
        let mtime = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let mut state = self.state.lock().expect("config lock poisoned");
        if state.loaded_once && state.mtime == mtime {
            return Arc::clone(&state.config);
        }

        let config = match mtime {
            Some(_) => Self::load_merged(&self.path),
            None => NewsConfig::default(),
        };
        state.config = Arc::new(config);
        state.mtime = mtime;
        state.loaded_once = true;
        Arc::clone(&state.config)
    }

    fn load_merged(path: &Path) -> NewsConfig {
        let Ok(text) = std::fs::read_to_string(path) else {
            return NewsConfig::default();
        };
        let Ok(overrides) = serde_yaml::from_str::<serde_json::Value>(&text) else {
            tracing::warn!(path = %path.display(), "news config YAML unparseable, using defaults");
            return NewsConfig::default();
        };
        if !overrides.is_object() {
            return NewsConfig::default();
        }
        let mut merged = serde_json::to_value(NewsConfig::default()).expect("default serializes");
        deep_update(&mut merged, overrides);
        match serde_json::from_value(merged) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "news config merge failed, using defaults");
                NewsConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_complete() {
        let cfg = NewsConfig::default();
        assert_eq!(cfg.news_window_days, 3);
        assert_eq!(cfg.news_topk, 10);
        assert_eq!(cfg.layer_weight("company"), 1.0);
        assert_eq!(cfg.layer_weight("macro"), 0.6);
        assert_eq!(cfg.layer_weight("unknown"), 1.0);
        assert!(cfg.priority_regex().is_match("公司发布回购公告"));
        assert!(!cfg.priority_regex().is_match("平平常常的一天"));
    }

    #[test]
    fn yaml_overrides_deep_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_config.yml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "news_window_days: 7\nsource_weights:\n  新来源: 1.5").unwrap();
        drop(f);

        let loader = NewsConfigLoader::new(Some(path.clone()));
        let cfg = loader.get();
        assert_eq!(cfg.news_window_days, 7);
        assert_eq!(cfg.source_weights["新来源"], 1.5);
        // Defaults survive the merge.
        assert_eq!(cfg.source_weights["财联社"], 1.15);
        assert_eq!(cfg.news_topk, 10);
    }

    #[test]
    fn reload_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_config.yml");
        std::fs::write(&path, "news_topk: 5").unwrap();

        let loader = NewsConfigLoader::new(Some(path.clone()));
        assert_eq!(loader.get().news_topk, 5);

        std::fs::write(&path, "news_topk: 8").unwrap();
        // Force a different mtime on filesystems with coarse timestamps.
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(later).unwrap();

        assert_eq!(loader.get().news_topk, 8);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let loader = NewsConfigLoader::new(Some(PathBuf::from("/nonexistent/news.yml")));
        assert_eq!(loader.get().news_window_days, 3);
    }
}
