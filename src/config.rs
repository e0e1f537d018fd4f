use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub question_bank_path: Option<String>,
    pub engine: EngineEnvConfig,
}

/// 可通过环境变量覆盖的引擎参数，其余参数走 `EngineConfig` 默认值或已存储版本
#[derive(Debug, Clone)]
pub struct EngineEnvConfig {
    pub k_student: Option<f64>,
    pub k_item: Option<f64>,
    pub low_mastery_threshold: Option<f64>,
    pub weak_area_threshold: Option<f64>,
    pub resume_stored_config: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let question_bank_path = env_or("QUESTION_BANK_PATH", "");
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/adaptive.sled"),
            question_bank_path: if question_bank_path.trim().is_empty() {
                None
            } else {
                Some(question_bank_path)
            },
            engine: EngineEnvConfig {
                k_student: env_opt_parse("ELO_K_STUDENT"),
                k_item: env_opt_parse("ELO_K_ITEM"),
                low_mastery_threshold: env_opt_parse("LOW_MASTERY_THRESHOLD"),
                weak_area_threshold: env_opt_parse("WEAK_AREA_THRESHOLD"),
                resume_stored_config: env_or_bool("RESUME_STORED_CONFIG", true),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                None
            }
        },
        Err(_) => None,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
