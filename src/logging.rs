use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

/// 初始化全局 tracing subscriber。
///
/// 重复调用是安全的：全局 subscriber 已存在时（例如测试进程中）直接忽略。
/// 文件日志目录无法创建时退回到仅 stdout 输出，并记录一条警告。
pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    let registry = Registry::default().with(env_filter).with(stdout_layer);

    if config.enable_file_logs {
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("adaptive-engine")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&config.log_dir)
        {
            Ok(file_appender) => {
                let file_layer = fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .json();
                if let Err(e) = registry.with(file_layer).try_init() {
                    report_init_failure(&e.to_string());
                }
            }
            Err(e) => {
                if registry.try_init().is_ok() {
                    tracing::warn!(
                        error = %e,
                        log_dir = %config.log_dir,
                        "File log appender unavailable, logging to stdout only"
                    );
                }
            }
        }
    } else if let Err(e) = registry.try_init() {
        report_init_failure(&e.to_string());
    }
}

fn report_init_failure(message: &str) {
    if !message.contains("already been set") {
        eprintln!("Failed to initialize tracing: {message}");
    }
}
