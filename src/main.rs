use std::sync::Arc;

use adaptive_engine::adaptive::engine::AdaptiveEngine;
use adaptive_engine::adaptive::question_bank::QuestionBank;
use adaptive_engine::config::Config;
use adaptive_engine::error::EngineError;
use adaptive_engine::logging::{init_tracing, LogConfig};
use adaptive_engine::store::Store;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    init_tracing(&LogConfig {
        log_level: config.log_level.clone(),
        enable_file_logs: config.enable_file_logs,
        log_dir: config.log_dir.clone(),
    });
    tracing::info!("Starting adaptive-engine");

    if let Err(e) = run(&config).await {
        tracing::error!(error = %e, "adaptive-engine failed");
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> Result<(), EngineError> {
    let store = Arc::new(Store::open(&config.sled_path)?);
    store.run_migrations()?;

    let engine = AdaptiveEngine::resume(store.clone(), &config.engine)?;
    let engine_config = engine.get_config().await;
    tracing::info!(
        k_student = engine_config.elo.k_student,
        k_item = engine_config.elo.k_item,
        target_low = engine_config.selector.target_low,
        target_high = engine_config.selector.target_high,
        "Engine ready"
    );

    if let Some(path) = &config.question_bank_path {
        let bank = QuestionBank::from_path(path)?;
        let summary = engine.import_question_bank(&bank)?;
        tracing::info!(
            path = %path,
            imported = summary.imported,
            skipped = summary.skipped,
            "Question bank loaded"
        );
    }

    tracing::info!(
        students = store.count_students(),
        questions = store.count_questions(),
        "Store summary"
    );

    store.flush()?;
    tracing::info!("adaptive-engine shutdown complete");
    Ok(())
}
