#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use adaptive_engine::adaptive::config::EngineConfig;
use adaptive_engine::adaptive::engine::AdaptiveEngine;
use adaptive_engine::adaptive::models::bkt::BktParams;
use adaptive_engine::adaptive::models::irt::IrtParams;
use adaptive_engine::adaptive::types::DifficultyBand;
use adaptive_engine::store::operations::questions::{Question, QuestionParameters};
use adaptive_engine::store::Store;

pub struct TestEngine {
    pub engine: Arc<AdaptiveEngine>,
    pub store: Arc<Store>,
    _temp_dir: TempDir,
}

pub fn spawn_engine() -> TestEngine {
    spawn_engine_with(EngineConfig::default())
}

pub fn spawn_engine_with(config: EngineConfig) -> TestEngine {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("adaptive-test.sled");
    let store = Arc::new(Store::open(sled_path.to_str().expect("utf8 path")).expect("open store"));
    store.run_migrations().expect("migrations");
    let engine = Arc::new(AdaptiveEngine::new(config, store.clone()).expect("engine"));
    TestEngine {
        engine,
        store,
        _temp_dir: temp_dir,
    }
}

pub fn question(id: &str, subject: &str, band: DifficultyBand, elo_rating: f64) -> Question {
    Question {
        id: id.to_string(),
        subject: subject.to_string(),
        concepts: vec![],
        difficulty: band,
        parameters: QuestionParameters {
            elo_rating,
            bkt: None,
            irt: None,
        },
    }
}

pub fn tagged_question(
    id: &str,
    subject: &str,
    band: DifficultyBand,
    elo_rating: f64,
    concepts: &[&str],
) -> Question {
    let mut q = question(id, subject, band, elo_rating);
    q.concepts = concepts.iter().map(|c| c.to_string()).collect();
    q
}

pub fn with_bkt(mut q: Question, params: BktParams) -> Question {
    q.parameters.bkt = Some(params);
    q
}

pub fn with_irt(mut q: Question, a: f64, b: f64, c: f64) -> Question {
    q.parameters.irt = Some(IrtParams {
        discrimination: a,
        difficulty: b,
        guessing: c,
    });
    q
}

pub fn seed_questions(engine: &AdaptiveEngine, questions: &[Question]) {
    for q in questions {
        engine.upsert_question(q).expect("upsert seed question");
    }
}
