use std::sync::Arc;

use tokio::sync::RwLock;

use crate::adaptive::config::EngineConfig;
use crate::adaptive::models::irt::IrtParams;
use crate::adaptive::monitoring;
use crate::adaptive::processor::AttemptProcessor;
use crate::adaptive::progress;
use crate::adaptive::question_bank::{ImportSummary, QuestionBank};
use crate::adaptive::selector;
use crate::adaptive::types::{
    AttemptEvent, DifficultyDecision, LearningProgress, RecordOutcome, ScoredQuestion, WeakArea,
};
use crate::adaptive::weak_areas;
use crate::config::EngineEnvConfig;
use crate::constants::MAX_SNAPSHOT_RETRIES;
use crate::error::{EngineError, ValidationReason};
use crate::store::operations::anomalies::AnomalyEvent;
use crate::store::operations::lessons::LessonRecord;
use crate::store::operations::questions::Question;
use crate::store::operations::students::Student;
use crate::store::{Store, StoreError};
use crate::validation::validate_identifier;

/// 引擎门面：写操作经过 `AttemptProcessor` 串行化，读操作走版本号校验的一致性读取。
pub struct AdaptiveEngine {
    config: Arc<RwLock<EngineConfig>>,
    store: Arc<Store>,
    processor: AttemptProcessor,
}

impl AdaptiveEngine {
    pub fn new(config: EngineConfig, store: Arc<Store>) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            processor: AttemptProcessor::new(store.clone()),
            store,
        })
    }

    /// 启动时恢复最近一次存储的配置版本（如启用），再叠加环境变量覆盖
    pub fn resume(store: Arc<Store>, env_config: &EngineEnvConfig) -> Result<Self, EngineError> {
        let mut config = if env_config.resume_stored_config {
            match store.latest_engine_config()? {
                Some(stored) => {
                    tracing::info!(version = stored.version, "Resuming stored engine config");
                    stored.config
                }
                None => EngineConfig::default(),
            }
        } else {
            EngineConfig::default()
        };
        config.apply_env(env_config);
        Self::new(config, store)
    }

    /// 校验后替换配置并存为新版本，返回版本号
    pub async fn reload_config(&self, new_config: EngineConfig) -> Result<u32, EngineError> {
        new_config.validate().map_err(EngineError::InvalidConfig)?;
        let mut cfg = self.config.write().await;
        let version = self.store.save_engine_config(&new_config)?;
        *cfg = new_config;
        tracing::info!(version, "Engine config reloaded");
        Ok(version)
    }

    pub async fn get_config(&self) -> EngineConfig {
        self.config.read().await.clone()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub async fn register_student(
        &self,
        student_id: &str,
        display_name: &str,
    ) -> Result<Student, EngineError> {
        self.processor
            .register_student(student_id, display_name)
            .await
    }

    pub async fn record_attempt(&self, event: AttemptEvent) -> Result<RecordOutcome, EngineError> {
        let config = self.get_config().await;
        self.processor.record(event, &config).await
    }

    pub async fn complete_lesson(&self, lesson: LessonRecord) -> Result<Student, EngineError> {
        self.processor.complete_lesson(lesson).await
    }

    pub async fn set_daily_goal(&self, student_id: &str, goal: u32) -> Result<Student, EngineError> {
        self.processor.set_daily_goal(student_id, goal).await
    }

    pub async fn next_difficulty(
        &self,
        student_id: &str,
        subject: &str,
    ) -> Result<DifficultyDecision, EngineError> {
        self.consistent_read(student_id, |store, config| {
            selector::next_difficulty(store, student_id, subject, config)
        })
        .await
    }

    pub async fn next_question(
        &self,
        student_id: &str,
        subject: &str,
    ) -> Result<Option<ScoredQuestion>, EngineError> {
        self.consistent_read(student_id, |store, config| {
            selector::next_question(store, student_id, subject, config)
        })
        .await
    }

    pub async fn detect_weak_areas(&self, student_id: &str) -> Result<Vec<WeakArea>, EngineError> {
        self.consistent_read(student_id, |store, config| {
            Ok(weak_areas::detect_weak_areas(
                store,
                student_id,
                &config.weak_areas,
            )?)
        })
        .await
    }

    pub async fn snapshot(&self, student_id: &str) -> Result<LearningProgress, EngineError> {
        self.consistent_read(student_id, |store, config| {
            progress::snapshot(store, student_id, config)
        })
        .await
    }

    pub fn upsert_question(&self, question: &Question) -> Result<(), EngineError> {
        self.store.upsert_question(question).map_err(|e| match e {
            StoreError::Validation(reason) => {
                EngineError::validation(&question.id, ValidationReason::InvalidParameter(reason))
            }
            other => EngineError::from_store(&question.id, other),
        })
    }

    pub fn import_question_bank(&self, bank: &QuestionBank) -> Result<ImportSummary, EngineError> {
        bank.import(&self.store)
    }

    /// 外部校准结果回写；退化参数记为模型异常并拒绝
    pub async fn update_question_irt(
        &self,
        question_id: &str,
        params: IrtParams,
    ) -> Result<Question, EngineError> {
        match self.store.update_question_irt(question_id, &params) {
            Ok(question) => {
                tracing::info!(question_id, "IRT parameters updated");
                Ok(question)
            }
            Err(StoreError::Validation(detail)) => {
                let persist = self.config.read().await.monitoring.persist_anomalies;
                let event = AnomalyEvent::new("irt", "update_question_irt", detail.clone());
                monitoring::record_anomaly(&self.store, &event, persist);
                Err(EngineError::ModelAnomaly {
                    model: "irt",
                    context: question_id.to_string(),
                    detail,
                })
            }
            Err(e) => Err(EngineError::from_store(question_id, e)),
        }
    }

    pub fn recent_anomalies(&self, limit: usize) -> Result<Vec<AnomalyEvent>, EngineError> {
        Ok(self.store.recent_anomalies(limit)?)
    }

    fn student_version(&self, student_id: &str) -> Result<u64, EngineError> {
        self.store
            .student_version(student_id)?
            .ok_or_else(|| EngineError::not_found("student", student_id))
    }

    /// 读前读后比对学生版本号，不一致则重试；多次失败后持学生锁读取
    async fn consistent_read<T, F>(&self, student_id: &str, read: F) -> Result<T, EngineError>
    where
        F: Fn(&Store, &EngineConfig) -> Result<T, EngineError>,
    {
        validate_identifier(student_id)
            .map_err(|message| EngineError::invalid_field(student_id, "student_id", message))?;
        let config = self.get_config().await;

        for attempt in 0..MAX_SNAPSHOT_RETRIES {
            let before = self.student_version(student_id)?;
            let value = read(&self.store, &config)?;
            let after = self.student_version(student_id)?;
            if before == after {
                return Ok(value);
            }
            tracing::debug!(student_id, attempt, before, after, "Student changed during read, retrying");
        }

        tracing::debug!(student_id, "Snapshot retries exhausted, reading under student lock");
        let lock = self.processor.acquire_student_lock(student_id).await;
        let _guard = lock.lock().await;
        read(&self.store, &config)
    }
}
