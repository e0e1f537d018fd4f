use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::adaptive::config::EngineConfig;
use crate::adaptive::models::bkt::{self, BktParams};
use crate::adaptive::models::elo::{self, EloRating};
use crate::adaptive::monitoring;
use crate::adaptive::types::{
    AttemptEvent, AttemptState, ConceptUpdate, ModelAnomalyReport, RecordOutcome,
};
use crate::constants::STUDENT_LOCK_PRUNE_THRESHOLD;
use crate::error::{EngineError, ValidationReason};
use crate::store::operations::anomalies::AnomalyEvent;
use crate::store::operations::attempts::{AttemptRecord, ModelReadSet, ModelWriteSet};
use crate::store::operations::lessons::LessonRecord;
use crate::store::operations::mastery::ConceptMastery;
use crate::store::operations::questions::Question;
use crate::store::operations::students::Student;
use crate::store::Store;
use crate::validation::validate_identifier;

/// 串行化同一学生的所有写操作（作答、课程、目标），不同学生之间并行。
pub struct AttemptProcessor {
    store: Arc<Store>,
    student_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// 事务闭包的计算结果
#[derive(Debug, Clone)]
struct AppliedModels {
    expected: f64,
    student_before: f64,
    student_after: f64,
    item_before: f64,
    item_after: f64,
    concept_updates: Vec<ConceptUpdate>,
    anomalies: Vec<ModelAnomalyReport>,
}

impl AttemptProcessor {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            student_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) async fn acquire_student_lock(&self, student_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.student_locks.lock().await;

        // strong_count == 1 表示只有表本身持有，可以清理
        if locks.len() > STUDENT_LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, v| Arc::strong_count(v) > 1);
        }

        locks
            .entry(student_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn register_student(
        &self,
        student_id: &str,
        display_name: &str,
    ) -> Result<Student, EngineError> {
        validate_identifier(student_id)
            .map_err(|message| EngineError::invalid_field(student_id, "student_id", message))?;

        let lock = self.acquire_student_lock(student_id).await;
        let _guard = lock.lock().await;

        let student = Student::new(student_id, display_name);
        self.store
            .create_student(&student)
            .map_err(|e| EngineError::from_store(student_id, e))?;
        tracing::info!(student_id, "Student registered");
        Ok(student)
    }

    /// Received → Validated → Applied → Committed。
    ///
    /// 任一步失败都不会留下部分状态；BKT 异常不终止作答，保留先验并在结果中报告。
    pub async fn record(
        &self,
        event: AttemptEvent,
        config: &EngineConfig,
    ) -> Result<RecordOutcome, EngineError> {
        let mut state = AttemptState::Received;
        tracing::debug!(
            attempt_id = %event.attempt_id,
            student_id = %event.student_id,
            question_id = %event.question_id,
            "Attempt received"
        );

        if let Err(e) = validate_event(&event) {
            log_rejection(&event.attempt_id, &e);
            return Err(e);
        }

        let lock = self.acquire_student_lock(&event.student_id).await;
        let _guard = lock.lock().await;

        let question = match self.load_validated(&event) {
            Ok(loaded) => loaded,
            Err(e) => {
                log_rejection(&event.attempt_id, &e);
                return Err(e);
            }
        };
        advance(&mut state, AttemptState::Validated, &event.attempt_id);

        let concepts = question.concept_tags();
        let record = AttemptRecord {
            id: event.attempt_id.clone(),
            student_id: event.student_id.clone(),
            question_id: event.question_id.clone(),
            subject: question.subject.clone(),
            is_correct: event.is_correct,
            response_time_ms: event.response_time_ms,
            timestamp: event.timestamp,
            state: AttemptState::Applied,
            committed_at: None,
        };

        let (applied, committed_student) = self
            .store
            .commit_attempt(&record, &concepts, |read| {
                apply_models(read, &event, &question, config)
            })
            .map_err(|e| {
                let error = EngineError::from_store(&event.attempt_id, e);
                log_rejection(&event.attempt_id, &error);
                error
            })?;
        advance(&mut state, AttemptState::Applied, &event.attempt_id);
        advance(&mut state, AttemptState::Committed, &event.attempt_id);

        for anomaly in &applied.anomalies {
            let mut report = AnomalyEvent::new(&anomaly.model, "record_attempt", &anomaly.detail)
                .with_student(&event.student_id);
            if let Some(concept) = &anomaly.concept {
                report = report.with_concept(concept);
            }
            monitoring::record_anomaly(&self.store, &report, config.monitoring.persist_anomalies);
        }

        let outcome = RecordOutcome {
            attempt_id: event.attempt_id.clone(),
            state,
            subject: question.subject.clone(),
            expected_score: applied.expected,
            student_rating_before: applied.student_before,
            student_rating_after: applied.student_after,
            item_rating_before: applied.item_before,
            item_rating_after: applied.item_after,
            concept_updates: applied.concept_updates,
            anomalies: applied.anomalies,
            student_version: committed_student.version,
        };

        if config.monitoring.check_invariants {
            for violation in monitoring::check_invariants(&outcome, config) {
                let report = AnomalyEvent::new(
                    "invariant",
                    "record_attempt",
                    format!(
                        "{}={} outside {}",
                        violation.field, violation.value, violation.expected_range
                    ),
                )
                .with_student(&event.student_id);
                monitoring::record_anomaly(
                    &self.store,
                    &report,
                    config.monitoring.persist_anomalies,
                );
            }
        }

        tracing::info!(
            attempt_id = %outcome.attempt_id,
            student_id = %event.student_id,
            question_id = %event.question_id,
            correct = event.is_correct,
            expected = outcome.expected_score,
            student_rating = outcome.student_rating_after,
            version = outcome.student_version,
            "Attempt committed"
        );
        Ok(outcome)
    }

    fn load_validated(&self, event: &AttemptEvent) -> Result<Question, EngineError> {
        let context = event.attempt_id.as_str();
        if self
            .store
            .attempt_exists(&event.attempt_id)
            .map_err(|e| EngineError::from_store(context, e))?
        {
            return Err(EngineError::validation(
                context,
                ValidationReason::DuplicateAttempt,
            ));
        }
        self.store
            .require_student(&event.student_id)
            .map_err(|e| EngineError::from_store(context, e))?;
        let question = self
            .store
            .require_question(&event.question_id)
            .map_err(|e| EngineError::from_store(context, e))?;
        Ok(question)
    }

    pub async fn complete_lesson(&self, lesson: LessonRecord) -> Result<Student, EngineError> {
        let context = lesson.id.clone();
        for (field, value) in [
            ("lesson_id", lesson.id.as_str()),
            ("student_id", lesson.student_id.as_str()),
            ("subject", lesson.subject.as_str()),
        ] {
            validate_identifier(value)
                .map_err(|message| EngineError::invalid_field(&context, field, message))?;
        }
        if lesson.correct_answers > lesson.questions_answered {
            return Err(EngineError::invalid_field(
                &context,
                "correct_answers",
                "exceeds questions answered",
            ));
        }

        let lock = self.acquire_student_lock(&lesson.student_id).await;
        let _guard = lock.lock().await;

        let student = self
            .store
            .record_lesson(&lesson)
            .map_err(|e| EngineError::from_store(&context, e))?;
        tracing::info!(
            lesson_id = %lesson.id,
            student_id = %lesson.student_id,
            version = student.version,
            "Lesson recorded"
        );
        Ok(student)
    }

    pub async fn set_daily_goal(&self, student_id: &str, goal: u32) -> Result<Student, EngineError> {
        if goal == 0 {
            return Err(EngineError::invalid_field(
                student_id,
                "daily_goal",
                "must be positive",
            ));
        }

        let lock = self.acquire_student_lock(student_id).await;
        let _guard = lock.lock().await;

        let student = self
            .store
            .update_student_with(student_id, |s| s.daily_goal = goal)
            .map_err(|e| EngineError::from_store(student_id, e))?;
        tracing::info!(student_id, goal, "Daily goal updated");
        Ok(student)
    }
}

fn validate_event(event: &AttemptEvent) -> Result<(), EngineError> {
    let context = event.attempt_id.as_str();
    for (field, value) in [
        ("attempt_id", event.attempt_id.as_str()),
        ("student_id", event.student_id.as_str()),
        ("question_id", event.question_id.as_str()),
    ] {
        validate_identifier(value)
            .map_err(|message| EngineError::invalid_field(context, field, message))?;
    }
    if event.response_time_ms <= 0 {
        return Err(EngineError::validation(
            context,
            ValidationReason::NonPositiveResponseTime(event.response_time_ms),
        ));
    }
    Ok(())
}

/// 输入问题记 warn，存储故障记 error
fn log_rejection(attempt_id: &str, error: &EngineError) {
    if error.is_operational() {
        tracing::warn!(attempt_id, error = %error, "Attempt rejected");
    } else {
        tracing::error!(attempt_id, error = %error, "Attempt failed");
    }
}

fn advance(state: &mut AttemptState, target: AttemptState, attempt_id: &str) {
    debug_assert!(state.can_advance_to(target));
    tracing::debug!(
        attempt_id,
        from = state.as_str(),
        to = target.as_str(),
        "Attempt state transition"
    );
    *state = target;
}

/// Elo 先于 BKT；在 sled 事务内执行，可能因冲突被重跑，不能有副作用
fn apply_models(
    read: &ModelReadSet,
    event: &AttemptEvent,
    question: &Question,
    config: &EngineConfig,
) -> (ModelWriteSet, AppliedModels) {
    let student_rating = read
        .student_rating
        .unwrap_or_else(|| EloRating::new(config.elo.default_student_rating));
    let item_rating = read
        .item_rating
        .unwrap_or_else(|| EloRating::new(question.parameters.elo_rating));
    let elo_update = elo::update(student_rating, item_rating, event.is_correct, &config.elo);

    let params: BktParams = question.parameters.bkt.unwrap_or(config.bkt.default_params);
    let initial_prior = params.p_known.unwrap_or(config.bkt.default_prior);

    let mut mastery = Vec::with_capacity(read.mastery.len());
    let mut concept_updates = Vec::with_capacity(read.mastery.len());
    let mut anomalies = Vec::new();

    for (concept, current) in &read.mastery {
        let mut state = current.clone().unwrap_or_else(|| {
            ConceptMastery::new(
                &event.student_id,
                &question.subject,
                concept,
                initial_prior,
                event.timestamp,
            )
        });
        let prior = state.p_known;
        let (next, applied) = match bkt::update(prior, event.is_correct, &params) {
            Ok(update) => (update.next, true),
            Err(anomaly) => {
                anomalies.push(ModelAnomalyReport {
                    model: "bkt".to_string(),
                    concept: Some(concept.clone()),
                    detail: anomaly.to_string(),
                });
                (prior, false)
            }
        };
        state.record(next, event.is_correct, event.timestamp);
        concept_updates.push(ConceptUpdate {
            concept: concept.clone(),
            prior,
            posterior: next,
            applied,
        });
        mastery.push(state);
    }

    let mut student = read.student.clone();
    student.count_daily_attempt(event.timestamp);

    (
        ModelWriteSet {
            student,
            student_rating: elo_update.student,
            item_rating: elo_update.item,
            mastery,
        },
        AppliedModels {
            expected: elo_update.expected,
            student_before: student_rating.rating,
            student_after: elo_update.student.rating,
            item_before: item_rating.rating,
            item_after: elo_update.item.rating,
            concept_updates,
            anomalies,
        },
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::adaptive::types::DifficultyBand;
    use crate::store::operations::questions::QuestionParameters;
    use crate::store::test_support::temp_store;

    fn question(bkt: Option<BktParams>) -> Question {
        Question {
            id: "q1".to_string(),
            subject: "Arithmetic".to_string(),
            concepts: vec!["fractions".to_string()],
            difficulty: DifficultyBand::Medium,
            parameters: QuestionParameters {
                elo_rating: 1000.0,
                bkt,
                irt: None,
            },
        }
    }

    async fn setup(bkt: Option<BktParams>) -> (tempfile::TempDir, AttemptProcessor) {
        let (dir, store) = temp_store();
        let store = Arc::new(store);
        store.upsert_question(&question(bkt)).unwrap();
        let processor = AttemptProcessor::new(store);
        processor.register_student("s1", "Ada").await.unwrap();
        (dir, processor)
    }

    #[tokio::test]
    async fn even_match_correct_answer_commits() {
        let (_dir, processor) = setup(None).await;
        let event = AttemptEvent::new("s1", "q1", true, 3_000, Utc::now());
        let outcome = processor
            .record(event, &EngineConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome.state, AttemptState::Committed);
        assert!((outcome.student_rating_after - 1012.0).abs() < 1e-9);
        assert!((outcome.item_rating_after - 992.0).abs() < 1e-9);
        assert_eq!(outcome.student_version, 1);
        assert!(outcome.concept_updates[0].posterior > outcome.concept_updates[0].prior);
    }

    #[tokio::test]
    async fn bkt_anomaly_keeps_prior_and_still_commits() {
        let degenerate = BktParams {
            p_learn: 0.1,
            p_guess: 0.0,
            p_slip: 0.1,
            p_known: Some(0.0),
            p_forget: 0.0,
        };
        let (_dir, processor) = setup(Some(degenerate)).await;
        let event = AttemptEvent::new("s1", "q1", true, 3_000, Utc::now());
        let outcome = processor
            .record(event, &EngineConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome.anomalies.len(), 1);
        assert!(!outcome.concept_updates[0].applied);
        assert_eq!(outcome.concept_updates[0].posterior, 0.0);
        assert!(outcome.student_rating_after > outcome.student_rating_before);
        assert_eq!(processor.store.recent_anomalies(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_response_time_is_rejected() {
        let (_dir, processor) = setup(None).await;
        let event = AttemptEvent::new("s1", "q1", true, 0, Utc::now());
        let err = processor
            .record(event, &EngineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                reason: ValidationReason::NonPositiveResponseTime(0),
                ..
            }
        ));
        assert_eq!(processor.store.student_version("s1").unwrap(), Some(0));
    }

    #[tokio::test]
    async fn lesson_with_more_correct_than_answered_is_rejected() {
        let (_dir, processor) = setup(None).await;
        let lesson = LessonRecord {
            id: "l1".to_string(),
            student_id: "s1".to_string(),
            subject: "Arithmetic".to_string(),
            title: "Fractions".to_string(),
            questions_answered: 3,
            correct_answers: 4,
            completed_at: Utc::now(),
        };
        assert!(processor.complete_lesson(lesson).await.is_err());
    }

    #[tokio::test]
    async fn daily_goal_must_be_positive() {
        let (_dir, processor) = setup(None).await;
        assert!(processor.set_daily_goal("s1", 0).await.is_err());
        let student = processor.set_daily_goal("s1", 30).await.unwrap();
        assert_eq!(student.daily_goal, 30);
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let (_dir, processor) = setup(None).await;
        for i in 0..=STUDENT_LOCK_PRUNE_THRESHOLD {
            let _ = processor.acquire_student_lock(&format!("s{i}")).await;
        }
        let held = processor.acquire_student_lock("held").await;
        let _ = processor.acquire_student_lock("trigger").await;
        let locks = processor.student_locks.lock().await;
        assert!(locks.len() < STUDENT_LOCK_PRUNE_THRESHOLD);
        assert!(locks.contains_key("held"));
        drop(held);
    }
}
