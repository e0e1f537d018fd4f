use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::adaptive::models::elo::EloRating;
use crate::adaptive::types::AttemptState;
use crate::store::keys;
use crate::store::operations::mastery::ConceptMastery;
use crate::store::operations::students::Student;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: String,
    pub student_id: String,
    pub question_id: String,
    pub subject: String,
    pub is_correct: bool,
    pub response_time_ms: i64,
    pub timestamp: DateTime<Utc>,
    pub state: AttemptState,
    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,
}

/// 事务内读取到的模型状态
#[derive(Debug, Clone)]
pub struct ModelReadSet {
    pub student: Student,
    pub student_rating: Option<EloRating>,
    pub item_rating: Option<EloRating>,
    /// 与传入的概念列表一一对应
    pub mastery: Vec<(String, Option<ConceptMastery>)>,
}

/// 需要在同一事务内写回的模型状态
#[derive(Debug, Clone)]
pub struct ModelWriteSet {
    pub student: Student,
    pub student_rating: EloRating,
    pub item_rating: EloRating,
    pub mastery: Vec<ConceptMastery>,
}

fn abort<T>(error: StoreError) -> Result<T, ConflictableTransactionError<StoreError>> {
    Err(ConflictableTransactionError::Abort(error))
}

impl Store {
    /// 单事务提交一次作答：作答记录、学生索引、学生（版本号）、学科评分、题目评分、概念掌握度。
    ///
    /// `apply` 在事务内根据读取结果计算新状态，发生冲突时 sled 会重跑闭包，
    /// 因此它必须是纯函数。重复的 attempt id 以 `Conflict` 中止，任何写入都不会生效。
    pub fn commit_attempt<F, T>(
        &self,
        attempt: &AttemptRecord,
        concepts: &[String],
        apply: F,
    ) -> Result<(T, Student), StoreError>
    where
        F: Fn(&ModelReadSet) -> (ModelWriteSet, T),
    {
        let attempt_key = keys::attempt_key(&attempt.id)?;
        let index_key = keys::attempt_student_index_key(
            &attempt.student_id,
            attempt.timestamp.timestamp_millis(),
            &attempt.id,
        )?;
        let student_key = keys::student_key(&attempt.student_id)?;
        let rating_key = keys::student_rating_key(&attempt.student_id, &attempt.subject)?;
        let item_key = keys::question_rating_key(&attempt.question_id)?;
        let mut mastery_keys = Vec::with_capacity(concepts.len());
        for concept in concepts {
            mastery_keys.push((
                concept.clone(),
                keys::concept_mastery_key(&attempt.student_id, &attempt.subject, concept)?,
            ));
        }

        let mut committed = attempt.clone();
        committed.state = AttemptState::Committed;
        committed.committed_at = Some(Utc::now());
        let attempt_bytes = Self::serialize(&committed)?;

        (
            &self.attempts,
            &self.attempts_by_student,
            &self.students,
            &self.student_ratings,
            &self.question_ratings,
            &self.concept_mastery,
        )
            .transaction(
                |(tx_attempts, tx_index, tx_students, tx_ratings, tx_items, tx_mastery)| {
                    if tx_attempts.get(attempt_key.as_bytes())?.is_some() {
                        return abort(StoreError::conflict("attempt", &attempt.id));
                    }
                    let Some(student_raw) = tx_students.get(student_key.as_bytes())? else {
                        return abort(StoreError::not_found("student", &attempt.student_id));
                    };

                    let student: Student = Self::deserialize_tx(&student_raw)?;
                    let student_rating = match tx_ratings.get(rating_key.as_bytes())? {
                        Some(raw) => Some(Self::deserialize_tx::<EloRating>(&raw)?),
                        None => None,
                    };
                    let item_rating = match tx_items.get(item_key.as_bytes())? {
                        Some(raw) => Some(Self::deserialize_tx::<EloRating>(&raw)?),
                        None => None,
                    };
                    let mut mastery = Vec::with_capacity(mastery_keys.len());
                    for (concept, key) in &mastery_keys {
                        let state = match tx_mastery.get(key.as_bytes())? {
                            Some(raw) => Some(Self::deserialize_tx::<ConceptMastery>(&raw)?),
                            None => None,
                        };
                        mastery.push((concept.clone(), state));
                    }

                    let read = ModelReadSet {
                        student,
                        student_rating,
                        item_rating,
                        mastery,
                    };
                    let (mut write, output) = apply(&read);
                    write.student.bump_version(Utc::now());

                    tx_attempts.insert(attempt_key.as_bytes(), attempt_bytes.as_slice())?;
                    tx_index.insert(index_key.as_bytes(), attempt.question_id.as_bytes())?;
                    tx_students.insert(
                        student_key.as_bytes(),
                        Self::serialize_tx(&write.student)?,
                    )?;
                    tx_ratings.insert(
                        rating_key.as_bytes(),
                        Self::serialize_tx(&write.student_rating)?,
                    )?;
                    tx_items.insert(item_key.as_bytes(), Self::serialize_tx(&write.item_rating)?)?;
                    for state in &write.mastery {
                        let key = keys::concept_mastery_key(
                            &state.student_id,
                            &state.subject,
                            &state.concept,
                        )
                        .map_err(ConflictableTransactionError::Abort)?;
                        tx_mastery.insert(key.as_bytes(), Self::serialize_tx(state)?)?;
                    }

                    Ok((output, write.student))
                },
            )
            .map_err(Self::map_tx_error)
    }

    pub fn attempt_exists(&self, attempt_id: &str) -> Result<bool, StoreError> {
        let key = keys::attempt_key(attempt_id)?;
        Ok(self.attempts.contains_key(key.as_bytes())?)
    }

    pub fn get_attempt(&self, attempt_id: &str) -> Result<Option<AttemptRecord>, StoreError> {
        let key = keys::attempt_key(attempt_id)?;
        match self.attempts.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 最近作答过的题目 id（新到旧，可能重复）
    pub fn recent_attempt_question_ids(
        &self,
        student_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let prefix = keys::attempt_student_prefix(student_id)?;
        let mut ids = Vec::with_capacity(limit);
        for item in self
            .attempts_by_student
            .scan_prefix(prefix.as_bytes())
            .take(limit)
        {
            let (_, value) = item?;
            ids.push(String::from_utf8_lossy(&value).into_owned());
        }
        Ok(ids)
    }

    pub fn list_attempts_for_student(
        &self,
        student_id: &str,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>, StoreError> {
        let prefix = keys::attempt_student_prefix(student_id)?;
        let mut records = Vec::new();
        for item in self
            .attempts_by_student
            .scan_prefix(prefix.as_bytes())
            .take(limit)
        {
            let (key_raw, _) = item?;
            let key = String::from_utf8_lossy(&key_raw);
            let Some(attempt_id) = key.rsplit(':').next() else {
                continue;
            };
            match self.get_attempt(attempt_id)? {
                Some(record) => records.push(record),
                None => tracing::warn!(student_id, attempt_id, "Dangling attempt index entry"),
            }
        }
        Ok(records)
    }
}
