use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::adaptive::models::bkt::BktParams;
use crate::adaptive::models::elo::EloRating;
use crate::adaptive::models::irt::IrtParams;
use crate::adaptive::types::DifficultyBand;
use crate::constants::DEFAULT_ITEM_RATING;
use crate::store::keys;
use crate::store::{Store, StoreError};
use crate::validation::{validate_identifier, validate_rating};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub subject: String,
    #[serde(default, alias = "tags")]
    pub concepts: Vec<String>,
    #[serde(default = "default_band", deserialize_with = "band_or_medium")]
    pub difficulty: DifficultyBand,
    #[serde(default)]
    pub parameters: QuestionParameters,
}

/// 题库侧提供的静态元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionParameters {
    #[serde(default = "default_item_rating")]
    pub elo_rating: f64,
    #[serde(default)]
    pub bkt: Option<BktParams>,
    #[serde(default)]
    pub irt: Option<IrtParams>,
}

fn default_item_rating() -> f64 {
    DEFAULT_ITEM_RATING
}

fn default_band() -> DifficultyBand {
    DifficultyBand::Medium
}

/// 题库中缺失或无法识别的难度按 Medium 处理
fn band_or_medium<'de, D>(deserializer: D) -> Result<DifficultyBand, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    match DifficultyBand::deserialize(&raw) {
        Ok(band) => Ok(band),
        Err(_) => {
            tracing::warn!(difficulty = %raw, "Unknown difficulty, using Medium");
            Ok(default_band())
        }
    }
}

impl Default for QuestionParameters {
    fn default() -> Self {
        Self {
            elo_rating: DEFAULT_ITEM_RATING,
            bkt: None,
            irt: None,
        }
    }
}

impl Question {
    /// Concept tags the BKT update applies to; untagged questions count
    /// toward the subject itself.
    pub fn concept_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::with_capacity(self.concepts.len().max(1));
        for concept in &self.concepts {
            let trimmed = concept.trim();
            if !trimmed.is_empty() && !tags.iter().any(|t| t == trimmed) {
                tags.push(trimmed.to_string());
            }
        }
        if tags.is_empty() {
            tags.push(self.subject.clone());
        }
        tags
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_identifier(&self.id).map_err(|e| format!("id {e}"))?;
        validate_identifier(&self.subject).map_err(|e| format!("subject {e}"))?;
        for concept in &self.concepts {
            validate_identifier(concept.trim()).map_err(|e| format!("concept {e}"))?;
        }
        validate_rating(self.parameters.elo_rating).map_err(|e| format!("eloRating {e}"))?;
        if let Some(bkt) = &self.parameters.bkt {
            bkt.validate().map_err(|e| format!("bkt.{e}"))?;
        }
        if let Some(irt) = &self.parameters.irt {
            irt.validate().map_err(|e| format!("irt.{e}"))?;
        }
        Ok(())
    }
}

impl Store {
    /// 写入或更新题目：维护学科索引，首次写入时用 eloRating 初始化在线难度评分。
    ///
    /// 已存在的在线评分不会被元数据覆盖。
    pub fn upsert_question(&self, question: &Question) -> Result<(), StoreError> {
        question.validate().map_err(StoreError::Validation)?;

        let key = keys::question_key(&question.id)?;
        let bytes = Self::serialize(question)?;
        let index_key = keys::question_subject_index_key(
            &question.subject,
            question.difficulty.level(),
            &question.id,
        )?;
        let rating_key = keys::question_rating_key(&question.id)?;
        let seed_rating = Self::serialize(&EloRating::new(question.parameters.elo_rating))?;

        (&self.questions, &self.questions_by_subject, &self.question_ratings)
            .transaction(|(tx_questions, tx_index, tx_ratings)| {
                if let Some(old_raw) = tx_questions.get(key.as_bytes())? {
                    let old: Question = Self::deserialize_tx(&old_raw)?;
                    let old_index_key = keys::question_subject_index_key(
                        &old.subject,
                        old.difficulty.level(),
                        &old.id,
                    )
                    .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                    tx_index.remove(old_index_key.as_bytes())?;
                }

                tx_questions.insert(key.as_bytes(), bytes.as_slice())?;
                tx_index.insert(index_key.as_bytes(), question.id.as_bytes())?;

                if tx_ratings.get(rating_key.as_bytes())?.is_none() {
                    tx_ratings.insert(rating_key.as_bytes(), seed_rating.as_slice())?;
                }
                Ok(())
            })
            .map_err(Self::map_tx_error)?;

        Ok(())
    }

    pub fn get_question(&self, question_id: &str) -> Result<Option<Question>, StoreError> {
        let key = keys::question_key(question_id)?;
        match self.questions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_question(&self, question_id: &str) -> Result<Question, StoreError> {
        self.get_question(question_id)?
            .ok_or_else(|| StoreError::not_found("question", question_id))
    }

    pub fn list_questions_by_subject(&self, subject: &str) -> Result<Vec<Question>, StoreError> {
        let prefix = keys::question_subject_prefix(subject)?;
        self.collect_indexed_questions(&prefix)
    }

    pub fn list_questions_by_subject_band(
        &self,
        subject: &str,
        band: DifficultyBand,
    ) -> Result<Vec<Question>, StoreError> {
        let prefix = keys::question_subject_band_prefix(subject, band.level())?;
        self.collect_indexed_questions(&prefix)
    }

    fn collect_indexed_questions(&self, prefix: &str) -> Result<Vec<Question>, StoreError> {
        let mut questions = Vec::new();
        for item in self.questions_by_subject.scan_prefix(prefix.as_bytes()) {
            let (_, question_id_raw) = item?;
            let question_id = match String::from_utf8(question_id_raw.to_vec()) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid UTF-8 in question subject index");
                    continue;
                }
            };
            match self.get_question(&question_id)? {
                Some(question) => questions.push(question),
                None => tracing::warn!(question_id, "Dangling question subject index entry"),
            }
        }
        Ok(questions)
    }

    /// 外部校准流程回写 IRT 参数；退化参数直接拒绝，不落盘
    pub fn update_question_irt(
        &self,
        question_id: &str,
        params: &IrtParams,
    ) -> Result<Question, StoreError> {
        params.validate().map_err(StoreError::Validation)?;

        let mut question = self.require_question(question_id)?;
        question.parameters.irt = Some(*params);
        let key = keys::question_key(question_id)?;
        self.questions
            .insert(key.as_bytes(), Self::serialize(&question)?)?;
        Ok(question)
    }

    pub fn count_questions(&self) -> usize {
        self.questions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    fn question(id: &str, subject: &str, band: DifficultyBand) -> Question {
        Question {
            id: id.to_string(),
            subject: subject.to_string(),
            concepts: vec!["fractions".to_string()],
            difficulty: band,
            parameters: QuestionParameters::default(),
        }
    }

    #[test]
    fn upsert_seeds_item_rating_once() {
        let (_dir, store) = temp_store();
        let mut q = question("q1", "Arithmetic", DifficultyBand::Easy);
        q.parameters.elo_rating = 950.0;
        store.upsert_question(&q).unwrap();
        assert_eq!(store.get_item_rating("q1").unwrap().unwrap().rating, 950.0);

        store
            .set_item_rating(
                "q1",
                &EloRating {
                    rating: 990.0,
                    games: 4,
                },
            )
            .unwrap();
        q.parameters.elo_rating = 1500.0;
        store.upsert_question(&q).unwrap();
        assert_eq!(store.get_item_rating("q1").unwrap().unwrap().rating, 990.0);
    }

    #[test]
    fn subject_index_follows_band_changes() {
        let (_dir, store) = temp_store();
        let mut q = question("q1", "Geometry", DifficultyBand::Easy);
        store.upsert_question(&q).unwrap();
        q.difficulty = DifficultyBand::Hard;
        store.upsert_question(&q).unwrap();

        let easy = store
            .list_questions_by_subject_band("Geometry", DifficultyBand::Easy)
            .unwrap();
        let hard = store
            .list_questions_by_subject_band("Geometry", DifficultyBand::Hard)
            .unwrap();
        assert!(easy.is_empty());
        assert_eq!(hard.len(), 1);
        assert_eq!(store.list_questions_by_subject("Geometry").unwrap().len(), 1);
    }

    #[test]
    fn invalid_question_is_rejected() {
        let (_dir, store) = temp_store();
        let mut q = question("q1", "Geometry", DifficultyBand::Easy);
        q.parameters.irt = Some(IrtParams {
            discrimination: 0.0,
            difficulty: 0.0,
            guessing: 0.25,
        });
        let err = store.upsert_question(&q).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.get_question("q1").unwrap().is_none());
    }

    #[test]
    fn degenerate_irt_write_back_is_rejected() {
        let (_dir, store) = temp_store();
        store
            .upsert_question(&question("q1", "Geometry", DifficultyBand::Easy))
            .unwrap();
        let bad = IrtParams {
            discrimination: 1e-9,
            difficulty: 0.0,
            guessing: 0.2,
        };
        assert!(store.update_question_irt("q1", &bad).is_err());
        assert!(store.require_question("q1").unwrap().parameters.irt.is_none());

        let good = IrtParams {
            discrimination: 1.3,
            difficulty: 0.4,
            guessing: 0.2,
        };
        let updated = store.update_question_irt("q1", &good).unwrap();
        assert_eq!(updated.parameters.irt, Some(good));
    }

    #[test]
    fn untagged_question_uses_subject_as_concept() {
        let mut q = question("q1", "Combinatorics", DifficultyBand::Medium);
        q.concepts = vec![" ".to_string()];
        assert_eq!(q.concept_tags(), vec!["Combinatorics".to_string()]);

        q.concepts = vec!["paths".to_string(), "paths".to_string(), "grids".to_string()];
        assert_eq!(q.concept_tags(), vec!["paths".to_string(), "grids".to_string()]);
    }
}
