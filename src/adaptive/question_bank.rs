//! JSON question bank import.
//!
//! Format: `{ "questions": [ { "id", "subject", "difficulty", "concepts"?,
//! "parameters": { "eloRating"?, "bkt"?, "irt"? } } ] }`. A missing or
//! unknown difficulty is read as Medium. Entries that fail to parse or
//! validate are skipped with a warning; the rest are upserted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::store::operations::questions::Question;
use crate::store::{Store, StoreError};

#[derive(Debug, Deserialize)]
struct RawBank {
    #[serde(default)]
    questions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    pub questions: Vec<Question>,
    /// 解析失败的条目数
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

impl QuestionBank {
    pub fn from_json_str(raw: &str) -> Result<Self, EngineError> {
        let bank: RawBank =
            serde_json::from_str(raw).map_err(|e| EngineError::Store(StoreError::from(e)))?;

        let mut questions = Vec::with_capacity(bank.questions.len());
        let mut rejected = 0usize;
        for (index, value) in bank.questions.into_iter().enumerate() {
            match serde_json::from_value::<Question>(value) {
                Ok(question) => questions.push(question),
                Err(e) => {
                    rejected += 1;
                    tracing::warn!(index, error = %e, "Skipping unparseable question");
                }
            }
        }
        Ok(Self {
            questions,
            rejected,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("cannot read question bank {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// 逐题写入；校验失败的题目跳过，存储错误直接返回
    pub fn import(&self, store: &Store) -> Result<ImportSummary, EngineError> {
        let mut summary = ImportSummary {
            imported: 0,
            skipped: self.rejected,
        };
        for question in &self.questions {
            match store.upsert_question(question) {
                Ok(()) => summary.imported += 1,
                Err(StoreError::Validation(reason)) => {
                    summary.skipped += 1;
                    tracing::warn!(question_id = %question.id, reason, "Skipping invalid question");
                }
                Err(e) => return Err(EngineError::from_store(&question.id, e)),
            }
        }
        tracing::info!(
            imported = summary.imported,
            skipped = summary.skipped,
            "Question bank imported"
        );
        Ok(summary)
    }
}
