pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub students: sled::Tree,
    pub questions: sled::Tree,
    pub question_ratings: sled::Tree,
    pub student_ratings: sled::Tree,
    pub concept_mastery: sled::Tree,
    pub attempts: sled::Tree,
    pub lessons: sled::Tree,
    pub model_anomalies: sled::Tree,
    pub config_versions: sled::Tree,
    // Secondary index trees
    pub questions_by_subject: sled::Tree,
    pub attempts_by_student: sled::Tree,
    pub lesson_index: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub(crate) fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn conflict(entity: &str, key: &str) -> Self {
        Self::Conflict {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let students = db.open_tree(trees::STUDENTS)?;
        let questions = db.open_tree(trees::QUESTIONS)?;
        let question_ratings = db.open_tree(trees::QUESTION_RATINGS)?;
        let student_ratings = db.open_tree(trees::STUDENT_RATINGS)?;
        let concept_mastery = db.open_tree(trees::CONCEPT_MASTERY)?;
        let attempts = db.open_tree(trees::ATTEMPTS)?;
        let lessons = db.open_tree(trees::LESSONS)?;
        let model_anomalies = db.open_tree(trees::MODEL_ANOMALIES)?;
        let config_versions = db.open_tree(trees::CONFIG_VERSIONS)?;
        // Secondary index trees
        let questions_by_subject = db.open_tree(trees::QUESTIONS_BY_SUBJECT)?;
        let attempts_by_student = db.open_tree(trees::ATTEMPTS_BY_STUDENT)?;
        let lesson_index = db.open_tree(trees::LESSON_INDEX)?;

        Ok(Self {
            db,
            students,
            questions,
            question_ratings,
            student_ratings,
            concept_mastery,
            attempts,
            lessons,
            model_anomalies,
            config_versions,
            questions_by_subject,
            attempts_by_student,
            lesson_index,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// 事务闭包内的反序列化，失败时中止事务
    pub(crate) fn deserialize_tx<T: DeserializeOwned>(
        bytes: &[u8],
    ) -> Result<T, ConflictableTransactionError<StoreError>> {
        serde_json::from_slice(bytes)
            .map_err(|error| ConflictableTransactionError::Abort(StoreError::Serialization(error)))
    }

    pub(crate) fn serialize_tx<T: Serialize>(
        value: &T,
    ) -> Result<Vec<u8>, ConflictableTransactionError<StoreError>> {
        serde_json::to_vec(value)
            .map_err(|error| ConflictableTransactionError::Abort(StoreError::Serialization(error)))
    }

    pub(crate) fn map_tx_error(error: TransactionError<StoreError>) -> StoreError {
        match error {
            TransactionError::Abort(store_error) => store_error,
            TransactionError::Storage(storage_error) => StoreError::Sled(storage_error),
        }
    }
}
