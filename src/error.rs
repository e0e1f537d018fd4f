use thiserror::Error;

use crate::store::StoreError;

/// 引擎对外错误分类。
///
/// 所有拒绝都携带上下文（尝试 ID 或实体 ID 与原因），由调用方决定是否重试。
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed for {context}: {reason}")]
    Validation {
        context: String,
        reason: ValidationReason,
    },
    #[error("model anomaly in {model} for {context}: {detail}")]
    ModelAnomaly {
        model: &'static str,
        context: String,
        detail: String,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationReason {
    #[error("attempt was already committed")]
    DuplicateAttempt,
    #[error("lesson was already recorded")]
    DuplicateLesson,
    #[error("student already exists")]
    DuplicateStudent,
    #[error("response time must be positive, got {0}ms")]
    NonPositiveResponseTime(i64),
    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: &'static str,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl EngineError {
    pub fn validation(context: &str, reason: ValidationReason) -> Self {
        Self::Validation {
            context: context.to_string(),
            reason,
        }
    }

    pub fn invalid_field(context: &str, field: &'static str, message: &'static str) -> Self {
        Self::validation(context, ValidationReason::InvalidField { field, message })
    }

    pub fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// 映射存储层的 NotFound / Conflict 到引擎分类，其余保持为存储错误
    pub fn from_store(context: &str, error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, key } => Self::NotFound {
                entity: entity_label(&entity),
                id: key,
            },
            StoreError::Conflict { entity, .. } if entity == "attempt" => {
                Self::validation(context, ValidationReason::DuplicateAttempt)
            }
            StoreError::Conflict { entity, .. } if entity == "lesson" => {
                Self::validation(context, ValidationReason::DuplicateLesson)
            }
            StoreError::Conflict { entity, .. } if entity == "student" => {
                Self::validation(context, ValidationReason::DuplicateStudent)
            }
            other => Self::Store(other),
        }
    }

    /// 是否为调用方输入问题（可直接反馈给调用方，不需要告警）
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound { .. })
    }
}

fn entity_label(entity: &str) -> &'static str {
    match entity {
        "student" => "student",
        "question" => "question",
        "attempt" => "attempt",
        "lesson" => "lesson",
        _ => "record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_map_to_validation_reasons() {
        let err = EngineError::from_store(
            "a1",
            StoreError::Conflict {
                entity: "attempt".to_string(),
                key: "a1".to_string(),
            },
        );
        assert!(matches!(
            err,
            EngineError::Validation {
                reason: ValidationReason::DuplicateAttempt,
                ..
            }
        ));
        assert!(err.is_operational());
    }

    #[test]
    fn store_not_found_keeps_entity_and_id() {
        let err = EngineError::from_store(
            "a1",
            StoreError::NotFound {
                entity: "question".to_string(),
                key: "q9".to_string(),
            },
        );
        match err {
            EngineError::NotFound { entity, id } => {
                assert_eq!(entity, "question");
                assert_eq!(id, "q9");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_includes_context() {
        let err = EngineError::validation("attempt-7", ValidationReason::NonPositiveResponseTime(0));
        let text = err.to_string();
        assert!(text.contains("attempt-7"));
        assert!(text.contains("0ms"));
    }
}
