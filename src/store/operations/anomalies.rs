use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_ANOMALY_PAGE;
use crate::store::keys;
use crate::store::{Store, StoreError};

/// 模型数值异常（BKT 分母下溢、IRT 参数退化、不变量违反）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyEvent {
    pub id: String,
    pub model: String,
    pub context: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub concept: Option<String>,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl AnomalyEvent {
    pub fn new(model: &str, context: &str, detail: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.to_string(),
            context: context.to_string(),
            student_id: None,
            concept: None,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_student(mut self, student_id: &str) -> Self {
        self.student_id = Some(student_id.to_string());
        self
    }

    pub fn with_concept(mut self, concept: &str) -> Self {
        self.concept = Some(concept.to_string());
        self
    }
}

impl Store {
    pub fn insert_anomaly(&self, event: &AnomalyEvent) -> Result<(), StoreError> {
        let key = keys::anomaly_key(event.timestamp.timestamp_millis(), &event.id)?;
        self.model_anomalies
            .insert(key.as_bytes(), Self::serialize(event)?)?;
        Ok(())
    }

    /// 最新的异常事件在前
    pub fn recent_anomalies(&self, limit: usize) -> Result<Vec<AnomalyEvent>, StoreError> {
        let limit = limit.min(MAX_ANOMALY_PAGE);
        let mut events = Vec::with_capacity(limit);
        for item in self.model_anomalies.iter().take(limit) {
            let (_, value) = item?;
            events.push(Self::deserialize(&value)?);
        }
        Ok(events)
    }
}
