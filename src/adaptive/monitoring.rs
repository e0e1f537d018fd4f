use serde::{Deserialize, Serialize};

use crate::adaptive::config::EngineConfig;
use crate::adaptive::types::RecordOutcome;
use crate::store::operations::anomalies::AnomalyEvent;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvariantViolation {
    pub field: String,
    pub value: f64,
    pub expected_range: String,
}

/// 提交后的结果自检：概率在 [0,1]，评分有限，单次学生评分变化不超过 K_student
pub fn check_invariants(outcome: &RecordOutcome, config: &EngineConfig) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    check_range(&mut violations, "expected_score", outcome.expected_score, 0.0, 1.0);
    for update in &outcome.concept_updates {
        check_range(
            &mut violations,
            &format!("mastery[{}].prior", update.concept),
            update.prior,
            0.0,
            1.0,
        );
        check_range(
            &mut violations,
            &format!("mastery[{}].posterior", update.concept),
            update.posterior,
            0.0,
            1.0,
        );
    }

    check_finite(&mut violations, "student_rating", outcome.student_rating_after);
    check_finite(&mut violations, "item_rating", outcome.item_rating_after);

    let k = config.elo.k_student;
    let delta = outcome.student_rating_after - outcome.student_rating_before;
    check_range(&mut violations, "student_rating_delta", delta, -k, k);

    violations
}

fn check_range(
    violations: &mut Vec<InvariantViolation>,
    field: &str,
    value: f64,
    min: f64,
    max: f64,
) {
    if value.is_nan() || value < min || value > max {
        violations.push(InvariantViolation {
            field: field.to_string(),
            value,
            expected_range: format!("[{min}, {max}]"),
        });
    }
}

fn check_finite(violations: &mut Vec<InvariantViolation>, field: &str, value: f64) {
    if !value.is_finite() {
        violations.push(InvariantViolation {
            field: field.to_string(),
            value,
            expected_range: "finite".to_string(),
        });
    }
}

/// 记录模型异常：总是写 warn 日志，按配置落盘。
///
/// 落盘失败只记录日志，不影响已提交的作答。
pub fn record_anomaly(store: &Store, event: &AnomalyEvent, persist: bool) {
    tracing::warn!(
        model = %event.model,
        context = %event.context,
        student_id = event.student_id.as_deref().unwrap_or(""),
        concept = event.concept.as_deref().unwrap_or(""),
        detail = %event.detail,
        "Model anomaly"
    );
    if !persist {
        return;
    }
    if let Err(e) = store.insert_anomaly(event) {
        tracing::warn!(error = %e, event_id = %event.id, "Failed to persist anomaly event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::types::{AttemptState, ConceptUpdate};

    fn outcome() -> RecordOutcome {
        RecordOutcome {
            attempt_id: "a1".to_string(),
            state: AttemptState::Committed,
            subject: "Arithmetic".to_string(),
            expected_score: 0.5,
            student_rating_before: 1000.0,
            student_rating_after: 1012.0,
            item_rating_before: 1000.0,
            item_rating_after: 992.0,
            concept_updates: vec![ConceptUpdate {
                concept: "fractions".to_string(),
                prior: 0.3,
                posterior: 0.6,
                applied: true,
            }],
            anomalies: vec![],
            student_version: 1,
        }
    }

    #[test]
    fn clean_outcome_has_no_violations() {
        assert!(check_invariants(&outcome(), &EngineConfig::default()).is_empty());
    }

    #[test]
    fn nan_and_oversized_jumps_are_flagged() {
        let mut o = outcome();
        o.concept_updates[0].posterior = f64::NAN;
        o.student_rating_after = 1100.0;
        let violations = check_invariants(&o, &EngineConfig::default());
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["mastery[fractions].posterior", "student_rating_delta"]);
    }

    #[test]
    fn anomaly_persistence_follows_flag() {
        let (_dir, store) = crate::store::test_support::temp_store();
        let event = AnomalyEvent::new("bkt", "record_attempt", "underflow");
        record_anomaly(&store, &event, false);
        assert!(store.recent_anomalies(10).unwrap().is_empty());
        record_anomaly(&store, &event, true);
        assert_eq!(store.recent_anomalies(10).unwrap().len(), 1);
    }
}
