use crate::adaptive::config::WeakAreaConfig;
use crate::adaptive::types::WeakArea;
use crate::store::operations::mastery::ConceptMastery;
use crate::store::{Store, StoreError};

/// 已练习且掌握度低于阈值的概念，按掌握度升序。
///
/// 同分时最近练习的在前，再按学科、概念名排序，结果完全确定。
pub fn rank_weak_areas(states: &[ConceptMastery], threshold: f64) -> Vec<WeakArea> {
    let mut weak: Vec<&ConceptMastery> = states
        .iter()
        .filter(|m| m.attempts >= 1 && m.p_known < threshold)
        .collect();

    weak.sort_by(|a, b| {
        a.p_known
            .total_cmp(&b.p_known)
            .then_with(|| b.last_practiced.cmp(&a.last_practiced))
            .then_with(|| a.subject.cmp(&b.subject))
            .then_with(|| a.concept.cmp(&b.concept))
    });

    weak.into_iter()
        .map(|m| WeakArea {
            subject: m.subject.clone(),
            concept: m.concept.clone(),
            concept_score: m.p_known,
            last_practiced: m.last_practiced,
        })
        .collect()
}

pub fn detect_weak_areas(
    store: &Store,
    student_id: &str,
    config: &WeakAreaConfig,
) -> Result<Vec<WeakArea>, StoreError> {
    let states = store.list_concept_mastery(student_id)?;
    Ok(rank_weak_areas(&states, config.threshold))
}
