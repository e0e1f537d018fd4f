use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// 学生在单个概念上的 BKT 状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMastery {
    pub student_id: String,
    pub subject: String,
    pub concept: String,
    pub p_known: f64,
    pub attempts: u32,
    pub correct: u32,
    pub last_practiced: DateTime<Utc>,
}

impl ConceptMastery {
    pub fn new(
        student_id: &str,
        subject: &str,
        concept: &str,
        p_known: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id: student_id.to_string(),
            subject: subject.to_string(),
            concept: concept.to_string(),
            p_known,
            attempts: 0,
            correct: 0,
            last_practiced: created_at,
        }
    }

    pub fn record(&mut self, p_known: f64, is_correct: bool, at: DateTime<Utc>) {
        self.p_known = p_known;
        self.attempts = self.attempts.saturating_add(1);
        if is_correct {
            self.correct = self.correct.saturating_add(1);
        }
        if at > self.last_practiced {
            self.last_practiced = at;
        }
    }
}

impl Store {
    pub fn get_concept_mastery(
        &self,
        student_id: &str,
        subject: &str,
        concept: &str,
    ) -> Result<Option<ConceptMastery>, StoreError> {
        let key = keys::concept_mastery_key(student_id, subject, concept)?;
        match self.concept_mastery.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list_concept_mastery(&self, student_id: &str) -> Result<Vec<ConceptMastery>, StoreError> {
        let prefix = keys::concept_mastery_prefix(student_id)?;
        self.scan_mastery(&prefix)
    }

    pub fn list_subject_mastery(
        &self,
        student_id: &str,
        subject: &str,
    ) -> Result<Vec<ConceptMastery>, StoreError> {
        let prefix = keys::concept_mastery_subject_prefix(student_id, subject)?;
        self.scan_mastery(&prefix)
    }

    fn scan_mastery(&self, prefix: &str) -> Result<Vec<ConceptMastery>, StoreError> {
        let mut result = Vec::new();
        for item in self.concept_mastery.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            result.push(Self::deserialize(&value)?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store::test_support::temp_store;

    fn put(store: &Store, m: &ConceptMastery) {
        let key = keys::concept_mastery_key(&m.student_id, &m.subject, &m.concept).unwrap();
        store
            .concept_mastery
            .insert(key.as_bytes(), Store::serialize(m).unwrap())
            .unwrap();
    }

    #[test]
    fn record_tracks_counts_and_latest_time() {
        let t1 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 4, 30, 8, 0, 0).unwrap();
        let mut m = ConceptMastery::new("s1", "Geometry", "angles", 0.3, t0);
        m.record(0.5, true, t1);
        m.record(0.4, false, t0);
        assert_eq!(m.attempts, 2);
        assert_eq!(m.correct, 1);
        assert_eq!(m.p_known, 0.4);
        assert_eq!(m.last_practiced, t1);
    }

    #[test]
    fn subject_listing_is_scoped() {
        let (_dir, store) = temp_store();
        put(&store, &ConceptMastery::new("s1", "Geometry", "angles", 0.4, Utc::now()));
        put(&store, &ConceptMastery::new("s1", "Geometry", "area", 0.6, Utc::now()));
        put(&store, &ConceptMastery::new("s1", "Arithmetic", "fractions", 0.2, Utc::now()));
        put(&store, &ConceptMastery::new("s2", "Geometry", "angles", 0.9, Utc::now()));

        assert_eq!(store.list_concept_mastery("s1").unwrap().len(), 3);
        let geometry = store.list_subject_mastery("s1", "Geometry").unwrap();
        assert_eq!(geometry.len(), 2);
        assert!(geometry.iter().all(|m| m.subject == "Geometry"));

        let got = store
            .get_concept_mastery("s2", "Geometry", "angles")
            .unwrap()
            .unwrap();
        assert_eq!(got.p_known, 0.9);
    }
}
