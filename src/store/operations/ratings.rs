use std::collections::HashMap;

use crate::adaptive::models::elo::EloRating;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    /// 学生在某学科的 Elo 评分，未作答过时为 None
    pub fn get_student_rating(
        &self,
        student_id: &str,
        subject: &str,
    ) -> Result<Option<EloRating>, StoreError> {
        let key = keys::student_rating_key(student_id, subject)?;
        match self.student_ratings.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 按学科名排序返回学生的全部评分
    pub fn list_student_ratings(
        &self,
        student_id: &str,
    ) -> Result<Vec<(String, EloRating)>, StoreError> {
        let prefix = keys::student_rating_prefix(student_id)?;
        let mut ratings = Vec::new();
        for item in self.student_ratings.scan_prefix(prefix.as_bytes()) {
            let (key_raw, value) = item?;
            let key = String::from_utf8_lossy(&key_raw);
            let Some(subject) = key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            ratings.push((subject.to_string(), Self::deserialize(&value)?));
        }
        Ok(ratings)
    }

    pub fn get_item_rating(&self, question_id: &str) -> Result<Option<EloRating>, StoreError> {
        let key = keys::question_rating_key(question_id)?;
        match self.question_ratings.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 批量读取题目评分，缺失的题目不出现在结果中
    pub fn get_item_ratings_by_ids(
        &self,
        question_ids: &[String],
    ) -> Result<HashMap<String, EloRating>, StoreError> {
        let mut result = HashMap::with_capacity(question_ids.len());
        for question_id in question_ids {
            if result.contains_key(question_id) {
                continue;
            }
            if let Some(rating) = self.get_item_rating(question_id)? {
                result.insert(question_id.clone(), rating);
            }
        }
        Ok(result)
    }

    pub fn set_item_rating(&self, question_id: &str, rating: &EloRating) -> Result<(), StoreError> {
        let key = keys::question_rating_key(question_id)?;
        self.question_ratings
            .insert(key.as_bytes(), Self::serialize(rating)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    #[test]
    fn missing_ratings_are_none() {
        let (_dir, store) = temp_store();
        assert!(store.get_student_rating("s1", "Geometry").unwrap().is_none());
        assert!(store.get_item_rating("q1").unwrap().is_none());
    }

    #[test]
    fn student_ratings_list_by_subject() {
        let (_dir, store) = temp_store();
        for (subject, rating) in [("Geometry", 1040.0), ("Arithmetic", 980.0)] {
            let key = keys::student_rating_key("s1", subject).unwrap();
            store
                .student_ratings
                .insert(
                    key.as_bytes(),
                    Store::serialize(&EloRating { rating, games: 3 }).unwrap(),
                )
                .unwrap();
        }
        let other = keys::student_rating_key("s10", "Geometry").unwrap();
        store
            .student_ratings
            .insert(
                other.as_bytes(),
                Store::serialize(&EloRating::new(1000.0)).unwrap(),
            )
            .unwrap();

        let ratings = store.list_student_ratings("s1").unwrap();
        let subjects: Vec<&str> = ratings.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(subjects, vec!["Arithmetic", "Geometry"]);
        assert_eq!(ratings[1].1.rating, 1040.0);
    }

    #[test]
    fn batch_item_ratings_skip_missing() {
        let (_dir, store) = temp_store();
        store.set_item_rating("q1", &EloRating::new(1100.0)).unwrap();
        let ids = vec!["q1".to_string(), "q2".to_string(), "q1".to_string()];
        let ratings = store.get_item_ratings_by_ids(&ids).unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings["q1"].rating, 1100.0);
    }
}
