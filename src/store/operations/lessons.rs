use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::students::Student;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    pub title: String,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub completed_at: DateTime<Utc>,
}

impl LessonRecord {
    pub fn accuracy(&self) -> Option<f64> {
        if self.questions_answered == 0 {
            None
        } else {
            Some(f64::from(self.correct_answers) / f64::from(self.questions_answered))
        }
    }
}

impl Store {
    /// 写入课程记录并递增学生版本号；同一课程 id 只能记录一次
    pub fn record_lesson(&self, lesson: &LessonRecord) -> Result<Student, StoreError> {
        let lesson_key = keys::lesson_key(
            &lesson.student_id,
            lesson.completed_at.timestamp_millis(),
            &lesson.id,
        )?;
        let index_key = keys::lesson_index_key(&lesson.id)?;
        let student_key = keys::student_key(&lesson.student_id)?;
        let lesson_bytes = Self::serialize(lesson)?;

        (&self.lesson_index, &self.lessons, &self.students)
            .transaction(|(tx_index, tx_lessons, tx_students)| {
                if tx_index.get(index_key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::conflict(
                        "lesson", &lesson.id,
                    )));
                }
                let Some(student_raw) = tx_students.get(student_key.as_bytes())? else {
                    return Err(ConflictableTransactionError::Abort(StoreError::not_found(
                        "student",
                        &lesson.student_id,
                    )));
                };
                let mut student: Student = Self::deserialize_tx(&student_raw)?;
                student.bump_version(Utc::now());

                tx_index.insert(index_key.as_bytes(), lesson_key.as_bytes())?;
                tx_lessons.insert(lesson_key.as_bytes(), lesson_bytes.as_slice())?;
                tx_students.insert(student_key.as_bytes(), Self::serialize_tx(&student)?)?;
                Ok(student)
            })
            .map_err(Self::map_tx_error)
    }

    /// 按完成时间倒序
    pub fn list_lessons(
        &self,
        student_id: &str,
        limit: usize,
    ) -> Result<Vec<LessonRecord>, StoreError> {
        let prefix = keys::lesson_prefix(student_id)?;
        let mut lessons = Vec::new();
        for item in self.lessons.scan_prefix(prefix.as_bytes()).take(limit) {
            let (_, value) = item?;
            lessons.push(Self::deserialize(&value)?);
        }
        Ok(lessons)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::test_support::temp_store;

    fn lesson(id: &str, completed_at: DateTime<Utc>) -> LessonRecord {
        LessonRecord {
            id: id.to_string(),
            student_id: "s1".to_string(),
            subject: "Number Theory".to_string(),
            title: format!("Lesson {id}"),
            questions_answered: 10,
            correct_answers: 7,
            completed_at,
        }
    }

    #[test]
    fn lessons_list_newest_first() {
        let (_dir, store) = temp_store();
        store.create_student(&Student::new("s1", "Ada")).unwrap();
        let base = Utc::now();
        store.record_lesson(&lesson("l1", base)).unwrap();
        store
            .record_lesson(&lesson("l2", base + Duration::minutes(5)))
            .unwrap();
        let student = store
            .record_lesson(&lesson("l3", base + Duration::minutes(10)))
            .unwrap();
        assert_eq!(student.version, 3);

        let ids: Vec<String> = store
            .list_lessons("s1", 2)
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec!["l3".to_string(), "l2".to_string()]);
    }

    #[test]
    fn duplicate_lesson_is_conflict() {
        let (_dir, store) = temp_store();
        store.create_student(&Student::new("s1", "Ada")).unwrap();
        let at = Utc::now();
        store.record_lesson(&lesson("l1", at)).unwrap();
        let err = store
            .record_lesson(&lesson("l1", at + Duration::minutes(1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.list_lessons("s1", 10).unwrap().len(), 1);
    }

    #[test]
    fn lesson_for_unknown_student_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store.record_lesson(&lesson("l1", Utc::now())).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn accuracy_handles_empty_lesson() {
        let mut l = lesson("l1", Utc::now());
        assert_eq!(l.accuracy(), Some(0.7));
        l.questions_answered = 0;
        l.correct_answers = 0;
        assert_eq!(l.accuracy(), None);
    }
}
