use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DAILY_GOAL, MAX_CAS_RETRIES};
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub display_name: String,
    pub daily_goal: u32,
    pub daily_progress: u32,
    pub progress_date: NaiveDate,
    /// 每次提交（作答、课程、目标变更）递增，用于一致性快照读取
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn new(id: &str, display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            daily_goal: DEFAULT_DAILY_GOAL,
            daily_progress: 0,
            progress_date: now.date_naive(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 计入一次作答；跨日时先清零
    pub fn count_daily_attempt(&mut self, at: DateTime<Utc>) {
        let day = at.date_naive();
        if day > self.progress_date {
            self.progress_date = day;
            self.daily_progress = 0;
        }
        if day == self.progress_date {
            self.daily_progress = self.daily_progress.saturating_add(1);
        }
    }

    /// 指定日期的完成数，日期不一致视为 0
    pub fn progress_on(&self, day: NaiveDate) -> u32 {
        if day == self.progress_date {
            self.daily_progress
        } else {
            0
        }
    }

    pub fn bump_version(&mut self, at: DateTime<Utc>) {
        self.version = self.version.saturating_add(1);
        self.updated_at = at;
    }
}

impl Store {
    pub fn create_student(&self, student: &Student) -> Result<(), StoreError> {
        let key = keys::student_key(&student.id)?;
        let bytes = Self::serialize(student)?;

        let cas_result = self
            .students
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(bytes))
            .map_err(StoreError::Sled)?;

        if cas_result.is_err() {
            return Err(StoreError::conflict("student", &student.id));
        }
        Ok(())
    }

    pub fn get_student(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        let key = keys::student_key(student_id)?;
        match self.students.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_student(&self, student_id: &str) -> Result<Student, StoreError> {
        self.get_student(student_id)?
            .ok_or_else(|| StoreError::not_found("student", student_id))
    }

    /// 当前版本号，学生不存在时为 None
    pub fn student_version(&self, student_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.get_student(student_id)?.map(|s| s.version))
    }

    /// CAS 读-改-写，修改后自动递增版本号
    pub fn update_student_with<F>(&self, student_id: &str, mutate: F) -> Result<Student, StoreError>
    where
        F: Fn(&mut Student),
    {
        let key = keys::student_key(student_id)?;

        for _ in 0..MAX_CAS_RETRIES {
            let Some(current_raw) = self.students.get(key.as_bytes())? else {
                return Err(StoreError::not_found("student", student_id));
            };
            let mut student: Student = Self::deserialize(&current_raw)?;
            mutate(&mut student);
            student.bump_version(Utc::now());
            let next_bytes = Self::serialize(&student)?;

            let swapped = self
                .students
                .compare_and_swap(key.as_bytes(), Some(current_raw), Some(next_bytes))?;
            if swapped.is_ok() {
                return Ok(student);
            }
            tracing::debug!(student_id, "Student CAS conflict, retrying");
        }

        Err(StoreError::CasRetryExhausted {
            entity: "student".to_string(),
            key: student_id.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    pub fn count_students(&self) -> usize {
        self.students.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store::test_support::temp_store;

    #[test]
    fn create_and_load_student() {
        let (_dir, store) = temp_store();
        let student = Student::new("s1", "Ada");
        store.create_student(&student).unwrap();

        let got = store.get_student("s1").unwrap().unwrap();
        assert_eq!(got.display_name, "Ada");
        assert_eq!(got.daily_goal, DEFAULT_DAILY_GOAL);
        assert_eq!(got.version, 0);
    }

    #[test]
    fn duplicate_student_is_conflict() {
        let (_dir, store) = temp_store();
        store.create_student(&Student::new("s1", "Ada")).unwrap();
        let err = store.create_student(&Student::new("s1", "Other")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn update_with_bumps_version() {
        let (_dir, store) = temp_store();
        store.create_student(&Student::new("s1", "Ada")).unwrap();

        let updated = store.update_student_with("s1", |s| s.daily_goal = 35).unwrap();
        assert_eq!(updated.daily_goal, 35);
        assert_eq!(updated.version, 1);
        assert_eq!(store.student_version("s1").unwrap(), Some(1));
    }

    #[test]
    fn update_missing_student_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store.update_student_with("ghost", |_| {}).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn daily_counter_resets_on_new_day() {
        let mut student = Student::new("s1", "Ada");
        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        student.progress_date = day1.date_naive();

        student.count_daily_attempt(day1);
        student.count_daily_attempt(day1);
        assert_eq!(student.daily_progress, 2);

        student.count_daily_attempt(day2);
        assert_eq!(student.daily_progress, 1);
        assert_eq!(student.progress_date, day2.date_naive());
        assert_eq!(student.progress_on(day1.date_naive()), 0);
    }

    #[test]
    fn late_attempt_from_previous_day_does_not_count_today() {
        let mut student = Student::new("s1", "Ada");
        let day2 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        student.progress_date = day2.date_naive();
        student.daily_progress = 3;

        student.count_daily_attempt(day1);
        assert_eq!(student.daily_progress, 3);
    }
}
