pub const STUDENTS: &str = "students";
pub const QUESTIONS: &str = "questions";
pub const QUESTION_RATINGS: &str = "question_ratings";
pub const STUDENT_RATINGS: &str = "student_ratings";
pub const CONCEPT_MASTERY: &str = "concept_mastery";
pub const ATTEMPTS: &str = "attempts";
pub const LESSONS: &str = "lessons";
pub const MODEL_ANOMALIES: &str = "model_anomalies";
pub const CONFIG_VERSIONS: &str = "config_versions";

// Secondary index trees
pub const QUESTIONS_BY_SUBJECT: &str = "questions_by_subject";
pub const ATTEMPTS_BY_STUDENT: &str = "attempts_by_student";
pub const LESSON_INDEX: &str = "lesson_index";
