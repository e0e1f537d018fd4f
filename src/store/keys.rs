use crate::store::StoreError;
use crate::validation::validate_identifier;

fn component<'a>(field: &str, value: &'a str) -> Result<&'a str, StoreError> {
    validate_identifier(value)
        .map_err(|message| StoreError::Validation(format!("{field} {message}")))?;
    Ok(value)
}

fn reverse_ts(timestamp_ms: i64) -> u64 {
    let ts = timestamp_ms.max(0) as u64;
    u64::MAX - ts
}

pub fn student_key(student_id: &str) -> Result<String, StoreError> {
    Ok(component("student_id", student_id)?.to_string())
}

pub fn question_key(question_id: &str) -> Result<String, StoreError> {
    Ok(component("question_id", question_id)?.to_string())
}

pub fn question_rating_key(question_id: &str) -> Result<String, StoreError> {
    question_key(question_id)
}

pub fn question_subject_index_key(
    subject: &str,
    band_level: u8,
    question_id: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        component("subject", subject)?,
        band_level,
        component("question_id", question_id)?
    ))
}

pub fn question_subject_prefix(subject: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component("subject", subject)?))
}

pub fn question_subject_band_prefix(subject: &str, band_level: u8) -> Result<String, StoreError> {
    Ok(format!("{}:{}:", component("subject", subject)?, band_level))
}

pub fn student_rating_key(student_id: &str, subject: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}",
        component("student_id", student_id)?,
        component("subject", subject)?
    ))
}

pub fn student_rating_prefix(student_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component("student_id", student_id)?))
}

pub fn concept_mastery_key(
    student_id: &str,
    subject: &str,
    concept: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        component("student_id", student_id)?,
        component("subject", subject)?,
        component("concept", concept)?
    ))
}

pub fn concept_mastery_prefix(student_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component("student_id", student_id)?))
}

pub fn concept_mastery_subject_prefix(
    student_id: &str,
    subject: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:",
        component("student_id", student_id)?,
        component("subject", subject)?
    ))
}

pub fn attempt_key(attempt_id: &str) -> Result<String, StoreError> {
    Ok(component("attempt_id", attempt_id)?.to_string())
}

pub fn attempt_student_index_key(
    student_id: &str,
    timestamp_ms: i64,
    attempt_id: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{:020}:{}",
        component("student_id", student_id)?,
        reverse_ts(timestamp_ms),
        component("attempt_id", attempt_id)?
    ))
}

pub fn attempt_student_prefix(student_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component("student_id", student_id)?))
}

pub fn lesson_key(
    student_id: &str,
    completed_at_ms: i64,
    lesson_id: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{:020}:{}",
        component("student_id", student_id)?,
        reverse_ts(completed_at_ms),
        component("lesson_id", lesson_id)?
    ))
}

pub fn lesson_prefix(student_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component("student_id", student_id)?))
}

pub fn lesson_index_key(lesson_id: &str) -> Result<String, StoreError> {
    Ok(component("lesson_id", lesson_id)?.to_string())
}

pub fn anomaly_key(timestamp_ms: i64, event_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{:020}:{}",
        reverse_ts(timestamp_ms),
        component("event_id", event_id)?
    ))
}

pub fn config_version_key(config_type: &str, version: u32) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{:010}",
        component("config_type", config_type)?,
        version
    ))
}

pub fn config_latest_key(config_type: &str) -> Result<String, StoreError> {
    Ok(format!("{}:latest", component("config_type", config_type)?))
}
