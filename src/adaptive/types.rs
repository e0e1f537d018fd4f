use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::operations::lessons::LessonRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DifficultyBand {
    Easy,
    Medium,
    Hard,
    Olympiad,
}

impl DifficultyBand {
    pub const ALL: [DifficultyBand; 4] = [
        DifficultyBand::Easy,
        DifficultyBand::Medium,
        DifficultyBand::Hard,
        DifficultyBand::Olympiad,
    ];

    /// 1..=4 display level
    pub fn level(self) -> u8 {
        match self {
            DifficultyBand::Easy => 1,
            DifficultyBand::Medium => 2,
            DifficultyBand::Hard => 3,
            DifficultyBand::Olympiad => 4,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(DifficultyBand::Easy),
            2 => Some(DifficultyBand::Medium),
            3 => Some(DifficultyBand::Hard),
            4 => Some(DifficultyBand::Olympiad),
            _ => None,
        }
    }

    pub fn easier(self) -> Self {
        Self::from_level(self.level().saturating_sub(1)).unwrap_or(DifficultyBand::Easy)
    }

    pub fn harder(self) -> Self {
        Self::from_level(self.level() + 1).unwrap_or(DifficultyBand::Olympiad)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyBand::Easy => "Easy",
            DifficultyBand::Medium => "Medium",
            DifficultyBand::Hard => "Hard",
            DifficultyBand::Olympiad => "Olympiad",
        }
    }
}

/// One submitted answer, as handed over by the ingestion side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptEvent {
    pub attempt_id: String,
    pub student_id: String,
    pub question_id: String,
    pub is_correct: bool,
    pub response_time_ms: i64,
    pub timestamp: DateTime<Utc>,
}

impl AttemptEvent {
    /// Fresh attempt id; callers that retry must resubmit the same event.
    pub fn new(
        student_id: &str,
        question_id: &str,
        is_correct: bool,
        response_time_ms: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            question_id: question_id.to_string(),
            is_correct,
            response_time_ms,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    Received,
    Validated,
    Applied,
    Committed,
}

impl AttemptState {
    pub fn next(self) -> Option<Self> {
        match self {
            AttemptState::Received => Some(AttemptState::Validated),
            AttemptState::Validated => Some(AttemptState::Applied),
            AttemptState::Applied => Some(AttemptState::Committed),
            AttemptState::Committed => None,
        }
    }

    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptState::Received => "received",
            AttemptState::Validated => "validated",
            AttemptState::Applied => "applied",
            AttemptState::Committed => "committed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAnomalyReport {
    pub model: String,
    pub concept: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptUpdate {
    pub concept: String,
    pub prior: f64,
    pub posterior: f64,
    /// false when the BKT update was rejected and the prior kept
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub attempt_id: String,
    pub state: AttemptState,
    pub subject: String,
    pub expected_score: f64,
    pub student_rating_before: f64,
    pub student_rating_after: f64,
    pub item_rating_before: f64,
    pub item_rating_after: f64,
    pub concept_updates: Vec<ConceptUpdate>,
    pub anomalies: Vec<ModelAnomalyReport>,
    pub student_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFilter {
    pub subject: String,
    pub band: DifficultyBand,
    pub target_low: f64,
    pub target_high: f64,
    pub focus_concept: Option<String>,
    pub exclude_question_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandEstimate {
    pub band: DifficultyBand,
    pub probability: f64,
    pub source: EstimateSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EstimateSource {
    ItemIrt,
    ItemElo,
    BandProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyDecision {
    pub band: DifficultyBand,
    /// band chosen from Elo/IRT before the mastery gate
    pub suggested_band: DifficultyBand,
    pub expected_probability: f64,
    pub ability: f64,
    pub mastery: Option<f64>,
    pub override_applied: bool,
    pub estimates: Vec<BandEstimate>,
    pub filter: CandidateFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredQuestion {
    pub question_id: String,
    pub band: DifficultyBand,
    pub predicted_probability: f64,
    /// BKT 按学生已练习概念给出的答对概率，没有练习记录时为 None
    pub mastery_probability: Option<f64>,
    pub information: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub subject: String,
    pub score: f64,
    pub concept_count: usize,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakArea {
    pub subject: String,
    pub concept: String,
    pub concept_score: f64,
    pub last_practiced: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityLevel {
    pub elo_rating: f64,
    pub ability: f64,
    pub band: DifficultyBand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyGoalProgress {
    pub goal: u32,
    pub completed: u32,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningProgress {
    pub student_id: String,
    pub ability_level: AbilityLevel,
    pub subject_scores: Vec<SubjectScore>,
    pub weak_areas: Vec<WeakArea>,
    pub lesson_history: Vec<LessonRecord>,
    pub daily_goal: DailyGoalProgress,
    pub student_version: u64,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_levels_round_trip() {
        for band in DifficultyBand::ALL {
            assert_eq!(DifficultyBand::from_level(band.level()), Some(band));
        }
        assert_eq!(DifficultyBand::from_level(0), None);
        assert_eq!(DifficultyBand::from_level(5), None);
    }

    #[test]
    fn band_steps_saturate() {
        assert_eq!(DifficultyBand::Easy.easier(), DifficultyBand::Easy);
        assert_eq!(DifficultyBand::Hard.easier(), DifficultyBand::Medium);
        assert_eq!(DifficultyBand::Olympiad.harder(), DifficultyBand::Olympiad);
    }

    #[test]
    fn band_serializes_by_name() {
        let json = serde_json::to_string(&DifficultyBand::Olympiad).unwrap();
        assert_eq!(json, "\"Olympiad\"");
    }

    #[test]
    fn attempt_state_only_moves_forward() {
        assert!(AttemptState::Received.can_advance_to(AttemptState::Validated));
        assert!(AttemptState::Applied.can_advance_to(AttemptState::Committed));
        assert!(!AttemptState::Received.can_advance_to(AttemptState::Committed));
        assert!(!AttemptState::Committed.can_advance_to(AttemptState::Received));
        assert_eq!(AttemptState::Committed.next(), None);
    }

    #[test]
    fn attempt_event_serializes_camel_case() {
        let event = AttemptEvent::new("s1", "q1", true, 1500, Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("attemptId").is_some());
        assert!(json.get("responseTimeMs").is_some());
        assert!(!event.attempt_id.is_empty());
    }
}
