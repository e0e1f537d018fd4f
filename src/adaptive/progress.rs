use std::collections::BTreeMap;

use chrono::Utc;

use crate::adaptive::config::EngineConfig;
use crate::adaptive::models::elo::elo_to_ability;
use crate::adaptive::types::{
    AbilityLevel, DailyGoalProgress, DifficultyBand, LearningProgress, SubjectScore,
};
use crate::adaptive::weak_areas::rank_weak_areas;
use crate::error::EngineError;
use crate::store::operations::mastery::ConceptMastery;
use crate::store::Store;

/// 完整重算学生的学习进度，不使用任何缓存。
///
/// 调用方负责一致性（版本号校验或持锁），这里只做一次读取。
pub fn snapshot(
    store: &Store,
    student_id: &str,
    config: &EngineConfig,
) -> Result<LearningProgress, EngineError> {
    let student = store
        .require_student(student_id)
        .map_err(|e| EngineError::from_store(student_id, e))?;

    let ratings = store.list_student_ratings(student_id)?;
    let mastery = store.list_concept_mastery(student_id)?;
    let lessons = store.list_lessons(student_id, config.progress.lesson_history_limit)?;

    let attempted: Vec<f64> = ratings
        .iter()
        .filter(|(_, r)| r.games >= 1)
        .map(|(_, r)| r.rating)
        .collect();
    let elo_rating = if attempted.is_empty() {
        config.elo.default_student_rating
    } else {
        attempted.iter().sum::<f64>() / attempted.len() as f64
    };

    let today = Utc::now().date_naive();

    Ok(LearningProgress {
        student_id: student.id.clone(),
        ability_level: AbilityLevel {
            elo_rating,
            ability: elo_to_ability(elo_rating, &config.elo),
            band: nearest_band(elo_rating, config),
        },
        subject_scores: subject_scores(&mastery),
        weak_areas: rank_weak_areas(&mastery, config.weak_areas.threshold),
        lesson_history: lessons,
        daily_goal: DailyGoalProgress {
            goal: student.daily_goal,
            completed: student.progress_on(today),
            date: today,
        },
        student_version: student.version,
        generated_at: Utc::now(),
    })
}

/// 学科得分 = 已练习概念掌握度的均值，按学科名排序
pub fn subject_scores(mastery: &[ConceptMastery]) -> Vec<SubjectScore> {
    let mut by_subject: BTreeMap<&str, (f64, usize, u32)> = BTreeMap::new();
    for m in mastery.iter().filter(|m| m.attempts >= 1) {
        let entry = by_subject.entry(m.subject.as_str()).or_insert((0.0, 0, 0));
        entry.0 += m.p_known;
        entry.1 += 1;
        entry.2 = entry.2.saturating_add(m.attempts);
    }

    by_subject
        .into_iter()
        .map(|(subject, (sum, concept_count, attempts))| SubjectScore {
            subject: subject.to_string(),
            score: sum / concept_count as f64,
            concept_count,
            attempts,
        })
        .collect()
}

/// 评分最接近的档位（按配置的档案评分）
fn nearest_band(rating: f64, config: &EngineConfig) -> DifficultyBand {
    config
        .selector
        .band_profiles
        .iter()
        .min_by(|a, b| {
            (a.elo_rating - rating)
                .abs()
                .total_cmp(&(b.elo_rating - rating).abs())
                .then_with(|| a.band.cmp(&b.band))
        })
        .map(|p| p.band)
        .unwrap_or(DifficultyBand::Easy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mastery(subject: &str, concept: &str, p_known: f64, attempts: u32) -> ConceptMastery {
        let mut m = ConceptMastery::new("s1", subject, concept, p_known, Utc::now());
        m.attempts = attempts;
        m
    }

    #[test]
    fn subject_scores_average_attempted_concepts() {
        let states = vec![
            mastery("Geometry", "angles", 0.4, 2),
            mastery("Geometry", "area", 0.8, 3),
            mastery("Geometry", "volume", 0.0, 0),
            mastery("Arithmetic", "fractions", 0.5, 1),
        ];
        let scores = subject_scores(&states);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].subject, "Arithmetic");
        assert_eq!(scores[1].subject, "Geometry");
        assert!((scores[1].score - 0.6).abs() < 1e-12);
        assert_eq!(scores[1].concept_count, 2);
        assert_eq!(scores[1].attempts, 5);
    }

    #[test]
    fn nearest_band_uses_profiles() {
        let cfg = EngineConfig::default();
        assert_eq!(nearest_band(1000.0, &cfg), DifficultyBand::Easy);
        assert_eq!(nearest_band(1120.0, &cfg), DifficultyBand::Medium);
        assert_eq!(nearest_band(2000.0, &cfg), DifficultyBand::Olympiad);
    }

    #[test]
    fn fresh_student_snapshot_uses_defaults() {
        let (_dir, store) = crate::store::test_support::temp_store();
        store
            .create_student(&crate::store::operations::students::Student::new("s1", "Ada"))
            .unwrap();
        let progress = snapshot(&store, "s1", &EngineConfig::default()).unwrap();
        assert_eq!(progress.ability_level.elo_rating, 1000.0);
        assert_eq!(progress.ability_level.ability, 0.0);
        assert!(progress.subject_scores.is_empty());
        assert!(progress.weak_areas.is_empty());
        assert_eq!(progress.daily_goal.completed, 0);
    }

    #[test]
    fn unknown_student_is_not_found() {
        let (_dir, store) = crate::store::test_support::temp_store();
        let err = snapshot(&store, "ghost", &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
