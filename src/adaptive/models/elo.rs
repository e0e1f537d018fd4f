//! Elo rating for student-question difficulty matching.
//!
//! Students carry one rating per subject, questions carry one item rating.
//! Both move after every committed attempt; items move slower except during
//! their cold start.

use serde::{Deserialize, Serialize};

use crate::adaptive::config::EloConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EloRating {
    pub rating: f64,
    pub games: u32,
}

impl EloRating {
    pub fn new(rating: f64) -> Self {
        Self { rating, games: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EloUpdate {
    pub expected: f64,
    pub student: EloRating,
    pub item: EloRating,
    pub k_item_applied: f64,
}

/// Expected score for player A against player B
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b - rating_a) / 400.0))
}

/// Item K-factor, widened while the item has too little history
pub fn item_k_factor(item_games: u32, config: &EloConfig) -> f64 {
    if item_games < config.cold_start_attempts {
        config.k_item * config.cold_start_multiplier
    } else {
        config.k_item
    }
}

/// Update both ratings after an answer.
///
/// `|student' - student| <= k_student` always holds since `|actual - E| <= 1`.
pub fn update(
    student: EloRating,
    item: EloRating,
    is_correct: bool,
    config: &EloConfig,
) -> EloUpdate {
    let expected = expected_score(student.rating, item.rating);
    let actual = if is_correct { 1.0 } else { 0.0 };
    let k_item = item_k_factor(item.games, config);

    EloUpdate {
        expected,
        student: EloRating {
            rating: student.rating + config.k_student * (actual - expected),
            games: student.games.saturating_add(1),
        },
        item: EloRating {
            rating: item.rating + k_item * (expected - actual),
            games: item.games.saturating_add(1),
        },
        k_item_applied: k_item,
    }
}

/// Rescale an Elo rating into IRT ability units
pub fn elo_to_ability(rating: f64, config: &EloConfig) -> f64 {
    (rating - config.ability_offset) / config.ability_scale
}

pub fn ability_to_elo(ability: f64, config: &EloConfig) -> f64 {
    ability * config.ability_scale + config.ability_offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_match_correct_answer_gains_half_k() {
        let config = EloConfig::default();
        let item = EloRating {
            rating: 1000.0,
            games: 100,
        };
        let out = update(EloRating::new(1000.0), item, true, &config);
        assert!((out.expected - 0.5).abs() < 1e-12);
        assert!((out.student.rating - 1012.0).abs() < 1e-9);
        assert!((out.item.rating - 996.0).abs() < 1e-9);
        assert_eq!(out.student.games, 1);
    }

    #[test]
    fn cold_start_item_moves_faster() {
        let config = EloConfig::default();
        let fresh = update(EloRating::new(1000.0), EloRating::new(1000.0), false, &config);
        let settled = update(
            EloRating::new(1000.0),
            EloRating {
                rating: 1000.0,
                games: config.cold_start_attempts,
            },
            false,
            &config,
        );
        assert_eq!(fresh.k_item_applied, config.k_item * config.cold_start_multiplier);
        assert_eq!(settled.k_item_applied, config.k_item);
        assert!(fresh.item.rating - 1000.0 > settled.item.rating - 1000.0);
    }

    #[test]
    fn ratings_converge_in_opposite_directions() {
        let config = EloConfig::default();
        let mut student = EloRating::new(1000.0);
        let mut item = EloRating::new(1200.0);
        for _ in 0..20 {
            let out = update(student, item, true, &config);
            student = out.student;
            item = out.item;
        }
        assert!(student.rating > 1000.0);
        assert!(item.rating < 1200.0);
    }

    #[test]
    fn ability_rescale_round_trips() {
        let config = EloConfig::default();
        assert_eq!(elo_to_ability(1400.0, &config), 1.0);
        assert_eq!(ability_to_elo(-0.5, &config), 800.0);
    }
}
