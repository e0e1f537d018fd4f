//! 难度选择：把学科 Elo 换算成能力值，估计每个难度档位的答对概率，
//! 选出最接近目标区间中点的档位，再用主导概念的 BKT 掌握度做下调保护。

use std::collections::{HashMap, HashSet};

use crate::adaptive::config::{EloConfig, EngineConfig, SelectorConfig};
use crate::adaptive::models::bkt;
use crate::adaptive::models::elo::{elo_to_ability, EloRating};
use crate::adaptive::models::irt::{self, IrtParams};
use crate::adaptive::types::{
    BandEstimate, CandidateFilter, DifficultyBand, DifficultyDecision, EstimateSource,
    ScoredQuestion,
};
use crate::error::EngineError;
use crate::store::operations::mastery::ConceptMastery;
use crate::store::operations::questions::Question;
use crate::store::Store;
use crate::validation::validate_identifier;

const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandChoice {
    pub suggested: DifficultyBand,
    pub band: DifficultyBand,
    pub expected_probability: f64,
    pub override_applied: bool,
}

/// 题目的有效 IRT 参数：自带 IRT 元数据优先，否则用在线 Elo 评分的等价曲线
fn question_params(
    question: &Question,
    ratings: &HashMap<String, EloRating>,
    elo: &EloConfig,
) -> (IrtParams, EstimateSource) {
    if let Some(params) = question.parameters.irt {
        return (params, EstimateSource::ItemIrt);
    }
    let rating = ratings
        .get(&question.id)
        .map(|r| r.rating)
        .unwrap_or(question.parameters.elo_rating);
    (
        IrtParams::elo_equivalent(elo_to_ability(rating, elo), elo.ability_scale),
        EstimateSource::ItemElo,
    )
}

/// 每个档位一个估计；档位内有 IRT 元数据的题目取参数均值，其次取在线 Elo 均值，最后退回配置档案
pub fn band_estimates(
    ability: f64,
    questions: &[Question],
    ratings: &HashMap<String, EloRating>,
    config: &EngineConfig,
) -> Vec<BandEstimate> {
    let elo = &config.elo;
    DifficultyBand::ALL
        .iter()
        .map(|&band| {
            let in_band: Vec<&Question> =
                questions.iter().filter(|q| q.difficulty == band).collect();

            let irt_params: Vec<IrtParams> =
                in_band.iter().filter_map(|q| q.parameters.irt).collect();
            if let Some(mean) = IrtParams::mean(irt_params.iter()) {
                return BandEstimate {
                    band,
                    probability: irt::probability_correct(ability, &mean),
                    source: EstimateSource::ItemIrt,
                };
            }

            if !in_band.is_empty() {
                let total: f64 = in_band
                    .iter()
                    .map(|q| {
                        ratings
                            .get(&q.id)
                            .map(|r| r.rating)
                            .unwrap_or(q.parameters.elo_rating)
                    })
                    .sum();
                let mean_rating = total / in_band.len() as f64;
                let params =
                    IrtParams::elo_equivalent(elo_to_ability(mean_rating, elo), elo.ability_scale);
                return BandEstimate {
                    band,
                    probability: irt::probability_correct(ability, &params),
                    source: EstimateSource::ItemElo,
                };
            }

            let params = match config.selector.band_profile(band) {
                Some(profile) => profile.irt.unwrap_or_else(|| {
                    IrtParams::elo_equivalent(
                        elo_to_ability(profile.elo_rating, elo),
                        elo.ability_scale,
                    )
                }),
                None => IrtParams::elo_equivalent(
                    elo_to_ability(elo.default_item_rating, elo),
                    elo.ability_scale,
                ),
            };
            BandEstimate {
                band,
                probability: irt::probability_correct(ability, &params),
                source: EstimateSource::BandProfile,
            }
        })
        .collect()
}

/// 距目标中点最近的档位（差距在 1e-9 内取更难的），掌握度过低时下调一级
pub fn choose_band(
    estimates: &[BandEstimate],
    mastery: Option<f64>,
    config: &SelectorConfig,
) -> BandChoice {
    let midpoint = config.target_midpoint();
    let mut best: Option<&BandEstimate> = None;
    for estimate in estimates {
        let gap = (estimate.probability - midpoint).abs();
        best = match best {
            None => Some(estimate),
            Some(current) => {
                let current_gap = (current.probability - midpoint).abs();
                if gap < current_gap - TIE_EPSILON
                    || ((gap - current_gap).abs() <= TIE_EPSILON && estimate.band > current.band)
                {
                    Some(estimate)
                } else {
                    Some(current)
                }
            }
        };
    }

    let suggested = best.map(|e| e.band).unwrap_or(DifficultyBand::Easy);
    let override_applied = matches!(mastery, Some(m) if m < config.low_mastery_threshold)
        && suggested != DifficultyBand::Easy;
    let band = if override_applied {
        suggested.easier()
    } else {
        suggested
    };
    let expected_probability = estimates
        .iter()
        .find(|e| e.band == band)
        .map(|e| e.probability)
        .unwrap_or(midpoint);

    BandChoice {
        suggested,
        band,
        expected_probability,
        override_applied,
    }
}

/// 作答次数最多的概念，同次数按名称；未作答过的概念不参与
pub fn dominant_concept(states: &[ConceptMastery]) -> Option<&ConceptMastery> {
    states
        .iter()
        .filter(|m| m.attempts >= 1)
        .min_by(|a, b| {
            b.attempts
                .cmp(&a.attempts)
                .then_with(|| a.concept.cmp(&b.concept))
        })
}

/// 题目概念中已练习部分的 BKT 答对概率均值
fn mastery_prediction(
    question: &Question,
    mastery: &[ConceptMastery],
    config: &EngineConfig,
) -> Option<f64> {
    let params = question.parameters.bkt.unwrap_or(config.bkt.default_params);
    let predictions: Vec<f64> = question
        .concept_tags()
        .iter()
        .filter_map(|concept| {
            mastery
                .iter()
                .find(|m| m.attempts >= 1 && m.subject == question.subject && &m.concept == concept)
        })
        .map(|m| bkt::predict_correct(m.p_known, &params))
        .collect();
    if predictions.is_empty() {
        None
    } else {
        Some(predictions.iter().sum::<f64>() / predictions.len() as f64)
    }
}

/// Ranks candidates by closeness of the predicted probability to the target
/// midpoint; ties go to the more informative item, then the question id.
pub fn rank_candidates(
    ability: f64,
    candidates: &[&Question],
    ratings: &HashMap<String, EloRating>,
    mastery: &[ConceptMastery],
    config: &EngineConfig,
) -> Vec<ScoredQuestion> {
    let midpoint = config.selector.target_midpoint();
    let mut scored: Vec<ScoredQuestion> = candidates
        .iter()
        .map(|q| {
            let (params, _) = question_params(q, ratings, &config.elo);
            let predicted = irt::probability_correct(ability, &params);
            ScoredQuestion {
                question_id: q.id.clone(),
                band: q.difficulty,
                predicted_probability: predicted,
                mastery_probability: mastery_prediction(q, mastery, config),
                information: irt::item_information(ability, &params),
                score: (predicted - midpoint).abs(),
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| b.information.total_cmp(&a.information))
            .then_with(|| a.question_id.cmp(&b.question_id))
    });
    scored
}

/// 选定档位优先，其余按距离由近到远，同距离先易后难
fn widening_order(band: DifficultyBand) -> Vec<DifficultyBand> {
    let mut order = DifficultyBand::ALL.to_vec();
    order.sort_by_key(|b| ((i16::from(b.level()) - i16::from(band.level())).abs(), b.level()));
    order
}

pub fn next_difficulty(
    store: &Store,
    student_id: &str,
    subject: &str,
    config: &EngineConfig,
) -> Result<DifficultyDecision, EngineError> {
    validate_identifier(subject)
        .map_err(|message| EngineError::invalid_field(student_id, "subject", message))?;
    store
        .require_student(student_id)
        .map_err(|e| EngineError::from_store(student_id, e))?;

    let rating = store
        .get_student_rating(student_id, subject)?
        .map(|r| r.rating)
        .unwrap_or(config.elo.default_student_rating);
    let ability = elo_to_ability(rating, &config.elo);

    let questions = store.list_questions_by_subject(subject)?;
    let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
    let ratings = store.get_item_ratings_by_ids(&question_ids)?;
    let estimates = band_estimates(ability, &questions, &ratings, config);

    let subject_mastery = store.list_subject_mastery(student_id, subject)?;
    let dominant = dominant_concept(&subject_mastery);
    let mastery = dominant.map(|m| m.p_known);
    let choice = choose_band(&estimates, mastery, &config.selector);

    let mut exclude_question_ids = Vec::new();
    let mut seen = HashSet::new();
    for id in store.recent_attempt_question_ids(student_id, config.selector.recent_exclusion_count)? {
        if seen.insert(id.clone()) {
            exclude_question_ids.push(id);
        }
    }

    let focus_concept = if choice.override_applied {
        dominant.map(|m| m.concept.clone())
    } else {
        None
    };

    tracing::debug!(
        student_id,
        subject,
        ability,
        suggested = choice.suggested.level(),
        band = choice.band.level(),
        mastery = mastery.unwrap_or(-1.0),
        override_applied = choice.override_applied,
        "Difficulty selected"
    );

    Ok(DifficultyDecision {
        band: choice.band,
        suggested_band: choice.suggested,
        expected_probability: choice.expected_probability,
        ability,
        mastery,
        override_applied: choice.override_applied,
        estimates,
        filter: CandidateFilter {
            subject: subject.to_string(),
            band: choice.band,
            target_low: config.selector.target_low,
            target_high: config.selector.target_high,
            focus_concept,
            exclude_question_ids,
        },
    })
}

/// 在选定档位中挑一道题；档位内没有可用题目时向相邻档位扩展
pub fn next_question(
    store: &Store,
    student_id: &str,
    subject: &str,
    config: &EngineConfig,
) -> Result<Option<ScoredQuestion>, EngineError> {
    let decision = next_difficulty(store, student_id, subject, config)?;
    let filter = &decision.filter;
    let excluded: HashSet<&str> = filter.exclude_question_ids.iter().map(String::as_str).collect();

    let questions = store.list_questions_by_subject(subject)?;
    let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
    let ratings = store.get_item_ratings_by_ids(&question_ids)?;
    let mastery = store.list_subject_mastery(student_id, subject)?;

    for band in widening_order(filter.band) {
        let eligible: Vec<&Question> = questions
            .iter()
            .filter(|q| q.difficulty == band && !excluded.contains(q.id.as_str()))
            .collect();
        if eligible.is_empty() {
            continue;
        }

        let focused: Vec<&Question> = match &filter.focus_concept {
            Some(concept) => eligible
                .iter()
                .copied()
                .filter(|q| q.concept_tags().iter().any(|c| c == concept))
                .collect(),
            None => Vec::new(),
        };
        let pool = if focused.is_empty() { eligible } else { focused };

        if let Some(best) = rank_candidates(decision.ability, &pool, &ratings, &mastery, config)
            .into_iter()
            .next()
        {
            if band != filter.band {
                tracing::debug!(
                    student_id,
                    subject,
                    requested = filter.band.level(),
                    served = band.level(),
                    "Widened question search to adjacent band"
                );
            }
            return Ok(Some(best));
        }
    }

    tracing::info!(student_id, subject, "No eligible question");
    Ok(None)
}
