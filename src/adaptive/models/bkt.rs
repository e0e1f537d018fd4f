//! Bayesian Knowledge Tracing: per-concept probability of mastery.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::validate_probability;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktParams {
    pub p_learn: f64,
    pub p_guess: f64,
    pub p_slip: f64,
    /// 概念首次作答时的掌握先验
    #[serde(default)]
    pub p_known: Option<f64>,
    #[serde(default)]
    pub p_forget: f64,
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            p_learn: 0.1,
            p_guess: 0.2,
            p_slip: 0.1,
            p_known: None,
            p_forget: 0.0,
        }
    }
}

impl BktParams {
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("pLearn", self.p_learn),
            ("pGuess", self.p_guess),
            ("pSlip", self.p_slip),
            ("pForget", self.p_forget),
        ];
        for (name, value) in fields {
            validate_probability(value).map_err(|e| format!("{name} {e}"))?;
        }
        if let Some(prior) = self.p_known {
            validate_probability(prior).map_err(|e| format!("pKnown {e}"))?;
        }
        Ok(())
    }

    fn clamped(&self) -> Self {
        Self {
            p_learn: clamp_probability(self.p_learn),
            p_guess: clamp_probability(self.p_guess),
            p_slip: clamp_probability(self.p_slip),
            p_known: self.p_known.map(clamp_probability),
            p_forget: clamp_probability(self.p_forget),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktUpdate {
    pub prior: f64,
    pub posterior: f64,
    pub next: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("evidence denominator underflow (prior={prior}, correct={correct}, denominator={denominator})")]
pub struct BktAnomaly {
    pub prior: f64,
    pub correct: bool,
    pub denominator: f64,
}

/// NaN 视为 0，其余截断到 [0,1]
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Evidence step (Bayes on the observed answer) followed by the
/// learn/forget transition.
///
/// A vanishing evidence denominator is reported instead of producing NaN;
/// the caller keeps the prior in that case.
pub fn update(prior: f64, is_correct: bool, params: &BktParams) -> Result<BktUpdate, BktAnomaly> {
    let p = clamp_probability(prior);
    let params = params.clamped();

    let (numerator, denominator) = if is_correct {
        let known = p * (1.0 - params.p_slip);
        (known, known + (1.0 - p) * params.p_guess)
    } else {
        let known = p * params.p_slip;
        (known, known + (1.0 - p) * (1.0 - params.p_guess))
    };

    if !denominator.is_finite() || denominator <= f64::MIN_POSITIVE {
        return Err(BktAnomaly {
            prior: p,
            correct: is_correct,
            denominator,
        });
    }

    let posterior = clamp_probability(numerator / denominator);
    let next = clamp_probability(
        posterior * (1.0 - params.p_forget) + (1.0 - posterior) * params.p_learn,
    );

    Ok(BktUpdate {
        prior: p,
        posterior,
        next,
    })
}

/// Probability of a correct answer given current mastery
pub fn predict_correct(p_known: f64, params: &BktParams) -> f64 {
    let p = clamp_probability(p_known);
    let params = params.clamped();
    clamp_probability(p * (1.0 - params.p_slip) + (1.0 - p) * params.p_guess)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(p_learn: f64, p_guess: f64, p_slip: f64, p_forget: f64) -> BktParams {
        BktParams {
            p_learn,
            p_guess,
            p_slip,
            p_known: None,
            p_forget,
        }
    }

    #[test]
    fn correct_answer_reference_values() {
        let out = update(0.5, true, &params(0.4, 0.2, 0.1, 0.05)).unwrap();
        assert!((out.posterior - 0.45 / 0.55).abs() < 1e-12);
        let expected_next = out.posterior * 0.95 + (1.0 - out.posterior) * 0.4;
        assert!((out.next - expected_next).abs() < 1e-12);
        assert!((out.next - 0.850).abs() < 1e-3);
    }

    #[test]
    fn incorrect_answer_lowers_mastery_before_transition() {
        let out = update(0.6, false, &params(0.0, 0.2, 0.1, 0.0)).unwrap();
        assert!(out.posterior < 0.6);
        assert_eq!(out.next, out.posterior);
    }

    #[test]
    fn degenerate_parameters_report_anomaly() {
        // prior 0 with guess 0 cannot explain a correct answer
        let err = update(0.0, true, &params(0.1, 0.0, 0.1, 0.0)).unwrap_err();
        assert!(err.correct);
        assert_eq!(err.prior, 0.0);

        // certain mastery with no slip cannot explain a wrong answer
        assert!(update(1.0, false, &params(0.1, 0.2, 0.0, 0.0)).is_err());
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let out = update(1.7, true, &params(2.0, -1.0, 0.1, 0.0)).unwrap();
        assert!((0.0..=1.0).contains(&out.next));
        assert_eq!(out.prior, 1.0);
    }

    #[test]
    fn predict_correct_interpolates_guess_and_slip() {
        let p = params(0.1, 0.25, 0.1, 0.0);
        assert!((predict_correct(0.0, &p) - 0.25).abs() < 1e-12);
        assert!((predict_correct(1.0, &p) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(params(0.1, 0.2, 0.1, 0.0).validate().is_ok());
        assert!(params(0.1, 1.2, 0.1, 0.0).validate().is_err());
        let mut bad_prior = params(0.1, 0.2, 0.1, 0.0);
        bad_prior.p_known = Some(-0.1);
        assert!(bad_prior.validate().is_err());
    }
}
