//! Three-parameter logistic IRT model.
//!
//! Item parameters are static metadata from the question repository; this
//! module only evaluates them and rejects degenerate values before they are
//! written anywhere.

use serde::{Deserialize, Serialize};

use crate::constants::MIN_DISCRIMINATION;

use super::bkt::clamp_probability;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrtParams {
    /// a
    #[serde(default = "default_discrimination")]
    pub discrimination: f64,
    /// b
    #[serde(default)]
    pub difficulty: f64,
    /// c，四选一题目的默认猜测率
    #[serde(default = "default_guessing")]
    pub guessing: f64,
}

fn default_discrimination() -> f64 {
    1.0
}

fn default_guessing() -> f64 {
    0.25
}

impl IrtParams {
    pub fn validate(&self) -> Result<(), String> {
        if !self.discrimination.is_finite() || self.discrimination < MIN_DISCRIMINATION {
            return Err(format!(
                "discrimination must be >= {MIN_DISCRIMINATION}, got {}",
                self.discrimination
            ));
        }
        if !self.difficulty.is_finite() {
            return Err("difficulty must be finite".to_string());
        }
        if !self.guessing.is_finite() || !(0.0..1.0).contains(&self.guessing) {
            return Err(format!("guessing must be in [0,1), got {}", self.guessing));
        }
        Ok(())
    }

    /// Parameters whose curve reproduces the Elo expected score against an
    /// item of the given difficulty in ability units.
    pub fn elo_equivalent(difficulty: f64, ability_scale: f64) -> Self {
        Self {
            discrimination: std::f64::consts::LN_10 * ability_scale / 400.0,
            difficulty,
            guessing: 0.0,
        }
    }

    /// Arithmetic mean of a set of item parameters
    pub fn mean<'a, I>(params: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a IrtParams>,
    {
        let mut count = 0usize;
        let mut sum = (0.0, 0.0, 0.0);
        for p in params {
            count += 1;
            sum.0 += p.discrimination;
            sum.1 += p.difficulty;
            sum.2 += p.guessing;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(Self {
            discrimination: sum.0 / n,
            difficulty: sum.1 / n,
            guessing: sum.2 / n,
        })
    }
}

/// `p = c + (1 - c) / (1 + exp(-a (ability - b)))`
pub fn probability_correct(ability: f64, params: &IrtParams) -> f64 {
    let c = clamp_probability(params.guessing);
    let z = params.discrimination * (ability - params.difficulty);
    let logistic = 1.0 / (1.0 + (-z).exp());
    clamp_probability(c + (1.0 - c) * logistic)
}

/// Fisher information of a 3PL item at the given ability
pub fn item_information(ability: f64, params: &IrtParams) -> f64 {
    let p = probability_correct(ability, params);
    let c = clamp_probability(params.guessing);
    if p <= 0.0 || p >= 1.0 || c >= 1.0 {
        return 0.0;
    }
    let a = params.discrimination;
    let info = a * a * ((1.0 - p) / p) * ((p - c) / (1.0 - c)).powi(2);
    if info.is_finite() {
        info.max(0.0)
    } else {
        0.0
    }
}
