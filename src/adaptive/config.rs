use serde::{Deserialize, Serialize};

use crate::adaptive::models::bkt::BktParams;
use crate::adaptive::models::irt::IrtParams;
use crate::adaptive::types::DifficultyBand;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EloConfig {
    pub k_student: f64,
    pub k_item: f64,
    /// 题目历史作答数低于此值时放大 K_item（冷启动）
    pub cold_start_attempts: u32,
    pub cold_start_multiplier: f64,
    pub default_student_rating: f64,
    pub default_item_rating: f64,
    /// ability = (rating - ability_offset) / ability_scale
    pub ability_offset: f64,
    pub ability_scale: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k_student: 24.0,
            k_item: 8.0,
            cold_start_attempts: 20,
            cold_start_multiplier: 2.0,
            default_student_rating: 1000.0,
            default_item_rating: crate::constants::DEFAULT_ITEM_RATING,
            ability_offset: 1000.0,
            ability_scale: 400.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BktConfig {
    /// 概念首次作答且题目未提供 pKnown 时使用的先验
    pub default_prior: f64,
    /// 题目缺少 BKT 元数据时使用的参数
    pub default_params: BktParams,
}

impl Default for BktConfig {
    fn default() -> Self {
        Self {
            default_prior: 0.3,
            default_params: BktParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandProfile {
    pub band: DifficultyBand,
    pub elo_rating: f64,
    #[serde(default)]
    pub irt: Option<IrtParams>,
}

fn default_band_profiles() -> Vec<BandProfile> {
    DifficultyBand::ALL
        .iter()
        .map(|band| BandProfile {
            band: *band,
            elo_rating: 700.0 + 200.0 * f64::from(band.level()),
            irt: None,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectorConfig {
    pub target_low: f64,
    pub target_high: f64,
    /// 主导概念掌握度低于此值时，难度档位强制下调一级
    pub low_mastery_threshold: f64,
    /// 候选过滤中排除最近作答过的题目数量
    pub recent_exclusion_count: usize,
    pub band_profiles: Vec<BandProfile>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            target_low: 0.6,
            target_high: 0.8,
            low_mastery_threshold: 0.3,
            recent_exclusion_count: 10,
            band_profiles: default_band_profiles(),
        }
    }
}

impl SelectorConfig {
    pub fn target_midpoint(&self) -> f64 {
        (self.target_low + self.target_high) / 2.0
    }

    pub fn band_profile(&self, band: DifficultyBand) -> Option<&BandProfile> {
        self.band_profiles.iter().find(|p| p.band == band)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeakAreaConfig {
    pub threshold: f64,
}

impl Default for WeakAreaConfig {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressConfig {
    /// 快照中返回的课程记录上限
    pub lesson_history_limit: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            lesson_history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitoringConfig {
    pub persist_anomalies: bool,
    pub check_invariants: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            persist_anomalies: true,
            check_invariants: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub elo: EloConfig,
    #[serde(default)]
    pub bkt: BktConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub weak_areas: WeakAreaConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl EngineConfig {
    pub fn from_env(env_config: &crate::config::EngineEnvConfig) -> Self {
        let mut config = Self::default();
        config.apply_env(env_config);
        config
    }

    /// 环境变量覆盖优先于存储的配置版本
    pub fn apply_env(&mut self, env_config: &crate::config::EngineEnvConfig) {
        if let Some(k) = env_config.k_student {
            self.elo.k_student = k;
        }
        if let Some(k) = env_config.k_item {
            self.elo.k_item = k;
        }
        if let Some(t) = env_config.low_mastery_threshold {
            self.selector.low_mastery_threshold = t;
        }
        if let Some(t) = env_config.weak_area_threshold {
            self.weak_areas.threshold = t;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        // EloConfig
        if !(self.elo.k_student.is_finite() && self.elo.k_student > 0.0) {
            return Err("elo.k_student must be > 0".to_string());
        }
        if !(self.elo.k_item.is_finite() && self.elo.k_item > 0.0) {
            return Err("elo.k_item must be > 0".to_string());
        }
        if !(self.elo.cold_start_multiplier.is_finite() && self.elo.cold_start_multiplier >= 1.0) {
            return Err("elo.cold_start_multiplier must be >= 1".to_string());
        }
        if !(1000.0..=1200.0).contains(&self.elo.default_student_rating) {
            return Err("elo.default_student_rating must be in [1000,1200]".to_string());
        }
        if !(self.elo.default_item_rating.is_finite() && self.elo.default_item_rating > 0.0) {
            return Err("elo.default_item_rating must be > 0".to_string());
        }
        if !(self.elo.ability_scale.is_finite() && self.elo.ability_scale > 0.0) {
            return Err("elo.ability_scale must be > 0".to_string());
        }

        // BktConfig
        if !(0.0..=1.0).contains(&self.bkt.default_prior) {
            return Err("bkt.default_prior must be in [0,1]".to_string());
        }
        self.bkt
            .default_params
            .validate()
            .map_err(|e| format!("bkt.default_params: {e}"))?;

        // SelectorConfig
        let s = &self.selector;
        if !(0.0..=1.0).contains(&s.target_low) || !(0.0..=1.0).contains(&s.target_high) {
            return Err("selector target band must be within [0,1]".to_string());
        }
        if s.target_low > s.target_high {
            return Err("selector.target_low must be <= selector.target_high".to_string());
        }
        if !(0.0..=1.0).contains(&s.low_mastery_threshold) {
            return Err("selector.low_mastery_threshold must be in [0,1]".to_string());
        }
        for band in DifficultyBand::ALL {
            let Some(profile) = s.band_profile(band) else {
                return Err(format!("selector.band_profiles missing band {}", band.level()));
            };
            if !(profile.elo_rating.is_finite() && profile.elo_rating > 0.0) {
                return Err(format!(
                    "selector.band_profiles[{}].elo_rating must be > 0",
                    band.level()
                ));
            }
            if let Some(irt) = &profile.irt {
                irt.validate().map_err(|e| {
                    format!("selector.band_profiles[{}].irt: {e}", band.level())
                })?;
            }
        }

        // WeakAreaConfig
        if !(0.0..=1.0).contains(&self.weak_areas.threshold) {
            return Err("weak_areas.threshold must be in [0,1]".to_string());
        }

        // ProgressConfig
        if self.progress.lesson_history_limit == 0 {
            return Err("progress.lesson_history_limit must be > 0".to_string());
        }

        Ok(())
    }
}
