use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adaptive::config::EngineConfig;
use crate::store::keys;
use crate::store::{Store, StoreError};

const ENGINE_CONFIG_TYPE: &str = "engine";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigVersion {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub config: EngineConfig,
}

impl Store {
    /// 保存新的引擎配置版本，同时更新 latest 指针；返回新版本号
    pub fn save_engine_config(&self, config: &EngineConfig) -> Result<u32, StoreError> {
        let latest_key = keys::config_latest_key(ENGINE_CONFIG_TYPE)?;
        let next_version = match self.config_versions.get(latest_key.as_bytes())? {
            Some(raw) => Self::deserialize::<ConfigVersion>(&raw)?.version + 1,
            None => 1,
        };

        let entry = ConfigVersion {
            version: next_version,
            saved_at: Utc::now(),
            config: config.clone(),
        };
        let bytes = Self::serialize(&entry)?;
        let version_key = keys::config_version_key(ENGINE_CONFIG_TYPE, next_version)?;

        let mut batch = sled::Batch::default();
        batch.insert(version_key.as_bytes(), bytes.as_slice());
        batch.insert(latest_key.as_bytes(), bytes.as_slice());
        self.config_versions.apply_batch(batch)?;

        Ok(next_version)
    }

    pub fn latest_engine_config(&self) -> Result<Option<ConfigVersion>, StoreError> {
        let key = keys::config_latest_key(ENGINE_CONFIG_TYPE)?;
        match self.config_versions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_engine_config_version(
        &self,
        version: u32,
    ) -> Result<Option<ConfigVersion>, StoreError> {
        let key = keys::config_version_key(ENGINE_CONFIG_TYPE, version)?;
        match self.config_versions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}
