use serde::{Deserialize, Serialize};

use crate::error::{AmsError, Result};

/// Tunables for one user's mission list manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Upper bound on missions tracked outside the launcher list. Reaching
    /// it triggers LRU eviction before a new mission is created.
    pub max_missions: usize,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self { max_missions: 256 }
    }
}

impl MissionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_missions == 0 {
            return Err(AmsError::Config(
                "max_missions must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(MissionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = MissionConfig { max_missions: 0 };
        assert!(config.validate().is_err());
    }
}
