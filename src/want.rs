use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Set when a start request comes from cross-device continuation.
pub const FLAG_ABILITY_CONTINUATION: u32 = 0x0000_0008;

/// Boolean param set when an app-recovery framework restarts the ability.
pub const PARAM_ABILITY_RECOVERY_RESTART: &str = "ohos.ability.params.abilityRecoveryRestart";

/// A structured start request: which component to reach and with what
/// parameters. Analogous to an intent object in other mobile frameworks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Want {
    pub bundle_name: String,
    pub ability_name: String,
    pub module_name: String,
    pub device_id: String,
    pub flags: u32,
    pub params: HashMap<String, Value>,
}

impl Want {
    pub fn new(bundle_name: impl Into<String>, ability_name: impl Into<String>) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            ability_name: ability_name.into(),
            ..Self::default()
        }
    }

    pub fn with_module(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = module_name.into();
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    pub fn set_flag(mut self, flag: u32) -> Self {
        self.flags |= flag;
        self
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn set_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn bool_param(&self, key: &str) -> bool {
        self.params
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// True when both wants name the same component instance.
    pub fn same_element(&self, other: &Want) -> bool {
        self.bundle_name == other.bundle_name
            && self.ability_name == other.ability_name
            && self.module_name == other.module_name
            && self.device_id == other.device_id
    }
}

impl std::fmt::Display for Want {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}::{}",
            self.bundle_name, self.module_name, self.ability_name
        )
    }
}
