use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime knobs shared by every component an [`crate::App`] creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Debounce window for refresh passes; 0 coalesces same-tick writes.
    #[serde(default)]
    pub refresh_delay_ms: u64,
    /// Used by `delay` when its argument is missing or malformed.
    #[serde(default = "default_listener_delay_ms")]
    pub default_listener_delay_ms: u64,
    #[serde(default = "default_component_attribute")]
    pub component_attribute: String,
    #[serde(default = "default_ref_attribute")]
    pub ref_attribute: String,
    /// Remove document and window listeners of components whose root left
    /// the document.
    #[serde(default = "default_teardown_on_detach")]
    pub teardown_on_detach: bool,
}

fn default_listener_delay_ms() -> u64 {
    250
}

fn default_component_attribute() -> String {
    "x-data".to_string()
}

fn default_ref_attribute() -> String {
    "x-ref".to_string()
}

fn default_teardown_on_detach() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            refresh_delay_ms: 0,
            default_listener_delay_ms: default_listener_delay_ms(),
            component_attribute: default_component_attribute(),
            ref_attribute: default_ref_attribute(),
            teardown_on_detach: default_teardown_on_detach(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }
}
