use serde::{Deserialize, Serialize};

use crate::error::FaceError;

/// How host animation graphs combine facial bone output with the base pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Output is the absolute local bone pose.
    #[default]
    Replace,
    /// Output is an offset from the host reference pose.
    Additive,
}

/// Per-character configuration, resolved by the host and passed to `Character::load`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Undo the -90 degree yaw baked into skeletons imported with a forced front X axis.
    pub compensate_axis: bool,
    pub disable_morph_targets: bool,
    pub disable_material_parameters: bool,
    /// Suppress dispatch of in-clip payload events.
    pub ignore_events: bool,
    pub blend_mode: BlendMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compensate_axis: false,
            disable_morph_targets: false,
            disable_material_parameters: false,
            ignore_events: false,
            blend_mode: BlendMode::Replace,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, FaceError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = Config::from_json(r#"{ "blend_mode": "additive", "ignore_events": true }"#)
            .unwrap();
        assert_eq!(cfg.blend_mode, BlendMode::Additive);
        assert!(cfg.ignore_events);
        assert!(!cfg.compensate_axis);
        assert!(!cfg.disable_morph_targets);
    }

    #[test]
    fn test_bad_json_is_load_error() {
        let err = Config::from_json("{ \"blend_mode\": 3 }").unwrap_err();
        assert_eq!(err.category(), "load");
    }
}
