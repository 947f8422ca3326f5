/// User-facing settings and the normalization policy derived from them
use serde::{Deserialize, Serialize};

use crate::error::StashError;
use crate::lifespan::DEFAULT_LIFESPAN_DAYS;

/// How query strings are treated when building the canonical form of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationPolicy {
    pub strip_all_params: bool,
    pub strip_tracking_params: bool,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        NormalizationPolicy {
            strip_all_params: false,
            strip_tracking_params: true,
        }
    }
}

/// Settings as stored by the extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StashSettings {
    /// Lifespan given to newly stashed items, in days
    pub stale_days: u32,
    pub close_after_stash: bool,
    pub close_pinned: bool,
    pub strip_all_params: bool,
    pub strip_tracking_params: bool,
}

impl Default for StashSettings {
    fn default() -> Self {
        StashSettings {
            stale_days: DEFAULT_LIFESPAN_DAYS,
            close_after_stash: true,
            close_pinned: false,
            strip_all_params: false,
            strip_tracking_params: true,
        }
    }
}

/// Partial update to [`StashSettings`]; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub stale_days: Option<u32>,
    pub close_after_stash: Option<bool>,
    pub close_pinned: Option<bool>,
    pub strip_all_params: Option<bool>,
    pub strip_tracking_params: Option<bool>,
}

impl SettingsPatch {
    pub fn from_json(json: &str) -> Result<SettingsPatch, StashError> {
        serde_json::from_str(json).map_err(|e| StashError::InvalidSettings(e.to_string()))
    }
}

impl StashSettings {
    /// Parse settings from a JSON blob, filling in defaults for missing keys
    pub fn from_json(json: &str) -> Result<StashSettings, StashError> {
        let settings: StashSettings = serde_json::from_str(json)
            .map_err(|e| StashError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, StashError> {
        serde_json::to_string(self).map_err(|e| StashError::InvalidSettings(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), StashError> {
        if self.stale_days == 0 {
            return Err(StashError::InvalidSettings(
                "staleDays must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a patch, returning the new settings only if they validate
    pub fn patched(&self, patch: &SettingsPatch) -> Result<StashSettings, StashError> {
        let next = StashSettings {
            stale_days: patch.stale_days.unwrap_or(self.stale_days),
            close_after_stash: patch.close_after_stash.unwrap_or(self.close_after_stash),
            close_pinned: patch.close_pinned.unwrap_or(self.close_pinned),
            strip_all_params: patch.strip_all_params.unwrap_or(self.strip_all_params),
            strip_tracking_params: patch
                .strip_tracking_params
                .unwrap_or(self.strip_tracking_params),
        };
        next.validate()?;
        Ok(next)
    }

    pub fn policy(&self) -> NormalizationPolicy {
        NormalizationPolicy {
            strip_all_params: self.strip_all_params,
            strip_tracking_params: self.strip_tracking_params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_extension() {
        let settings = StashSettings::default();
        assert_eq!(settings.stale_days, 30);
        assert!(settings.close_after_stash);
        assert!(!settings.close_pinned);
        assert_eq!(settings.policy(), NormalizationPolicy::default());
    }

    #[test]
    fn test_from_json_fills_missing_keys() {
        let settings = StashSettings::from_json(r#"{"stripAllParams": true}"#).unwrap();
        assert!(settings.strip_all_params);
        assert!(settings.strip_tracking_params);
        assert_eq!(settings.stale_days, 30);
    }

    #[test]
    fn test_from_json_rejects_zero_lifespan() {
        let err = StashSettings::from_json(r#"{"staleDays": 0}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_SETTINGS");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(StashSettings::from_json("not json").is_err());
    }

    #[test]
    fn test_patched_only_touches_given_fields() {
        let patch = SettingsPatch {
            close_pinned: Some(true),
            stale_days: Some(14),
            ..SettingsPatch::default()
        };
        let next = StashSettings::default().patched(&patch).unwrap();
        assert!(next.close_pinned);
        assert_eq!(next.stale_days, 14);
        assert!(next.close_after_stash);
    }

    #[test]
    fn test_patch_from_json() {
        let patch = SettingsPatch::from_json(r#"{"closeAfterStash": false}"#).unwrap();
        assert_eq!(patch.close_after_stash, Some(false));
        assert_eq!(patch.stale_days, None);
    }

    #[test]
    fn test_patched_validates() {
        let patch = SettingsPatch {
            stale_days: Some(0),
            ..SettingsPatch::default()
        };
        assert!(StashSettings::default().patched(&patch).is_err());
    }
}
