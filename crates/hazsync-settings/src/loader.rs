//! Settings loading: file + deep merge + environment overrides.

use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::HazsyncSettings;

/// Path to the user settings file (`~/.hazsync/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".hazsync").join("settings.json")
}

/// Load settings from the default path with env overrides applied.
pub fn load_settings() -> Result<HazsyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from an explicit path with env overrides applied.
///
/// A missing file is not an error: defaults are used and only the env
/// layer applies.
pub fn load_settings_from_path(path: &std::path::Path) -> Result<HazsyncSettings> {
    let mut merged = serde_json::to_value(HazsyncSettings::default())?;

    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let file_value: Value = serde_json::from_str(&raw)?;
        deep_merge(&mut merged, &file_value);
        debug!(path = %path.display(), "loaded settings file");
    }

    let mut settings: HazsyncSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Recursively merge `overlay` into `base`. Objects merge key-by-key;
/// any other value replaces the base value wholesale.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        let _ = base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base_slot, _) => {
            *base_slot = overlay.clone();
        }
    }
}

/// Apply `HAZSYNC_*` environment overrides (highest priority layer).
fn apply_env_overrides(settings: &mut HazsyncSettings) -> Result<()> {
    if let Ok(host) = std::env::var("HAZSYNC_HOST") {
        settings.server.host = host;
    }
    if let Ok(port) = std::env::var("HAZSYNC_PORT") {
        settings.server.port = port.parse().map_err(|_| SettingsError::InvalidEnv {
            var: "HAZSYNC_PORT".into(),
            message: format!("expected a port number, got {port:?}"),
        })?;
    }
    if let Ok(db_path) = std::env::var("HAZSYNC_DB_PATH") {
        settings.storage.db_path = db_path;
    }
    if let Ok(secs) = std::env::var("HAZSYNC_IDLE_THRESHOLD_SECS") {
        settings.collaboration.idle_threshold_secs =
            secs.parse().map_err(|_| SettingsError::InvalidEnv {
                var: "HAZSYNC_IDLE_THRESHOLD_SECS".into(),
                message: format!("expected seconds, got {secs:?}"),
            })?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_nested_objects() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": true});
        deep_merge(&mut base, &json!({"a": {"y": 20, "z": 30}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 20, "z": 30}, "b": true}));
    }

    #[test]
    fn deep_merge_scalar_replaces() {
        let mut base = json!({"a": {"x": 1}});
        deep_merge(&mut base, &json!({"a": 5}));
        assert_eq!(base, json!({"a": 5}));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            load_settings_from_path(&dir.path().join("does-not-exist.json")).unwrap();
        assert_eq!(settings, HazsyncSettings::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9999}, "collaboration": {"onEmptySession": "pause"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.port, 9999);
        assert_eq!(
            settings.collaboration.on_empty_session,
            crate::types::EmptySessionPolicy::Pause
        );
        // Untouched sections keep defaults
        assert_eq!(settings.storage.pool_size, 16);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }
}
