//! Settings sanitizer: untrusted tree in, schema-conformant settings out.
//!
//! Stored settings may be corrupt, written by an older release, or edited by
//! hand. The sanitizer merges whatever it is given over the defaults tree,
//! keeping only keys the schema knows, and decodes the result into
//! [`OptimizationSettings`].
//!
//! The policy is strict on purpose: one undefined or empty-string leaf
//! anywhere rejects the **whole** input, not only the branch holding it, and
//! the caller gets a fresh copy of the defaults. Stale keys, by contrast, are
//! silently dropped.

use super::schema::{OptimizationSettings, DEFAULT_TREE};
use super::value::SettingValue;
use crate::error::SanitizeError;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Sanitize an untrusted settings tree.
///
/// Never fails: any violation is logged and a fresh
/// `OptimizationSettings::default()` is returned instead.
pub fn sanitize(input: &SettingValue) -> OptimizationSettings {
    match try_sanitize(input) {
        Ok(settings) => settings,
        Err(error) => {
            warn!(
                input = %input,
                error = %error,
                "Could not parse input settings, corrupt or outdated; falling back to defaults"
            );
            OptimizationSettings::default()
        }
    }
}

/// Parse JSON text and sanitize it. Unparseable text yields the defaults.
pub fn sanitize_json(text: &str) -> OptimizationSettings {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => sanitize(&SettingValue::from(json)),
        Err(error) => {
            warn!(error = %error, "Settings are not valid JSON; falling back to defaults");
            OptimizationSettings::default()
        }
    }
}

/// The same merge as [`sanitize`], reporting the violation instead of
/// falling back.
///
/// An `Undefined` root is treated as "nothing stored" and yields the
/// defaults.
pub fn try_sanitize(input: &SettingValue) -> Result<OptimizationSettings, SanitizeError> {
    let input = match input {
        SettingValue::Undefined => return Ok(OptimizationSettings::default()),
        SettingValue::Group(map) => map,
        other => {
            return Err(SanitizeError::ShapeMismatch {
                path: "<root>".to_string(),
                expected: format!("a settings group, got {}", other.kind()),
            })
        }
    };

    let defaults = DEFAULT_TREE.as_group().ok_or_else(|| {
        SanitizeError::Schema("defaults tree is not a group".to_string())
    })?;

    let merged = SettingValue::Group(merge_group(defaults, input, "")?);
    let json = merged
        .to_json()
        .ok_or_else(|| SanitizeError::Schema("merged tree has no JSON form".to_string()))?;

    serde_json::from_value(json).map_err(|e| SanitizeError::Schema(e.to_string()))
}

/// Merge `input` over a copy of `defaults`, one level.
fn merge_group(
    defaults: &BTreeMap<String, SettingValue>,
    input: &BTreeMap<String, SettingValue>,
    prefix: &str,
) -> Result<BTreeMap<String, SettingValue>, SanitizeError> {
    let mut merged = defaults.clone();

    for (key, value) in input {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if value.is_disallowed() {
            return Err(SanitizeError::DisallowedValue {
                path,
                value: value.to_string(),
            });
        }

        let Some(default) = defaults.get(key) else {
            debug!("Dropping unknown settings key '{}'", path);
            continue;
        };

        let next = if value.as_pair().is_some() {
            // A dimension pair is a leaf, but never stands in for a group.
            if default.is_group() {
                return Err(SanitizeError::ShapeMismatch {
                    path,
                    expected: "an options group".to_string(),
                });
            }
            value.clone()
        } else if let SettingValue::Group(nested) = value {
            match default {
                SettingValue::Group(default_nested) => {
                    SettingValue::Group(merge_group(default_nested, nested, &path)?)
                }
                other => {
                    return Err(SanitizeError::ShapeMismatch {
                        path,
                        expected: other.kind().to_string(),
                    })
                }
            }
        } else {
            value.clone()
        };

        merged.insert(key.clone(), next);
    }

    Ok(merged)
}
