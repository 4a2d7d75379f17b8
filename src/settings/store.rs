//! Persisted, observable settings.
//!
//! The store is loaded once through the sanitizer, written back after every
//! change, and can be frozen while a batch is processing so the running
//! pipeline never sees its configuration move underneath it.

use super::sanitize::{sanitize_json, try_sanitize};
use super::schema::OptimizationSettings;
use super::value::SettingValue;
use crate::error::OptimizeError;
use crate::store::Store;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

/// Settings with change notification and optional file persistence.
#[derive(Debug)]
pub struct SettingsStore {
    state: Store<OptimizationSettings>,
    path: Option<PathBuf>,
    freezes: AtomicUsize,
    /// Held for the whole read-edit-commit of one change, and while a
    /// freeze is taken.
    edits: Mutex<()>,
}

impl SettingsStore {
    /// A store that lives only in memory.
    pub fn in_memory(initial: OptimizationSettings) -> Self {
        Self {
            state: Store::new(initial),
            path: None,
            freezes: AtomicUsize::new(0),
            edits: Mutex::new(()),
        }
    }

    /// `<config dir>/glb-optimize/settings.json`, when the platform has a
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("glb-optimize").join("settings.json"))
    }

    /// Load settings from `path`.
    ///
    /// A missing file means "nothing saved yet" and yields the defaults.
    /// Unreadable content is sanitized like any other untrusted input.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, OptimizeError> {
        let path = path.into();
        let initial = match std::fs::read_to_string(&path) {
            Ok(text) => sanitize_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                OptimizationSettings::default()
            }
            Err(source) => return Err(OptimizeError::SettingsIo { path, source }),
        };

        info!("Loaded settings from {}", path.display());
        Ok(Self {
            state: Store::new(initial),
            path: Some(path),
            freezes: AtomicUsize::new(0),
            edits: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> OptimizationSettings {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<OptimizationSettings> {
        self.state.subscribe()
    }

    /// Edit the settings.
    ///
    /// The edited value must still pass the sanitizer; a rejected edit
    /// leaves the store untouched.
    pub fn update(&self, edit: impl FnOnce(&mut OptimizationSettings)) -> Result<(), OptimizeError> {
        let _edit = self.lock_edits();
        let mut candidate = self.get();
        edit(&mut candidate);
        let checked = try_sanitize(&candidate.to_tree())?;
        self.commit(checked)
    }

    /// Overlay an untyped patch, e.g. `{"simplifyOptions": {"ratio": 0.5}}`.
    ///
    /// Returns `false` when the patch changed nothing (unknown keys are
    /// dropped, as everywhere else).
    pub fn apply_patch(&self, patch: SettingValue) -> Result<bool, OptimizeError> {
        let _edit = self.lock_edits();
        let current = self.get();
        let mut tree = current.to_tree();
        tree.overlay(patch);
        let checked = try_sanitize(&tree)?;
        if checked == current {
            return Ok(false);
        }
        self.commit(checked)?;
        Ok(true)
    }

    /// Restore and persist the defaults.
    pub fn reset(&self) -> Result<(), OptimizeError> {
        let _edit = self.lock_edits();
        self.commit(OptimizationSettings::default())
    }

    /// Refuse edits until the returned guard is dropped.
    ///
    /// Waits for an edit already in progress to land first.
    pub fn freeze(&self) -> FreezeGuard<'_> {
        let _edit = self.lock_edits();
        self.freezes.fetch_add(1, Ordering::SeqCst);
        FreezeGuard { store: self }
    }

    pub fn is_frozen(&self) -> bool {
        self.freezes.load(Ordering::SeqCst) > 0
    }

    fn lock_edits(&self) -> MutexGuard<'_, ()> {
        self.edits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller holds the edit lock.
    fn commit(&self, settings: OptimizationSettings) -> Result<(), OptimizeError> {
        if self.is_frozen() {
            return Err(OptimizeError::SettingsFrozen);
        }
        if let Some(ref path) = self.path {
            persist(path, &settings)?;
        }
        self.state.replace(settings);
        Ok(())
    }
}

/// Keeps a [`SettingsStore`] frozen while alive.
#[derive(Debug)]
pub struct FreezeGuard<'a> {
    store: &'a SettingsStore,
}

impl Drop for FreezeGuard<'_> {
    fn drop(&mut self) {
        self.store.freezes.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Atomic write: temp file in the same directory, then rename.
fn persist(path: &Path, settings: &OptimizationSettings) -> Result<(), OptimizeError> {
    let io_err = |source| OptimizeError::SettingsIo {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, settings.to_pretty_json()).map_err(io_err)?;
    std::fs::rename(&tmp_path, path).map_err(io_err)?;
    debug!("Persisted settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.get(), OptimizationSettings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"enableSimplify": true, "pruneOptions": {"keepExtras": ""}}"#)
            .unwrap();
        let store = SettingsStore::open(&path).unwrap();
        assert_eq!(store.get(), OptimizationSettings::default());
    }

    #[test]
    fn every_change_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::open(&path).unwrap();
        store.update(|s| s.enable_simplify = true).unwrap();

        let reopened = SettingsStore::open(&path).unwrap();
        assert!(reopened.get().enable_simplify);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn invalid_edit_is_refused_and_state_kept() {
        let store = SettingsStore::in_memory(OptimizationSettings::default());
        let err = store
            .update(|s| s.user_settings.file_name_suffix.clear())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidSettings(_)));
        assert_eq!(store.get().user_settings.file_name_suffix, "_optimized");
    }

    #[test]
    fn patch_overlays_current_settings() {
        let store = SettingsStore::in_memory(OptimizationSettings::default());
        store.update(|s| s.enable_simplify = true).unwrap();
        let changed = store
            .apply_patch(SettingValue::from(json!({"simplifyOptions": {"ratio": 0.4}})))
            .unwrap();
        assert!(changed);
        let s = store.get();
        assert!(s.enable_simplify, "earlier edit must survive the patch");
        assert_eq!(s.simplify_options.ratio, 0.4);

        let unchanged = store
            .apply_patch(SettingValue::from(json!({"noSuchKey": 1})))
            .unwrap();
        assert!(!unchanged);
    }

    #[test]
    fn frozen_store_rejects_edits_until_guard_drops() {
        let store = SettingsStore::in_memory(OptimizationSettings::default());
        {
            let _guard = store.freeze();
            assert!(store.is_frozen());
            let err = store.update(|s| s.enable_join = false).unwrap_err();
            assert!(matches!(err, OptimizeError::SettingsFrozen));
            assert!(store.get().enable_join);
        }
        assert!(!store.is_frozen());
        store.update(|s| s.enable_join = false).unwrap();
        assert!(!store.get().enable_join);
    }

    #[test]
    fn subscribers_see_updates() {
        let store = SettingsStore::in_memory(OptimizationSettings::default());
        let mut rx = store.subscribe();
        store.update(|s| s.enable_weld = false).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().enable_weld);
    }

    #[test]
    fn concurrent_edits_are_not_lost() {
        let store = SettingsStore::in_memory(OptimizationSettings::default());
        let edits: [fn(&mut OptimizationSettings); 6] = [
            |s| s.enable_simplify = true,
            |s| s.enable_center = true,
            |s| s.enable_meshopt = true,
            |s| s.enable_quantize = true,
            |s| s.enable_sparse = true,
            |s| s.enable_normals = true,
        ];
        std::thread::scope(|scope| {
            for edit in edits {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..20 {
                        store.update(edit).unwrap();
                    }
                });
            }
        });
        let s = store.get();
        assert!(s.enable_simplify && s.enable_center && s.enable_meshopt);
        assert!(s.enable_quantize && s.enable_sparse && s.enable_normals);
    }

    #[test]
    fn reset_restores_defaults() {
        let store = SettingsStore::in_memory(OptimizationSettings::default());
        store.update(|s| s.enable_normals = true).unwrap();
        store.reset().unwrap();
        assert_eq!(store.get(), OptimizationSettings::default());
    }
}
