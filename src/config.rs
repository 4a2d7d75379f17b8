//! Configuration for the batch orchestrator.
//!
//! Optimisation settings (what to do to each asset) live in
//! [`crate::settings`]. This module holds the knobs of the machinery around
//! them: which files the queue accepts, how long URL downloads may take,
//! and who hears about progress.
//!
//! Built via [`OrchestratorConfig::builder()`] or
//! [`OrchestratorConfig::default()`].

use crate::error::OptimizeError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Configuration for a [`crate::batch::BatchOrchestrator`].
///
/// # Example
/// ```rust
/// use glb_optimize::OrchestratorConfig;
///
/// let config = OrchestratorConfig::builder()
///     .accepted_extension("glb")
///     .download_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OrchestratorConfig {
    /// File extension the queue accepts, without the dot, compared
    /// case-insensitively. Default: `glb`.
    pub accepted_extension: String,

    /// Timeout for downloading URL inputs, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-file progress callback. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            accepted_extension: "glb".to_string(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("accepted_extension", &self.accepted_extension)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl OrchestratorConfig {
    /// Create a new builder for `OrchestratorConfig`.
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder {
            config: Self::default(),
        }
    }

    /// `true` when `name` carries the accepted extension.
    pub fn accepts(&self, name: &str) -> bool {
        name.rsplit_once('.').is_some_and(|(stem, ext)| {
            !stem.is_empty() && ext.eq_ignore_ascii_case(&self.accepted_extension)
        })
    }
}

/// Builder for [`OrchestratorConfig`].
#[derive(Debug)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    pub fn accepted_extension(mut self, ext: impl Into<String>) -> Self {
        let ext: String = ext.into();
        self.config.accepted_extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OrchestratorConfig, OptimizeError> {
        let c = &self.config;
        if c.accepted_extension.is_empty() {
            return Err(OptimizeError::InvalidConfig(
                "Accepted extension must not be empty".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(OptimizeError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgressCallback;
    use std::sync::Arc;

    #[test]
    fn default_config_is_valid() {
        let config = OrchestratorConfig::builder().build().unwrap();
        assert_eq!(config.accepted_extension, "glb");
        assert_eq!(config.download_timeout_secs, 120);
        assert!(config.progress_callback.is_none());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let config = OrchestratorConfig::default();
        assert!(config.accepts("chair.glb"));
        assert!(config.accepts("CHAIR.GLB"));
        assert!(config.accepts("my.model.Glb"));
        assert!(!config.accepts("chair.gltf"));
        assert!(!config.accepts("chair.glb.zip"));
        assert!(!config.accepts("glb"));
        assert!(!config.accepts(".glb"));
    }

    #[test]
    fn leading_dot_is_stripped() {
        let config = OrchestratorConfig::builder()
            .accepted_extension(".gltf")
            .build()
            .unwrap();
        assert!(config.accepts("scene.gltf"));
    }

    #[test]
    fn rejects_empty_extension() {
        let err = OrchestratorConfig::builder()
            .accepted_extension("")
            .build()
            .unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(OrchestratorConfig::builder()
            .download_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let config = OrchestratorConfig::builder()
            .progress_callback(Arc::new(NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(dbg.contains("<dyn BatchProgressCallback>"));
    }
}
