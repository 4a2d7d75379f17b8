//! The transform collaborator seam.
//!
//! The orchestrator never touches geometry itself. It hands bytes to an
//! [`AssetBackend`], which owns the document model and knows how to apply
//! each [`StepDescriptor`]. One document exists per file, and each is owned
//! by exactly one processing pass.
//!
//! Backends often need an expensive one-time setup (loading an encoder,
//! probing for an external binary). [`Readiness`] runs that setup at most
//! once and remembers the outcome, including failure, for every later file.
//! Each backend instance owns its cell, so every orchestrator sharing one
//! `Arc<B>` shares a single initialisation.

pub mod cli;
pub mod glb;

pub use cli::{CliBackendConfig, GltfTransformCli};
pub use glb::GlbContainer;

use crate::error::BackendError;
use crate::pipeline::StepDescriptor;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Document model and step application.
#[async_trait]
pub trait AssetBackend: Send + Sync {
    /// A loaded, mutable document.
    type Document: Send;

    /// Short name used in logs.
    fn name(&self) -> &str;

    /// The instance's initialise-once cell.
    fn readiness(&self) -> &Readiness;

    /// One-time setup. Called through [`Readiness`], never directly by the
    /// orchestrator.
    async fn initialize(&self) -> Result<(), BackendError>;

    /// Load a document from GLB bytes.
    async fn read(&self, bytes: &[u8]) -> Result<Self::Document, BackendError>;

    /// Set the double-sided flag on every material.
    async fn set_double_sided(
        &self,
        doc: &mut Self::Document,
        double_sided: bool,
    ) -> Result<(), BackendError>;

    async fn apply(
        &self,
        doc: &mut Self::Document,
        step: &StepDescriptor,
    ) -> Result<(), BackendError>;

    /// Serialise the document back to GLB bytes.
    async fn write(&self, doc: Self::Document) -> Result<Vec<u8>, BackendError>;
}

/// Initialise-once cell for a backend.
///
/// The first caller runs [`AssetBackend::initialize`]; concurrent callers
/// wait for it, and later callers get the cached outcome.
#[derive(Debug, Default)]
pub struct Readiness {
    cell: OnceCell<Result<(), String>>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialise `backend` through its own [`AssetBackend::readiness`].
    pub async fn ensure_ready<B: AssetBackend + ?Sized>(backend: &B) -> Result<(), String> {
        backend.readiness().ensure(backend).await
    }

    pub async fn ensure<B: AssetBackend + ?Sized>(&self, backend: &B) -> Result<(), String> {
        self.cell
            .get_or_init(|| async {
                match backend.initialize().await {
                    Ok(()) => {
                        info!("Backend '{}' ready", backend.name());
                        Ok(())
                    }
                    Err(e) => {
                        error!("Backend '{}' failed to initialise: {}", backend.name(), e);
                        Err(e.to_string())
                    }
                }
            })
            .await
            .clone()
    }

    /// `true` once initialisation has been attempted, whatever the outcome.
    pub fn is_settled(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        inits: AtomicUsize,
        fail: bool,
        readiness: Readiness,
    }

    #[async_trait]
    impl AssetBackend for CountingBackend {
        type Document = ();

        fn name(&self) -> &str {
            "counting"
        }

        fn readiness(&self) -> &Readiness {
            &self.readiness
        }

        async fn initialize(&self) -> Result<(), BackendError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BackendError::Init("encoder missing".into()))
            } else {
                Ok(())
            }
        }

        async fn read(&self, _bytes: &[u8]) -> Result<(), BackendError> {
            Ok(())
        }

        async fn set_double_sided(&self, _doc: &mut (), _v: bool) -> Result<(), BackendError> {
            Ok(())
        }

        async fn apply(&self, _doc: &mut (), _step: &StepDescriptor) -> Result<(), BackendError> {
            Ok(())
        }

        async fn write(&self, _doc: ()) -> Result<Vec<u8>, BackendError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn initialises_once() {
        let backend = CountingBackend::default();
        let readiness = Readiness::new();
        assert!(!readiness.is_settled());
        for _ in 0..3 {
            readiness.ensure(&backend).await.unwrap();
        }
        assert!(readiness.is_settled());
        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_cached() {
        let backend = CountingBackend {
            fail: true,
            ..CountingBackend::default()
        };
        let readiness = Readiness::new();
        let first = readiness.ensure(&backend).await.unwrap_err();
        let second = readiness.ensure(&backend).await.unwrap_err();
        assert_eq!(first, second);
        assert!(first.contains("encoder missing"));
        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ensure_ready_uses_the_backends_own_cell() {
        let backend = CountingBackend::default();
        Readiness::ensure_ready(&backend).await.unwrap();
        Readiness::ensure_ready(&backend).await.unwrap();
        assert!(backend.readiness().is_settled());
        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
    }
}
