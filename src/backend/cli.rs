//! Backend that drives the external `gltf-transform` command.
//!
//! Each document is a working copy inside its own temporary directory.
//! Every step runs one or more commands of the form
//!
//! ```text
//! gltf-transform <command> <current.glb> <next.glb> [flags...]
//! ```
//!
//! and the output becomes the next step's input. The directory is removed
//! when the document is dropped, whether the file succeeded or not.

use super::glb::GlbContainer;
use super::{AssetBackend, Readiness};
use crate::error::BackendError;
use crate::pipeline::StepDescriptor;
use crate::settings::CenterPivot;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable that overrides the `gltf-transform` binary.
pub const BIN_ENV: &str = "GLTF_TRANSFORM_BIN";

/// Knobs for [`GltfTransformCli`].
#[derive(Debug, Clone)]
pub struct CliBackendConfig {
    /// Binary to run. Default: `$GLTF_TRANSFORM_BIN`, else `gltf-transform`
    /// from `PATH`.
    pub binary: PathBuf,

    /// Upper bound for a single command. Default: 300 s.
    ///
    /// Texture re-encoding of large atlases is the slow case; geometry
    /// steps finish in seconds.
    pub step_timeout_secs: u64,
}

impl Default for CliBackendConfig {
    fn default() -> Self {
        Self {
            binary: std::env::var_os(BIN_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("gltf-transform")),
            step_timeout_secs: 300,
        }
    }
}

/// A document being transformed on disk.
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
    current: PathBuf,
    generation: usize,
}

impl WorkingCopy {
    pub fn path(&self) -> &Path {
        &self.current
    }

    fn next_path(&mut self) -> PathBuf {
        self.generation += 1;
        self.dir.path().join(format!("stage-{:02}.glb", self.generation))
    }
}

/// [`AssetBackend`] backed by the `gltf-transform` CLI.
#[derive(Debug, Default)]
pub struct GltfTransformCli {
    config: CliBackendConfig,
    readiness: Readiness,
}

impl GltfTransformCli {
    pub fn new(config: CliBackendConfig) -> Self {
        Self {
            config,
            readiness: Readiness::new(),
        }
    }

    pub fn config(&self) -> &CliBackendConfig {
        &self.config
    }

    async fn run(&self, args: &[String]) -> Result<String, BackendError> {
        let command = format!("{} {}", self.config.binary.display(), args.join(" "));
        debug!("Running: {}", command);

        let child = Command::new(&self.config.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let secs = self.config.step_timeout_secs;
        let output = tokio::time::timeout(Duration::from_secs(secs), child)
            .await
            .map_err(|_| BackendError::Timeout {
                command: command.clone(),
                secs,
            })??;

        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl AssetBackend for GltfTransformCli {
    type Document = WorkingCopy;

    fn name(&self) -> &str {
        "gltf-transform"
    }

    fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        let version = self.run(&["--version".to_string()]).await.map_err(|e| {
            BackendError::Init(format!(
                "{} is not usable: {e}",
                self.config.binary.display()
            ))
        })?;
        info!("Using gltf-transform {}", version);
        Ok(())
    }

    async fn read(&self, bytes: &[u8]) -> Result<WorkingCopy, BackendError> {
        // Reject non-GLB input here rather than as an opaque command failure.
        GlbContainer::parse(bytes)?;

        let dir = TempDir::new()?;
        let current = dir.path().join("stage-00.glb");
        tokio::fs::write(&current, bytes).await?;
        Ok(WorkingCopy {
            dir,
            current,
            generation: 0,
        })
    }

    async fn set_double_sided(
        &self,
        doc: &mut WorkingCopy,
        double_sided: bool,
    ) -> Result<(), BackendError> {
        let bytes = tokio::fs::read(&doc.current).await?;
        let mut glb = GlbContainer::parse(&bytes)?;
        let touched = glb.set_double_sided(double_sided);
        debug!("Set doubleSided={} on {} material(s)", double_sided, touched);

        let next = doc.next_path();
        tokio::fs::write(&next, glb.to_bytes()?).await?;
        doc.current = next;
        Ok(())
    }

    async fn apply(&self, doc: &mut WorkingCopy, step: &StepDescriptor) -> Result<(), BackendError> {
        let commands = command_args(step);
        if commands.is_empty() {
            debug!("{} needs no command, skipping", step);
            return Ok(());
        }
        for command in commands {
            let next = doc.next_path();
            let mut args = Vec::with_capacity(command.len() + 2);
            let mut parts = command.into_iter();
            args.extend(parts.next());
            args.push(doc.current.display().to_string());
            args.push(next.display().to_string());
            args.extend(parts);

            self.run(&args).await?;
            doc.current = next;
        }
        Ok(())
    }

    async fn write(&self, doc: WorkingCopy) -> Result<Vec<u8>, BackendError> {
        let bytes = tokio::fs::read(&doc.current).await?;
        GlbContainer::parse(&bytes)?;
        Ok(bytes)
    }
}

/// The `gltf-transform` invocations for one step, each as
/// `[command, flags...]` without the input and output paths.
///
/// Most steps map to one command. Texture compression with a resize maps
/// to a resize followed by the encoder; centering on the origin maps to
/// nothing because the asset already sits there.
pub fn command_args(step: &StepDescriptor) -> Vec<Vec<String>> {
    fn cmd(name: &str, flags: &[(&str, String)]) -> Vec<String> {
        let mut out = vec![name.to_string()];
        for (flag, value) in flags {
            out.push(format!("--{flag}"));
            out.push(value.clone());
        }
        out
    }

    match step {
        StepDescriptor::Prune { keep_extras } => {
            vec![cmd("prune", &[("keep-extras", keep_extras.to_string())])]
        }
        StepDescriptor::Instance { min } => vec![cmd("instance", &[("min", min.to_string())])],
        StepDescriptor::Dedup {
            accessors,
            meshes,
            materials,
        } => vec![cmd(
            "dedup",
            &[
                ("accessors", accessors.to_string()),
                ("meshes", meshes.to_string()),
                ("materials", materials.to_string()),
            ],
        )],
        StepDescriptor::Palette { min } => vec![cmd("palette", &[("min", min.to_string())])],
        StepDescriptor::Flatten => vec![cmd("flatten", &[])],
        StepDescriptor::Join => vec![cmd("join", &[])],
        StepDescriptor::Weld => vec![cmd("weld", &[])],
        StepDescriptor::Center { pivot } => match pivot {
            CenterPivot::Center => vec![cmd("center", &[("pivot", "center".into())])],
            CenterPivot::Bottom => vec![cmd("center", &[("pivot", "below".into())])],
            CenterPivot::Origin => Vec::new(),
        },
        StepDescriptor::Quantize => vec![cmd("quantize", &[])],
        StepDescriptor::Resample => vec![cmd("resample", &[])],
        StepDescriptor::Meshopt { level } => {
            vec![cmd("meshopt", &[("level", level.as_str().to_string())])]
        }
        StepDescriptor::Simplify { ratio, error } => vec![cmd(
            "simplify",
            &[("ratio", ratio.to_string()), ("error", error.to_string())],
        )],
        StepDescriptor::TextureCompress {
            target_format,
            quality,
            resize,
        } => {
            let mut commands = Vec::new();
            if let Some([w, h]) = resize {
                commands.push(cmd(
                    "resize",
                    &[("width", w.to_string()), ("height", h.to_string())],
                ));
            }
            let flags: Vec<(&str, String)> =
                quality.iter().map(|q| ("quality", q.to_string())).collect();
            commands.push(cmd(target_format.as_str(), &flags));
            commands
        }
        StepDescriptor::Sparse { ratio } => vec![cmd("sparse", &[("ratio", ratio.to_string())])],
        StepDescriptor::Normals { overwrite } => {
            vec![cmd("normals", &[("overwrite", overwrite.to_string())])]
        }
        StepDescriptor::MetalRough => vec![cmd("metalrough", &[])],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MeshoptLevel, TextureFormat};

    fn flat(step: &StepDescriptor) -> Vec<String> {
        command_args(step).into_iter().map(|c| c.join(" ")).collect()
    }

    #[test]
    fn parameterless_steps_map_to_bare_commands() {
        assert_eq!(flat(&StepDescriptor::Weld), vec!["weld"]);
        assert_eq!(flat(&StepDescriptor::MetalRough), vec!["metalrough"]);
        assert_eq!(flat(&StepDescriptor::Quantize), vec!["quantize"]);
    }

    #[test]
    fn parameters_become_flags() {
        assert_eq!(
            flat(&StepDescriptor::Dedup {
                accessors: true,
                meshes: false,
                materials: true
            }),
            vec!["dedup --accessors true --meshes false --materials true"]
        );
        assert_eq!(
            flat(&StepDescriptor::Simplify {
                ratio: 0.75,
                error: 0.01
            }),
            vec!["simplify --ratio 0.75 --error 0.01"]
        );
        assert_eq!(
            flat(&StepDescriptor::Meshopt {
                level: MeshoptLevel::High
            }),
            vec!["meshopt --level high"]
        );
    }

    #[test]
    fn center_pivots() {
        assert_eq!(
            flat(&StepDescriptor::Center {
                pivot: CenterPivot::Bottom
            }),
            vec!["center --pivot below"]
        );
        assert!(command_args(&StepDescriptor::Center {
            pivot: CenterPivot::Origin
        })
        .is_empty());
    }

    #[test]
    fn texture_compress_resizes_first_and_omits_auto_quality() {
        assert_eq!(
            flat(&StepDescriptor::TextureCompress {
                target_format: TextureFormat::Webp,
                quality: None,
                resize: Some([1024, 512]),
            }),
            vec!["resize --width 1024 --height 512", "webp"]
        );
        assert_eq!(
            flat(&StepDescriptor::TextureCompress {
                target_format: TextureFormat::Jpeg,
                quality: Some(80),
                resize: None,
            }),
            vec!["jpeg --quality 80"]
        );
    }

    #[tokio::test]
    async fn read_rejects_non_glb_bytes() {
        let backend = GltfTransformCli::default();
        let err = backend.read(b"not a model at all").await.unwrap_err();
        assert!(matches!(err, BackendError::Container(_)));
    }

    #[tokio::test]
    async fn double_sided_edit_runs_without_the_binary() {
        let glb = GlbContainer {
            json: serde_json::json!({"asset": {"version": "2.0"}, "materials": [{}]}),
            bin: None,
        };
        let backend = GltfTransformCli::default();
        let mut doc = backend.read(&glb.to_bytes().unwrap()).await.unwrap();
        backend.set_double_sided(&mut doc, true).await.unwrap();
        // Origin centering is a no-op and must not spawn anything.
        backend
            .apply(
                &mut doc,
                &StepDescriptor::Center {
                    pivot: CenterPivot::Origin,
                },
            )
            .await
            .unwrap();

        let out = GlbContainer::parse(&backend.write(doc).await.unwrap()).unwrap();
        assert_eq!(out.json["materials"][0]["doubleSided"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn missing_binary_fails_initialisation() {
        let backend = GltfTransformCli::new(CliBackendConfig {
            binary: PathBuf::from("/nonexistent/gltf-transform-binary"),
            step_timeout_secs: 5,
        });
        let err = backend.initialize().await.unwrap_err();
        assert!(matches!(err, BackendError::Init(_)));
    }
}
