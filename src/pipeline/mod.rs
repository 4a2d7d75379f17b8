//! Pipeline construction: validated settings → ordered step list.
//!
//! Steps are always emitted in one fixed order, whatever order the flags
//! were toggled in:
//!
//! ```text
//! prune ─▶ instance ─▶ dedup ─▶ palette ─▶ flatten ─▶ join ─▶ weld ─▶ center
//!   ─▶ quantize ─▶ resample ─▶ meshopt ─▶ simplify ─▶ textureCompress
//!   ─▶ sparse ─▶ normals ─▶ metalRough
//! ```
//!
//! Unused data goes first so everything downstream is smaller; instancing
//! runs before structural edits disturb mesh equality; palette runs before
//! flatten/join blur material boundaries; join benefits from a flat
//! hierarchy and weld from joined meshes; centering waits for final
//! topology; texture re-encoding is the expensive tail once geometry is
//! settled.
//!
//! The double-sided material edit is not a step. It is a flat per-material
//! property write, carried separately as [`MaterialEdit`].

pub mod step;

pub use step::{StepDescriptor, StepKind};

use crate::settings::{OptimizationSettings, TextureQuality};
use serde::{Deserialize, Serialize};

/// Direct per-material attribute writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialEdit {
    pub double_sided: bool,
}

/// Everything one file goes through, built fresh for each run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub steps: Vec<StepDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub material_edit: Option<MaterialEdit>,
}

impl Pipeline {
    pub fn from_settings(settings: &OptimizationSettings) -> Self {
        Self {
            steps: build_steps(settings),
            material_edit: settings
                .enable_materials_options
                .then_some(MaterialEdit {
                    double_sided: settings.materials_options.double_sided,
                }),
        }
    }

    /// `true` when running this pipeline would leave the document as read.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.material_edit.is_none()
    }
}

/// Build the ordered step list for `settings`.
///
/// Pure and deterministic: the same settings always produce the same list.
pub fn build_steps(settings: &OptimizationSettings) -> Vec<StepDescriptor> {
    StepKind::ORDER
        .iter()
        .filter_map(|kind| step_for(*kind, settings))
        .collect()
}

/// The descriptor for `kind`, or `None` when its flag is off.
fn step_for(kind: StepKind, s: &OptimizationSettings) -> Option<StepDescriptor> {
    match kind {
        StepKind::Prune => s.enable_prune.then(|| StepDescriptor::Prune {
            keep_extras: s.prune_options.keep_extras,
        }),
        StepKind::Instance => s.enable_instance.then(|| StepDescriptor::Instance {
            min: s.instance_options.min,
        }),
        StepKind::Dedup => s.enable_dedup.then(|| StepDescriptor::Dedup {
            accessors: s.dedup_options.accessors,
            meshes: s.dedup_options.meshes,
            materials: s.dedup_options.materials,
        }),
        StepKind::Palette => s.enable_palette.then(|| StepDescriptor::Palette {
            min: s.palette_options.min,
        }),
        StepKind::Flatten => s.enable_flatten.then_some(StepDescriptor::Flatten),
        StepKind::Join => s.enable_join.then_some(StepDescriptor::Join),
        StepKind::Weld => s.enable_weld.then_some(StepDescriptor::Weld),
        StepKind::Center => s.enable_center.then(|| StepDescriptor::Center {
            pivot: s.center_options.pivot,
        }),
        StepKind::Quantize => s.enable_quantize.then_some(StepDescriptor::Quantize),
        StepKind::Resample => s.enable_resample.then_some(StepDescriptor::Resample),
        StepKind::Meshopt => s.enable_meshopt.then(|| StepDescriptor::Meshopt {
            level: s.meshopt_options.level,
        }),
        StepKind::Simplify => s.enable_simplify.then(|| StepDescriptor::Simplify {
            ratio: s.simplify_options.ratio,
            error: s.simplify_options.error,
        }),
        StepKind::TextureCompress => s.enable_texture_compression.then(|| {
            let opts = &s.texture_compression_options;
            StepDescriptor::TextureCompress {
                target_format: opts.format,
                quality: match opts.quality {
                    TextureQuality::Auto => None,
                    TextureQuality::Fixed(q) => Some(q),
                },
                resize: opts.resize,
            }
        }),
        StepKind::Sparse => s.enable_sparse.then(|| StepDescriptor::Sparse {
            ratio: s.sparse_options.ratio,
        }),
        StepKind::Normals => s.enable_normals.then(|| StepDescriptor::Normals {
            overwrite: s.normals_options.overwrite,
        }),
        StepKind::MetalRough => s.enable_metal_rough.then_some(StepDescriptor::MetalRough),
    }
}
