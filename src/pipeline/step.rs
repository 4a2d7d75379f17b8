//! Step descriptors: one named transformation plus only the parameters
//! relevant to it.

use crate::settings::{CenterPivot, MeshoptLevel, TextureFormat};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every transformation kind, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Prune,
    Instance,
    Dedup,
    Palette,
    Flatten,
    Join,
    Weld,
    Center,
    Quantize,
    Resample,
    Meshopt,
    Simplify,
    TextureCompress,
    Sparse,
    Normals,
    MetalRough,
}

impl StepKind {
    /// The fixed total order steps are emitted in.
    pub const ORDER: [StepKind; 16] = [
        StepKind::Prune,
        StepKind::Instance,
        StepKind::Dedup,
        StepKind::Palette,
        StepKind::Flatten,
        StepKind::Join,
        StepKind::Weld,
        StepKind::Center,
        StepKind::Quantize,
        StepKind::Resample,
        StepKind::Meshopt,
        StepKind::Simplify,
        StepKind::TextureCompress,
        StepKind::Sparse,
        StepKind::Normals,
        StepKind::MetalRough,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Prune => "prune",
            StepKind::Instance => "instance",
            StepKind::Dedup => "dedup",
            StepKind::Palette => "palette",
            StepKind::Flatten => "flatten",
            StepKind::Join => "join",
            StepKind::Weld => "weld",
            StepKind::Center => "center",
            StepKind::Quantize => "quantize",
            StepKind::Resample => "resample",
            StepKind::Meshopt => "meshopt",
            StepKind::Simplify => "simplify",
            StepKind::TextureCompress => "textureCompress",
            StepKind::Sparse => "sparse",
            StepKind::Normals => "normals",
            StepKind::MetalRough => "metalRough",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transformation to apply to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepDescriptor {
    #[serde(rename_all = "camelCase")]
    Prune { keep_extras: bool },
    Instance { min: u32 },
    Dedup {
        accessors: bool,
        meshes: bool,
        materials: bool,
    },
    Palette { min: u32 },
    Flatten,
    Join,
    Weld,
    Center { pivot: CenterPivot },
    Quantize,
    Resample,
    Meshopt { level: MeshoptLevel },
    Simplify { ratio: f64, error: f64 },
    #[serde(rename_all = "camelCase")]
    TextureCompress {
        target_format: TextureFormat,
        /// Absent when the encoder should choose.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        quality: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        resize: Option<[u32; 2]>,
    },
    Sparse { ratio: f64 },
    Normals { overwrite: bool },
    MetalRough,
}

impl StepDescriptor {
    pub fn kind(&self) -> StepKind {
        match self {
            StepDescriptor::Prune { .. } => StepKind::Prune,
            StepDescriptor::Instance { .. } => StepKind::Instance,
            StepDescriptor::Dedup { .. } => StepKind::Dedup,
            StepDescriptor::Palette { .. } => StepKind::Palette,
            StepDescriptor::Flatten => StepKind::Flatten,
            StepDescriptor::Join => StepKind::Join,
            StepDescriptor::Weld => StepKind::Weld,
            StepDescriptor::Center { .. } => StepKind::Center,
            StepDescriptor::Quantize => StepKind::Quantize,
            StepDescriptor::Resample => StepKind::Resample,
            StepDescriptor::Meshopt { .. } => StepKind::Meshopt,
            StepDescriptor::Simplify { .. } => StepKind::Simplify,
            StepDescriptor::TextureCompress { .. } => StepKind::TextureCompress,
            StepDescriptor::Sparse { .. } => StepKind::Sparse,
            StepDescriptor::Normals { .. } => StepKind::Normals,
            StepDescriptor::MetalRough => StepKind::MetalRough,
        }
    }
}

impl fmt::Display for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepDescriptor::Prune { keep_extras } => write!(f, "prune(keepExtras={keep_extras})"),
            StepDescriptor::Instance { min } => write!(f, "instance(min={min})"),
            StepDescriptor::Dedup {
                accessors,
                meshes,
                materials,
            } => write!(
                f,
                "dedup(accessors={accessors}, meshes={meshes}, materials={materials})"
            ),
            StepDescriptor::Palette { min } => write!(f, "palette(min={min})"),
            StepDescriptor::Center { pivot } => write!(f, "center(pivot={pivot:?})"),
            StepDescriptor::Meshopt { level } => write!(f, "meshopt(level={})", level.as_str()),
            StepDescriptor::Simplify { ratio, error } => {
                write!(f, "simplify(ratio={ratio}, error={error})")
            }
            StepDescriptor::TextureCompress {
                target_format,
                quality,
                resize,
            } => {
                write!(f, "textureCompress(format={}", target_format.as_str())?;
                if let Some(q) = quality {
                    write!(f, ", quality={q}")?;
                }
                if let Some([w, h]) = resize {
                    write!(f, ", resize={w}x{h}")?;
                }
                f.write_str(")")
            }
            StepDescriptor::Sparse { ratio } => write!(f, "sparse(ratio={ratio})"),
            StepDescriptor::Normals { overwrite } => write!(f, "normals(overwrite={overwrite})"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_is_sorted_by_declaration() {
        let mut sorted = StepKind::ORDER;
        sorted.sort();
        assert_eq!(sorted, StepKind::ORDER);
    }

    #[test]
    fn auto_quality_is_omitted_from_json() {
        let step = StepDescriptor::TextureCompress {
            target_format: TextureFormat::Webp,
            quality: None,
            resize: Some([1024, 1024]),
        };
        assert_eq!(
            serde_json::to_value(&step).unwrap(),
            json!({"kind": "textureCompress", "targetFormat": "webp", "resize": [1024, 1024]})
        );
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(StepDescriptor::Weld.to_string(), "weld");
        assert_eq!(
            StepDescriptor::Simplify { ratio: 0.5, error: 0.01 }.to_string(),
            "simplify(ratio=0.5, error=0.01)"
        );
        assert_eq!(StepDescriptor::MetalRough.to_string(), "metalRough");
    }
}
