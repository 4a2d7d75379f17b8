//! The settings schema: every recognised key, its default, and its shape.
//!
//! The typed [`OptimizationSettings`] is the single source of truth. Its
//! serialised form (camelCase keys) is the persisted JSON layout, and the
//! defaults tree the sanitizer merges against is derived from
//! `OptimizationSettings::default()` exactly once.
//!
//! Options records only ever appear one level below the top; no group nests
//! another group.

use super::value::SettingValue;
use once_cell::sync::Lazy;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Complete, schema-conformant optimisation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSettings {
    pub enable_dedup: bool,
    pub dedup_options: DedupOptions,
    pub enable_texture_compression: bool,
    pub texture_compression_options: TextureCompressionOptions,
    pub enable_flatten: bool,
    pub enable_join: bool,
    pub enable_weld: bool,
    pub enable_simplify: bool,
    pub simplify_options: SimplifyOptions,
    pub enable_center: bool,
    pub center_options: CenterOptions,
    pub enable_meshopt: bool,
    pub meshopt_options: MeshoptOptions,
    pub enable_prune: bool,
    pub prune_options: PruneOptions,
    pub enable_quantize: bool,
    pub enable_resample: bool,
    pub enable_instance: bool,
    pub instance_options: InstanceOptions,
    pub enable_sparse: bool,
    pub sparse_options: SparseOptions,
    pub enable_palette: bool,
    pub palette_options: PaletteOptions,
    pub enable_normals: bool,
    pub normals_options: NormalsOptions,
    pub enable_metal_rough: bool,
    pub enable_materials_options: bool,
    pub materials_options: MaterialsOptions,
    pub user_settings: UserSettings,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            enable_dedup: true,
            dedup_options: DedupOptions {
                accessors: true,
                meshes: true,
                materials: true,
            },
            enable_texture_compression: true,
            texture_compression_options: TextureCompressionOptions {
                format: TextureFormat::Webp,
                quality: TextureQuality::Auto,
                resize: Some([1024, 1024]),
            },
            enable_flatten: true,
            enable_join: true,
            enable_weld: true,
            enable_simplify: false,
            simplify_options: SimplifyOptions {
                ratio: 0.75,
                error: 0.01,
            },
            enable_center: false,
            center_options: CenterOptions {
                pivot: CenterPivot::Center,
            },
            enable_meshopt: false,
            meshopt_options: MeshoptOptions {
                level: MeshoptLevel::Medium,
            },
            enable_prune: true,
            prune_options: PruneOptions { keep_extras: true },
            enable_quantize: false,
            enable_resample: false,
            enable_instance: false,
            instance_options: InstanceOptions { min: 5 },
            enable_sparse: false,
            sparse_options: SparseOptions { ratio: 0.1 },
            enable_palette: false,
            palette_options: PaletteOptions { min: 3 },
            enable_normals: false,
            normals_options: NormalsOptions { overwrite: true },
            enable_metal_rough: false,
            enable_materials_options: false,
            materials_options: MaterialsOptions {
                double_sided: false,
            },
            user_settings: UserSettings::default(),
        }
    }
}

impl OptimizationSettings {
    /// The untyped tree form of these settings.
    pub fn to_tree(&self) -> SettingValue {
        serde_json::to_value(self)
            .map(SettingValue::from)
            .unwrap_or_else(|_| SettingValue::empty_group())
    }

    /// Pretty JSON with a trailing newline, as persisted on disk.
    pub fn to_pretty_json(&self) -> String {
        let mut out = serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        out.push('\n');
        out
    }
}

/// Defaults in tree form; the base of every sanitizer merge.
pub(crate) static DEFAULT_TREE: Lazy<SettingValue> =
    Lazy::new(|| OptimizationSettings::default().to_tree());

// ── Option records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupOptions {
    pub accessors: bool,
    pub meshes: bool,
    pub materials: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureCompressionOptions {
    pub format: TextureFormat,
    pub quality: TextureQuality,
    /// Target `[width, height]`; `None` keeps the source resolution.
    pub resize: Option<[u32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifyOptions {
    /// Target fraction of triangles to keep.
    pub ratio: f64,
    /// Error tolerance bound, as a fraction of the mesh radius.
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterOptions {
    pub pivot: CenterPivot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshoptOptions {
    pub level: MeshoptLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOptions {
    pub keep_extras: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceOptions {
    /// Minimum number of repeats before a mesh is instanced.
    pub min: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseOptions {
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteOptions {
    pub min: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalsOptions {
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialsOptions {
    pub double_sided: bool,
}

/// Output naming preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub file_name_suffix: String,
    pub max_file_name_length: usize,
    pub shorten_file_names: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            file_name_suffix: "_optimized".to_string(),
            max_file_name_length: 20,
            shorten_file_names: false,
        }
    }
}

// ── Enumerated leaves ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    Webp,
    Jpeg,
    Png,
}

impl TextureFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TextureFormat::Webp => "webp",
            TextureFormat::Jpeg => "jpeg",
            TextureFormat::Png => "png",
        }
    }
}

/// Encoder quality: `"auto"` lets the encoder pick, a number pins it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureQuality {
    Auto,
    Fixed(u8),
}

impl Serialize for TextureQuality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TextureQuality::Auto => serializer.serialize_str("auto"),
            TextureQuality::Fixed(q) => serializer.serialize_u8(*q),
        }
    }
}

impl<'de> Deserialize<'de> for TextureQuality {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u8),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(q) => Ok(TextureQuality::Fixed(q)),
            Raw::Text(s) if s == "auto" => Ok(TextureQuality::Auto),
            Raw::Text(other) => Err(de::Error::custom(format!(
                "quality must be \"auto\" or a number, got \"{other}\""
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CenterPivot {
    Center,
    Bottom,
    Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshoptLevel {
    High,
    Medium,
    Low,
}

impl MeshoptLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            MeshoptLevel::High => "high",
            MeshoptLevel::Medium => "medium",
            MeshoptLevel::Low => "low",
        }
    }
}
