//! Optimisation settings: schema, untyped input tree, sanitizer, and store.
//!
//! ```text
//! stored JSON ──▶ SettingValue ──▶ sanitize ──▶ OptimizationSettings
//!                   (untrusted)    (merge over      (schema-conformant)
//!                                   defaults)
//! ```
//!
//! 1. [`value`]    — the tagged union untrusted data is read into
//! 2. [`schema`]   — typed settings, defaults, and the defaults tree
//! 3. [`sanitize`] — strict recursive merge with whole-tree fallback
//! 4. [`store`]    — persisted, observable, freezable settings

pub mod sanitize;
pub mod schema;
pub mod store;
pub mod value;

pub use sanitize::{sanitize, sanitize_json, try_sanitize};
pub use schema::{
    CenterOptions, CenterPivot, DedupOptions, InstanceOptions, MaterialsOptions, MeshoptLevel,
    MeshoptOptions, NormalsOptions, OptimizationSettings, PaletteOptions, PruneOptions,
    SimplifyOptions, SparseOptions, TextureCompressionOptions, TextureFormat, TextureQuality,
    UserSettings,
};
pub use store::{FreezeGuard, SettingsStore};
pub use value::SettingValue;
