//! Binary glTF (GLB) container access.
//!
//! Framing (header, chunk headers, 4-byte padding) is handled by
//! [`gltf::binary::Glb`]. The JSON chunk is kept as a [`serde_json::Value`]
//! so edits such as [`GlbContainer::set_double_sided`] can touch one
//! attribute without modelling the whole glTF schema. The BIN chunk is
//! carried through untouched.

use crate::error::GlbError;
use gltf::binary::{Glb, Header};
use serde_json::Value;
use std::borrow::Cow;

/// A parsed GLB file.
#[derive(Debug, Clone, PartialEq)]
pub struct GlbContainer {
    pub json: Value,
    pub bin: Option<Vec<u8>>,
}

impl GlbContainer {
    pub fn parse(bytes: &[u8]) -> Result<Self, GlbError> {
        let glb = Glb::from_slice(bytes)?;
        let json = serde_json::from_slice(&glb.json)?;
        Ok(Self {
            json,
            bin: glb.bin.map(Cow::into_owned),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, GlbError> {
        let json = serde_json::to_vec(&self.json)?;
        let glb = Glb {
            // `to_vec` recomputes the length and pads both chunks.
            header: Header {
                magic: *b"glTF",
                version: 2,
                length: 0,
            },
            json: Cow::Owned(json),
            bin: self.bin.as_deref().map(Cow::Borrowed),
        };
        Ok(glb.to_vec()?)
    }

    /// Set `doubleSided` on every material. Returns how many were touched.
    pub fn set_double_sided(&mut self, double_sided: bool) -> usize {
        let Some(materials) = self.json.get_mut("materials").and_then(Value::as_array_mut) else {
            return 0;
        };
        let mut touched = 0;
        for material in materials.iter_mut().filter_map(Value::as_object_mut) {
            material.insert("doubleSided".to_string(), Value::Bool(double_sided));
            touched += 1;
        }
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> GlbContainer {
        GlbContainer {
            json: json!({
                "asset": {"version": "2.0"},
                "materials": [{"name": "wood"}, {"name": "metal", "doubleSided": true}]
            }),
            bin: Some(vec![1, 2, 3]),
        }
    }

    #[test]
    fn written_container_is_aligned_and_parses_back() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(&bytes[..4], b"glTF");
        assert_eq!(
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            bytes.len()
        );

        let parsed = GlbContainer::parse(&bytes).unwrap();
        assert_eq!(parsed.json, sample().json);
        // BIN keeps its zero padding.
        assert_eq!(parsed.bin.as_deref(), Some(&[1, 2, 3, 0][..]));
    }

    #[test]
    fn json_only_container() {
        let glb = GlbContainer {
            json: json!({"asset": {"version": "2.0"}}),
            bin: None,
        };
        let parsed = GlbContainer::parse(&glb.to_bytes().unwrap()).unwrap();
        assert!(parsed.bin.is_none());
        assert_eq!(parsed.json["asset"]["version"], json!("2.0"));
    }

    #[test]
    fn set_double_sided_touches_every_material() {
        let mut glb = sample();
        assert_eq!(glb.set_double_sided(false), 2);
        assert_eq!(glb.json["materials"][0]["doubleSided"], json!(false));
        assert_eq!(glb.json["materials"][1]["doubleSided"], json!(false));
        assert_eq!(glb.json["materials"][0]["name"], json!("wood"));
    }

    #[test]
    fn set_double_sided_without_materials_is_noop() {
        let mut glb = GlbContainer {
            json: json!({"asset": {"version": "2.0"}}),
            bin: None,
        };
        assert_eq!(glb.set_double_sided(true), 0);
        assert!(glb.json.get("materials").is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'x';
        assert!(matches!(
            GlbContainer::parse(&bytes),
            Err(GlbError::Container(_))
        ));
    }

    #[test]
    fn rejects_short_and_truncated_buffers() {
        assert!(matches!(
            GlbContainer::parse(b"glTF"),
            Err(GlbError::Container(_))
        ));

        let bytes = sample().to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 4];
        assert!(matches!(
            GlbContainer::parse(cut),
            Err(GlbError::Container(_))
        ));
    }

    #[test]
    fn rejects_version_one() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());
        assert!(GlbContainer::parse(&bytes).is_err());
    }

    #[test]
    fn json_chunk_that_is_not_json_is_reported() {
        let glb = Glb {
            header: Header {
                magic: *b"glTF",
                version: 2,
                length: 0,
            },
            json: Cow::Borrowed(b"{not json"),
            bin: None,
        };
        let bytes = glb.to_vec().unwrap();
        assert!(matches!(
            GlbContainer::parse(&bytes),
            Err(GlbError::Json(_))
        ));
    }
}
