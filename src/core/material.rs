use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Codes at or above this value are texture counterparts of the scalar
/// property `code - TEXTURE_BASE`.
pub const TEXTURE_BASE: u8 = 128;

/// How a property value is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyFormat {
    Color,
    Uint8,
    Uint16,
    Uint32,
    Float,
    Texture,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Color(u32),
    Int(u32),
    Float(f32),
    /// index into `Model::textures`
    Texture(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub kind: u8,
    pub value: PropertyValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub props: Vec<Property>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: Vec::new(),
        }
    }

    pub fn get(&self, kind: u8) -> Option<PropertyValue> {
        self.props.iter().find(|p| p.kind == kind).map(|p| p.value)
    }

    /// Replaces the property of the same kind or appends a new one.
    pub fn set(&mut self, kind: u8, value: PropertyValue) {
        match self.props.iter_mut().find(|p| p.kind == kind) {
            Some(p) => p.value = value,
            None => self.props.push(Property { kind, value }),
        }
    }

    /// Opacity used to order faces on save: the alpha byte of the diffuse
    /// color, overridden by the dissolve factor.
    pub fn opacity(&self) -> u8 {
        let mut out = 255;
        for prop in &self.props {
            match (prop.kind, prop.value) {
                (DIFFUSE, PropertyValue::Color(c)) => out = (c >> 24) as u8,
                (DISSOLVE, PropertyValue::Float(d)) => {
                    out = (d.clamp(0.0, 1.0) * 255.0).round() as u8;
                    break;
                }
                _ => {}
            }
        }
        out
    }
}

pub const DIFFUSE: u8 = 0;
pub const DISSOLVE: u8 = 7;

macro_rules! property_table {
    ($( ($code:expr, $key:ident, $format:ident) ),* $(,)?) => {
        paste::paste! {
            const SCALAR_PROPERTIES: &[(u8, &str, PropertyFormat)] = &[
                $( ($code, stringify!($key), PropertyFormat::$format), )*
            ];
            const TEXTURE_PROPERTIES: &[(u8, &str)] = &[
                $( ($code + TEXTURE_BASE, stringify!([<map_ $key>])), )*
            ];
        }
    };
}

property_table! {
    (0, Kd, Color),
    (1, Ka, Color),
    (2, Ks, Color),
    (3, Ns, Float),
    (4, Ke, Color),
    (5, Tf, Color),
    (6, Km, Float),
    (7, d, Float),
    (8, il, Uint8),
    (64, Pr, Float),
    (65, Pm, Float),
    (66, Ps, Float),
    (67, Ni, Float),
    (68, Nt, Float),
}

/// Alternative spellings accepted when parsing text models.
const ALIASES: &[(&str, u8)] = &[("map_N", 136), ("bump", 134), ("refl", 193)];

lazy_static! {
    static ref BY_KEY: HashMap<&'static str, u8> = {
        let mut map = HashMap::new();
        for &(code, key, _) in SCALAR_PROPERTIES {
            map.insert(key, code);
        }
        for &(code, key) in TEXTURE_PROPERTIES {
            map.insert(key, code);
        }
        for &(key, code) in ALIASES {
            map.insert(key, code);
        }
        map
    };
}

/// Storage format of a property code, `None` for unknown codes.
pub fn property_format(kind: u8) -> Option<PropertyFormat> {
    if kind >= TEXTURE_BASE {
        return TEXTURE_PROPERTIES
            .iter()
            .any(|&(code, _)| code == kind)
            .then_some(PropertyFormat::Texture);
    }
    SCALAR_PROPERTIES
        .iter()
        .find(|&&(code, _, _)| code == kind)
        .map(|&(_, _, format)| format)
}

pub fn property_key(kind: u8) -> Option<&'static str> {
    if kind >= TEXTURE_BASE {
        TEXTURE_PROPERTIES
            .iter()
            .find(|&&(code, _)| code == kind)
            .map(|&(_, key)| key)
    } else {
        SCALAR_PROPERTIES
            .iter()
            .find(|&&(code, _, _)| code == kind)
            .map(|&(_, key, _)| key)
    }
}

pub fn property_by_key(key: &str) -> Option<u8> {
    BY_KEY.get(key).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookups() {
        assert_eq!(property_format(0), Some(PropertyFormat::Color));
        assert_eq!(property_format(8), Some(PropertyFormat::Uint8));
        assert_eq!(property_format(200), None);
        assert_eq!(property_format(128), Some(PropertyFormat::Texture));
        assert_eq!(property_format(9), None);
        assert_eq!(property_key(128), Some("map_Kd"));
        assert_eq!(property_key(67), Some("Ni"));
        assert_eq!(property_by_key("map_d"), Some(135));
        assert_eq!(property_by_key("bump"), Some(134));
        assert_eq!(property_by_key("refl"), Some(193));
        assert_eq!(property_by_key("nope"), None);
    }

    #[test]
    fn opacity_prefers_dissolve() {
        let mut mat = Material::new("glass");
        assert_eq!(mat.opacity(), 255);
        mat.set(DIFFUSE, PropertyValue::Color(0x80FF_FFFF));
        assert_eq!(mat.opacity(), 0x80);
        mat.set(DISSOLVE, PropertyValue::Float(0.0));
        assert_eq!(mat.opacity(), 0);
    }
}
