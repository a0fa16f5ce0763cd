use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::core::material::Material;
use crate::core::shape::Shape;
use crate::core::texture::Texture;

pub const MAX_BONES_PER_VERTEX: usize = 4;

/// Which skin record, if any, a vertex uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VertexSkin {
    #[default]
    None,
    Index(u32),
    /// The vertex is not a position: it stores a bone orientation quaternion
    /// or a normal.
    Transform,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    /// RGBA packed little endian, red in the lowest byte
    pub color: u32,
    pub skin: VertexSkin,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
            color: 0,
            skin: VertexSkin::None,
        }
    }
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    /// A quaternion or normal carrier.
    pub fn transform(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self {
            x,
            y,
            z,
            w,
            color: 0,
            skin: VertexSkin::Transform,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TexCoord {
    pub u: f32,
    pub v: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SkinWeight {
    pub bone: Option<u32>,
    pub weight: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Skin {
    pub weights: [SkinWeight; MAX_BONES_PER_VERTEX],
}

impl Skin {
    pub fn single(bone: u32) -> Self {
        let mut out = Self::default();
        out.weights[0] = SkinWeight {
            bone: Some(bone),
            weight: 1.0,
        };
        out
    }

    pub fn used(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.weights
            .iter()
            .filter_map(|w| w.bone.map(|b| (b, w.weight)))
    }
}

/// A vertex influenced by a bone, rebuilt from the skins after loading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexWeight {
    pub vertex: u32,
    pub weight: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub parent: Option<u32>,
    pub name: String,
    /// vertex index of the position
    pub pos: u32,
    /// vertex index of the orientation quaternion
    pub ori: u32,
    pub weights: Vec<VertexWeight>,
    /// inverse bind matrix
    pub mat4: Mat4,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent: Option<u32>, pos: u32, ori: u32) -> Self {
        Self {
            parent,
            name: name.into(),
            pos,
            ori,
            weights: Vec::new(),
            mat4: Mat4::IDENTITY,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Face {
    pub material: Option<u32>,
    pub vertex: Vec<u32>,
    pub texcoord: Option<Vec<u32>>,
    pub normal: Option<Vec<u32>>,
}

impl Face {
    pub fn triangle(material: Option<u32>, vertex: [u32; 3]) -> Self {
        Self {
            material,
            vertex: vertex.to_vec(),
            texcoord: None,
            normal: None,
        }
    }

    pub fn with_texcoords(mut self, texcoord: [u32; 3]) -> Self {
        self.texcoord = Some(texcoord.to_vec());
        self
    }

    pub fn with_normals(mut self, normal: [u32; 3]) -> Self {
        self.normal = Some(normal.to_vec());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: Option<String>,
    pub lang: Option<String>,
    pub color: u32,
    pub vertex: u32,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub bone: u32,
    pub pos: u32,
    pub ori: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub msec: u32,
    pub transforms: Vec<Transform>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub duration_msec: u32,
    pub frames: Vec<Frame>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlinedAsset {
    pub name: String,
    pub data: Vec<u8>,
}

/// A chunk with an unrecognized magic, carried through unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraChunk {
    pub magic: [u8; 4],
    pub data: Vec<u8>,
}

/// Problems found while loading that did not prevent a model from being built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    BadReference,
    /// A text line that does not parse; the line is skipped.
    BadSyntax,
    DuplicateChunk,
    MissingColorMap,
    Truncated,
    UnknownCommand,
    UnknownMaterial,
    UnknownMesh,
    UnknownProperty,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub license: String,
    pub author: String,
    pub description: String,
    pub scale: f32,
    pub preview: Option<Vec<u8>>,
    pub tmap: Vec<TexCoord>,
    pub vertices: Vec<Vertex>,
    pub skins: Vec<Skin>,
    pub bones: Vec<Bone>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub faces: Vec<Face>,
    pub shapes: Vec<Shape>,
    pub labels: Vec<Label>,
    pub actions: Vec<Action>,
    pub inlined: Vec<InlinedAsset>,
    pub extras: Vec<ExtraChunk>,
    pub procedurals: Vec<String>,
    /// First vertex of the normal slots synthesized by loading. Face normals
    /// pointing at or past it are left out when saving.
    pub generated_normals: Option<u32>,
    pub errcode: Option<ErrorCode>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            name: String::new(),
            license: String::new(),
            author: String::new(),
            description: String::new(),
            scale: 1.0,
            preview: None,
            tmap: Vec::new(),
            vertices: Vec::new(),
            skins: Vec::new(),
            bones: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            faces: Vec::new(),
            shapes: Vec::new(),
            labels: Vec::new(),
            actions: Vec::new(),
            inlined: Vec::new(),
            extras: Vec::new(),
            procedurals: Vec::new(),
            generated_normals: None,
            errcode: None,
        }
    }
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn material_index(&self, name: &str) -> Option<u32> {
        self.materials.iter().position(|m| m.name == name).map(|i| i as u32)
    }

    pub fn texture_index(&self, name: &str) -> Option<u32> {
        self.textures.iter().position(|t| t.name == name).map(|i| i as u32)
    }

    pub fn shape_index(&self, name: &str) -> Option<u32> {
        self.shapes.iter().position(|s| s.name == name).map(|i| i as u32)
    }

    pub fn bone_index(&self, name: &str) -> Option<u32> {
        self.bones.iter().position(|b| b.name == name).map(|i| i as u32)
    }

    pub fn inlined(&self, name: &str) -> Option<&InlinedAsset> {
        self.inlined.iter().find(|a| a.name == name)
    }

    /// Records a recoverable load problem. The last one recorded wins.
    pub(crate) fn report(&mut self, code: ErrorCode) {
        log::warn!("{:?} while loading model '{}'", code, self.name);
        self.errcode = Some(code);
    }
}
