// lib.rs

/// Contains the in-memory model, its entities, and the byte level primitives
/// shared by the reader and the writer.
pub mod core;

/// Contains chunk framing and string sanitizing used by both directions.
pub mod shared;

/// Contains the zlib compressor used by the writer and the inflater used by the reader.
pub mod compression;

/// Defines the model writer, binary and text.
pub mod encode;

/// Defines the model reader, binary and text.
pub mod decode;

/// Contains the most commonly used traits, types, and functions.
pub mod prelude {
    pub use crate::core::bit_coder::{ByteReader, ByteWriter};
    pub use crate::core::material::{Material, Property, PropertyValue};
    pub use crate::core::model::{
        Action, Bone, ErrorCode, Face, Frame, Label, Model, Skin, SkinWeight, TexCoord, Transform,
        Vertex, VertexSkin,
    };
    pub use crate::core::shape::{Arg, Command, CommandKind, Shape};
    pub use crate::core::shared::ConfigType;
    pub use crate::core::skeleton::{compute_interpolated_pose, compute_static_pose, SkeletonBone};
    pub use crate::core::texture::Texture;
    pub use crate::decode::{self, load, FileReader};
    pub use crate::encode::{self, save, ExportFlags, Quality};
}
