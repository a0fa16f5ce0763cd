use crate::core::bit_coder::ByteWriter;

pub const BINARY_MAGIC: [u8; 4] = *b"3DMO";
pub const ASCII_MAGIC: [u8; 4] = *b"3dmo";

/// The chunks understood by the codec. Anything else is carried as an extra chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Header,
    Preview,
    ColorMap,
    TextureMap,
    Vertices,
    Bones,
    Material,
    Procedural,
    Mesh,
    Shape,
    Labels,
    Action,
    Asset,
    End,
}

impl ChunkKind {
    pub fn magic(self) -> [u8; 4] {
        *match self {
            ChunkKind::Header => b"HEAD",
            ChunkKind::Preview => b"PRVW",
            ChunkKind::ColorMap => b"CMAP",
            ChunkKind::TextureMap => b"TMAP",
            ChunkKind::Vertices => b"VRTS",
            ChunkKind::Bones => b"BONE",
            ChunkKind::Material => b"MTRL",
            ChunkKind::Procedural => b"PROC",
            ChunkKind::Mesh => b"MESH",
            ChunkKind::Shape => b"SHPE",
            ChunkKind::Labels => b"LBLS",
            ChunkKind::Action => b"ACTN",
            ChunkKind::Asset => b"ASET",
            ChunkKind::End => b"OMD3",
        }
    }

    pub fn from_magic(magic: &[u8]) -> Option<Self> {
        Some(match magic {
            b"HEAD" => ChunkKind::Header,
            b"PRVW" => ChunkKind::Preview,
            b"CMAP" => ChunkKind::ColorMap,
            b"TMAP" => ChunkKind::TextureMap,
            b"VRTS" => ChunkKind::Vertices,
            b"BONE" => ChunkKind::Bones,
            b"MTRL" => ChunkKind::Material,
            b"PROC" => ChunkKind::Procedural,
            b"MESH" => ChunkKind::Mesh,
            b"SHPE" => ChunkKind::Shape,
            b"LBLS" => ChunkKind::Labels,
            b"ACTN" => ChunkKind::Action,
            b"ASET" => ChunkKind::Asset,
            b"OMD3" => ChunkKind::End,
            _ => return None,
        })
    }

    /// Chunks that may appear at most once per file.
    pub fn is_unique(self) -> bool {
        matches!(
            self,
            ChunkKind::Header
                | ChunkKind::Preview
                | ChunkKind::ColorMap
                | ChunkKind::TextureMap
                | ChunkKind::Vertices
                | ChunkKind::Bones
        )
    }
}

/// Size of a chunk header: magic plus the u32 length, which counts the header too.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Starts a chunk in `buffer` and returns its offset for `end_chunk`.
pub fn begin_chunk(buffer: &mut Vec<u8>, magic: [u8; 4]) -> usize {
    let start = buffer.len();
    buffer.write_bytes(&magic);
    buffer.write_u32(0);
    start
}

/// Patches the length field of the chunk started at `start`.
pub fn end_chunk(buffer: &mut [u8], start: usize) {
    let len = (buffer.len() - start) as u32;
    buffer[start + 4..start + 8].copy_from_slice(&len.to_le_bytes());
}
