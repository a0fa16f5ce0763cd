pub mod color_map;
pub mod compaction;
pub(crate) mod emitter;
pub mod string_table;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compression;
use crate::core::bit_coder::ByteWriter;
use crate::core::model::Model;
use crate::core::shared::{ConfigType, CoordWidth};
use crate::shared::chunk::{ASCII_MAGIC, BINARY_MAGIC};
use emitter::{AsciiEmitter, BinaryEmitter, Emit, Emitter};

/// Hash chain length used when compressing saved models.
const DEFLATE_QUALITY: usize = 9;

/// Storage precision of vertex and texture coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Int8,
    Int16,
    Float,
    Double,
}

impl Quality {
    pub fn coord_width(self) -> CoordWidth {
        match self {
            Quality::Int8 => CoordWidth::I8,
            Quality::Int16 => CoordWidth::I16,
            Quality::Float => CoordWidth::F32,
            Quality::Double => CoordWidth::F64,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
    pub struct ExportFlags: u32 {
        /// Store raw colors instead of a palette.
        const NO_CMAP = 1 << 0;
        const NO_MATERIAL = 1 << 1;
        const NO_FACE = 1 << 2;
        const NO_NORMAL = 1 << 3;
        const NO_TXTCRD = 1 << 4;
        /// Store texture coordinates as `1 - v`.
        const FLIP_TXTCRD = 1 << 5;
        /// Keep coordinates as they are instead of fitting them into the unit cube.
        const NO_RECALC = 1 << 6;
        const NO_BONE = 1 << 7;
        const NO_ACTION = 1 << 8;
        /// Write unknown chunks back out.
        const EXTRA = 1 << 9;
        const NO_ZLIB = 1 << 10;
        const ASCII = 1 << 11;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub quality: Quality,
    pub flags: ExportFlags,
}

impl ConfigType for Config {
    fn default() -> Self {
        Self {
            quality: Quality::Float,
            flags: ExportFlags::empty(),
        }
    }
}

impl Config {
    pub fn ascii() -> Self {
        Self {
            quality: Quality::Double,
            flags: ExportFlags::ASCII,
        }
    }

    pub fn is_ascii(&self) -> bool {
        self.flags.contains(ExportFlags::ASCII)
    }
}

#[remain::sorted]
#[derive(Error, Debug)]
pub enum Err {
    #[error("Compaction error: {0}")]
    CompactionError(#[from] compaction::Err),
}

/// Serializes a model into a binary or text buffer.
///
/// Only referenced data is written: unreferenced vertices, texture
/// coordinates, skins, materials and textures are dropped, and the rest is
/// deduplicated and renumbered. Binary output is compressed unless
/// `ExportFlags::NO_ZLIB` is set or compression would not shrink it.
pub fn save(model: &Model, cfg: Config) -> Result<Vec<u8>, Err> {
    let compacted = compaction::compact(model, &cfg)?;

    let mut emitter: Emitter = if cfg.is_ascii() {
        AsciiEmitter::new().into()
    } else {
        BinaryEmitter::new().into()
    };
    emitter.header(&compacted);
    emitter.preview(&compacted);
    emitter.color_map(&compacted);
    emitter.texture_map(&compacted);
    emitter.vertices(&compacted);
    emitter.bones(&compacted);
    emitter.materials(&compacted);
    emitter.procedurals(&compacted);
    emitter.mesh(&compacted);
    emitter.shapes(&compacted);
    emitter.labels(&compacted);
    emitter.actions(&compacted);
    emitter.assets(&compacted);
    if cfg.flags.contains(ExportFlags::EXTRA) {
        emitter.extras(&compacted);
    }
    emitter.end(&compacted);
    let body = emitter.finish();

    if cfg.is_ascii() {
        debug_assert!(body.starts_with(&ASCII_MAGIC));
        return Ok(body);
    }

    let body = if cfg.flags.contains(ExportFlags::NO_ZLIB) {
        body
    } else {
        let packed = compression::deflate(&body, DEFLATE_QUALITY);
        log::debug!("deflated {} bytes into {}", body.len(), packed.len());
        if packed.len() < body.len() {
            packed
        } else {
            body
        }
    };
    let mut out = Vec::with_capacity(body.len() + 8);
    out.write_bytes(&BINARY_MAGIC);
    out.write_u32((body.len() + 8) as u32);
    out.write_bytes(&body);
    Ok(out)
}
