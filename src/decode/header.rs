use std::borrow::Cow;

use crate::compression;
use crate::core::bit_coder::{ByteReader, ReaderErr, SliceReader};
use crate::core::shared::{WidthErr, Widths, NOT_APPLICABLE};
use crate::shared::chunk::{ChunkKind, ASCII_MAGIC, BINARY_MAGIC, CHUNK_HEADER_LEN};

#[remain::sorted]
#[derive(thiserror::Error, Debug)]
pub enum Err {
    #[error("Inflate error: {0}")]
    InflateError(#[from] compression::Err),
    #[error("Text model is not valid UTF-8: {0}")]
    InvalidText(#[from] std::str::Utf8Error),
    #[error("File header declares {declared} bytes, the buffer has {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("No HEAD chunk after the file header")]
    MissingHeader,
    #[error("Not a Model 3D file")]
    NotAModel3dFile,
    #[error("Not enough data: {0}")]
    NotEnoughData(#[from] ReaderErr),
    #[error("Unsupported width: {0}")]
    UnsupportedWidth(#[from] WidthErr),
}

/// The payload of a model file after the magic has been checked.
pub(crate) enum Body<'data> {
    /// The chunk stream, starting at the `HEAD` chunk.
    Binary(Cow<'data, [u8]>),
    Ascii(&'data str),
}

/// Checks the file header and inflates compressed binary payloads.
pub(crate) fn unpack(buffer: &[u8]) -> Result<Body<'_>, Err> {
    if buffer.starts_with(&ASCII_MAGIC) {
        return Ok(Body::Ascii(std::str::from_utf8(buffer)?));
    }
    let mut reader = SliceReader::new(buffer);
    if reader.take(4)? != BINARY_MAGIC {
        return Err(Err::NotAModel3dFile);
    }
    let declared = reader.read_u32()? as usize;
    if declared != buffer.len() {
        return Err(Err::LengthMismatch {
            declared,
            actual: buffer.len(),
        });
    }
    let payload = reader.rest();
    let header = ChunkKind::Header.magic();
    if payload.starts_with(&header) {
        return Ok(Body::Binary(Cow::Borrowed(payload)));
    }
    if !compression::is_zlib(payload) {
        return Err(Err::MissingHeader);
    }
    let inflated = compression::inflate(payload)?;
    log::debug!("inflated {} bytes into {}", payload.len(), inflated.len());
    if !inflated.starts_with(&header) {
        return Err(Err::MissingHeader);
    }
    Ok(Body::Binary(Cow::Owned(inflated)))
}

/// Contents of the `HEAD` chunk.
pub(crate) struct Header<'data> {
    pub scale: f32,
    pub widths: Widths,
    /// The string area. Offsets stored in other chunks index into it.
    pub strings: &'data [u8],
    /// Length of the whole `HEAD` chunk.
    pub len: usize,
}

impl<'data> Header<'data> {
    /// Reads the NUL terminated string at `offset`. Offset 0 and the sentinels
    /// stand for "no string"; `None` means the offset points past the area.
    pub fn string_at(&self, offset: u32) -> Option<String> {
        if offset == 0 || offset >= NOT_APPLICABLE {
            return Some(String::new());
        }
        self.string_from(offset as usize)
    }

    fn string_from(&self, start: usize) -> Option<String> {
        let tail = self.strings.get(start..)?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Some(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    /// The name, license, author and description that open the string area.
    pub fn model_strings(&self) -> [String; 4] {
        let mut out: [String; 4] = Default::default();
        let mut pos = 0;
        for s in &mut out {
            let Some(value) = self.string_from(pos) else {
                break;
            };
            pos += value.len() + 1;
            *s = value;
        }
        out
    }
}

pub(crate) fn decode_header(stream: &[u8]) -> Result<Header<'_>, Err> {
    let mut reader = SliceReader::new(stream);
    if reader.take(4)? != ChunkKind::Header.magic() {
        return Err(Err::MissingHeader);
    }
    let len = reader.read_u32()? as usize;
    if len < CHUNK_HEADER_LEN + 8 || len > stream.len() {
        return Err(Err::NotEnoughData(ReaderErr::NotEnoughData));
    }
    let scale = reader.read_f32()?;
    let widths = Widths::from_types(reader.read_u32()?)?;
    let strings = &stream[CHUNK_HEADER_LEN + 8..len];
    log::trace!("HEAD: scale {scale}, widths {widths:?}, {} string bytes", strings.len());
    Ok(Header {
        scale,
        widths,
        strings,
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bit_coder::ByteWriter;

    fn head(strings: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_bytes(b"HEAD");
        out.write_u32((16 + strings.len()) as u32);
        out.write_f32(2.0);
        out.write_u32(Widths::default().to_types());
        out.write_bytes(strings);
        out
    }

    #[test]
    fn reads_head_strings() {
        let stream = head(b"box\0CC0\0me\0\0wood\0");
        let header = decode_header(&stream).unwrap();
        assert_eq!(header.scale, 2.0);
        assert_eq!(header.widths, Widths::default());
        let [name, license, author, description] = header.model_strings();
        assert_eq!((name.as_str(), license.as_str(), author.as_str()), ("box", "CC0", "me"));
        assert!(description.is_empty());
        assert_eq!(header.string_at(12).as_deref(), Some("wood"));
        assert_eq!(header.string_at(0).as_deref(), Some(""));
        assert_eq!(header.string_at(99), None);
    }

    #[test]
    fn rejects_bad_file_headers() {
        assert!(matches!(unpack(b"GLTF\x08\0\0\0"), Err(Err::NotAModel3dFile)));
        assert!(matches!(unpack(b"3DMO\x09\0\0\0"), Err(Err::LengthMismatch { declared: 9, actual: 8 })));
        assert!(matches!(unpack(b"3DM"), Err(Err::NotEnoughData(_))));
        assert!(matches!(unpack(b"3DMO\x0c\0\0\0HEAP"), Err(Err::MissingHeader)));
        assert!(matches!(unpack(b"3DMO\x0d\0\0\0\x78\x5e\xff\xff\xff"), Err(Err::InflateError(_))));

        let mut file = b"3DMO".to_vec();
        let stream = head(b"\0\0\0\0");
        file.write_u32((8 + stream.len()) as u32);
        file.extend_from_slice(&stream);
        assert!(matches!(unpack(&file), Ok(Body::Binary(Cow::Borrowed(_)))));
    }
}
