use std::io::Read;

use flate2::read::ZlibDecoder;

/// The zlib compressor used when saving binary models.
pub mod deflate;

pub use deflate::deflate;

#[derive(thiserror::Error, Debug)]
pub enum Err {
    #[error("zlib decode: {0}")]
    Inflate(#[from] std::io::Error),
}

/// Decompresses a zlib stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, Err> {
    let mut out = Vec::with_capacity(data.len() * 4);
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Whether `data` starts with a zlib header with a 32K window and valid check bits.
pub fn is_zlib(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => cmf & 0x0F == 8 && (((*cmf as u16) << 8) | *flg as u16) % 31 == 0,
        _ => false,
    }
}
