/// Chunk magics and framing shared by the binary reader and writer.
pub mod chunk;

pub mod safe_str;
