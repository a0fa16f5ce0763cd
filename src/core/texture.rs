use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};

/// A texture referenced by material map properties. `channels == 0` means the
/// image could not be found or decoded and only the name is known.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

#[remain::sorted]
#[derive(Debug, thiserror::Error)]
pub enum Err {
    #[error("Decode error: {0}")]
    DecodeError(#[from] image::ImageError),
    #[error("Not a PNG image")]
    NotPng,
}

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

pub fn is_png(buffer: &[u8]) -> bool {
    buffer.starts_with(&PNG_SIGNATURE)
}

impl Texture {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.channels > 0
    }

    /// Decodes a PNG image into 8 bit pixels, keeping grey, grey-alpha, RGB
    /// and RGBA layouts as 1 to 4 channels. Wider formats are narrowed to RGBA.
    pub fn decode_png(&mut self, data: &[u8]) -> Result<(), Err> {
        if !is_png(data) {
            return Err(Err::NotPng);
        }
        let image = ImageReader::with_format(Cursor::new(data), ImageFormat::Png).decode()?;
        self.width = image.width();
        self.height = image.height();
        let (channels, pixels) = match image {
            DynamicImage::ImageLuma8(img) => (1, img.into_raw()),
            DynamicImage::ImageLumaA8(img) => (2, img.into_raw()),
            DynamicImage::ImageRgb8(img) => (3, img.into_raw()),
            DynamicImage::ImageRgba8(img) => (4, img.into_raw()),
            other => (4, other.to_rgba8().into_raw()),
        };
        self.channels = channels;
        self.pixels = pixels;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn encode(image: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_rgba() {
        let mut img = RgbaImage::new(3, 2);
        img.put_pixel(2, 1, Rgba([1, 2, 3, 4]));
        let data = encode(DynamicImage::ImageRgba8(img));

        let mut tex = Texture::named("wood");
        tex.decode_png(&data).unwrap();
        assert_eq!((tex.width, tex.height, tex.channels), (3, 2, 4));
        assert_eq!(&tex.pixels[20..24], &[1, 2, 3, 4]);
    }

    #[test]
    fn keeps_grey_single_channel() {
        let img = GrayImage::from_pixel(4, 4, Luma([77]));
        let data = encode(DynamicImage::ImageLuma8(img));
        let mut tex = Texture::named("mask");
        tex.decode_png(&data).unwrap();
        assert_eq!(tex.channels, 1);
        assert_eq!(tex.pixels, vec![77; 16]);
    }

    #[test]
    fn rejects_non_png() {
        let mut tex = Texture::named("bad");
        assert!(matches!(tex.decode_png(b"GIF89a..."), Err(Err::NotPng)));
        assert!(!tex.is_decoded());
    }
}
