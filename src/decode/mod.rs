mod ascii;
mod binary;
mod header;
mod post_process;

use crate::core::model::Model;
use crate::core::shared::ConfigType;
use crate::core::texture::Texture;

use header::Body;

/// Source of files a model refers to but does not embed: textures and the
/// assets listed by text models.
pub trait FileReader {
    /// Returns the contents of `name`, or `None` when it cannot be read.
    fn read_file(&mut self, name: &str) -> Option<Vec<u8>>;
}

impl<F> FileReader for F
where
    F: FnMut(&str) -> Option<Vec<u8>>,
{
    fn read_file(&mut self, name: &str) -> Option<Vec<u8>> {
        self(name)
    }
}

/// No external files: textures that are not inlined stay name-only.
impl FileReader for () {
    fn read_file(&mut self, _: &str) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Synthesize flat normals when no face has normals.
    pub generate_normals: bool,
}

impl ConfigType for Config {
    fn default() -> Self {
        Self {
            generate_normals: true,
        }
    }
}

#[remain::sorted]
#[derive(thiserror::Error, Debug)]
pub enum Err {
    #[error("Header error: {0}")]
    HeaderError(#[from] header::Err),
}

/// Parses a binary or text model.
///
/// Materials and textures of `mtllib` are available to the model as if it
/// defined them; a material of the same name in the file replaces the library
/// one. Problems that leave the model usable are recorded in `Model::errcode`.
pub fn load(
    buffer: &[u8],
    reader: &mut dyn FileReader,
    mtllib: Option<&Model>,
    cfg: Config,
) -> Result<Model, Err> {
    let mut model = Model::default();
    if let Some(lib) = mtllib {
        model.materials = lib.materials.clone();
        model.textures = lib.textures.clone();
    }

    match header::unpack(buffer)? {
        Body::Binary(stream) => {
            let header = header::decode_header(&stream)?;
            binary::parse(&stream, &header, &mut model, reader);
        }
        Body::Ascii(text) => ascii::parse(text, &mut model, reader),
    }

    post_process::finish(&mut model, &cfg);
    log::debug!(
        "loaded '{}': {} vertices, {} faces, {} materials, {} bones, {} actions",
        model.name,
        model.vertices.len(),
        model.faces.len(),
        model.materials.len(),
        model.bones.len(),
        model.actions.len()
    );
    Ok(model)
}

/// Index of the texture called `name`, creating and resolving it on first use.
/// The image comes from an inlined asset of that name, else `<name>.png` or
/// `name` through the reader.
pub(crate) fn texture_index(model: &mut Model, name: &str, reader: &mut dyn FileReader) -> u32 {
    if let Some(idx) = model.texture_index(name) {
        return idx;
    }
    let mut texture = Texture::named(name);
    let data = model
        .inlined(name)
        .map(|asset| asset.data.clone())
        .or_else(|| reader.read_file(&format!("{name}.png")))
        .or_else(|| reader.read_file(name));
    match data {
        Some(data) => {
            if let Err(err) = texture.decode_png(&data) {
                log::warn!("texture '{name}' could not be decoded: {err}");
            }
        }
        None => log::debug!("texture '{name}' not found, keeping the name only"),
    }
    model.textures.push(texture);
    model.textures.len() as u32 - 1
}

/// Index of the material called `name`; an empty name means no material.
pub(crate) fn material_by_name(model: &mut Model, name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let found = model.material_index(name);
    if found.is_none() {
        model.report(crate::core::model::ErrorCode::UnknownMaterial);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_and_unit_read_files() {
        let mut calls = Vec::new();
        let mut reader = |name: &str| -> Option<Vec<u8>> {
            calls.push(name.to_string());
            None
        };
        let mut model = Model::default();
        assert_eq!(texture_index(&mut model, "wood", &mut reader), 0);
        assert_eq!(texture_index(&mut model, "wood", &mut reader), 0);
        assert_eq!(calls, ["wood.png", "wood"]);
        assert!(!model.textures[0].is_decoded());
        assert_eq!(().read_file("anything"), None);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(load(b"not a model", &mut (), None, Config::default()).is_err());
    }
}
