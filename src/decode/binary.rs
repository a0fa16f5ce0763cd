use crate::core::bit_coder::{ByteReader, ReaderErr, SliceReader};
use crate::core::material::{property_format, Material, Property, PropertyFormat, PropertyValue};
use crate::core::model::{
    Action, Bone, ErrorCode, ExtraChunk, Face, Frame, InlinedAsset, Label, Model, Skin, SkinWeight,
    TexCoord, Transform, Vertex, VertexSkin, MAX_BONES_PER_VERTEX,
};
use crate::core::shape::{Arg, ArgKind, Command, CommandKind, Shape};
use crate::core::shared::{index_to_opt, IndexWidth, Widths, NOT_APPLICABLE, UNDEF};
use crate::shared::chunk::{ChunkKind, CHUNK_HEADER_LEN};

use super::header::Header;
use super::{material_by_name, texture_index, FileReader};

impl From<ReaderErr> for ErrorCode {
    fn from(_: ReaderErr) -> Self {
        ErrorCode::Truncated
    }
}

/// One chunk of the stream: its magic and the bytes after the chunk header.
struct Chunk<'data> {
    magic: [u8; 4],
    data: &'data [u8],
}

/// Walks the chunks that follow `HEAD`. Stops at the end marker, or with
/// `Truncated` recorded when a chunk claims more bytes than are left.
struct Chunks<'data> {
    stream: &'data [u8],
    pos: usize,
    truncated: bool,
}

impl<'data> Iterator for Chunks<'data> {
    type Item = Chunk<'data>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.stream.get(self.pos..)?;
        if rest.is_empty() || rest.starts_with(&ChunkKind::End.magic()) {
            return None;
        }
        let len = match rest.get(4..8) {
            Some(bytes) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
            None => 0,
        };
        if len < CHUNK_HEADER_LEN || len > rest.len() {
            self.truncated = true;
            return None;
        }
        let magic = [rest[0], rest[1], rest[2], rest[3]];
        self.pos += len;
        Some(Chunk {
            magic,
            data: &rest[CHUNK_HEADER_LEN..len],
        })
    }
}

fn chunks<'data>(stream: &'data [u8], header: &Header) -> Chunks<'data> {
    Chunks {
        stream,
        pos: header.len,
        truncated: false,
    }
}

/// Reads the records of one chunk with the widths declared in the header.
struct Records<'a, 'data> {
    r: SliceReader<'data>,
    header: &'a Header<'a>,
    palette: &'a [u32],
    /// A recoverable problem met while reading; reported once per chunk.
    problem: Option<ErrorCode>,
}

impl<'a, 'data> Records<'a, 'data> {
    fn widths(&self) -> Widths {
        self.header.widths
    }

    fn index(&mut self, width: IndexWidth) -> Result<u32, ErrorCode> {
        Ok(self.r.read_index(width)?)
    }

    fn count(&mut self, width: IndexWidth) -> Result<u32, ErrorCode> {
        let n = self.index(width)?;
        Ok(if n >= NOT_APPLICABLE { 0 } else { n })
    }

    fn string(&mut self) -> Result<String, ErrorCode> {
        let offset = self.index(self.widths().si)?;
        Ok(self.header.string_at(offset).unwrap_or_else(|| {
            self.problem = Some(ErrorCode::BadReference);
            String::new()
        }))
    }

    fn color(&mut self) -> Result<u32, ErrorCode> {
        match self.widths().ci {
            IndexWidth::Absent => Ok(0),
            IndexWidth::U32 => Ok(self.r.read_u32()?),
            width => {
                let idx = self.index(width)?;
                if self.palette.is_empty() {
                    self.problem = Some(ErrorCode::MissingColorMap);
                    return Ok(0);
                }
                Ok(self.palette.get(idx as usize).copied().unwrap_or_else(|| {
                    self.problem = Some(ErrorCode::BadReference);
                    0
                }))
            }
        }
    }
}

/// Fills `model` from a decompressed chunk stream. Never fails: problems are
/// recorded in `model.errcode` and the affected chunk is abandoned.
pub(crate) fn parse(stream: &[u8], header: &Header, model: &mut Model, reader: &mut dyn FileReader) {
    model.scale = header.scale;
    let [name, license, author, description] = header.model_strings();
    model.name = name;
    model.license = license;
    model.author = author;
    model.description = description;

    // inlined assets first, materials may refer to them as textures
    for chunk in chunks(stream, header) {
        if ChunkKind::from_magic(&chunk.magic) == Some(ChunkKind::Asset) {
            let mut records = Records {
                r: SliceReader::new(chunk.data),
                header,
                palette: &[],
                problem: None,
            };
            if let Ok(name) = records.string() {
                let data = records.r.rest().to_vec();
                model.inlined.push(InlinedAsset { name, data });
            }
        }
    }

    let mut palette: Vec<u32> = Vec::new();
    let mut seen: Vec<ChunkKind> = Vec::new();
    let mut walk = chunks(stream, header);
    for chunk in &mut walk {
        let Some(kind) = ChunkKind::from_magic(&chunk.magic) else {
            log::trace!("extra chunk {:?}, {} bytes", String::from_utf8_lossy(&chunk.magic), chunk.data.len());
            model.extras.push(ExtraChunk {
                magic: chunk.magic,
                data: chunk.data.to_vec(),
            });
            continue;
        };
        if kind.is_unique() {
            if seen.contains(&kind) {
                model.report(ErrorCode::DuplicateChunk);
                continue;
            }
            seen.push(kind);
        }
        log::trace!("{:?} chunk, {} bytes", kind, chunk.data.len());

        if kind == ChunkKind::ColorMap {
            palette = chunk.data.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
            continue;
        }
        let mut records = Records {
            r: SliceReader::new(chunk.data),
            header,
            palette: &palette,
            problem: None,
        };
        let result = match kind {
            ChunkKind::Header | ChunkKind::Asset | ChunkKind::ColorMap | ChunkKind::End => Ok(()),
            ChunkKind::Preview => {
                model.preview = Some(chunk.data.to_vec());
                Ok(())
            }
            ChunkKind::TextureMap => texture_map(&mut records, model),
            ChunkKind::Vertices => vertices(&mut records, model),
            ChunkKind::Bones => bones(&mut records, model),
            ChunkKind::Material => material(&mut records, model, reader),
            ChunkKind::Procedural => records.string().map(|name| model.procedurals.push(name)),
            ChunkKind::Mesh => mesh(&mut records, model),
            ChunkKind::Shape => shape(&mut records, model),
            ChunkKind::Labels => labels(&mut records, model),
            ChunkKind::Action => action(&mut records, model),
        };
        if let Some(code) = records.problem {
            model.report(code);
        }
        if let Err(code) = result {
            log::warn!("abandoning {:?} chunk at byte {}", kind, records.r.position());
            model.report(code);
        }
    }
    if walk.truncated {
        model.report(ErrorCode::Truncated);
    }
}

fn texture_map(rec: &mut Records, model: &mut Model) -> Result<(), ErrorCode> {
    let vc = rec.widths().vc;
    while !rec.r.is_empty() {
        let u = rec.r.read_unorm(vc)?;
        let v = rec.r.read_unorm(vc)?;
        model.tmap.push(TexCoord { u, v });
    }
    Ok(())
}

fn vertices(rec: &mut Records, model: &mut Model) -> Result<(), ErrorCode> {
    let w = rec.widths();
    while !rec.r.is_empty() {
        let x = rec.r.read_coord(w.vc)?;
        let y = rec.r.read_coord(w.vc)?;
        let z = rec.r.read_coord(w.vc)?;
        let vw = rec.r.read_coord(w.vc)?;
        let color = rec.color()?;
        let skin = match rec.index(w.sk)? {
            UNDEF => VertexSkin::None,
            NOT_APPLICABLE => VertexSkin::Transform,
            s => VertexSkin::Index(s),
        };
        model.vertices.push(Vertex {
            x,
            y,
            z,
            w: vw,
            color,
            skin,
        });
    }
    Ok(())
}

fn bones(rec: &mut Records, model: &mut Model) -> Result<(), ErrorCode> {
    let w = rec.widths();
    let num_bones = rec.count(w.bi)?;
    let num_skins = rec.count(w.sk)?;
    for _ in 0..num_bones {
        let parent = index_to_opt(rec.index(w.bi)?);
        let name = rec.string()?;
        let pos = rec.index(w.vi)?;
        let ori = rec.index(w.vi)?;
        model.bones.push(Bone::new(name, parent, pos, ori));
    }
    let slots = w.nb as usize;
    for _ in 0..num_skins {
        let mut skin = Skin::default();
        if slots == 1 {
            skin.weights[0] = SkinWeight {
                bone: index_to_opt(rec.index(w.bi)?),
                weight: 1.0,
            };
        } else {
            let bytes = rec.r.take(slots)?;
            let mut slot = 0;
            for &byte in bytes.iter().filter(|&&b| b > 0) {
                let bone = index_to_opt(rec.index(w.bi)?);
                if slot < MAX_BONES_PER_VERTEX {
                    skin.weights[slot] = SkinWeight {
                        bone,
                        weight: byte as f32 / 255.0,
                    };
                    slot += 1;
                }
            }
        }
        model.skins.push(skin);
    }
    Ok(())
}

fn material(rec: &mut Records, model: &mut Model, reader: &mut dyn FileReader) -> Result<(), ErrorCode> {
    let mut material = Material::new(rec.string()?);
    let result = material_props(rec, model, reader, &mut material);
    // a material cut short keeps the properties read so far
    match model.material_index(&material.name) {
        Some(idx) => model.materials[idx as usize] = material,
        None => model.materials.push(material),
    }
    result
}

fn material_props(
    rec: &mut Records,
    model: &mut Model,
    reader: &mut dyn FileReader,
    material: &mut Material,
) -> Result<(), ErrorCode> {
    while !rec.r.is_empty() {
        let kind = rec.r.read_u8()?;
        let value = match property_format(kind).ok_or(ErrorCode::UnknownProperty)? {
            PropertyFormat::Color => PropertyValue::Color(rec.color()?),
            PropertyFormat::Uint8 => PropertyValue::Int(rec.r.read_u8()? as u32),
            PropertyFormat::Uint16 => PropertyValue::Int(rec.r.read_u16()? as u32),
            PropertyFormat::Uint32 => PropertyValue::Int(rec.r.read_u32()?),
            PropertyFormat::Float => PropertyValue::Float(rec.r.read_f32()?),
            PropertyFormat::Texture => {
                let name = rec.string()?;
                if name.is_empty() {
                    continue;
                }
                PropertyValue::Texture(texture_index(model, &name, reader))
            }
        };
        material.props.push(Property { kind, value });
    }
    Ok(())
}

fn mesh(rec: &mut Records, model: &mut Model) -> Result<(), ErrorCode> {
    let w = rec.widths();
    let mut current = None;
    while !rec.r.is_empty() {
        let tag = rec.r.read_u8()?;
        let corners = tag >> 4;
        if corners == 0 {
            let name = rec.string()?;
            current = material_by_name(model, &name);
            continue;
        }
        if corners != 3 {
            return Err(ErrorCode::UnknownMesh);
        }
        let mut face = Face {
            material: current,
            vertex: Vec::with_capacity(3),
            texcoord: (tag & 1 != 0).then(|| Vec::with_capacity(3)),
            normal: (tag & 2 != 0).then(|| Vec::with_capacity(3)),
        };
        for _ in 0..3 {
            face.vertex.push(rec.index(w.vi)?);
            if let Some(t) = &mut face.texcoord {
                t.push(rec.index(w.ti)?);
            }
            if let Some(n) = &mut face.normal {
                n.push(rec.index(w.vi)?);
            }
        }
        model.faces.push(face);
    }
    Ok(())
}

fn shape_arg(rec: &mut Records, model: &mut Model, kind: ArgKind) -> Result<Arg, ErrorCode> {
    let w = rec.widths();
    Ok(match kind {
        ArgKind::Mi => {
            let name = rec.string()?;
            Arg::Material(material_by_name(model, &name))
        }
        ArgKind::Hi => Arg::Shape(rec.index(w.hi)?),
        ArgKind::Fi => Arg::Face(rec.index(w.fi)?),
        ArgKind::Ti => Arg::TexMap(rec.index(w.ti)?),
        ArgKind::Vi => Arg::Vertex(rec.index(w.vi)?),
        ArgKind::Qi => Arg::Orientation(rec.index(w.vi)?),
        ArgKind::Vc => Arg::Coord(rec.r.read_coord(w.vc)?),
        ArgKind::I1 => Arg::Int(rec.r.read_u8()? as i8 as i32),
        ArgKind::I2 => Arg::Int(rec.r.read_u16()? as i16 as i32),
        ArgKind::I4 => Arg::Int(rec.r.read_u32()? as i32),
        ArgKind::Va => Arg::Count(rec.count(w.vd)?),
    })
}

fn shape(rec: &mut Records, model: &mut Model) -> Result<(), ErrorCode> {
    let w = rec.widths();
    let name = rec.string()?;
    let group = index_to_opt(rec.index(w.bi)?);
    model.shapes.push(Shape {
        name,
        group,
        commands: Vec::new(),
    });
    let idx = model.shapes.len() - 1;
    while !rec.r.is_empty() {
        let first = rec.r.read_u8()? as u16;
        let id = if first & 0x80 != 0 {
            (first & 0x7F) | (rec.r.read_u8()? as u16) << 7
        } else {
            first
        };
        let kind = CommandKind::from_id(id).ok_or(ErrorCode::UnknownCommand)?;
        let kinds = kind.args();
        let mut args = Vec::with_capacity(kinds.len());
        for (pos, &arg_kind) in kinds.iter().enumerate() {
            let arg = shape_arg(rec, model, arg_kind)?;
            args.push(arg);
            if let Arg::Count(n) = arg {
                if n as usize > rec.r.remaining() {
                    return Err(ErrorCode::Truncated);
                }
                for _ in 0..n {
                    for &repeated in &kinds[pos + 1..] {
                        args.push(shape_arg(rec, model, repeated)?);
                    }
                }
                break;
            }
        }
        model.shapes[idx].commands.push(Command { kind, args });
    }
    Ok(())
}

fn labels(rec: &mut Records, model: &mut Model) -> Result<(), ErrorCode> {
    let w = rec.widths();
    let name = rec.string()?;
    let lang = rec.string()?;
    let color = rec.color()?;
    let non_empty = |s: String| (!s.is_empty()).then_some(s);
    let (name, lang) = (non_empty(name), non_empty(lang));
    while !rec.r.is_empty() {
        let vertex = rec.index(w.vi)?;
        let text = rec.string()?;
        model.labels.push(Label {
            name: name.clone(),
            lang: lang.clone(),
            color,
            vertex,
            text,
        });
    }
    Ok(())
}

fn action(rec: &mut Records, model: &mut Model) -> Result<(), ErrorCode> {
    let w = rec.widths();
    let name = rec.string()?;
    let num_frames = rec.r.read_u16()?;
    let duration_msec = rec.r.read_u32()?;
    let mut action = Action {
        name,
        duration_msec,
        frames: Vec::with_capacity(num_frames as usize),
    };
    let result = (|| -> Result<(), ErrorCode> {
        for _ in 0..num_frames {
            let msec = rec.r.read_u32()?;
            let count = rec.count(w.fc)?;
            let mut frame = Frame {
                msec,
                transforms: Vec::new(),
            };
            for _ in 0..count {
                frame.transforms.push(Transform {
                    bone: rec.index(w.bi)?,
                    pos: rec.index(w.vi)?,
                    ori: rec.index(w.vi)?,
                });
            }
            action.frames.push(frame);
        }
        Ok(())
    })();
    model.actions.push(action);
    result
}
