use crate::core::bit_coder::ByteWriter;
use crate::core::material::{property_format, PropertyFormat, PropertyValue};
use crate::core::model::VertexSkin;
use crate::core::shape::{Arg, ArgKind};
use crate::core::shared::{opt_to_index, IndexWidth, NOT_APPLICABLE, UNDEF};
use crate::encode::compaction::Compacted;
use crate::shared::chunk::{begin_chunk, end_chunk, ChunkKind};

use super::Emit;

/// Writes the chunk stream of a binary model, without the file header.
pub(crate) struct BinaryEmitter {
    buf: Vec<u8>,
}

impl BinaryEmitter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn begin(&mut self, kind: ChunkKind) -> usize {
        begin_chunk(&mut self.buf, kind.magic())
    }

    fn close(&mut self, start: usize) {
        end_chunk(&mut self.buf, start);
    }

    fn string(&mut self, c: &Compacted, s: &str) {
        self.buf.write_index(c.strings.offset(s), c.widths.si);
    }

    fn material_name(&mut self, c: &Compacted, material: Option<u32>) {
        let offset = material
            .and_then(|m| c.materials.get(m as usize))
            .map_or(0, |m| c.strings.offset(&m.name));
        self.buf.write_index(offset, c.widths.si);
    }

    fn color(&mut self, c: &Compacted, color: u32) {
        self.buf.write_index(c.color_index(color), c.widths.ci);
    }
}

impl Emit for BinaryEmitter {
    fn header(&mut self, c: &Compacted) {
        let start = self.begin(ChunkKind::Header);
        self.buf.write_f32(c.scale);
        self.buf.write_u32(c.widths.to_types());
        self.buf.write_bytes(&c.string_area);
        self.close(start);
    }

    fn preview(&mut self, c: &Compacted) {
        let Some(data) = c.preview.as_deref().filter(|d| !d.is_empty()) else {
            return;
        };
        let start = self.begin(ChunkKind::Preview);
        self.buf.write_bytes(data);
        self.close(start);
    }

    fn color_map(&mut self, c: &Compacted) {
        if c.colors.is_empty() || matches!(c.widths.ci, IndexWidth::Absent | IndexWidth::U32) {
            return;
        }
        let start = self.begin(ChunkKind::ColorMap);
        for &color in c.colors.colors() {
            self.buf.write_u32(color);
        }
        self.close(start);
    }

    fn texture_map(&mut self, c: &Compacted) {
        if c.tmap.is_empty() {
            return;
        }
        let start = self.begin(ChunkKind::TextureMap);
        for t in &c.tmap {
            self.buf.write_unorm(t.u, c.widths.vc);
            self.buf.write_unorm(t.v, c.widths.vc);
        }
        self.close(start);
    }

    fn vertices(&mut self, c: &Compacted) {
        if c.vertices.is_empty() {
            return;
        }
        let start = self.begin(ChunkKind::Vertices);
        for v in &c.vertices {
            for coord in [v.x, v.y, v.z, v.w] {
                self.buf.write_coord(coord, c.widths.vc);
            }
            self.color(c, v.color);
            let skin = match v.skin {
                VertexSkin::Index(s) => s,
                VertexSkin::Transform => NOT_APPLICABLE,
                VertexSkin::None => UNDEF,
            };
            self.buf.write_index(skin, c.widths.sk);
        }
        self.close(start);
    }

    fn bones(&mut self, c: &Compacted) {
        if c.bones.is_empty() {
            return;
        }
        let w = c.widths;
        let start = self.begin(ChunkKind::Bones);
        self.buf.write_index(c.bones.len() as u32, w.bi);
        self.buf.write_index(c.skins.len() as u32, w.sk);
        for bone in &c.bones {
            self.buf.write_index(opt_to_index(bone.parent), w.bi);
            self.string(c, &bone.name);
            self.buf.write_index(bone.pos, w.vi);
            self.buf.write_index(bone.ori, w.vi);
        }
        let slots = w.nb as usize;
        for skin in &c.skins {
            if slots > 1 {
                self.buf.write_bytes(&skin.weights[..slots]);
            }
            for (&bone, &weight) in skin.bones.iter().zip(&skin.weights).take(slots) {
                if weight > 0 {
                    self.buf.write_index(bone, w.bi);
                }
            }
        }
        self.close(start);
    }

    fn materials(&mut self, c: &Compacted) {
        for material in &c.materials {
            let start = self.begin(ChunkKind::Material);
            self.string(c, &material.name);
            for prop in &material.props {
                let Some(format) = property_format(prop.kind) else {
                    continue;
                };
                self.buf.write_u8(prop.kind);
                match (format, prop.value) {
                    (PropertyFormat::Color, PropertyValue::Color(color)) => self.color(c, color),
                    (PropertyFormat::Uint8, PropertyValue::Int(i)) => self.buf.write_u8(i as u8),
                    (PropertyFormat::Uint16, PropertyValue::Int(i)) => self.buf.write_u16(i as u16),
                    (PropertyFormat::Uint32, PropertyValue::Int(i)) => self.buf.write_u32(i),
                    (PropertyFormat::Float, PropertyValue::Float(f)) => self.buf.write_f32(f),
                    (PropertyFormat::Texture, PropertyValue::Texture(t)) => {
                        let offset = c
                            .textures
                            .get(t as usize)
                            .map_or(0, |name| c.strings.offset(name));
                        self.buf.write_index(offset, c.widths.si);
                    }
                    (format, value) => {
                        log::warn!("material '{}': {:?} stored as {:?}", material.name, value, format);
                        self.buf.truncate(self.buf.len() - 1);
                    }
                }
            }
            self.close(start);
        }
    }

    fn procedurals(&mut self, c: &Compacted) {
        for name in &c.procedurals {
            let start = self.begin(ChunkKind::Procedural);
            self.string(c, name);
            self.close(start);
        }
    }

    fn mesh(&mut self, c: &Compacted) {
        if c.faces.is_empty() {
            return;
        }
        let w = c.widths;
        let start = self.begin(ChunkKind::Mesh);
        let mut current = None;
        for face in &c.faces {
            if face.material != current {
                current = face.material;
                self.buf.write_u8(0);
                self.material_name(c, current);
            }
            let mut flags = 0;
            if face.texcoord.is_some() {
                flags |= 1;
            }
            if face.normal.is_some() {
                flags |= 2;
            }
            self.buf.write_u8(3 << 4 | flags);
            for corner in 0..3 {
                self.buf.write_index(face.vertex[corner], w.vi);
                if let Some(t) = &face.texcoord {
                    self.buf.write_index(t[corner], w.ti);
                }
                if let Some(n) = &face.normal {
                    self.buf.write_index(n[corner], w.vi);
                }
            }
        }
        self.close(start);
    }

    fn shapes(&mut self, c: &Compacted) {
        let w = c.widths;
        for shape in &c.shapes {
            let start = self.begin(ChunkKind::Shape);
            self.string(c, &shape.name);
            self.buf.write_index(opt_to_index(shape.group), w.bi);
            for cmd in &shape.commands {
                let id = cmd.kind.id();
                if id < 128 {
                    self.buf.write_u8(id as u8);
                } else {
                    self.buf.write_u8((id & 0x7F) as u8 | 0x80);
                    self.buf.write_u8((id >> 7) as u8);
                }
                for (kind, arg) in cmd.expected_args().into_iter().zip(&cmd.args) {
                    match (kind, *arg) {
                        (ArgKind::Mi, Arg::Material(m)) => self.material_name(c, m),
                        (ArgKind::Vc, Arg::Coord(f)) => self.buf.write_coord(f, w.vc),
                        (ArgKind::I1, Arg::Int(i)) => self.buf.write_u8(i as i8 as u8),
                        (ArgKind::I2, Arg::Int(i)) => self.buf.write_u16(i as i16 as u16),
                        (ArgKind::I4, Arg::Int(i)) => self.buf.write_u32(i as u32),
                        (ArgKind::Hi, Arg::Shape(h)) => self.buf.write_index(h, w.hi),
                        (ArgKind::Fi, Arg::Face(f)) => self.buf.write_index(f, w.fi),
                        (ArgKind::Ti, Arg::TexMap(t)) => self.buf.write_index(t, w.ti),
                        (ArgKind::Vi, Arg::Vertex(v)) | (ArgKind::Qi, Arg::Orientation(v)) => {
                            self.buf.write_index(v, w.vi)
                        }
                        (ArgKind::Va, Arg::Count(n)) => self.buf.write_index(n, w.vd),
                        // compaction only lets well formed commands through
                        _ => unreachable!("argument {arg:?} does not match {kind:?}"),
                    }
                }
            }
            self.close(start);
        }
    }

    fn labels(&mut self, c: &Compacted) {
        let mut open: Option<usize> = None;
        let mut key = None;
        for label in &c.labels {
            let this = (&label.lang, &label.name, label.color);
            if key != Some(this) {
                if let Some(start) = open.take() {
                    self.close(start);
                }
                let start = self.begin(ChunkKind::Labels);
                self.string(c, label.name.as_deref().unwrap_or(""));
                self.string(c, label.lang.as_deref().unwrap_or(""));
                self.color(c, label.color);
                open = Some(start);
                key = Some(this);
            }
            self.buf.write_index(label.vertex, c.widths.vi);
            self.string(c, &label.text);
        }
        if let Some(start) = open {
            self.close(start);
        }
    }

    fn actions(&mut self, c: &Compacted) {
        let w = c.widths;
        for action in &c.actions {
            let start = self.begin(ChunkKind::Action);
            self.string(c, &action.name);
            self.buf.write_u16(action.frames.len() as u16);
            self.buf.write_u32(action.duration_msec);
            for frame in &action.frames {
                self.buf.write_u32(frame.msec);
                self.buf.write_index(frame.transforms.len() as u32, w.fc);
                for t in &frame.transforms {
                    self.buf.write_index(t.bone, w.bi);
                    self.buf.write_index(t.pos, w.vi);
                    self.buf.write_index(t.ori, w.vi);
                }
            }
            self.close(start);
        }
    }

    fn assets(&mut self, c: &Compacted) {
        for asset in &c.inlined {
            let start = self.begin(ChunkKind::Asset);
            self.string(c, &asset.name);
            self.buf.write_bytes(&asset.data);
            self.close(start);
        }
    }

    fn extras(&mut self, c: &Compacted) {
        for extra in &c.extras {
            let start = begin_chunk(&mut self.buf, extra.magic);
            self.buf.write_bytes(&extra.data);
            self.close(start);
        }
    }

    fn end(&mut self, _: &Compacted) {
        self.buf.write_bytes(&ChunkKind::End.magic());
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}
