use std::fmt::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::core::material::{property_key, PropertyValue};
use crate::core::model::VertexSkin;
use crate::core::shape::Arg;
use crate::core::shared::IndexWidth;
use crate::encode::compaction::Compacted;

use super::Emit;

/// Width of base64 lines in `Preview` and `Extra` blocks.
pub(crate) const BASE64_LINE: usize = 76;

/// Escapes a label text so it fits on one line.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Writes the line oriented text form, CRLF terminated.
pub(crate) struct AsciiEmitter {
    out: String,
}

impl AsciiEmitter {
    pub fn new() -> Self {
        Self { out: String::new() }
    }

    fn line(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push_str("\r\n");
    }

    fn base64(&mut self, data: &[u8]) {
        let encoded = STANDARD.encode(data);
        // base64 output is pure ASCII, so byte chunks are valid strings
        for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
            self.line(String::from_utf8_lossy(chunk));
        }
    }

    fn material_name(c: &Compacted, material: Option<u32>) -> &str {
        material
            .and_then(|m| c.materials.get(m as usize))
            .map_or("", |m| m.name.as_str())
    }
}

impl Emit for AsciiEmitter {
    fn header(&mut self, c: &Compacted) {
        self.line(format!("3dmodel {}", c.scale));
        self.line(&c.name);
        self.line(&c.license);
        self.line(&c.author);
        if !c.description.is_empty() {
            self.line(&c.description);
        }
        self.line("");
    }

    fn preview(&mut self, c: &Compacted) {
        let Some(data) = c.preview.as_deref().filter(|d| !d.is_empty()) else {
            return;
        };
        self.line("Preview");
        self.base64(data);
        self.line("");
    }

    fn color_map(&mut self, _: &Compacted) {}

    fn texture_map(&mut self, c: &Compacted) {
        if c.tmap.is_empty() {
            return;
        }
        self.line("Textmap");
        for t in &c.tmap {
            self.line(format!("{} {}", t.u, t.v));
        }
        self.line("");
    }

    fn vertices(&mut self, c: &Compacted) {
        if c.vertices.is_empty() {
            return;
        }
        self.line("Vertex");
        for v in &c.vertices {
            let mut line = format!("{} {} {} {}", v.x, v.y, v.z, v.w);
            if c.widths.ci != IndexWidth::Absent && v.color != 0 {
                let _ = write!(line, " #{:08x}", v.color);
            }
            if v.skin == VertexSkin::Transform {
                line.push_str(" transform");
            } else if let VertexSkin::Index(s) = v.skin {
                if let Some(skin) = c.skins.get(s as usize) {
                    for (&bone, &weight) in skin.bones.iter().zip(&skin.weights) {
                        if weight > 0 {
                            let _ = write!(line, " {}:{}", bone, weight as f32 / 255.0);
                        }
                    }
                }
            }
            self.line(line);
        }
        self.line("");
    }

    fn bones(&mut self, c: &Compacted) {
        if c.bones.is_empty() {
            return;
        }
        self.line("Bones");
        for bone in &c.bones {
            let parent = bone.parent.map_or(-1, |p| p as i64);
            self.line(format!("{} {} {} {}", parent, bone.pos, bone.ori, bone.name));
        }
        self.line("");
    }

    fn materials(&mut self, c: &Compacted) {
        for material in &c.materials {
            self.line(format!("Material {}", material.name));
            for prop in &material.props {
                let Some(key) = property_key(prop.kind) else {
                    continue;
                };
                let value = match prop.value {
                    PropertyValue::Color(color) => format!("#{color:08x}"),
                    PropertyValue::Int(i) => i.to_string(),
                    PropertyValue::Float(f) => f.to_string(),
                    PropertyValue::Texture(t) => match c.textures.get(t as usize) {
                        Some(name) => name.clone(),
                        None => continue,
                    },
                };
                self.line(format!("{key} {value}"));
            }
            self.line("");
        }
    }

    fn procedurals(&mut self, c: &Compacted) {
        if c.procedurals.is_empty() {
            return;
        }
        self.line("Procedural");
        for name in &c.procedurals {
            self.line(name);
        }
        self.line("");
    }

    fn mesh(&mut self, c: &Compacted) {
        if c.faces.is_empty() {
            return;
        }
        self.line("Mesh");
        let mut current = None;
        for face in &c.faces {
            if face.material != current {
                current = face.material;
                let name = Self::material_name(c, current);
                self.line(format!("use {name}").trim_end());
            }
            let corners: Vec<String> = (0..3)
                .map(|i| {
                    let v = face.vertex[i];
                    match (&face.texcoord, &face.normal) {
                        (Some(t), Some(n)) => format!("{}/{}/{}", v, t[i], n[i]),
                        (Some(t), None) => format!("{}/{}", v, t[i]),
                        (None, Some(n)) => format!("{}//{}", v, n[i]),
                        (None, None) => v.to_string(),
                    }
                })
                .collect();
            self.line(corners.join(" "));
        }
        self.line("");
    }

    fn shapes(&mut self, c: &Compacted) {
        for shape in &c.shapes {
            self.line(format!("Shape {}", shape.name));
            if let Some(group) = shape.group {
                self.line(format!("group {group}"));
            }
            for cmd in &shape.commands {
                let mut line = cmd.kind.name().to_string();
                for arg in &cmd.args {
                    let _ = match *arg {
                        Arg::Material(m) => match Self::material_name(c, m) {
                            "" => write!(line, " -"),
                            name => write!(line, " {name}"),
                        },
                        Arg::Coord(f) => write!(line, " {f}"),
                        Arg::Int(i) => write!(line, " {i}"),
                        Arg::Vertex(i)
                        | Arg::Orientation(i)
                        | Arg::Shape(i)
                        | Arg::Face(i)
                        | Arg::TexMap(i)
                        | Arg::Count(i) => write!(line, " {i}"),
                    };
                }
                self.line(line);
            }
            self.line("");
        }
    }

    fn labels(&mut self, c: &Compacted) {
        let mut key = None;
        for label in &c.labels {
            let this = (&label.lang, &label.name, label.color);
            if key != Some(this) {
                if key.is_some() {
                    self.line("");
                }
                match &label.name {
                    Some(name) => self.line(format!("Labels {name}")),
                    None => self.line("Labels"),
                }
                if let Some(lang) = &label.lang {
                    self.line(format!("lang {lang}"));
                }
                if label.color != 0 {
                    self.line(format!("color #{:08x}", label.color));
                }
                key = Some(this);
            }
            self.line(format!("{} {}", label.vertex, escape(&label.text)));
        }
        if key.is_some() {
            self.line("");
        }
    }

    fn actions(&mut self, c: &Compacted) {
        for action in &c.actions {
            self.line(format!("Action {} {}", action.duration_msec, action.name));
            for frame in &action.frames {
                self.line(format!("frame {}", frame.msec));
                for t in &frame.transforms {
                    self.line(format!("{} {} {}", t.bone, t.pos, t.ori));
                }
            }
            self.line("");
        }
    }

    fn assets(&mut self, c: &Compacted) {
        if c.inlined.is_empty() {
            return;
        }
        self.line("Assets");
        for asset in &c.inlined {
            self.line(&asset.name);
        }
        self.line("");
    }

    fn extras(&mut self, c: &Compacted) {
        for extra in &c.extras {
            self.line(format!("Extra {}", String::from_utf8_lossy(&extra.magic)));
            self.base64(&extra.data);
            self.line("");
        }
    }

    fn end(&mut self, _: &Compacted) {
        self.line("End");
    }

    fn finish(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}
