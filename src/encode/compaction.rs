use std::cmp::{Ordering, Reverse};

use crate::core::material::{property_format, Material, Property, PropertyValue};
use crate::core::model::{
    Action, Bone, ExtraChunk, Face, Frame, InlinedAsset, Label, Model, TexCoord, Transform, Vertex,
    VertexSkin, MAX_BONES_PER_VERTEX,
};
use crate::core::shape::{Arg, Command, CommandKind, Shape};
use crate::core::shared::{CoordWidth, IndexWidth, Widths, UNDEF};
use crate::shared::safe_str::{self, Mode};

use super::color_map::ColorMap;
use super::string_table::{self, StringTable};
use super::{Config, ExportFlags};

#[remain::sorted]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Err {
    #[error("{what} {index} referenced by {by} does not exist")]
    DanglingReference {
        what: &'static str,
        index: u32,
        by: &'static str,
    },
    #[error("Materials {first} and {second} are both saved as '{name}'")]
    DuplicateMaterialName { first: usize, second: usize, name: String },
    #[error("Mesh range {first}..={last} of shape {shape} is invalid")]
    InvalidMeshRange { shape: usize, first: u32, last: u32 },
    #[error("Command {command} of shape {shape} has malformed arguments")]
    MalformedCommand { shape: usize, command: usize },
    #[error("Face {0} has {1} corners, only triangles can be saved")]
    NonTriangularFace(usize, usize),
    #[error("Mesh range of shape {shape} claims face {face}, which is already in another range")]
    OverlappingMeshRange { shape: usize, face: u32 },
    #[error("String table error: {0}")]
    StringTableError(#[from] string_table::Err),
}

/// A skin with byte weights summing to 255. Used slots come first; unused ones
/// have bone `UNDEF` and weight 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuantSkin {
    pub bones: [u32; MAX_BONES_PER_VERTEX],
    pub weights: [u8; MAX_BONES_PER_VERTEX],
}

impl QuantSkin {
    pub fn used(&self) -> usize {
        self.weights.iter().filter(|&&w| w > 0).count()
    }

    /// Distributes 255 over the weighted bones by largest remainder.
    /// Returns `None` when no bone carries weight.
    fn quantize(pairs: &[(u32, f32)]) -> Option<Self> {
        let pairs: Vec<(u32, f32)> = pairs.iter().copied().filter(|&(_, w)| w > 0.0).collect();
        let total: f32 = pairs.iter().map(|&(_, w)| w).sum();
        if pairs.is_empty() || total <= 0.0 {
            return None;
        }
        let scaled: Vec<f32> = pairs.iter().map(|&(_, w)| w / total * 255.0).collect();
        let mut bytes: Vec<u32> = scaled.iter().map(|s| s.floor() as u32).collect();
        let mut rest = 255_u32.saturating_sub(bytes.iter().sum());
        let mut order: Vec<usize> = (0..pairs.len()).collect();
        order.sort_by(|&a, &b| {
            let fa = scaled[a] - scaled[a].floor();
            let fb = scaled[b] - scaled[b].floor();
            fb.total_cmp(&fa)
        });
        for &i in order.iter().cycle().take(pairs.len() * 2) {
            if rest == 0 {
                break;
            }
            bytes[i] += 1;
            rest -= 1;
        }

        let mut out = QuantSkin {
            bones: [UNDEF; MAX_BONES_PER_VERTEX],
            weights: [0; MAX_BONES_PER_VERTEX],
        };
        let mut slot = 0;
        for (&(bone, _), &byte) in pairs.iter().zip(&bytes) {
            if byte > 0 && slot < MAX_BONES_PER_VERTEX {
                out.bones[slot] = bone;
                out.weights[slot] = byte.min(255) as u8;
                slot += 1;
            }
        }
        Some(out)
    }
}

/// Everything an emitter writes, already filtered, deduplicated, renumbered
/// and sanitized.
#[derive(Debug, Clone)]
pub struct Compacted {
    pub flags: ExportFlags,
    pub widths: Widths,
    pub scale: f32,
    pub name: String,
    pub license: String,
    pub author: String,
    pub description: String,
    pub strings: StringTable,
    /// Header strings followed by the string table.
    pub string_area: Vec<u8>,
    pub colors: ColorMap,
    pub preview: Option<Vec<u8>>,
    pub tmap: Vec<TexCoord>,
    pub vertices: Vec<Vertex>,
    pub skins: Vec<QuantSkin>,
    pub bones: Vec<Bone>,
    pub materials: Vec<Material>,
    pub textures: Vec<String>,
    pub procedurals: Vec<String>,
    pub faces: Vec<Face>,
    pub shapes: Vec<Shape>,
    pub labels: Vec<Label>,
    pub actions: Vec<Action>,
    pub inlined: Vec<InlinedAsset>,
    pub extras: Vec<ExtraChunk>,
}

impl Compacted {
    pub fn is_ascii(&self) -> bool {
        self.flags.contains(ExportFlags::ASCII)
    }

    pub fn color_index(&self, color: u32) -> u32 {
        match self.widths.ci {
            IndexWidth::U32 => color,
            _ => self.colors.index_of(color),
        }
    }
}

/// How a vertex is used. Orientations and normals are not positions: they are
/// not rescaled and carry the transform skin marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
    Position,
    Orientation,
    Normal,
}

const ROLES: usize = 3;

/// Per original index, whether it is referenced in each role.
struct Marks {
    vertices: Vec<[bool; ROLES]>,
    tmap: Vec<bool>,
    materials: Vec<bool>,
}

impl Marks {
    fn vertex(&mut self, idx: u32, role: Role) {
        self.vertices[idx as usize][role as usize] = true;
    }
}

fn check(idx: u32, len: usize, what: &'static str, by: &'static str) -> Result<(), Err> {
    if (idx as usize) < len {
        Ok(())
    } else {
        Err(Err::DanglingReference { what, index: idx, by })
    }
}

/// Rejects models that cannot be written: non-triangles, indices past the end
/// of their arrays, bones whose parent does not precede them and shape
/// commands whose arguments do not follow the command table.
fn validate(model: &Model) -> Result<(), Err> {
    let nv = model.vertices.len();
    for (i, face) in model.faces.iter().enumerate() {
        if face.vertex.len() != 3 {
            return Err(Err::NonTriangularFace(i, face.vertex.len()));
        }
        for list in [&face.texcoord, &face.normal].into_iter().flatten() {
            if list.len() != 3 {
                return Err(Err::NonTriangularFace(i, list.len()));
            }
        }
        for &v in &face.vertex {
            check(v, nv, "vertex", "face")?;
        }
        for &t in face.texcoord.iter().flatten() {
            check(t, model.tmap.len(), "texture coordinate", "face")?;
        }
        for &n in face.normal.iter().flatten() {
            check(n, nv, "normal", "face")?;
        }
        if let Some(m) = face.material {
            check(m, model.materials.len(), "material", "face")?;
        }
    }
    for vertex in &model.vertices {
        if let VertexSkin::Index(s) = vertex.skin {
            check(s, model.skins.len(), "skin", "vertex")?;
        }
    }
    for skin in &model.skins {
        for (bone, _) in skin.used() {
            check(bone, model.bones.len(), "bone", "skin")?;
        }
    }
    for (i, bone) in model.bones.iter().enumerate() {
        check(bone.pos, nv, "vertex", "bone")?;
        check(bone.ori, nv, "vertex", "bone")?;
        if let Some(p) = bone.parent {
            check(p, i, "parent bone", "bone")?;
        }
    }
    for material in &model.materials {
        for prop in &material.props {
            if let PropertyValue::Texture(t) = prop.value {
                check(t, model.textures.len(), "texture", "material")?;
            }
        }
    }
    for (s, shape) in model.shapes.iter().enumerate() {
        if let Some(g) = shape.group {
            check(g, model.bones.len(), "bone", "shape")?;
        }
        for (c, cmd) in shape.commands.iter().enumerate() {
            if !cmd.is_well_formed() {
                return Err(Err::MalformedCommand { shape: s, command: c });
            }
            for arg in &cmd.args {
                match *arg {
                    Arg::Material(Some(m)) => check(m, model.materials.len(), "material", "shape")?,
                    Arg::Vertex(v) | Arg::Orientation(v) => check(v, nv, "vertex", "shape")?,
                    Arg::Shape(h) => check(h, model.shapes.len(), "shape", "shape")?,
                    Arg::Face(f) => check(f, model.faces.len(), "face", "shape")?,
                    Arg::TexMap(t) => check(t, model.tmap.len(), "texture coordinate", "shape")?,
                    _ => {}
                }
            }
        }
    }
    for label in &model.labels {
        check(label.vertex, nv, "vertex", "label")?;
    }
    for action in &model.actions {
        for t in action.frames.iter().flat_map(|f| &f.transforms) {
            check(t.bone, model.bones.len(), "bone", "action")?;
            check(t.pos, nv, "vertex", "action")?;
            check(t.ori, nv, "vertex", "action")?;
        }
    }
    Ok(())
}

/// Assigns each face the group of the mesh range containing it: 1 + the
/// ordinal of the mesh command over all shapes, or 0 outside every range.
fn face_groups(model: &Model) -> Result<Vec<u32>, Err> {
    let mut groups = vec![0; model.faces.len()];
    let mut ordinal = 0;
    for (s, shape) in model.shapes.iter().enumerate() {
        for cmd in &shape.commands {
            let Some((first, last)) = cmd.mesh_range() else {
                continue;
            };
            if first > last || last as usize >= model.faces.len() {
                return Err(Err::InvalidMeshRange { shape: s, first, last });
            }
            ordinal += 1;
            for face in first..=last {
                if groups[face as usize] != 0 {
                    return Err(Err::OverlappingMeshRange { shape: s, face });
                }
                groups[face as usize] = ordinal;
            }
        }
    }
    Ok(groups)
}

/// The normals of `face` that get written. Normals synthesized by loading are
/// left out; faces that brought their own keep them.
fn saved_normal(face: &Face, keep: bool, generated: Option<u32>) -> Option<&Vec<u32>> {
    face.normal
        .as_ref()
        .filter(|n| keep && !generated.is_some_and(|g| n.iter().all(|&i| i >= g)))
}

/// Rounds to the grid a fixed point width can represent.
fn round_signed(value: f32, width: CoordWidth) -> f32 {
    match width {
        CoordWidth::I8 => (value.clamp(-1.0, 1.0) * 127.0).round() / 127.0,
        CoordWidth::I16 => (value.clamp(-1.0, 1.0) * 32767.0).round() / 32767.0,
        CoordWidth::F32 | CoordWidth::F64 => value,
    }
}

fn round_unsigned(value: f32, width: CoordWidth) -> f32 {
    match width {
        CoordWidth::I8 => (value.clamp(0.0, 1.0) * 255.0).round() / 255.0,
        CoordWidth::I16 => (value.clamp(0.0, 1.0) * 65535.0).round() / 65535.0,
        CoordWidth::F32 | CoordWidth::F64 => value,
    }
}

struct VertexEntry {
    vertex: Vertex,
    role: Role,
    orig: u32,
}

impl VertexEntry {
    fn is_normal(&self) -> bool {
        self.role == Role::Normal
    }

    /// Geometry that is rescaled with the model.
    fn is_position(&self) -> bool {
        self.role == Role::Position && self.vertex.skin != VertexSkin::Transform
    }

    /// Normals compare by their components only, everything else by the whole record.
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.vertex, &other.vertex);
        self.is_normal()
            .cmp(&other.is_normal())
            .then(a.x.total_cmp(&b.x))
            .then(a.y.total_cmp(&b.y))
            .then(a.z.total_cmp(&b.z))
            .then(a.w.total_cmp(&b.w))
            .then_with(|| {
                if self.is_normal() {
                    Ordering::Equal
                } else {
                    a.color.cmp(&b.color).then(a.skin.cmp(&b.skin))
                }
            })
    }
}

/// Sorts entries, collapses equal neighbors and returns the unique records
/// together with the new index of every entry.
fn dedup_vertices(mut entries: Vec<VertexEntry>) -> (Vec<Vertex>, Vec<[Option<u32>; ROLES]>, usize) {
    let max_orig = entries.iter().map(|e| e.orig as usize + 1).max().unwrap_or(0);
    let mut remap = vec![[None; ROLES]; max_orig];
    entries.sort_by(|a, b| a.cmp(b));
    let mut out: Vec<Vertex> = Vec::with_capacity(entries.len());
    let mut prev: Option<&VertexEntry> = None;
    for entry in &entries {
        if prev.map_or(true, |p| p.cmp(entry) != Ordering::Equal) {
            out.push(entry.vertex);
        }
        remap[entry.orig as usize][entry.role as usize] = Some(out.len() as u32 - 1);
        prev = Some(entry);
    }
    let collapsed = entries.len() - out.len();
    (out, remap, collapsed)
}

pub fn compact(model: &Model, cfg: &Config) -> Result<Compacted, Err> {
    validate(model)?;
    let flags = cfg.flags;
    let ascii = cfg.is_ascii();
    let coord = if ascii {
        CoordWidth::F64
    } else {
        cfg.quality.coord_width()
    };
    let keep_faces = !flags.contains(ExportFlags::NO_FACE);
    let keep_bones = !flags.contains(ExportFlags::NO_BONE);
    let keep_actions = keep_bones && !flags.contains(ExportFlags::NO_ACTION);
    let keep_materials = !flags.contains(ExportFlags::NO_MATERIAL);
    let keep_normals = !flags.contains(ExportFlags::NO_NORMAL);
    let generated = model.generated_normals;
    let keep_texcoords = !flags.contains(ExportFlags::NO_TXTCRD);

    let groups = face_groups(model)?;

    // reference marking
    let mut marks = Marks {
        vertices: vec![[false; ROLES]; model.vertices.len()],
        tmap: vec![false; model.tmap.len()],
        materials: vec![false; model.materials.len()],
    };
    if keep_faces {
        for face in &model.faces {
            for &v in &face.vertex {
                marks.vertex(v, Role::Position);
            }
            if keep_texcoords {
                for &t in face.texcoord.iter().flatten() {
                    marks.tmap[t as usize] = true;
                }
            }
            for &n in saved_normal(face, keep_normals, generated).into_iter().flatten() {
                marks.vertex(n, Role::Normal);
            }
            if let Some(m) = face.material {
                marks.materials[m as usize] = true;
            }
        }
    }
    for shape in &model.shapes {
        for cmd in &shape.commands {
            if cmd.kind == CommandKind::Mesh && !keep_faces {
                continue;
            }
            for arg in &cmd.args {
                match *arg {
                    Arg::Material(Some(m)) => marks.materials[m as usize] = true,
                    Arg::Vertex(v) => marks.vertex(v, Role::Position),
                    Arg::Orientation(v) => marks.vertex(v, Role::Orientation),
                    Arg::TexMap(t) => marks.tmap[t as usize] = true,
                    _ => {}
                }
            }
        }
    }
    if keep_bones {
        for bone in &model.bones {
            marks.vertex(bone.pos, Role::Position);
            marks.vertex(bone.ori, Role::Orientation);
        }
    }
    if keep_actions {
        for t in model.actions.iter().flat_map(|a| &a.frames).flat_map(|f| &f.transforms) {
            marks.vertex(t.pos, Role::Position);
            marks.vertex(t.ori, Role::Orientation);
        }
    }
    for label in &model.labels {
        marks.vertex(label.vertex, Role::Position);
    }
    if !keep_materials {
        marks.materials.iter_mut().for_each(|m| *m = false);
    } else if model.faces.is_empty() && model.shapes.is_empty() {
        marks.materials.iter_mut().for_each(|m| *m = true);
    }

    let mut strings = StringTable::new();
    let mut colors = ColorMap::new();

    // materials and the textures they reference
    let mut material_map = vec![None; model.materials.len()];
    let mut texture_map = vec![None; model.textures.len()];
    let mut textures = Vec::new();
    let mut materials = Vec::new();
    for (i, mat) in model.materials.iter().enumerate() {
        if !marks.materials[i] {
            continue;
        }
        let name = safe_str::sanitize(&mat.name, Mode::Name);
        if let Some(first) = model.materials[..i]
            .iter()
            .enumerate()
            .position(|(j, m)| marks.materials[j] && safe_str::sanitize(&m.name, Mode::Name) == name)
        {
            return Err(Err::DuplicateMaterialName { first, second: i, name });
        }
        let mut out = Material::new(strings.add(&name, Mode::Name));
        for prop in &mat.props {
            if property_format(prop.kind).is_none() {
                log::warn!("dropping unknown property {} of material '{}'", prop.kind, mat.name);
                continue;
            }
            let value = match prop.value {
                PropertyValue::Texture(t) => {
                    let new = *texture_map[t as usize].get_or_insert_with(|| {
                        textures.push(strings.add(&model.textures[t as usize].name, Mode::Name));
                        textures.len() as u32 - 1
                    });
                    PropertyValue::Texture(new)
                }
                PropertyValue::Color(c) => {
                    colors.add(c);
                    PropertyValue::Color(c)
                }
                other => other,
            };
            out.props.push(Property { kind: prop.kind, value });
        }
        material_map[i] = Some(materials.len() as u32);
        materials.push(out);
    }

    // skins, quantized and deduplicated
    let mut skin_quant: Vec<Option<QuantSkin>> = vec![None; model.skins.len()];
    if keep_bones {
        for (i, roles) in marks.vertices.iter().enumerate() {
            if let (true, VertexSkin::Index(s)) = (roles[Role::Position as usize], model.vertices[i].skin) {
                let s = s as usize;
                if skin_quant[s].is_none() {
                    let pairs: Vec<(u32, f32)> = model.skins[s].used().collect();
                    skin_quant[s] = QuantSkin::quantize(&pairs);
                }
            }
        }
    }
    let mut skins: Vec<QuantSkin> = skin_quant.iter().flatten().copied().collect();
    skins.sort();
    skins.dedup();
    let skin_map: Vec<Option<u32>> = skin_quant
        .iter()
        .map(|q| q.and_then(|q| skins.binary_search(&q).ok().map(|i| i as u32)))
        .collect();

    // vertices
    let mut entries = Vec::new();
    for (i, roles) in marks.vertices.iter().enumerate() {
        let v = model.vertices[i];
        if roles[Role::Position as usize] {
            let skin = match v.skin {
                VertexSkin::Index(s) => skin_map[s as usize].map_or(VertexSkin::None, VertexSkin::Index),
                other => other,
            };
            entries.push(VertexEntry {
                vertex: Vertex { skin, ..v },
                role: Role::Position,
                orig: i as u32,
            });
        }
        if roles[Role::Orientation as usize] {
            entries.push(VertexEntry {
                vertex: Vertex {
                    skin: VertexSkin::Transform,
                    ..v
                },
                role: Role::Orientation,
                orig: i as u32,
            });
        }
        if roles[Role::Normal as usize] {
            entries.push(VertexEntry {
                vertex: Vertex::transform(v.x, v.y, v.z, v.w),
                role: Role::Normal,
                orig: i as u32,
            });
        }
    }

    let base_scale = if model.scale > 0.0 { model.scale } else { 1.0 };
    let mut scale = base_scale;
    if !flags.contains(ExportFlags::NO_RECALC) {
        let extent = entries
            .iter()
            .filter(|e| e.is_position())
            .flat_map(|e| [e.vertex.x.abs(), e.vertex.y.abs(), e.vertex.z.abs()])
            .fold(0.0_f32, f32::max);
        if extent > 0.0 && extent.is_finite() {
            for entry in entries.iter_mut().filter(|e| e.is_position()) {
                entry.vertex.x /= extent;
                entry.vertex.y /= extent;
                entry.vertex.z /= extent;
            }
            scale = base_scale * extent;
        }
    }
    for entry in &mut entries {
        let v = &mut entry.vertex;
        v.x = round_signed(v.x, coord);
        v.y = round_signed(v.y, coord);
        v.z = round_signed(v.z, coord);
        v.w = round_signed(v.w, coord);
    }
    let referenced = entries.len();
    let (vertices, vertex_map, collapsed) = dedup_vertices(entries);
    log::debug!(
        "{} of {} vertices referenced, {} duplicates collapsed",
        referenced,
        model.vertices.len(),
        collapsed
    );
    let vmap = |idx: u32, role: Role| -> u32 {
        vertex_map
            .get(idx as usize)
            .and_then(|roles| roles[role as usize])
            .unwrap_or(UNDEF)
    };
    for v in &vertices {
        colors.add(v.color);
    }

    // texture coordinates
    let flip = flags.contains(ExportFlags::FLIP_TXTCRD);
    let mut tex_entries: Vec<(TexCoord, u32)> = marks
        .tmap
        .iter()
        .enumerate()
        .filter(|&(_, &m)| m)
        .map(|(i, _)| {
            let t = model.tmap[i];
            let v = if flip { 1.0 - t.v } else { t.v };
            let t = TexCoord {
                u: round_unsigned(t.u, coord),
                v: round_unsigned(v, coord),
            };
            (t, i as u32)
        })
        .collect();
    tex_entries.sort_by(|(a, _), (b, _)| a.u.total_cmp(&b.u).then(a.v.total_cmp(&b.v)));
    let mut tmap: Vec<TexCoord> = Vec::new();
    let mut tex_map = vec![UNDEF; model.tmap.len()];
    for (t, orig) in &tex_entries {
        let same = tmap
            .last()
            .is_some_and(|l| l.u.total_cmp(&t.u).is_eq() && l.v.total_cmp(&t.v).is_eq());
        if !same {
            tmap.push(*t);
        }
        tex_map[*orig as usize] = tmap.len() as u32 - 1;
    }

    // faces, grouped and sorted
    let mut order: Vec<usize> = if keep_faces {
        (0..model.faces.len()).collect()
    } else {
        Vec::new()
    };
    let opacity = |face: &Face| {
        face.material
            .and_then(|m| material_map[m as usize])
            .map_or(255, |m| materials[m as usize].opacity())
    };
    order.sort_by_key(|&i| {
        let face = &model.faces[i];
        let material = face.material.and_then(|m| material_map[m as usize]).unwrap_or(u32::MAX);
        (groups[i], Reverse(opacity(face)), material)
    });
    let mut face_map = vec![UNDEF; model.faces.len()];
    let faces: Vec<Face> = order
        .iter()
        .enumerate()
        .map(|(new, &old)| {
            face_map[old] = new as u32;
            let face = &model.faces[old];
            Face {
                material: face.material.and_then(|m| material_map[m as usize]),
                vertex: face.vertex.iter().map(|&v| vmap(v, Role::Position)).collect(),
                texcoord: face
                    .texcoord
                    .as_ref()
                    .filter(|_| keep_texcoords)
                    .map(|t| t.iter().map(|&t| tex_map[t as usize]).collect()),
                normal: saved_normal(face, keep_normals, generated)
                    .map(|n| n.iter().map(|&n| vmap(n, Role::Normal)).collect()),
            }
        })
        .collect();

    // shapes
    let shapes: Vec<Shape> = model
        .shapes
        .iter()
        .map(|shape| Shape {
            name: strings.add(&shape.name, Mode::Name),
            group: shape.group.filter(|_| keep_bones),
            commands: shape
                .commands
                .iter()
                .filter(|cmd| keep_faces || cmd.kind != CommandKind::Mesh)
                .map(|cmd| remap_command(cmd, &material_map, &face_map, &tex_map, &vmap))
                .collect(),
        })
        .collect();

    let bones: Vec<Bone> = if keep_bones {
        model
            .bones
            .iter()
            .map(|b| Bone::new(strings.add(&b.name, Mode::Name), b.parent, vmap(b.pos, Role::Position), vmap(b.ori, Role::Orientation)))
            .collect()
    } else {
        Vec::new()
    };

    let actions: Vec<Action> = if keep_actions {
        model
            .actions
            .iter()
            .map(|a| Action {
                name: strings.add(&a.name, Mode::Name),
                duration_msec: a.duration_msec,
                frames: a
                    .frames
                    .iter()
                    .map(|f| Frame {
                        msec: f.msec,
                        transforms: f
                            .transforms
                            .iter()
                            .map(|t| Transform {
                                bone: t.bone,
                                pos: vmap(t.pos, Role::Position),
                                ori: vmap(t.ori, Role::Orientation),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    } else {
        Vec::new()
    };

    // sorted before their strings are recorded, the string area must not
    // depend on the order labels had in the model
    let name_or_none = |s: &Option<String>| {
        s.as_deref()
            .map(|s| safe_str::sanitize(s, Mode::Name))
            .filter(|s| !s.is_empty())
    };
    let mut labels: Vec<Label> = model
        .labels
        .iter()
        .map(|l| Label {
            name: name_or_none(&l.name),
            lang: name_or_none(&l.lang),
            color: l.color,
            vertex: vmap(l.vertex, Role::Position),
            text: safe_str::sanitize(&l.text, Mode::Paragraph),
        })
        .collect();
    labels.sort_by(|a, b| (&a.lang, &a.name, &a.text).cmp(&(&b.lang, &b.name, &b.text)));
    for label in &labels {
        colors.add(label.color);
        for s in [&label.name, &label.lang].into_iter().flatten() {
            strings.add(s, Mode::Name);
        }
        strings.add(&label.text, Mode::Paragraph);
    }

    let procedurals: Vec<String> = model
        .procedurals
        .iter()
        .map(|p| strings.add(p, Mode::Name))
        .filter(|p| !p.is_empty())
        .collect();
    let inlined: Vec<InlinedAsset> = model
        .inlined
        .iter()
        .map(|a| InlinedAsset {
            name: strings.add(&a.name, Mode::Name),
            data: a.data.clone(),
        })
        .collect();

    colors.finish();

    let name = safe_str::sanitize(&model.name, Mode::Line);
    let license = safe_str::sanitize(&model.license, Mode::Line);
    let author = safe_str::sanitize(&model.author, Mode::Line);
    let description = safe_str::sanitize(
        &model.description,
        if ascii { Mode::Crlf } else { Mode::Paragraph },
    );
    let string_area = strings.finalize([&name, &license, &author, &description])?;

    let max_variadic = shapes
        .iter()
        .flat_map(|s| &s.commands)
        .flat_map(|c| &c.args)
        .filter_map(|a| match a {
            Arg::Count(n) => Some(*n as usize),
            _ => None,
        })
        .max();
    let max_transforms = actions
        .iter()
        .flat_map(|a| &a.frames)
        .map(|f| f.transforms.len())
        .max();
    let has_carriers = vertices.iter().any(|v| v.skin == VertexSkin::Transform);
    let widths = Widths {
        vc: coord,
        vi: IndexWidth::for_count(vertices.len()),
        si: IndexWidth::for_count(string_area.len()),
        ci: colors.width(!flags.contains(ExportFlags::NO_CMAP)),
        ti: IndexWidth::for_optional_count(tmap.len()),
        bi: IndexWidth::for_optional_count(bones.len()),
        nb: match skins.iter().map(QuantSkin::used).max().unwrap_or(1) {
            0 | 1 => 1,
            2 => 2,
            _ => 4,
        },
        sk: if skins.is_empty() && !has_carriers {
            IndexWidth::Absent
        } else {
            IndexWidth::for_count(skins.len())
        },
        fc: max_transforms.map_or(IndexWidth::Absent, |n| IndexWidth::for_count(n + 1)),
        hi: IndexWidth::for_optional_count(shapes.len()),
        fi: IndexWidth::for_optional_count(faces.len()),
        vd: max_variadic.map_or(IndexWidth::Absent, |n| IndexWidth::for_count(n + 1)),
    };
    log::debug!(
        "compacted to {} vertices, {} texture coordinates, {} skins, {} faces, {} colors, widths {:?}",
        vertices.len(),
        tmap.len(),
        skins.len(),
        faces.len(),
        colors.len(),
        widths
    );

    Ok(Compacted {
        flags,
        widths,
        scale,
        name,
        license,
        author,
        description,
        strings,
        string_area,
        colors,
        preview: model.preview.clone(),
        tmap,
        vertices,
        skins,
        bones,
        materials,
        textures,
        procedurals,
        faces,
        shapes,
        labels,
        actions,
        inlined,
        extras: model.extras.clone(),
    })
}

fn remap_command(
    cmd: &Command,
    material_map: &[Option<u32>],
    face_map: &[u32],
    tex_map: &[u32],
    vmap: &impl Fn(u32, Role) -> u32,
) -> Command {
    let mut args: Vec<Arg> = cmd
        .args
        .iter()
        .map(|arg| match *arg {
            Arg::Material(m) => Arg::Material(m.and_then(|m| material_map[m as usize])),
            Arg::Vertex(v) => Arg::Vertex(vmap(v, Role::Position)),
            Arg::Orientation(v) => Arg::Orientation(vmap(v, Role::Orientation)),
            Arg::Face(f) => Arg::Face(face_map[f as usize]),
            Arg::TexMap(t) => Arg::TexMap(tex_map[t as usize]),
            other => other,
        })
        .collect();
    // sorted faces of one range stay contiguous, only the ends move
    if let Some((first, last)) = cmd.mesh_range() {
        let moved = (first..=last).map(|f| face_map[f as usize]);
        let lo = moved.clone().min().unwrap_or(UNDEF);
        let hi = moved.max().unwrap_or(UNDEF);
        args[0] = Arg::Face(lo);
        args[1] = Arg::Face(hi);
    }
    Command { kind: cmd.kind, args }
}
