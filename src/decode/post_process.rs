use glam::{Mat4, Vec3};

use crate::core::model::{ErrorCode, Model, Vertex, VertexSkin, VertexWeight};
use crate::core::skeleton::{local_matrix, vertex_orientation, vertex_position};

use super::Config;

/// Inverse square root with one Newton step, enough for unit normals.
fn fast_inv_sqrt(x: f32) -> f32 {
    let half = 0.5 * x;
    let y = f32::from_bits(0x5f37_5a86 - (x.to_bits() >> 1));
    y * (1.5 - half * y * y)
}

fn normalize(v: Vec3) -> Vec3 {
    let len2 = v.length_squared();
    if len2 > 0.0 {
        v * fast_inv_sqrt(len2)
    } else {
        v
    }
}

/// Completes a freshly parsed model: normals, skin weights and bone matrices.
pub(crate) fn finish(model: &mut Model, cfg: &Config) {
    if cfg.generate_normals && model.faces.iter().any(|f| f.normal.is_none()) {
        generate_normals(model);
    }
    normalize_skins(model);
    bind_matrices(model);
    bone_weights(model);
}

/// Gives every face without normals one normal per corner, averaged over the
/// flat normals of those faces. The slots follow the original vertices, one
/// per vertex; faces that came with normals keep them.
fn generate_normals(model: &mut Model) {
    let n = model.vertices.len();
    let mut sums = vec![Vec3::ZERO; n];
    let mut filled = Vec::new();
    let position = |v: &Vertex| Vec3::new(v.x, v.y, v.z);
    for (f, face) in model.faces.iter().enumerate() {
        if face.normal.is_some() {
            continue;
        }
        let corners: Option<Vec<Vec3>> = face
            .vertex
            .iter()
            .map(|&i| model.vertices.get(i as usize).map(position))
            .collect();
        let Some([a, b, c]) = corners.and_then(|c| <[Vec3; 3]>::try_from(c).ok()) else {
            continue;
        };
        let normal = normalize((b - a).cross(c - a));
        for &i in &face.vertex {
            sums[i as usize] += normal;
        }
        filled.push(f);
    }
    if filled.is_empty() {
        return;
    }
    model.vertices.extend(sums.into_iter().map(|s| {
        let s = normalize(s);
        Vertex::transform(s.x, s.y, s.z, 1.0)
    }));
    for &f in &filled {
        let face = &mut model.faces[f];
        face.normal = Some(face.vertex.iter().map(|&i| i + n as u32).collect());
    }
    model.generated_normals = Some(n as u32);
    log::debug!("generated normals for {} of {} faces", filled.len(), model.faces.len());
}

fn normalize_skins(model: &mut Model) {
    for skin in &mut model.skins {
        let sum: f32 = skin.weights.iter().filter(|w| w.bone.is_some()).map(|w| w.weight).sum();
        if sum != 0.0 && sum != 1.0 {
            for w in skin.weights.iter_mut().filter(|w| w.bone.is_some()) {
                w.weight /= sum;
            }
        }
    }
}

/// Computes every bone's bind matrix from its parent's, then stores the inverse.
fn bind_matrices(model: &mut Model) {
    let mut world: Vec<Mat4> = Vec::with_capacity(model.bones.len());
    let mut bad = false;
    for (i, bone) in model.bones.iter().enumerate() {
        let local = match (vertex_position(model, bone.pos), vertex_orientation(model, bone.ori)) {
            (Ok(pos), Ok(ori)) => local_matrix(pos, ori),
            _ => {
                bad = true;
                Mat4::IDENTITY
            }
        };
        let parent = bone.parent.filter(|&p| (p as usize) < i).map(|p| world[p as usize]);
        world.push(parent.map_or(local, |p| p * local));
    }
    for (bone, mat) in model.bones.iter_mut().zip(world) {
        bone.mat4 = mat.inverse();
    }
    if bad {
        model.report(ErrorCode::BadReference);
    }
}

fn bone_weights(model: &mut Model) {
    for bone in &mut model.bones {
        bone.weights.clear();
    }
    let mut bad = false;
    for (i, vertex) in model.vertices.iter().enumerate() {
        let VertexSkin::Index(s) = vertex.skin else {
            continue;
        };
        let Some(skin) = model.skins.get(s as usize) else {
            bad = true;
            continue;
        };
        for (bone, weight) in skin.used() {
            match model.bones.get_mut(bone as usize) {
                Some(b) => b.weights.push(VertexWeight {
                    vertex: i as u32,
                    weight,
                }),
                None => bad = true,
            }
        }
    }
    if bad {
        model.report(ErrorCode::BadReference);
    }
}
