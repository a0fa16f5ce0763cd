//! Pose queries over a model's bones and actions.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::model::{Frame, Model};

/// A bone of a posed skeleton.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkeletonBone {
    pub parent: Option<u32>,
    pub name: String,
    pub pos: Vec3,
    pub ori: Quat,
    /// Local matrix for static poses, accumulated parent-to-child for
    /// interpolated ones.
    pub mat4: Mat4,
}

#[remain::sorted]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Err {
    #[error("Bone {0} does not exist")]
    BadBone(u32),
    #[error("Vertex {0} does not exist")]
    BadVertex(u32),
    #[error("The model has no bones")]
    NoBones,
    #[error("Action {0} does not exist")]
    UnknownAction(usize),
    #[error("Frame {frame} does not exist, the action has {len} frames")]
    UnknownFrame { frame: usize, len: usize },
}

pub fn vertex_position(model: &Model, idx: u32) -> Result<Vec3, Err> {
    let v = model.vertices.get(idx as usize).ok_or(Err::BadVertex(idx))?;
    Ok(Vec3::new(v.x, v.y, v.z))
}

pub fn vertex_orientation(model: &Model, idx: u32) -> Result<Quat, Err> {
    let v = model.vertices.get(idx as usize).ok_or(Err::BadVertex(idx))?;
    let q = Quat::from_xyzw(v.x, v.y, v.z, v.w);
    let len = q.length();
    Ok(if len > 0.0 { q / len } else { Quat::IDENTITY })
}

pub fn local_matrix(pos: Vec3, ori: Quat) -> Mat4 {
    Mat4::from_rotation_translation(ori, pos)
}

fn bind_pose(model: &Model) -> Result<Vec<SkeletonBone>, Err> {
    if model.bones.is_empty() {
        return Err(Err::NoBones);
    }
    model
        .bones
        .iter()
        .map(|bone| {
            let pos = vertex_position(model, bone.pos)?;
            let ori = vertex_orientation(model, bone.ori)?;
            Ok(SkeletonBone {
                parent: bone.parent,
                name: bone.name.clone(),
                pos,
                ori,
                mat4: local_matrix(pos, ori),
            })
        })
        .collect()
}

fn apply_frame(model: &Model, skeleton: &mut [SkeletonBone], frame: &Frame) -> Result<(), Err> {
    for t in &frame.transforms {
        let pos = vertex_position(model, t.pos)?;
        let ori = vertex_orientation(model, t.ori)?;
        let bone = skeleton.get_mut(t.bone as usize).ok_or(Err::BadBone(t.bone))?;
        bone.pos = pos;
        bone.ori = ori;
    }
    Ok(())
}

/// Poses the skeleton at one frame of an action and returns local matrices.
///
/// Without a `previous` skeleton, or for frame 0, the pose is rebuilt from the
/// bind pose by replaying every frame up to `frame`. With a previous skeleton,
/// only the transforms of `frame` are applied on top of it. Frame 0 is not
/// replayed on its own when its timestamp is not zero. `action == None`
/// yields the bind pose.
pub fn compute_static_pose(
    model: &Model,
    action: Option<usize>,
    frame: usize,
    previous: Option<Vec<SkeletonBone>>,
) -> Result<Vec<SkeletonBone>, Err> {
    if model.bones.is_empty() {
        return Err(Err::NoBones);
    }
    let action = match action {
        Some(a) => {
            let act = model.actions.get(a).ok_or(Err::UnknownAction(a))?;
            if frame >= act.frames.len() {
                return Err(Err::UnknownFrame {
                    frame,
                    len: act.frames.len(),
                });
            }
            Some(act)
        }
        None => None,
    };

    let (mut skeleton, first) = match previous {
        Some(prev) if frame > 0 && prev.len() == model.bones.len() => (prev, frame),
        _ => (bind_pose(model)?, 0),
    };

    if let Some(act) = action {
        if frame > 0 || act.frames[0].msec == 0 {
            for fr in &act.frames[first..=frame] {
                apply_frame(model, &mut skeleton, fr)?;
            }
        }
    }

    for bone in &mut skeleton {
        bone.mat4 = local_matrix(bone.pos, bone.ori);
    }
    Ok(skeleton)
}

/// Poses the skeleton at `msec` into an action, interpolating between the
/// surrounding frames, and returns parent-to-child accumulated matrices.
/// The time wraps around the action's duration.
pub fn compute_interpolated_pose(
    model: &Model,
    action: Option<usize>,
    msec: u32,
) -> Result<Vec<SkeletonBone>, Err> {
    let mut skeleton = bind_pose(model)?;

    if let Some(a) = action {
        let act = model.actions.get(a).ok_or(Err::UnknownAction(a))?;
        let msec = if act.duration_msec > 0 {
            msec % act.duration_msec
        } else {
            0
        };

        let mut last = 0;
        let mut next = 0;
        for fr in act.frames.iter().take_while(|fr| fr.msec <= msec) {
            apply_frame(model, &mut skeleton, fr)?;
            last = fr.msec;
            next += 1;
        }

        if last != msec && !act.frames.is_empty() {
            let (target_frame, target_msec) = match act.frames.get(next) {
                Some(fr) => (fr, fr.msec),
                None => (&act.frames[0], act.duration_msec),
            };
            let mut target = skeleton.clone();
            apply_frame(model, &mut target, target_frame)?;
            if target_msec > last {
                let t = (msec - last) as f32 / (target_msec - last) as f32;
                for (bone, to) in skeleton.iter_mut().zip(&target) {
                    bone.pos = bone.pos.lerp(to.pos, t);
                    bone.ori = bone.ori.slerp(to.ori, t).normalize();
                }
            }
        }
    }

    for i in 0..skeleton.len() {
        let local = local_matrix(skeleton[i].pos, skeleton[i].ori);
        skeleton[i].mat4 = match skeleton[i].parent {
            Some(p) if (p as usize) < i => skeleton[p as usize].mat4 * local,
            _ => local,
        };
    }
    Ok(skeleton)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Action, Bone, Transform, Vertex};

    /// Two bones in a chain. Vertices: 0 origin, 1 identity quaternion,
    /// 2 (0,1,0), 3 (0,2,0), 4 (0,4,0).
    /// The action moves the tip to vertex 2, 3 and 4 at 0, 500 and 750 ms.
    fn rig() -> Model {
        let mut model = Model::new("rig");
        model.vertices = vec![
            Vertex::new(0.0, 0.0, 0.0),
            Vertex::transform(0.0, 0.0, 0.0, 1.0),
            Vertex::new(0.0, 1.0, 0.0),
            Vertex::new(0.0, 2.0, 0.0),
            Vertex::new(0.0, 4.0, 0.0),
        ];
        model.bones = vec![Bone::new("root", None, 0, 1), Bone::new("tip", Some(0), 2, 1)];
        let moved = |pos| Frame {
            msec: 0,
            transforms: vec![Transform { bone: 1, pos, ori: 1 }],
        };
        model.actions.push(Action {
            name: "stretch".into(),
            duration_msec: 1000,
            frames: vec![
                Frame { msec: 0, ..moved(2) },
                Frame { msec: 500, ..moved(3) },
                Frame { msec: 750, ..moved(4) },
            ],
        });
        model
    }

    #[test]
    fn no_bones_is_an_error() {
        let model = Model::default();
        assert_eq!(compute_static_pose(&model, None, 0, None), Err(Err::NoBones));
        assert_eq!(compute_interpolated_pose(&model, None, 0), Err(Err::NoBones));
    }

    #[test]
    fn static_pose_replays_frames() {
        let model = rig();
        let pose = compute_static_pose(&model, Some(0), 2, None).unwrap();
        assert_eq!(pose[1].pos, Vec3::new(0.0, 4.0, 0.0));
        assert_eq!(pose[1].mat4.w_axis.y, 4.0);

        let first = compute_static_pose(&model, Some(0), 0, None).unwrap();
        let stepped = compute_static_pose(&model, Some(0), 1, Some(first)).unwrap();
        assert_eq!(stepped[1].pos, Vec3::new(0.0, 2.0, 0.0));

        assert_eq!(
            compute_static_pose(&model, Some(0), 3, None),
            Err(Err::UnknownFrame { frame: 3, len: 3 })
        );
        assert_eq!(compute_static_pose(&model, Some(1), 0, None), Err(Err::UnknownAction(1)));
    }

    #[test]
    fn interpolated_pose_blends_and_wraps() {
        let model = rig();
        let pose = compute_interpolated_pose(&model, Some(0), 625).unwrap();
        assert!((pose[1].pos.y - 3.0).abs() < 1e-5);

        let wrapped = compute_interpolated_pose(&model, Some(0), 1500).unwrap();
        assert!((wrapped[1].pos.y - 2.0).abs() < 1e-5);

        // between the last frame and the end, blend back towards frame 0
        let tail = compute_interpolated_pose(&model, Some(0), 875).unwrap();
        assert!((tail[1].pos.y - 2.5).abs() < 1e-5);
        assert!((tail[1].mat4.w_axis.y - 2.5).abs() < 1e-5);
    }

    #[test]
    fn bind_pose_composes_parents() {
        let mut model = rig();
        model.vertices[0] = Vertex::new(1.0, 0.0, 0.0);
        let pose = compute_interpolated_pose(&model, None, 0).unwrap();
        assert_eq!(pose[1].mat4.w_axis.truncate(), Vec3::new(1.0, 1.0, 0.0));
    }
}
