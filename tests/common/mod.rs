#![allow(dead_code)]

use m3d::core::material::{DIFFUSE, DISSOLVE, TEXTURE_BASE};
use m3d::core::model::InlinedAsset;
use m3d::prelude::*;

pub const RED: u32 = 0xFF00_00FF;
pub const GREEN: u32 = 0xFF00_FF00;
pub const BLUE: u32 = 0xFFFF_0000;

pub const DIFFUSE_MAP: u8 = TEXTURE_BASE + DIFFUSE;

pub const CUBE_FACES: [[u32; 3]; 12] = [
    [0, 2, 1],
    [0, 3, 2],
    [4, 5, 6],
    [4, 6, 7],
    [0, 1, 5],
    [0, 5, 4],
    [3, 6, 2],
    [3, 7, 6],
    [0, 4, 7],
    [0, 7, 3],
    [1, 2, 6],
    [1, 6, 5],
];

pub fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

pub fn load_plain(data: &[u8]) -> Model {
    decode::load(data, &mut (), None, decode::Config::default()).unwrap()
}

fn cube_vertices(half: f32) -> Vec<Vertex> {
    let mut out = Vec::new();
    for z in [-half, half] {
        for (x, y) in [(-half, -half), (half, -half), (half, half), (-half, half)] {
            out.push(Vertex::new(x, y, z));
        }
    }
    out
}

/// A cube with corners at +-2 and a single red material.
pub fn cube() -> Model {
    let mut model = Model::new("cube");
    model.vertices = cube_vertices(2.0);
    let mut red = Material::new("red");
    red.set(DIFFUSE, PropertyValue::Color(RED));
    model.materials.push(red);
    model.faces = CUBE_FACES.iter().map(|&f| Face::triangle(Some(0), f)).collect();
    model
}

/// The cube with every kind of data attached: texture coordinates, a
/// texture, two materials, a two bone skeleton with skins, an action,
/// labels, a shape, a preview and an inlined asset.
pub fn scene() -> Model {
    let mut model = cube();
    model.license = "MIT".into();
    model.author = "nobody".into();
    model.description = "A test cube.\nSecond line.".into();
    model.vertices[0].color = GREEN;

    // 8: identity orientation, 9 and 10: bone positions
    model.vertices.push(Vertex::transform(0.0, 0.0, 0.0, 1.0));
    model.vertices.push(Vertex::new(0.0, 3.0, 0.0));
    model.vertices.push(Vertex::new(0.0, 4.0, 0.0));

    model.tmap = vec![
        TexCoord { u: 0.0, v: 0.0 },
        TexCoord { u: 1.0, v: 0.0 },
        TexCoord { u: 1.0, v: 1.0 },
        TexCoord { u: 0.0, v: 1.0 },
    ];
    model.faces[0] = model.faces[0].clone().with_texcoords([0, 2, 1]);
    model.faces[1] = model.faces[1].clone().with_texcoords([0, 3, 2]);

    model.textures.push(Texture::named("wood"));
    model.materials[0].set(DIFFUSE_MAP, PropertyValue::Texture(0));
    let mut glass = Material::new("glass");
    glass.set(DISSOLVE, PropertyValue::Float(0.5));
    model.materials.push(glass);
    for face in &mut model.faces[6..] {
        face.material = Some(1);
    }

    model.bones = vec![Bone::new("root", None, 9, 8), Bone::new("tip", Some(0), 10, 8)];
    let mut blend = Skin::default();
    blend.weights[0] = SkinWeight { bone: Some(0), weight: 0.25 };
    blend.weights[1] = SkinWeight { bone: Some(1), weight: 0.75 };
    model.skins = vec![Skin::single(0), blend];
    for (i, v) in model.vertices[..8].iter_mut().enumerate() {
        v.skin = VertexSkin::Index((i >= 4) as u32);
    }

    model.actions.push(Action {
        name: "wave".into(),
        duration_msec: 1000,
        frames: vec![
            Frame {
                msec: 0,
                transforms: vec![Transform { bone: 1, pos: 10, ori: 8 }],
            },
            Frame {
                msec: 500,
                transforms: vec![Transform { bone: 1, pos: 9, ori: 8 }],
            },
        ],
    });

    model.labels = vec![
        Label {
            name: Some("note".into()),
            lang: Some("en".into()),
            color: RED,
            vertex: 0,
            text: "two\nlines".into(),
        },
        Label {
            name: Some("note".into()),
            lang: Some("en".into()),
            color: RED,
            vertex: 6,
            text: "top corner".into(),
        },
    ];

    model.shapes.push(Shape {
        name: "hull".into(),
        group: Some(0),
        commands: vec![
            Command {
                kind: CommandKind::Mesh,
                args: vec![Arg::Face(0), Arg::Face(11), Arg::Vertex(9), Arg::Orientation(8), Arg::Vertex(9)],
            },
            Command {
                kind: CommandKind::Sphere,
                args: vec![Arg::Vertex(10), Arg::Coord(0.5)],
            },
            Command {
                kind: CommandKind::Line,
                args: vec![Arg::Count(2), Arg::Vertex(0), Arg::Vertex(6)],
            },
            Command {
                kind: CommandKind::Use,
                args: vec![Arg::Material(Some(1))],
            },
        ],
    });

    model.preview = Some(vec![0x89, b'P', b'N', b'G']);
    model.procedurals.push("script".into());
    model.inlined.push(InlinedAsset {
        name: "script".into(),
        data: b"print(1)".to_vec(),
    });
    model
}

/// Reads the inlined asset of `scene` back for text models, which only list
/// asset names.
pub fn scene_files(name: &str) -> Option<Vec<u8>> {
    (name == "script").then(|| b"print(1)".to_vec())
}

pub fn position(model: &Model, idx: u32) -> [f32; 3] {
    let v = model.vertices[idx as usize];
    [v.x, v.y, v.z]
}
