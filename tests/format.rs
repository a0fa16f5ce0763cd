mod common;

use std::io::{Cursor, Read};

use common::*;
use m3d::core::material::{DIFFUSE, TEXTURE_BASE};
use m3d::core::model::{ExtraChunk, InlinedAsset};
use m3d::encode::compaction;
use m3d::prelude::*;

fn raw() -> encode::Config {
    encode::Config {
        flags: ExportFlags::NO_ZLIB,
        ..encode::Config::default()
    }
}

fn raw_with(flags: ExportFlags) -> encode::Config {
    encode::Config {
        flags: ExportFlags::NO_ZLIB | flags,
        ..encode::Config::default()
    }
}

fn contains(data: &[u8], needle: &[u8]) -> bool {
    data.windows(needle.len()).any(|w| w == needle)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// The cube with an explicit normal on its first face only.
fn cube_with_one_normal() -> Model {
    let mut model = common::cube();
    model.vertices.push(Vertex::transform(0.0, 0.0, -1.0, 1.0));
    model.faces[0].normal = Some(vec![8, 8, 8]);
    model
}

fn triangle(colors: [u32; 3]) -> Model {
    let mut model = Model::new("tri");
    model.vertices = vec![
        Vertex::new(0.0, 0.0, 0.0),
        Vertex::new(1.0, 0.0, 0.0),
        Vertex::new(0.0, 1.0, 0.0),
    ];
    for (v, c) in model.vertices.iter_mut().zip(colors) {
        v.color = c;
    }
    model.faces.push(Face::triangle(None, [0, 1, 2]));
    model
}

#[test]
fn empty_model_layout() {
    init_logger();
    let data = save(&Model::default(), raw()).unwrap();
    assert_eq!(data.len(), 32);
    assert_eq!(&data[0..4], b"3DMO");
    assert_eq!(&data[4..8], &32u32.to_le_bytes());
    assert_eq!(&data[8..12], b"HEAD");
    assert_eq!(&data[12..16], &20u32.to_le_bytes());
    assert_eq!(&data[16..20], &1.0f32.to_le_bytes());
    // four empty header strings
    assert_eq!(&data[24..28], &[0, 0, 0, 0]);
    assert_eq!(&data[28..32], b"OMD3");

    let model = load_plain(&data);
    assert_eq!(model.errcode, None);
    assert!(model.vertices.is_empty() && model.faces.is_empty());
    assert_eq!(model.scale, 1.0);
}

#[test]
fn compressed_payload_inflates_with_zlib() {
    init_logger();
    let mut model = Model::new("grid");
    for y in 0..20 {
        for x in 0..20 {
            model.vertices.push(Vertex::new(x as f32, y as f32, 0.0));
        }
    }
    for y in 0..19 {
        for x in 0..19 {
            let i = y * 20 + x;
            model.faces.push(Face::triangle(None, [i, i + 1, i + 21]));
            model.faces.push(Face::triangle(None, [i, i + 21, i + 20]));
        }
    }

    let data = save(&model, encode::Config::default()).unwrap();
    let plain = save(&model, raw()).unwrap();
    assert!(data.len() < plain.len());
    assert_eq!(&data[0..4], b"3DMO");
    assert_eq!(&data[4..8], &(data.len() as u32).to_le_bytes());
    assert_ne!(&data[8..12], b"HEAD");

    let mut inflated = Vec::new();
    flate2::read::ZlibDecoder::new(&data[8..])
        .read_to_end(&mut inflated)
        .unwrap();
    assert_eq!(inflated, &plain[8..]);

    let loaded = load_plain(&data);
    assert_eq!(loaded.errcode, None);
    assert_eq!(loaded.faces.len(), 722);
    assert_eq!(loaded.scale, 19.0);
}

#[test]
fn polygons_are_rejected() {
    init_logger();
    let mut model = triangle([0; 3]);
    model.vertices.push(Vertex::new(1.0, 1.0, 0.0));
    model.faces[0].vertex.push(3);
    let res = save(&model, encode::Config::default());
    assert!(matches!(
        res,
        Err(encode::Err::CompactionError(compaction::Err::NonTriangularFace(0, 4)))
    ));
}

#[test]
fn dangling_references_are_rejected() {
    init_logger();
    let mut model = triangle([0; 3]);
    model.faces[0].material = Some(3);
    let res = save(&model, encode::Config::default());
    assert!(matches!(
        res,
        Err(encode::Err::CompactionError(compaction::Err::DanglingReference { .. }))
    ));
}

#[test]
fn colors_use_a_palette_unless_disabled() {
    init_logger();
    let model = triangle([RED, GREEN, BLUE]);

    let paletted = save(&model, raw()).unwrap();
    assert!(contains(&paletted, b"CMAP"));
    let direct = save(
        &model,
        encode::Config {
            flags: ExportFlags::NO_ZLIB | ExportFlags::NO_CMAP,
            ..encode::Config::default()
        },
    )
    .unwrap();
    assert!(!contains(&direct, b"CMAP"));

    for data in [paletted, direct] {
        let loaded = load_plain(&data);
        assert_eq!(loaded.errcode, None);
        let colors: Vec<u32> = loaded.faces[0]
            .vertex
            .iter()
            .map(|&v| loaded.vertices[v as usize].color)
            .collect();
        assert_eq!(colors, [RED, GREEN, BLUE]);
    }
}

#[test]
fn black_models_have_no_palette() {
    init_logger();
    let data = save(&triangle([0; 3]), raw()).unwrap();
    assert!(!contains(&data, b"CMAP"));
    let loaded = load_plain(&data);
    assert!(loaded.vertices.iter().all(|v| v.color == 0));
}

#[test]
fn quantized_coordinates_stay_on_the_grid() {
    init_logger();
    let model = common::cube();
    for (quality, step) in [(Quality::Int8, 127.0), (Quality::Int16, 32767.0)] {
        let data = save(
            &model,
            encode::Config {
                quality,
                flags: ExportFlags::empty(),
            },
        )
        .unwrap();
        let loaded = load_plain(&data);
        assert_eq!(loaded.scale, 2.0);
        for &v in loaded.faces.iter().flat_map(|f| &f.vertex) {
            let p = position(&loaded, v);
            assert!(p.iter().all(|c| (c.abs() - 1.0).abs() < 1.0 / step));
        }
    }
}

#[test]
fn unknown_chunks_need_the_extra_flag() {
    init_logger();
    let mut model = triangle([0; 3]);
    model.extras.push(ExtraChunk {
        magic: *b"XTRA",
        data: vec![1, 2, 3],
    });

    let dropped = save(&model, raw()).unwrap();
    assert!(!contains(&dropped, b"XTRA"));

    let kept = save(
        &model,
        encode::Config {
            flags: ExportFlags::NO_ZLIB | ExportFlags::EXTRA,
            ..encode::Config::default()
        },
    )
    .unwrap();
    let loaded = load_plain(&kept);
    assert_eq!(loaded.extras, model.extras);
}

#[test]
fn material_library_fills_in_materials() {
    init_logger();
    let text = b"3dmodel 1\r\n\
        tri\r\n\
        \r\n\
        \r\n\
        \r\n\
        Vertex\r\n\
        0 0 0 1\r\n\
        1 0 0 1\r\n\
        0 1 0 1\r\n\
        \r\n\
        Mesh\r\n\
        use steel\r\n\
        0 1 2\r\n\
        \r\n\
        End\r\n";

    let alone = load_plain(text);
    assert_eq!(alone.faces[0].material, None);
    assert_eq!(alone.errcode, Some(ErrorCode::UnknownMaterial));

    let mut lib = Model::new("lib");
    let mut steel = Material::new("steel");
    steel.set(DIFFUSE, PropertyValue::Color(0xFF80_8080));
    lib.materials.push(steel);
    let model = decode::load(text, &mut (), Some(&lib), decode::Config::default()).unwrap();
    assert_eq!(model.errcode, None);
    assert_eq!(model.faces[0].material, Some(0));
    assert_eq!(model.materials[0].get(DIFFUSE), Some(PropertyValue::Color(0xFF80_8080)));
}

#[test]
fn textures_come_from_the_reader() {
    init_logger();
    let text = b"3dmodel 1\r\n\
        tri\r\n\
        \r\n\
        \r\n\
        \r\n\
        Material red\r\n\
        map_Kd wood\r\n\
        \r\n\
        End\r\n";
    let image = png(2, 3);
    let mut asked = Vec::new();
    let mut reader = |name: &str| -> Option<Vec<u8>> {
        asked.push(name.to_string());
        (name == "wood.png").then(|| image.clone())
    };
    let model = decode::load(text, &mut reader, None, decode::Config::default()).unwrap();
    assert_eq!(asked, ["wood.png"]);
    assert_eq!(model.materials[0].get(TEXTURE_BASE + DIFFUSE), Some(PropertyValue::Texture(0)));
    let tex = &model.textures[0];
    assert_eq!((tex.name.as_str(), tex.width, tex.height, tex.channels), ("wood", 2, 3, 4));
}

#[test]
fn inlined_textures_are_decoded() {
    init_logger();
    let mut model = triangle([0; 3]);
    model.textures.push(Texture::named("wood"));
    let mut mat = Material::new("red");
    mat.set(DIFFUSE_MAP, PropertyValue::Texture(0));
    model.materials.push(mat);
    model.faces[0].material = Some(0);
    model.inlined.push(InlinedAsset {
        name: "wood".into(),
        data: png(4, 4),
    });

    let loaded = load_plain(&save(&model, encode::Config::default()).unwrap());
    assert_eq!(loaded.errcode, None);
    assert!(loaded.textures[0].is_decoded());
    assert_eq!((loaded.textures[0].width, loaded.textures[0].height), (4, 4));
}

#[test]
fn truncated_files_are_reported() {
    init_logger();
    let data = save(&triangle([0; 3]), raw()).unwrap();
    // cut into the last chunk and patch the declared length
    let mut cut = data[..data.len() - 10].to_vec();
    let len = cut.len() as u32;
    cut[4..8].copy_from_slice(&len.to_le_bytes());
    let model = load_plain(&cut);
    assert_eq!(model.errcode, Some(ErrorCode::Truncated));
    assert_eq!(model.vertices.len(), 3);
    assert!(model.faces.is_empty());

    let res = decode::load(&data[..data.len() - 1], &mut (), None, decode::Config::default());
    assert!(res.is_err());
}

#[test]
fn given_normals_are_kept_and_the_rest_generated() {
    init_logger();
    let first = save(&cube_with_one_normal(), raw()).unwrap();
    let model = load_plain(&first);
    assert_eq!(model.errcode, None);
    // eight corners and the given normal, then one generated slot per vertex
    assert_eq!(model.generated_normals, Some(9));
    assert_eq!(model.vertices.len(), 18);
    assert!(model.faces.iter().all(|f| f.normal.is_some()));
    let given = model.faces[0].normal.as_ref().unwrap()[0];
    assert!(given < 9);
    assert_eq!(position(&model, given), [0.0, 0.0, -1.0]);
    assert!(model.faces[1..].iter().flat_map(|f| f.normal.iter().flatten()).all(|&n| n >= 9));

    // the generated normals are not saved back
    assert_eq!(save(&model, raw()).unwrap(), first);
}

#[test]
fn no_normal_drops_given_normals() {
    init_logger();
    let model = load_plain(&save(&cube_with_one_normal(), raw_with(ExportFlags::NO_NORMAL)).unwrap());
    assert_eq!(model.generated_normals, Some(8));
    assert_eq!(model.vertices.len(), 16);
}

#[test]
fn no_face_keeps_the_rest_of_the_scene() {
    init_logger();
    let data = save(&scene(), raw_with(ExportFlags::NO_FACE)).unwrap();
    assert!(!contains(&data, b"MESH"));
    let model = load_plain(&data);
    assert!(model.faces.is_empty());
    let kinds: Vec<_> = model.shapes[0].commands.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, [CommandKind::Sphere, CommandKind::Line, CommandKind::Use]);
    // only the material named by the shape is left
    let names: Vec<_> = model.materials.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["glass"]);
    assert_eq!(model.shapes[0].commands[2].args, [Arg::Material(Some(0))]);
    assert_eq!((model.bones.len(), model.labels.len()), (2, 2));
}

#[test]
fn no_material_clears_material_references() {
    init_logger();
    let data = save(&scene(), raw_with(ExportFlags::NO_MATERIAL)).unwrap();
    assert!(!contains(&data, b"MTRL"));
    let model = load_plain(&data);
    assert!(model.materials.is_empty() && model.textures.is_empty());
    assert_eq!(model.faces.len(), 12);
    assert!(model.faces.iter().all(|f| f.material.is_none()));
    assert_eq!(model.shapes[0].commands[3].args, [Arg::Material(None)]);
}

#[test]
fn no_txtcrd_drops_texture_coordinates() {
    init_logger();
    let data = save(&scene(), raw_with(ExportFlags::NO_TXTCRD)).unwrap();
    assert!(!contains(&data, b"TMAP"));
    let model = load_plain(&data);
    assert!(model.tmap.is_empty());
    assert!(model.faces.iter().all(|f| f.texcoord.is_none()));
}

#[test]
fn flip_txtcrd_mirrors_v() {
    init_logger();
    let original = scene();
    let model = load_plain(&save(&original, raw_with(ExportFlags::FLIP_TXTCRD)).unwrap());
    let mut checked = 0;
    for (face, orig) in model.faces.iter().zip(&original.faces) {
        let (Some(t), Some(o)) = (&face.texcoord, &orig.texcoord) else {
            continue;
        };
        for (&t, &o) in t.iter().zip(o) {
            let (got, want) = (model.tmap[t as usize], original.tmap[o as usize]);
            assert_eq!((got.u, got.v), (want.u, 1.0 - want.v));
            checked += 1;
        }
    }
    assert_eq!(checked, 6);
}

#[test]
fn no_bone_drops_skeleton_skins_and_actions() {
    init_logger();
    let data = save(&scene(), raw_with(ExportFlags::NO_BONE)).unwrap();
    assert!(!contains(&data, b"BONE"));
    assert!(!contains(&data, b"ACTN"));
    let model = load_plain(&data);
    assert!(model.bones.is_empty() && model.skins.is_empty() && model.actions.is_empty());
    assert!(model.vertices.iter().all(|v| !matches!(v.skin, VertexSkin::Index(_))));
    assert_eq!(model.shapes[0].group, None);
}

#[test]
fn no_action_keeps_the_skeleton() {
    init_logger();
    let data = save(&scene(), raw_with(ExportFlags::NO_ACTION)).unwrap();
    assert!(!contains(&data, b"ACTN"));
    let model = load_plain(&data);
    assert!(model.actions.is_empty());
    assert_eq!(model.bones.len(), 2);
    assert_eq!(model.skins.len(), 2);
}
