use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::core::material::{property_by_key, property_format, Material, Property, PropertyFormat, PropertyValue};
use crate::core::model::{
    Action, Bone, ErrorCode, ExtraChunk, Face, Frame, InlinedAsset, Label, Model, Skin, SkinWeight,
    TexCoord, Transform, Vertex, VertexSkin, MAX_BONES_PER_VERTEX,
};
use crate::core::shape::{Arg, ArgKind, Command, CommandKind, Shape};

use super::{material_by_name, texture_index, FileReader};

fn num<T: FromStr>(token: Option<&str>) -> Option<T> {
    token?.parse().ok()
}

fn hex_color(token: &str) -> Option<u32> {
    u32::from_str_radix(token.strip_prefix('#')?, 16).ok()
}

/// The text after the first `n` whitespace separated tokens.
fn rest_after(line: &str, n: usize) -> &str {
    let mut rest = line.trim_start();
    for _ in 0..n {
        rest = match rest.find(char::is_whitespace) {
            Some(end) => rest[end..].trim_start(),
            None => "",
        };
    }
    rest.trim_end()
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn base64_lines(body: &[&str]) -> Option<Vec<u8>> {
    let joined: String = body.iter().map(|l| l.trim()).collect();
    STANDARD.decode(joined).ok()
}

/// Fills `model` from the text form. Lines that do not parse are skipped and
/// recorded in `model.errcode`.
pub(crate) fn parse(text: &str, model: &mut Model, reader: &mut dyn FileReader) {
    let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let first = lines.next().unwrap_or("");
    match num::<f32>(first.split_whitespace().nth(1)) {
        Some(scale) => model.scale = scale,
        None => model.report(ErrorCode::BadSyntax),
    }
    model.name = lines.next().unwrap_or("").trim().to_string();
    model.license = lines.next().unwrap_or("").trim().to_string();
    model.author = lines.next().unwrap_or("").trim().to_string();
    let description: Vec<&str> = lines.by_ref().take_while(|l| !l.trim().is_empty()).collect();
    model.description = description.join("\n");

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let keyword = line.split_whitespace().next().unwrap_or("");
        let arg = rest_after(line, 1);
        if keyword == "End" {
            break;
        }
        let body: Vec<&str> = lines
            .by_ref()
            .take_while(|l| !l.trim().is_empty())
            .map(str::trim)
            .collect();
        log::trace!("{} block, {} lines", keyword, body.len());
        match keyword {
            "Preview" => match base64_lines(&body) {
                Some(data) => model.preview = Some(data),
                None => model.report(ErrorCode::BadSyntax),
            },
            "Textmap" => each_line(&body, model, |line, model| {
                let mut t = line.split_whitespace();
                let u = num(t.next())?;
                let v = num(t.next())?;
                model.tmap.push(TexCoord { u, v });
                Some(())
            }),
            "Vertex" => each_line(&body, model, vertex),
            "Bones" => each_line(&body, model, bone),
            "Material" => material(arg, &body, model, reader),
            "Procedural" => model.procedurals.extend(body.iter().map(|l| l.to_string())),
            "Mesh" => mesh(&body, model),
            "Shape" => shape(arg, &body, model),
            "Labels" => labels(arg, &body, model),
            "Action" => action(arg, &body, model),
            "Assets" => {
                for &name in &body {
                    match reader.read_file(name) {
                        Some(data) => model.inlined.push(InlinedAsset {
                            name: name.to_string(),
                            data,
                        }),
                        None => log::warn!("asset '{name}' could not be read"),
                    }
                }
            }
            "Extra" => {
                let mut magic = [b' '; 4];
                for (dst, src) in magic.iter_mut().zip(arg.bytes()) {
                    *dst = src;
                }
                match base64_lines(&body) {
                    Some(data) => model.extras.push(ExtraChunk { magic, data }),
                    None => model.report(ErrorCode::BadSyntax),
                }
            }
            other => log::warn!("skipping unknown block '{other}'"),
        }
    }
}

/// Runs `f` on every line, recording lines it rejects.
fn each_line<F>(body: &[&str], model: &mut Model, mut f: F)
where
    F: FnMut(&str, &mut Model) -> Option<()>,
{
    for line in body {
        if f(line, model).is_none() {
            log::warn!("cannot parse '{line}'");
            model.report(ErrorCode::BadSyntax);
        }
    }
}

fn vertex(line: &str, model: &mut Model) -> Option<()> {
    let mut tokens = line.split_whitespace().peekable();
    let mut v = Vertex::new(num(tokens.next())?, num(tokens.next())?, num(tokens.next())?);
    if let Some(w) = tokens.peek().and_then(|t| t.parse::<f32>().ok()) {
        v.w = w;
        tokens.next();
    }
    let mut skin = Skin::default();
    let mut slot = 0;
    let mut transform = false;
    for token in tokens {
        if token.starts_with('#') {
            v.color = hex_color(token)?;
        } else if token == "transform" {
            transform = true;
        } else {
            let (bone, weight) = token.split_once(':')?;
            if slot < MAX_BONES_PER_VERTEX {
                skin.weights[slot] = SkinWeight {
                    bone: Some(bone.parse().ok()?),
                    weight: weight.parse().ok()?,
                };
                slot += 1;
            }
        }
    }
    if transform {
        v.skin = VertexSkin::Transform;
    } else if slot > 0 {
        v.skin = VertexSkin::Index(model.skins.len() as u32);
        model.skins.push(skin);
    }
    model.vertices.push(v);
    Some(())
}

fn bone(line: &str, model: &mut Model) -> Option<()> {
    let mut t = line.split_whitespace();
    let parent: i64 = num(t.next())?;
    let pos = num(t.next())?;
    let ori = num(t.next())?;
    let parent = u32::try_from(parent).ok();
    model.bones.push(Bone::new(rest_after(line, 3), parent, pos, ori));
    Some(())
}

fn material(name: &str, body: &[&str], model: &mut Model, reader: &mut dyn FileReader) {
    let mut material = Material::new(name);
    for line in body {
        let key = line.split_whitespace().next().unwrap_or("");
        let value = rest_after(line, 1);
        let Some(kind) = property_by_key(key) else {
            log::warn!("material '{name}': unknown property '{key}'");
            model.report(ErrorCode::UnknownProperty);
            continue;
        };
        let parsed = match property_format(kind) {
            Some(PropertyFormat::Color) => hex_color(value).map(PropertyValue::Color),
            Some(PropertyFormat::Uint8 | PropertyFormat::Uint16 | PropertyFormat::Uint32) => {
                value.parse().ok().map(PropertyValue::Int)
            }
            Some(PropertyFormat::Float) => value.parse().ok().map(PropertyValue::Float),
            Some(PropertyFormat::Texture) if !value.is_empty() => {
                Some(PropertyValue::Texture(texture_index(model, value, reader)))
            }
            _ => None,
        };
        match parsed {
            Some(value) => material.props.push(Property { kind, value }),
            None => model.report(ErrorCode::BadSyntax),
        }
    }
    match model.material_index(name) {
        Some(idx) => model.materials[idx as usize] = material,
        None => model.materials.push(material),
    }
}

/// Splits `v`, `v/t`, `v/t/n` and `v//n` corners.
fn corner(token: &str) -> Option<(u32, Option<u32>, Option<u32>)> {
    let mut parts = token.split('/');
    let v = parts.next()?.parse().ok()?;
    let t = match parts.next() {
        None | Some("") => None,
        Some(t) => Some(t.parse().ok()?),
    };
    let n = match parts.next() {
        None => None,
        Some(n) => Some(n.parse().ok()?),
    };
    Some((v, t, n))
}

fn mesh(body: &[&str], model: &mut Model) {
    let mut current = None;
    for line in body {
        if line.split_whitespace().next() == Some("use") {
            current = material_by_name(model, rest_after(line, 1));
            continue;
        }
        let corners: Option<Vec<_>> = line.split_whitespace().map(corner).collect();
        let Some(corners) = corners else {
            model.report(ErrorCode::BadSyntax);
            continue;
        };
        if corners.len() != 3 {
            model.report(ErrorCode::UnknownMesh);
            continue;
        }
        let texcoord: Option<Vec<u32>> = corners.iter().map(|c| c.1).collect();
        let normal: Option<Vec<u32>> = corners.iter().map(|c| c.2).collect();
        let mixed = corners.iter().any(|c| c.1.is_some()) != texcoord.is_some()
            || corners.iter().any(|c| c.2.is_some()) != normal.is_some();
        if mixed {
            model.report(ErrorCode::BadSyntax);
            continue;
        }
        model.faces.push(Face {
            material: current,
            vertex: corners.iter().map(|c| c.0).collect(),
            texcoord,
            normal,
        });
    }
}

fn shape_arg(token: Option<&str>, kind: ArgKind, model: &mut Model) -> Option<Arg> {
    Some(match kind {
        ArgKind::Mi => match token? {
            "-" => Arg::Material(None),
            name => Arg::Material(material_by_name(model, name)),
        },
        ArgKind::Hi => Arg::Shape(num(token)?),
        ArgKind::Fi => Arg::Face(num(token)?),
        ArgKind::Ti => Arg::TexMap(num(token)?),
        ArgKind::Vi => Arg::Vertex(num(token)?),
        ArgKind::Qi => Arg::Orientation(num(token)?),
        ArgKind::Vc => Arg::Coord(num(token)?),
        ArgKind::I1 | ArgKind::I2 | ArgKind::I4 => Arg::Int(num(token)?),
        ArgKind::Va => Arg::Count(num(token)?),
    })
}

fn command(line: &str, model: &mut Model) -> Result<Command, ErrorCode> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next().unwrap_or("");
    let kind = CommandKind::from_name(name).ok_or(ErrorCode::UnknownCommand)?;
    let kinds = kind.args();
    let mut args = Vec::with_capacity(kinds.len());
    for (pos, &arg_kind) in kinds.iter().enumerate() {
        let arg = shape_arg(tokens.next(), arg_kind, model).ok_or(ErrorCode::BadSyntax)?;
        args.push(arg);
        if let Arg::Count(n) = arg {
            for _ in 0..n {
                for &repeated in &kinds[pos + 1..] {
                    args.push(shape_arg(tokens.next(), repeated, model).ok_or(ErrorCode::BadSyntax)?);
                }
            }
            break;
        }
    }
    Ok(Command { kind, args })
}

fn shape(name: &str, body: &[&str], model: &mut Model) {
    let mut shape = Shape {
        name: name.to_string(),
        group: None,
        commands: Vec::new(),
    };
    for line in body {
        let mut tokens = line.split_whitespace();
        if tokens.next() == Some("group") {
            match num(tokens.next()) {
                Some(group) => shape.group = Some(group),
                None => model.report(ErrorCode::BadSyntax),
            }
            continue;
        }
        match command(line, model) {
            Ok(cmd) => shape.commands.push(cmd),
            Err(code) => {
                log::warn!("shape '{name}': cannot parse '{line}'");
                model.report(code);
            }
        }
    }
    model.shapes.push(shape);
}

fn labels(name: &str, body: &[&str], model: &mut Model) {
    let name = (!name.is_empty()).then(|| name.to_string());
    let mut lang = None;
    let mut color = 0;
    each_line(body, model, |line, model| {
        let mut tokens = line.split_whitespace();
        match tokens.next()? {
            "lang" => lang = Some(rest_after(line, 1).to_string()).filter(|l| !l.is_empty()),
            "color" => color = hex_color(tokens.next()?)?,
            vertex => model.labels.push(Label {
                name: name.clone(),
                lang: lang.clone(),
                color,
                vertex: vertex.parse().ok()?,
                text: unescape(rest_after(line, 1)),
            }),
        }
        Some(())
    });
}

fn action(arg: &str, body: &[&str], model: &mut Model) {
    let mut action = Action {
        name: rest_after(arg, 1).to_string(),
        duration_msec: num(arg.split_whitespace().next()).unwrap_or_else(|| {
            model.report(ErrorCode::BadSyntax);
            0
        }),
        frames: Vec::new(),
    };
    each_line(body, model, |line, _| {
        let mut t = line.split_whitespace();
        let first = t.next()?;
        if first == "frame" {
            action.frames.push(Frame {
                msec: num(t.next())?,
                transforms: Vec::new(),
            });
        } else {
            let transform = Transform {
                bone: first.parse().ok()?,
                pos: num(t.next())?,
                ori: num(t.next())?,
            };
            action.frames.last_mut()?.transforms.push(transform);
        }
        Some(())
    });
    model.actions.push(action);
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "3dmodel 2.5\r\n\
        tri\r\n\
        MIT\r\n\
        someone\r\n\
        first line\r\n\
        second line\r\n\
        \r\n\
        Vertex\r\n\
        0 0 0 1\r\n\
        1 0 0 1 #ff0000ff 0:0.5 1:0.5\r\n\
        0 1 0\r\n\
        0 0 0 1 transform\r\n\
        \r\n\
        Material red\r\n\
        Kd #ff0000ff\r\n\
        d 0.5\r\n\
        Zz 1\r\n\
        \r\n\
        Mesh\r\n\
        use red\r\n\
        0 1 2\r\n\
        use\r\n\
        0//1 1//2 2//0\r\n\
        \r\n\
        Labels note\r\n\
        lang en\r\n\
        1 two\\nlines\r\n\
        \r\n\
        End\r\n";

    #[test]
    fn parses_blocks() {
        let mut model = Model::default();
        parse(TEXT, &mut model, &mut ());
        assert_eq!(model.scale, 2.5);
        assert_eq!(model.name, "tri");
        assert_eq!(model.author, "someone");
        assert_eq!(model.description, "first line\nsecond line");
        assert_eq!(model.vertices.len(), 4);
        assert_eq!(model.vertices[3].skin, VertexSkin::Transform);
        assert_eq!(model.vertices[1].color, 0xFF00_00FF);
        assert_eq!(model.vertices[1].skin, VertexSkin::Index(0));
        assert_eq!(model.vertices[2].w, 1.0);
        assert_eq!(model.skins[0].used().count(), 2);
        assert_eq!(model.materials.len(), 1);
        assert_eq!(model.materials[0].props.len(), 2);
        assert_eq!(model.errcode, Some(ErrorCode::UnknownProperty));
        assert_eq!(model.faces.len(), 2);
        assert_eq!(model.faces[0].material, Some(0));
        assert_eq!(model.faces[1].material, None);
        assert_eq!(model.faces[1].normal.as_deref(), Some(&[1, 2, 0][..]));
        assert_eq!(model.labels[0].text, "two\nlines");
        assert_eq!(model.labels[0].lang.as_deref(), Some("en"));
    }

    #[test]
    fn shape_commands_expand_variadics() {
        let mut model = Model::default();
        shape("curve", &["group 0", "line 3 0 1 2", "use -", "teapot 1"], &mut model);
        let cmds = &model.shapes[0].commands;
        assert_eq!(model.shapes[0].group, Some(0));
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].args.len(), 4);
        assert!(cmds[0].is_well_formed());
        assert_eq!(cmds[1].args, vec![Arg::Material(None)]);
        assert_eq!(model.errcode, Some(ErrorCode::UnknownCommand));
    }

    #[test]
    fn splits_tokens() {
        assert_eq!(rest_after("  Action 100   walk cycle ", 2), "walk cycle");
        assert_eq!(rest_after("End", 1), "");
        assert_eq!(corner("4//2"), Some((4, None, Some(2))));
        assert_eq!(corner("4/1"), Some((4, Some(1), None)));
        assert_eq!(corner("x"), None);
    }
}
