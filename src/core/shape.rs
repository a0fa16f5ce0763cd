use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Kind of a shape command argument as stored on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// material, by name
    Mi,
    /// shape index
    Hi,
    /// face index
    Fi,
    /// texture map index
    Ti,
    /// vertex index
    Vi,
    /// orientation, a vertex index of a quaternion
    Qi,
    /// scalar coordinate
    Vc,
    I1,
    I2,
    I4,
    /// variadic count; the kinds after it repeat that many times
    Va,
}

impl ArgKind {
    pub fn accepts(self, arg: &Arg) -> bool {
        matches!(
            (self, arg),
            (ArgKind::Mi, Arg::Material(_))
                | (ArgKind::Hi, Arg::Shape(_))
                | (ArgKind::Fi, Arg::Face(_))
                | (ArgKind::Ti, Arg::TexMap(_))
                | (ArgKind::Vi, Arg::Vertex(_))
                | (ArgKind::Qi, Arg::Orientation(_))
                | (ArgKind::Vc, Arg::Coord(_))
                | (ArgKind::I1 | ArgKind::I2 | ArgKind::I4, Arg::Int(_))
                | (ArgKind::Va, Arg::Count(_))
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Material(Option<u32>),
    Vertex(u32),
    Orientation(u32),
    Coord(f32),
    Int(i32),
    Shape(u32),
    Face(u32),
    TexMap(u32),
    Count(u32),
}

macro_rules! command_table {
    ($( $id:literal => $variant:ident $name:literal [$($arg:ident)*] ),* $(,)?) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum CommandKind {
            $( $variant = $id, )*
        }

        impl CommandKind {
            pub fn from_id(id: u16) -> Option<Self> {
                match id {
                    $( $id => Some(Self::$variant), )*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }

            pub fn args(self) -> &'static [ArgKind] {
                match self {
                    $( Self::$variant => &[$(ArgKind::$arg),*], )*
                }
            }
        }

        const ALL_COMMANDS: &[CommandKind] = &[$( CommandKind::$variant ),*];
    };
}

command_table! {
    0 => Use "use" [Mi],
    1 => Inc "inc" [Hi Vi Qi Vi],
    2 => Mesh "mesh" [Fi Fi Vi Qi Vi],
    3 => Div "div" [Vc],
    4 => Sub "sub" [Vc Vc],
    5 => Len "len" [Vc],
    6 => Dist "dist" [Vc Vc],
    7 => Degu "degu" [I1],
    8 => Deg "deg" [I1 I1],
    9 => Rangeu "rangeu" [Ti],
    10 => Range "range" [Ti Ti],
    11 => Paru "paru" [Va Vc],
    12 => Parv "parv" [Va Vc],
    13 => Trim "trim" [Va Ti I2],
    14 => Hole "hole" [Va Ti I2],
    15 => Scrv "scrv" [Va Ti I2],
    16 => Sp "sp" [Va Vi],
    17 => Bez1 "bez1" [Vi Vi],
    18 => Bsp1 "bsp1" [Vi Vi],
    19 => Bez2 "bez2" [Vi Vi Vi],
    20 => Bsp2 "bsp2" [Vi Vi Vi],
    21 => Bez3 "bez3" [Vi Vi Vi Vi],
    22 => Bsp3 "bsp3" [Vi Vi Vi Vi],
    23 => Bez "bez" [Va Vi],
    24 => Bsp "bsp" [Va Vi],
    25 => Nurbs "nurbs" [Va Vi],
    26 => Conn "conn" [I2 Ti I2 I2 Ti I2],
    27 => Line "line" [Va Vi],
    28 => Polygon "polygon" [Va Vi],
    29 => Circle "circle" [Vi Qi Vc],
    30 => Cylinder "cylinder" [Vi Qi Vc Vi Qi Vc],
    31 => Sphere "sphere" [Vi Vc],
    32 => Torus "torus" [Vi Qi Vc Vc],
    33 => Cone "cone" [Vi Vi Vi],
    34 => Cube "cube" [Vi Vi Vi],
}

lazy_static! {
    static ref BY_NAME: HashMap<&'static str, CommandKind> =
        ALL_COMMANDS.iter().map(|&kind| (kind.name(), kind)).collect();
}

impl CommandKind {
    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn from_name(name: &str) -> Option<Self> {
        BY_NAME.get(name).copied()
    }
}

/// Expands the argument kinds of a command for a given variadic count.
/// Without a `Va` marker the list is returned as is.
pub fn expand_args(kinds: &[ArgKind], count: u32) -> Vec<ArgKind> {
    match kinds.iter().position(|&k| k == ArgKind::Va) {
        None => kinds.to_vec(),
        Some(pos) => {
            let (head, tail) = kinds.split_at(pos);
            let repeated = &tail[1..];
            let mut out = head.to_vec();
            out.push(ArgKind::Va);
            for _ in 0..count {
                out.extend_from_slice(repeated);
            }
            out
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<Arg>,
}

impl Command {
    /// The argument kinds this command's arguments must follow.
    pub fn expected_args(&self) -> Vec<ArgKind> {
        let kinds = self.kind.args();
        let count = kinds
            .iter()
            .position(|&k| k == ArgKind::Va)
            .and_then(|pos| match self.args.get(pos) {
                Some(Arg::Count(n)) => Some(*n),
                _ => None,
            })
            .unwrap_or(0);
        expand_args(kinds, count)
    }

    pub fn is_well_formed(&self) -> bool {
        let expected = self.expected_args();
        expected.len() == self.args.len()
            && expected.iter().zip(&self.args).all(|(kind, arg)| kind.accepts(arg))
    }

    /// The face range of a mesh-inclusion command, inclusive at both ends.
    pub fn mesh_range(&self) -> Option<(u32, u32)> {
        if self.kind != CommandKind::Mesh {
            return None;
        }
        match (self.args.first(), self.args.get(1)) {
            (Some(Arg::Face(first)), Some(Arg::Face(last))) => Some((*first, *last)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub name: String,
    /// bone the shape is attached to
    pub group: Option<u32>,
    pub commands: Vec<Command>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_dense() {
        for (id, &kind) in ALL_COMMANDS.iter().enumerate() {
            assert_eq!(kind.id() as usize, id);
            assert_eq!(CommandKind::from_id(id as u16), Some(kind));
            assert_eq!(CommandKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(CommandKind::from_id(35), None);
        assert_eq!(CommandKind::from_name("teapot"), None);
    }

    #[test]
    fn variadic_expansion() {
        let kinds = CommandKind::Trim.args();
        assert_eq!(
            expand_args(kinds, 2),
            vec![ArgKind::Va, ArgKind::Ti, ArgKind::I2, ArgKind::Ti, ArgKind::I2]
        );
        assert_eq!(expand_args(CommandKind::Cube.args(), 7).len(), 3);
        assert_eq!(expand_args(CommandKind::Line.args(), 0), vec![ArgKind::Va]);
    }

    #[test]
    fn mesh_range_reads_face_args() {
        let cmd = Command {
            kind: CommandKind::Mesh,
            args: vec![Arg::Face(2), Arg::Face(5), Arg::Vertex(0), Arg::Orientation(1), Arg::Vertex(2)],
        };
        assert_eq!(cmd.mesh_range(), Some((2, 5)));
        assert!(cmd.is_well_formed());
    }

    #[test]
    fn malformed_commands_are_detected() {
        let line = Command {
            kind: CommandKind::Line,
            args: vec![Arg::Count(2), Arg::Vertex(0), Arg::Vertex(1)],
        };
        assert!(line.is_well_formed());
        let short = Command {
            kind: CommandKind::Line,
            args: vec![Arg::Count(3), Arg::Vertex(0)],
        };
        assert!(!short.is_well_formed());
        let wrong = Command {
            kind: CommandKind::Use,
            args: vec![Arg::Vertex(0)],
        };
        assert!(!wrong.is_well_formed());
    }
}
