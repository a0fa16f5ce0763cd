use serde::{Deserialize, Serialize};

/// "Undefined" index: no material, no parent, no skin.
pub const UNDEF: u32 = u32::MAX;

/// "Not applicable" index. As a vertex skin id it marks vertices that carry
/// orientations or normals instead of skinned geometry.
pub const NOT_APPLICABLE: u32 = u32::MAX - 1;

/// Byte width of an index field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexWidth {
    Absent,
    U8,
    U16,
    U32,
}

impl IndexWidth {
    /// The narrowest width that holds `count` distinct indices plus the two
    /// reserved sentinel patterns.
    pub fn for_count(count: usize) -> Self {
        if count < 254 {
            Self::U8
        } else if count < 65534 {
            Self::U16
        } else {
            Self::U32
        }
    }

    /// Like `for_count`, but an empty category is omitted from the records.
    pub fn for_optional_count(count: usize) -> Self {
        if count == 0 {
            Self::Absent
        } else {
            Self::for_count(count)
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::Absent => 0,
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    fn code(self) -> u32 {
        match self {
            Self::U8 => 0,
            Self::U16 => 1,
            Self::U32 => 2,
            Self::Absent => 3,
        }
    }

    fn from_code(code: u32, optional: bool) -> Option<Self> {
        match code & 3 {
            0 => Some(Self::U8),
            1 => Some(Self::U16),
            2 => Some(Self::U32),
            _ if optional => Some(Self::Absent),
            _ => None,
        }
    }
}

/// Storage class of vertex and texture coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CoordWidth {
    I8,
    I16,
    F32,
    F64,
}

impl CoordWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::I8 => 1,
            Self::I16 => 2,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    fn code(self) -> u32 {
        match self {
            Self::I8 => 0,
            Self::I16 => 1,
            Self::F32 => 2,
            Self::F64 => 3,
        }
    }

    fn from_code(code: u32) -> Self {
        match code & 3 {
            0 => Self::I8,
            1 => Self::I16,
            2 => Self::F32,
            _ => Self::F64,
        }
    }
}

/// Every per-category field width of a binary model. Decoded once from the
/// header's types bitfield and consulted by every record reader and writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Widths {
    /// vertex and texture coordinates
    pub vc: CoordWidth,
    /// vertex index
    pub vi: IndexWidth,
    /// string offset
    pub si: IndexWidth,
    /// color index (or raw color when four bytes wide)
    pub ci: IndexWidth,
    /// texture coordinate index
    pub ti: IndexWidth,
    /// bone index
    pub bi: IndexWidth,
    /// bone slots per skin record: 1, 2, 4 or 8
    pub nb: u8,
    /// skin index
    pub sk: IndexWidth,
    /// transform count per animation frame
    pub fc: IndexWidth,
    /// shape index
    pub hi: IndexWidth,
    /// face index
    pub fi: IndexWidth,
    /// variadic argument count
    pub vd: IndexWidth,
}

impl Default for Widths {
    fn default() -> Self {
        Self {
            vc: CoordWidth::F32,
            vi: IndexWidth::U8,
            si: IndexWidth::U8,
            ci: IndexWidth::Absent,
            ti: IndexWidth::Absent,
            bi: IndexWidth::Absent,
            nb: 1,
            sk: IndexWidth::Absent,
            fc: IndexWidth::Absent,
            hi: IndexWidth::Absent,
            fi: IndexWidth::Absent,
            vd: IndexWidth::Absent,
        }
    }
}

#[remain::sorted]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthErr {
    #[error("Eight byte string offsets are not supported")]
    StringOffset,
    #[error("Eight byte vertex indices are not supported")]
    VertexIndex,
}

impl Widths {
    pub fn from_types(types: u32) -> Result<Self, WidthErr> {
        let field = |shift: u32| (types >> shift) & 3;
        let optional = |shift: u32| IndexWidth::from_code(field(shift), true).unwrap_or(IndexWidth::Absent);
        Ok(Self {
            vc: CoordWidth::from_code(field(0)),
            vi: IndexWidth::from_code(field(2), false).ok_or(WidthErr::VertexIndex)?,
            si: IndexWidth::from_code(field(4), false).ok_or(WidthErr::StringOffset)?,
            ci: optional(6),
            ti: optional(8),
            bi: optional(10),
            nb: 1u8 << field(12),
            sk: optional(14),
            fc: optional(16),
            hi: optional(18),
            fi: optional(20),
            vd: optional(22),
        })
    }

    pub fn to_types(&self) -> u32 {
        let nb = match self.nb {
            0 | 1 => 0,
            2 => 1,
            3 | 4 => 2,
            _ => 3,
        };
        self.vc.code()
            | self.vi.code() << 2
            | self.si.code() << 4
            | self.ci.code() << 6
            | self.ti.code() << 8
            | self.bi.code() << 10
            | nb << 12
            | self.sk.code() << 14
            | self.fc.code() << 16
            | self.hi.code() << 18
            | self.fi.code() << 20
            | self.vd.code() << 22
    }
}

pub trait ConfigType {
    fn default() -> Self;
}

/// Converts an in-memory optional index to its on-disk form.
pub fn opt_to_index(idx: Option<u32>) -> u32 {
    idx.unwrap_or(UNDEF)
}

/// Converts an on-disk index to its in-memory optional form; both sentinels map to `None`.
pub fn index_to_opt(idx: u32) -> Option<u32> {
    if idx >= NOT_APPLICABLE {
        None
    } else {
        Some(idx)
    }
}
