use crate::core::shared::IndexWidth;

/// Palette size from which colors are stored as raw values instead of indices.
pub const MAX_PALETTE: usize = 65536;

/// Distinct colors of a model, ordered by the brightest of their red, green
/// and blue channels.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ColorMap {
    colors: Vec<u32>,
}

fn key(color: u32) -> u8 {
    let [r, g, b, _] = color.to_le_bytes();
    r.max(g).max(b)
}

impl ColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a color after every entry with the same key. Known colors are ignored.
    pub fn add(&mut self, color: u32) {
        if self.colors.contains(&color) {
            return;
        }
        let k = key(color);
        let pos = self.colors.partition_point(|&c| key(c) <= k);
        self.colors.insert(pos, color);
    }

    /// Palette position of `color`, or the color itself once the palette is
    /// too large to be indexed.
    pub fn index_of(&self, color: u32) -> u32 {
        if self.colors.len() >= MAX_PALETTE {
            return color;
        }
        self.colors
            .iter()
            .position(|&c| c == color)
            .map_or(color, |i| i as u32)
    }

    /// Drops a palette that holds nothing but black, the default color.
    pub fn finish(&mut self) {
        if self.colors == [0] {
            self.colors.clear();
        }
    }

    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Width of color fields: none without colors, raw four byte colors when
    /// indexing is disabled or impossible, otherwise a palette index.
    pub fn width(&self, indexed: bool) -> IndexWidth {
        if self.colors.is_empty() {
            IndexWidth::Absent
        } else if indexed {
            IndexWidth::for_count(self.colors.len())
        } else {
            IndexWidth::U32
        }
    }
}
