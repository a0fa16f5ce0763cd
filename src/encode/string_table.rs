use indexmap::IndexSet;

use crate::shared::safe_str::{self, Mode};

#[remain::sorted]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Err {
    #[error("The string area is {0} bytes long, more than offsets can address")]
    Overflow(usize),
}

/// Deduplicated strings of a binary model, stored NUL terminated after the
/// four header strings. Offsets count from the start of the header strings,
/// so offset 0 never names a table string and doubles as "no string".
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    strings: IndexSet<String>,
    offsets: Vec<u32>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizes `s`, records it unless empty, and returns the sanitized form.
    pub fn add(&mut self, s: &str, mode: Mode) -> String {
        let s = safe_str::sanitize(s, mode);
        if !s.is_empty() {
            self.strings.insert(s.clone());
        }
        s
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Lays out the header strings followed by every table string and returns
    /// the bytes. Offsets are available through `offset` afterwards.
    pub fn finalize(&mut self, header: [&str; 4]) -> Result<Vec<u8>, Err> {
        let mut area = Vec::new();
        for s in header {
            area.extend_from_slice(s.as_bytes());
            area.push(0);
        }
        self.offsets.clear();
        for s in &self.strings {
            self.offsets.push(area.len() as u32);
            area.extend_from_slice(s.as_bytes());
            area.push(0);
        }
        if area.len() >= u32::MAX as usize - 1 {
            return Err(Err::Overflow(area.len()));
        }
        Ok(area)
    }

    /// Offset of a string added before `finalize`; 0 for empty or unknown strings.
    pub fn offset(&self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        self.strings
            .get_index_of(s)
            .and_then(|i| self.offsets.get(i).copied())
            .unwrap_or(0)
    }
}
