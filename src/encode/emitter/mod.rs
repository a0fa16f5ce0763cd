mod ascii;
mod binary;

pub(crate) use ascii::AsciiEmitter;
pub(crate) use binary::BinaryEmitter;

use super::compaction::Compacted;

/// Writes the sections of a compacted model in file order. Sections with
/// nothing to write are skipped by the implementations.
#[enum_dispatch::enum_dispatch]
pub(crate) trait Emit {
    fn header(&mut self, c: &Compacted);
    fn preview(&mut self, c: &Compacted);
    fn color_map(&mut self, c: &Compacted);
    fn texture_map(&mut self, c: &Compacted);
    fn vertices(&mut self, c: &Compacted);
    fn bones(&mut self, c: &Compacted);
    fn materials(&mut self, c: &Compacted);
    fn procedurals(&mut self, c: &Compacted);
    fn mesh(&mut self, c: &Compacted);
    fn shapes(&mut self, c: &Compacted);
    fn labels(&mut self, c: &Compacted);
    fn actions(&mut self, c: &Compacted);
    fn assets(&mut self, c: &Compacted);
    fn extras(&mut self, c: &Compacted);
    fn end(&mut self, c: &Compacted);
    fn finish(self) -> Vec<u8>;
}

#[enum_dispatch::enum_dispatch(Emit)]
pub(crate) enum Emitter {
    BinaryEmitter,
    AsciiEmitter,
}
