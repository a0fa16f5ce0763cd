use crate::core::bit_coder::{BitWriter, ByteWriter};

/// Number of hash chains.
const HASH_SIZE: usize = 16384;
const WINDOW: usize = 32768;
const MAX_MATCH: usize = 258;
const MIN_QUALITY: usize = 5;

/// Base lengths of the length symbols 257..=285, with a terminator.
const LENGTH_BASE: [u16; 30] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258, 259,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
/// Base distances of the distance symbols 0..=29, with a terminator.
const DIST_BASE: [u16; 31] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577, 32768,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

const END_OF_BLOCK: u16 = 256;

fn hash(data: &[u8]) -> usize {
    let mut h = data[0] as u32 | (data[1] as u32) << 8 | (data[2] as u32) << 16;
    h ^= h << 3;
    h = h.wrapping_add(h >> 5);
    h ^= h << 4;
    h = h.wrapping_add(h >> 17);
    h ^= h << 25;
    h = h.wrapping_add(h >> 6);
    h as usize & (HASH_SIZE - 1)
}

/// Length of the common prefix of `a` and `b`, capped at the longest match.
fn match_len(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .zip(b)
        .take(MAX_MATCH)
        .take_while(|(x, y)| x == y)
        .count()
}

/// Huffman codes are sent most significant bit first, while the bit writer
/// packs least significant bit first.
fn reverse(code: u32, len: u8) -> u32 {
    code.reverse_bits() >> (32 - len as u32)
}

/// Code and length of a literal/length symbol in the fixed Huffman table.
fn fixed_code(symbol: u16) -> (u8, u32) {
    let s = symbol as u32;
    let (len, code) = match symbol {
        0..=143 => (8, 0x30 + s),
        144..=255 => (9, 0x190 + s - 144),
        256..=279 => (7, s - 256),
        _ => (8, 0xC0 + s - 280),
    };
    (len, reverse(code, len))
}

struct Encoder<'buffer, W: ByteWriter> {
    bits: BitWriter<'buffer, W>,
}

impl<W: ByteWriter> Encoder<'_, W> {
    fn symbol(&mut self, symbol: u16) {
        self.bits.write_bits(fixed_code(symbol));
    }

    fn copy(&mut self, len: usize, dist: usize) {
        let mut j = 0;
        while len > LENGTH_BASE[j + 1] as usize - 1 {
            j += 1;
        }
        self.symbol(257 + j as u16);
        if LENGTH_EXTRA[j] > 0 {
            self.bits
                .write_bits((LENGTH_EXTRA[j], (len - LENGTH_BASE[j] as usize) as u32));
        }

        let mut j = 0;
        while dist > DIST_BASE[j + 1] as usize - 1 {
            j += 1;
        }
        self.bits.write_bits((5, reverse(j as u32, 5)));
        if DIST_EXTRA[j] > 0 {
            self.bits
                .write_bits((DIST_EXTRA[j], (dist - DIST_BASE[j] as usize) as u32));
        }
    }
}

/// Compresses `data` into a zlib stream made of a single fixed Huffman block.
///
/// Matches are found through hash chains over three byte prefixes. A chain is
/// cut back to its newest `quality` entries once it holds `2 * quality`, so a
/// higher quality searches longer at the cost of speed. A match is dropped in
/// favor of a literal when the next position offers a strictly longer one.
pub fn deflate(data: &[u8], quality: usize) -> Vec<u8> {
    let quality = quality.max(MIN_QUALITY);
    let mut out = Vec::with_capacity(data.len() / 2 + 16);
    out.write_u8(0x78);
    out.write_u8(0x5E);

    {
        let mut enc = Encoder {
            bits: BitWriter::spown_from(&mut out),
        };
        // final block, fixed Huffman codes
        enc.bits.write_bits((1, 1));
        enc.bits.write_bits((2, 1));

        let mut chains: Vec<Vec<usize>> = vec![Vec::new(); HASH_SIZE];
        let mut i = 0;
        while i + 3 < data.len() {
            let h = hash(&data[i..]);
            let mut best = 3;
            let mut best_pos = None;
            for &pos in &chains[h] {
                if pos + WINDOW > i {
                    let d = match_len(&data[pos..], &data[i..]);
                    if d >= best {
                        best = d;
                        best_pos = Some(pos);
                    }
                }
            }

            let chain = &mut chains[h];
            if chain.len() == 2 * quality {
                chain.drain(..quality);
            }
            chain.push(i);

            if best_pos.is_some() {
                let next = &chains[hash(&data[i + 1..])];
                let better = next
                    .iter()
                    .filter(|&&pos| pos + WINDOW - 1 > i)
                    .any(|&pos| match_len(&data[pos..], &data[i + 1..]) > best);
                if better {
                    best_pos = None;
                }
            }

            match best_pos {
                Some(pos) => {
                    enc.copy(best, i - pos);
                    i += best;
                }
                None => {
                    enc.symbol(data[i] as u16);
                    i += 1;
                }
            }
        }
        for &b in &data[i..] {
            enc.symbol(b as u16);
        }
        enc.symbol(END_OF_BLOCK);
    }

    let (s1, s2) = adler32(data);
    out.extend_from_slice(&[(s2 >> 8) as u8, s2 as u8, (s1 >> 8) as u8, s1 as u8]);
    out
}

fn adler32(data: &[u8]) -> (u32, u32) {
    const MOD: u32 = 65521;
    const BLOCK: usize = 5552;
    let (mut s1, mut s2) = (1_u32, 0_u32);
    for block in data.chunks(BLOCK) {
        for &b in block {
            s1 += b as u32;
            s2 += s1;
        }
        s1 %= MOD;
        s2 %= MOD;
    }
    (s1, s2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn header_and_trailer() {
        let out = deflate(b"", 5);
        assert_eq!(&out[..2], &[0x78, 0x5E]);
        // empty input has an Adler-32 of 1
        assert_eq!(&out[out.len() - 4..], &[0, 0, 0, 1]);
        assert!(inflate(&out).is_empty());
    }

    #[test]
    fn fixed_codes_match_rfc1951() {
        // literal 0 is 00110000, sent msb first
        assert_eq!(fixed_code(0), (8, 0b0000_1100));
        assert_eq!(fixed_code(256), (7, 0));
        assert_eq!(fixed_code(144).0, 9);
        assert_eq!(fixed_code(285).0, 8);
    }

    #[test]
    fn inflates_back_to_input() {
        let short = b"abc".to_vec();
        let text = b"the quick brown fox jumps over the lazy dog; ".repeat(200);
        let runs = vec![7_u8; 70_000];
        let mut noise = Vec::with_capacity(50_000);
        let mut state = 0x1234_5678_u32;
        for _ in 0..50_000 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            noise.push((state >> 16) as u8 % 16);
        }
        for input in [short, text, runs, noise] {
            for quality in [1, 8, 64] {
                let packed = deflate(&input, quality);
                assert_eq!(inflate(&packed), input);
            }
        }
    }

    #[test]
    fn repetitive_data_shrinks() {
        let input = b"VRTS".repeat(1000);
        assert!(deflate(&input, 8).len() < input.len() / 10);
    }

    #[test]
    fn adler_of_known_string() {
        let (s1, s2) = adler32(b"Wikipedia");
        assert_eq!(s2 << 16 | s1, 0x11E6_0398);
    }
}
