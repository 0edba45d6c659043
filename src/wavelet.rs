//! A wavelet matrix over small alphabets, backed by `simple-sds` bit
//! vectors. This is the rank/select structure behind the edge-symbol
//! sequence W: the flagged DNA alphabet has 10 values, so four levels
//! suffice and every rank and select query costs four bit-vector queries.

use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::ops::{BitVec, Rank, Select, SelectZero};
use simple_sds_sbwt::raw_vector::{AccessRaw, RawVector};
use simple_sds_sbwt::serialize::Serialize;

use crate::util;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WaveletMatrix {
    levels: Vec<BitVector>,
    zeros: Vec<usize>,
    len: usize,
    width: usize,
}

impl WaveletMatrix {
    /// Builds the matrix from a sequence of codes over `0..sigma`.
    pub fn new(codes: &[u8], sigma: usize) -> Self {
        assert!(sigma >= 1);
        let width = std::cmp::max(1, 64 - (sigma as u64 - 1).leading_zeros() as usize);
        let len = codes.len();

        let mut levels = Vec::<BitVector>::with_capacity(width);
        let mut zeros = Vec::<usize>::with_capacity(width);
        let mut current = codes.to_vec();
        let mut next = Vec::with_capacity(len);

        for level in 0..width {
            let shift = width - 1 - level;
            let mut raw = RawVector::with_len(len, false);
            for (i, code) in current.iter().enumerate() {
                if (code >> shift) & 1 == 1 {
                    raw.set_bit(i, true);
                }
            }

            // Stable partition: zero-bit codes first, then one-bit codes
            next.clear();
            next.extend(current.iter().filter(|c| (**c >> shift) & 1 == 0));
            let n_zeros = next.len();
            next.extend(current.iter().filter(|c| (**c >> shift) & 1 == 1));
            std::mem::swap(&mut current, &mut next);

            let mut bv = BitVector::from(raw);
            bv.enable_rank();
            bv.enable_select();
            bv.enable_select_zero();
            levels.push(bv);
            zeros.push(n_zeros);
        }

        Self { levels, zeros, len, width }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// The code at position i.
    pub fn access(&self, i: usize) -> u8 {
        debug_assert!(i < self.len);
        let mut code = 0_u8;
        let mut pos = i;
        for (level, bv) in self.levels.iter().enumerate() {
            code <<= 1;
            if bv.get(pos) {
                code |= 1;
                pos = self.zeros[level] + bv.rank(pos);
            } else {
                pos = pos - bv.rank(pos);
            }
        }
        code
    }

    /// Number of occurrences of `code` in positions `[0, i)`.
    pub fn rank(&self, code: u8, i: usize) -> usize {
        debug_assert!(i <= self.len);
        let mut start = 0_usize;
        let mut end = i;
        for (level, bv) in self.levels.iter().enumerate() {
            let shift = self.width - 1 - level;
            if (code >> shift) & 1 == 1 {
                start = self.zeros[level] + bv.rank(start);
                end = self.zeros[level] + bv.rank(end);
            } else {
                start -= bv.rank(start);
                end -= bv.rank(end);
            }
        }
        end - start
    }

    /// Position of the occurrence of `code` with the given 0-based rank.
    pub fn select(&self, code: u8, rank: usize) -> Option<usize> {
        if rank >= self.rank(code, self.len) {
            return None;
        }

        // Descend to the start of the code's interval on the bottom level
        let mut start = 0_usize;
        for (level, bv) in self.levels.iter().enumerate() {
            let shift = self.width - 1 - level;
            if (code >> shift) & 1 == 1 {
                start = self.zeros[level] + bv.rank(start);
            } else {
                start -= bv.rank(start);
            }
        }

        // Ascend back, mapping the in-interval offset to a position
        let mut pos = start + rank;
        for (level, bv) in self.levels.iter().enumerate().rev() {
            let shift = self.width - 1 - level;
            if (code >> shift) & 1 == 1 {
                pos = bv.select(pos - self.zeros[level]).unwrap();
            } else {
                pos = bv.select_zero(pos).unwrap();
            }
        }
        Some(pos)
    }

    /// Writes the matrix to the writer and returns the number of bytes written.
    pub fn serialize<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n_written = 0_usize;
        n_written += util::write_bytes(out, &(self.len as u64).to_le_bytes())?;
        n_written += util::write_bytes(out, &(self.width as u64).to_le_bytes())?;
        for z in self.zeros.iter() {
            n_written += util::write_bytes(out, &(*z as u64).to_le_bytes())?;
        }
        for level in self.levels.iter() {
            level.serialize(out)?;
            n_written += level.size_in_bytes();
        }
        Ok(n_written)
    }

    /// Loads a matrix previously written with [`WaveletMatrix::serialize`].
    pub fn load<R: std::io::Read>(input: &mut R) -> std::io::Result<Self> {
        let len = util::read_u64(input)? as usize;
        let width = util::read_u64(input)? as usize;
        let mut zeros = Vec::with_capacity(width);
        for _ in 0..width {
            zeros.push(util::read_u64(input)? as usize);
        }
        let mut levels = Vec::with_capacity(width);
        for _ in 0..width {
            let mut bv = BitVector::load(input)?;
            bv.enable_rank();
            bv.enable_select();
            bv.enable_select_zero();
            levels.push(bv);
        }
        Ok(Self { levels, zeros, len, width })
    }

    pub fn size_in_bytes(&self) -> usize {
        16 + 8 * self.zeros.len() + self.levels.iter().map(|l| l.size_in_bytes()).sum::<usize>()
    }
}
