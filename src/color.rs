//! Per-edge color bitmaps: which input dataset contributed each edge.
//!
//! The colors of a graph with E edges and C colors form an E·C bitmap in
//! edge-major order: bit `i·C + c` is set iff edge i occurs in input c.
//! The bitmap is accumulated as a plain bit vector during the merge and
//! compressed into an Elias-Fano vector for queries and persistence, kept
//! in a file of its own next to the graph.

use bitvec::vec::BitVec;
use simple_sds_sbwt::ops::{BitVec as _, Rank, Select};
use simple_sds_sbwt::serialize::Serialize;
use simple_sds_sbwt::sparse_vector::{SparseBuilder, SparseVector};

use crate::util;

/// Accumulates the color mask of every emitted edge.
pub struct ColorAssembler {
    bits: BitVec,
    num_colors: usize,
}

impl ColorAssembler {
    pub fn new(num_colors: usize) -> Self {
        assert!(num_colors >= 1 && num_colors <= crate::ingest::MAX_COLORS);
        Self { bits: BitVec::new(), num_colors }
    }

    /// Appends the colors of one edge, in emission order.
    pub fn push(&mut self, mask: u64) {
        for c in 0..self.num_colors {
            self.bits.push((mask >> c) & 1 == 1);
        }
    }

    pub fn finish(self) -> ColorMatrix {
        let n_ones = self.bits.count_ones();
        let mut builder = SparseBuilder::new(self.bits.len(), n_ones).unwrap();
        for pos in self.bits.iter_ones() {
            builder.set(pos);
        }
        let bits = SparseVector::try_from(builder).unwrap();
        ColorMatrix { bits, num_colors: self.num_colors }
    }
}

/// The compressed edge-major color bitmap.
#[derive(Debug)]
pub struct ColorMatrix {
    bits: SparseVector,
    num_colors: usize,
}

impl ColorMatrix {
    pub fn num_colors(&self) -> usize {
        self.num_colors
    }

    pub fn num_edges(&self) -> usize {
        self.bits.len() / self.num_colors
    }

    /// True iff edge i carries color c.
    pub fn edge_has_color(&self, i: usize, c: usize) -> bool {
        debug_assert!(c < self.num_colors);
        let pos = i * self.num_colors + c;
        self.bits.rank(pos + 1) - self.bits.rank(pos) == 1
    }

    /// The color mask of edge i.
    pub fn edge_colors(&self, i: usize) -> u64 {
        let mut mask = 0_u64;
        for c in 0..self.num_colors {
            mask |= (self.edge_has_color(i, c) as u64) << c;
        }
        mask
    }

    pub fn serialize<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n_written = 0_usize;
        n_written += util::write_bytes(out, &(self.num_colors as u64).to_le_bytes())?;
        self.bits.serialize(out)?;
        n_written += self.bits.size_in_bytes();
        Ok(n_written)
    }

    pub fn load<R: std::io::Read>(input: &mut R) -> std::io::Result<Self> {
        let num_colors = util::read_u64(input)? as usize;
        let bits = SparseVector::load(input)?;
        if num_colors == 0 || bits.len() % num_colors != 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "color bitmap length is not a multiple of the color count",
            ));
        }
        Ok(Self { bits, num_colors })
    }
}

impl PartialEq for ColorMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.num_colors == other.num_colors
            && self.bits.len() == other.bits.len()
            && self.bits.one_iter().eq(other.bits.one_iter())
    }
}

impl Eq for ColorMatrix {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_roundtrip() {
        let masks = [0b101_u64, 0b000, 0b111, 0b010, 0b001];
        let mut assembler = ColorAssembler::new(3);
        for &mask in masks.iter() {
            assembler.push(mask);
        }
        let matrix = assembler.finish();
        assert_eq!(matrix.num_colors(), 3);
        assert_eq!(matrix.num_edges(), 5);
        for (i, &mask) in masks.iter().enumerate() {
            assert_eq!(matrix.edge_colors(i), mask);
        }
        assert!(matrix.edge_has_color(0, 0));
        assert!(!matrix.edge_has_color(0, 1));
        assert!(matrix.edge_has_color(0, 2));

        let mut buf = Vec::<u8>::new();
        matrix.serialize(&mut buf).unwrap();
        let matrix2 = ColorMatrix::load(&mut buf.as_slice()).unwrap();
        assert_eq!(matrix, matrix2);
    }
}
