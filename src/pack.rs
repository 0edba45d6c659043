//! The packed intermediate edge format.
//!
//! Every edge becomes a 5-bit entry `(symbol << 2) | (flag << 1) | last`
//! packed twelve to a little-endian u64 block. The file ends with a footer
//! of σ+1 cumulative symbol counts (the F table) and the k value, so a
//! packed file alone reconstructs the whole index: W codes and node
//! boundaries from the entries, F and k from the footer.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::graph::DbgIndex;
use crate::merge::EdgeRecord;
use crate::util;
use crate::util::SIGMA;
use crate::Error;

/// Bits per packed edge entry: 3 for the symbol, 1 flag bit, 1 boundary bit.
pub const PACKED_WIDTH: usize = 5;
/// Entries per u64 block.
pub const PACKED_CAPACITY: usize = 64 / PACKED_WIDTH;

/// Streams edge records into a packed file.
pub struct PackedEdgeWriter<W: Write> {
    out: W,
    block: u64,
    n_in_block: usize,
    counts: Vec<u64>,
    n_edges: u64,
    k: u64,
}

impl<W: Write> PackedEdgeWriter<W> {
    pub fn new(out: W, k: usize) -> Self {
        Self { out, block: 0, n_in_block: 0, counts: vec![0; SIGMA + 1], n_edges: 0, k: k as u64 }
    }

    pub fn push<const B: usize>(&mut self, record: &EdgeRecord<B>) -> std::io::Result<()> {
        let entry = ((record.symbol() as u64) << 2)
            | ((record.flag() as u64) << 1)
            | record.node_last as u64;
        self.block |= entry << (PACKED_WIDTH * self.n_in_block);
        self.n_in_block += 1;
        if self.n_in_block == PACKED_CAPACITY {
            self.flush_block()?;
        }
        self.counts[record.node_last_symbol() as usize] += 1;
        self.n_edges += 1;
        Ok(())
    }

    fn flush_block(&mut self) -> std::io::Result<()> {
        self.out.write_all(&self.block.to_le_bytes())?;
        self.block = 0;
        self.n_in_block = 0;
        Ok(())
    }

    /// Writes the trailing partial block and the footer. Returns the number
    /// of edges written.
    pub fn finish(mut self) -> std::io::Result<u64> {
        if self.n_in_block > 0 {
            self.flush_block()?;
        }
        let mut cumulative = 0_u64;
        for count in self.counts.iter() {
            cumulative += count;
            self.out.write_all(&cumulative.to_le_bytes())?;
        }
        self.out.write_all(&self.k.to_le_bytes())?;
        self.out.flush()?;
        Ok(self.n_edges)
    }
}

/// The contents of a packed file, decoded.
pub struct PackedComponents {
    pub k: usize,
    /// Flagged W codes, `(symbol << 1) | flag`.
    pub codes: Vec<u8>,
    /// Positions of the node boundary bits.
    pub last_positions: Vec<usize>,
    /// The cumulative F table.
    pub symbol_ends: Vec<u64>,
}

/// Reads a packed file back into its components.
pub fn read_packed(path: &Path) -> Result<PackedComponents, Error> {
    let footer_bytes = (SIGMA + 2) * 8;
    let mut file = std::fs::File::open(path)?;
    let file_len = file.metadata()?.len() as usize;
    if file_len < footer_bytes || file_len % 8 != 0 {
        return Err(Error::InputFormat {
            path: path.to_path_buf(),
            reason: "missing or truncated footer".to_string(),
        });
    }

    file.seek(SeekFrom::End(-(footer_bytes as i64)))?;
    let mut symbol_ends = Vec::with_capacity(SIGMA + 1);
    for _ in 0..=SIGMA {
        symbol_ends.push(util::read_u64(&mut file)?);
    }
    let k = util::read_u64(&mut file)? as usize;
    let num_edges = symbol_ends[SIGMA] as usize;

    let num_blocks = (file_len - footer_bytes) / 8;
    if num_blocks * PACKED_CAPACITY < num_edges {
        return Err(Error::InputFormat {
            path: path.to_path_buf(),
            reason: format!("{} blocks cannot hold {} edges", num_blocks, num_edges),
        });
    }

    file.seek(SeekFrom::Start(0))?;
    let mut reader = std::io::BufReader::new(file);
    let mut codes = Vec::with_capacity(num_edges);
    let mut last_positions = Vec::new();
    let mut edge_idx = 0_usize;
    for _ in 0..num_blocks {
        let mut buf = [0_u8; 8];
        reader.read_exact(&mut buf)?;
        let block = u64::from_le_bytes(buf);
        for i in 0..PACKED_CAPACITY {
            if edge_idx == num_edges {
                break;
            }
            let entry = (block >> (PACKED_WIDTH * i)) & ((1 << PACKED_WIDTH) - 1);
            let symbol = (entry >> 2) as u8;
            let flag = (entry >> 1) & 1 == 1;
            let node_last = entry & 1 == 1;
            codes.push((symbol << 1) | flag as u8);
            if node_last {
                last_positions.push(edge_idx);
            }
            edge_idx += 1;
        }
    }

    if last_positions.last() != Some(&(num_edges.saturating_sub(1))) || num_edges == 0 {
        return Err(Error::InputFormat {
            path: path.to_path_buf(),
            reason: "node boundary bits do not close the edge list".to_string(),
        });
    }

    Ok(PackedComponents { k, codes, last_positions, symbol_ends })
}

impl DbgIndex {
    /// Assembles a queryable index from a packed file.
    pub fn from_packed_file(path: &Path) -> Result<Self, Error> {
        let parts = read_packed(path)?;
        if parts.k < 2 || parts.k > 64 {
            return Err(Error::InputFormat {
                path: path.to_path_buf(),
                reason: format!("unsupported k = {}", parts.k),
            });
        }
        Ok(Self::from_components(parts.k, &parts.codes, parts.last_positions, parts.symbol_ends))
    }
}
