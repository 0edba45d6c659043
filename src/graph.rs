//! The succinct de Bruijn graph index and its query operations.
//!
//! The graph is stored as the BOSS triple (W, L, F): the per-edge symbol
//! sequence with duplicate-target flags in a [`WaveletMatrix`], the
//! node-boundary bits in an Elias-Fano [`SparseVector`], and the cumulative
//! per-symbol edge counts. Nodes are identified by their colex rank and
//! materialize only as edge ranges; every operation is rank/select
//! arithmetic over the three tables. The index is immutable: build it with
//! [`DbgAssembler`] (or [`crate::DbgBuilder`]) and share it freely across
//! threads.

use simple_sds_sbwt::ops::{BitVec, Rank, Select};
use simple_sds_sbwt::serialize::Serialize;
use simple_sds_sbwt::sparse_vector::SparseVector;

use crate::merge::EdgeRecord;
use crate::util;
use crate::util::{ACGT_TO_0123, ALPHABET, SIGMA};
use crate::wavelet::WaveletMatrix;

#[inline]
fn with_flag(x: u8, flag: bool) -> u8 {
    (x << 1) | flag as u8
}

/// The immutable BOSS index over a DNA k-mer set.
#[derive(Debug)]
pub struct DbgIndex {
    k: usize,
    /// Bit i is set iff edge i is the last outgoing edge of its source node.
    last: SparseVector,
    /// The flagged edge symbols.
    edges: WaveletMatrix,
    /// Cumulative number of edges whose source node ends in a symbol <= x.
    symbol_ends: Vec<u64>,
    /// Per symbol, the total number of unflagged occurrences in W.
    max_ranks: Vec<u64>,
    alphabet: Vec<u8>,
    num_nodes: usize,
}

/// Accumulates the merge output and freezes it into a [`DbgIndex`].
pub struct DbgAssembler {
    k: usize,
    codes: Vec<u8>,
    last_positions: Vec<usize>,
    counts: Vec<u64>,
}

impl DbgAssembler {
    pub fn new(k: usize) -> Self {
        Self { k, codes: Vec::new(), last_positions: Vec::new(), counts: vec![0; SIGMA + 1] }
    }

    /// Appends one edge in emission order.
    pub fn push<const B: usize>(&mut self, record: &EdgeRecord<B>) {
        if record.node_last {
            self.last_positions.push(self.codes.len());
        }
        self.codes.push(record.w);
        self.counts[record.node_last_symbol() as usize] += 1;
    }

    pub fn finish(self) -> DbgIndex {
        let mut symbol_ends = self.counts;
        for x in 1..=SIGMA {
            symbol_ends[x] += symbol_ends[x - 1];
        }
        DbgIndex::from_components(self.k, &self.codes, self.last_positions, symbol_ends)
    }
}

impl DbgIndex {
    /// Builds the index from its raw parts: the flagged symbol codes, the
    /// positions of the node-boundary bits, and the cumulative F counts.
    pub(crate) fn from_components(
        k: usize,
        codes: &[u8],
        last_positions: Vec<usize>,
        symbol_ends: Vec<u64>,
    ) -> Self {
        assert!(k >= 2, "k must be at least 2");
        assert!(!codes.is_empty(), "a graph always has the all-$ edge");
        assert_eq!(symbol_ends.len(), SIGMA + 1);
        assert_eq!(symbol_ends[SIGMA] as usize, codes.len());
        assert_eq!(last_positions.last(), Some(&(codes.len() - 1)));

        let edges = WaveletMatrix::new(codes, 2 * (SIGMA + 1));
        let num_nodes = last_positions.len();
        let last = SparseVector::try_from_iter(last_positions.into_iter()).unwrap();

        let max_ranks: Vec<u64> =
            (0..=SIGMA).map(|x| edges.rank(with_flag(x as u8, false), edges.len()) as u64).collect();

        Self { k, last, edges, symbol_ends, max_ranks, alphabet: ALPHABET.to_vec(), num_nodes }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn alphabet(&self) -> &[u8] {
        &self.alphabet
    }

    /// Total size of the serialized index in bytes.
    pub fn size_in_bytes(&self) -> usize {
        8 + self.last.size_in_bytes()
            + self.edges.size_in_bytes()
            + 8 * (self.symbol_ends.len() + self.max_ranks.len())
            + 8
            + self.alphabet.len()
            + 8
    }

    fn symbol_start(&self, x: u8) -> usize {
        debug_assert!((x as usize) <= SIGMA);
        if x == 0 {
            0
        } else {
            self.symbol_ends[x as usize - 1] as usize
        }
    }

    /// The last symbol of the source-node label of edge i.
    pub fn symbol_access(&self, i: usize) -> u8 {
        debug_assert!(i < self.num_edges());
        for x in 0..=SIGMA {
            if (i as u64) < self.symbol_ends[x] {
                return x as u8;
            }
        }
        unreachable!("F table does not cover the edge range")
    }

    /// The first edge of node v.
    pub fn node_to_edge(&self, v: usize) -> usize {
        debug_assert!(v < self.num_nodes);
        if v == 0 {
            0
        } else {
            self.last.select(v - 1).unwrap() + 1
        }
    }

    /// The last edge of node v.
    pub fn last_edge_of_node(&self, v: usize) -> usize {
        debug_assert!(v < self.num_nodes);
        self.last.select(v).unwrap()
    }

    /// The node edge i belongs to.
    pub fn edge_to_node(&self, i: usize) -> usize {
        debug_assert!(i < self.num_edges());
        self.last.rank(i)
    }

    /// The inclusive edge range of node v.
    pub fn node_range(&self, v: usize) -> (usize, usize) {
        (self.node_to_edge(v), self.last_edge_of_node(v))
    }

    /// Number of outgoing edges of node v. A single `$`-labeled edge does
    /// not count.
    pub fn outdegree(&self, v: usize) -> usize {
        let (first, last) = self.node_range(v);
        let count = last - first + 1;
        count - (count == 1 && self.edges.access(first) >> 1 == 0) as usize
    }

    /// Number of incoming edges of node v, counting flagged duplicates.
    pub fn indegree(&self, v: usize) -> usize {
        let j = self.node_to_edge(v);
        let y = self.symbol_access(j);
        if y == 0 {
            return 0;
        }
        let i_first = self.backward(j);
        let i_last = self.next_edge(i_first, y);
        let flagged = with_flag(y, true);
        self.edges.rank(flagged, i_last) - self.edges.rank(flagged, i_first) + 1
    }

    /// Follows edge i to its target node and returns the target's first
    /// edge, or None if the edge is labeled `$`.
    pub fn forward(&self, i: usize) -> Option<usize> {
        debug_assert!(i < self.num_edges());
        let x = self.edges.access(i) >> 1;
        if x == 0 {
            return None;
        }
        // Rank of the representative unflagged occurrence: for a flagged
        // edge this is the unflagged edge with the same target before it.
        let nth = self.edges.rank(with_flag(x, false), i + 1);
        debug_assert!(nth >= 1);
        let block_first_node = self.last.rank(self.symbol_start(x));
        Some(self.node_to_edge(block_first_node + nth - 1))
    }

    /// The edge into the source node of edge i: the inverse of forward up
    /// to the choice of edge within a node. Edges of the all-`$` node map
    /// to edge 0, the backward fixed point.
    pub fn backward(&self, i: usize) -> usize {
        debug_assert!(i < self.num_edges());
        let x = self.symbol_access(i);
        if x == 0 {
            return 0;
        }
        let v = self.edge_to_node(i);
        let block_first_node = self.last.rank(self.symbol_start(x));
        debug_assert!(v >= block_first_node);
        self.edges.select(with_flag(x, false), v - block_first_node).unwrap()
    }

    /// The next edge after i with unflagged symbol x, or `num_edges()` if
    /// there is none.
    pub fn next_edge(&self, i: usize, x: u8) -> usize {
        let r = self.edges.rank(with_flag(x, false), i + 1);
        if r as u64 >= self.max_ranks[x as usize] {
            self.num_edges()
        } else {
            self.edges.select(with_flag(x, false), r).unwrap()
        }
    }

    /// Follows the outgoing edge of node v labeled with symbol x (1..=4).
    /// Returns the target node, or None if v has no such edge.
    pub fn outgoing(&self, v: usize, x: u8) -> Option<usize> {
        debug_assert!((x as usize) <= SIGMA);
        if x == 0 {
            return None;
        }
        let (first, last) = self.node_range(v);
        for flag in [false, true] {
            let c = with_flag(x, flag);
            let r = self.edges.rank(c, last + 1);
            if r == 0 {
                continue;
            }
            let most_recent = self.edges.select(c, r - 1).unwrap();
            if first <= most_recent && most_recent <= last {
                return self.forward(most_recent).map(|e| self.edge_to_node(e));
            }
        }
        None
    }

    // The first character of the edge label of i, walking the source-node
    // label backwards. Cheaper than building the whole label.
    fn first_symbol(&self, mut i: usize) -> u8 {
        let mut x = 0;
        for _ in 1..self.k {
            x = self.symbol_access(i);
            if x == 0 {
                return x;
            }
            i = self.backward(i);
        }
        x
    }

    /// The predecessor of node v whose label starts with symbol x (1..=4),
    /// or None if there is none.
    pub fn incoming(&self, v: usize, x: u8) -> Option<usize> {
        debug_assert!((x as usize) <= SIGMA);
        if x == 0 {
            return None;
        }
        let j = self.node_to_edge(v);
        let y = self.symbol_access(j);
        if y == 0 {
            return None;
        }
        let i_first = self.backward(j);
        let i_last = self.next_edge(i_first, y);
        let flagged = with_flag(y, true);
        let base_rank = self.edges.rank(flagged, i_first);
        let num_predecessors = self.edges.rank(flagged, i_last) - base_rank + 1;

        let selector = |t: usize| -> usize {
            if t == 0 {
                i_first
            } else {
                self.edges.select(flagged, base_rank + t - 1).unwrap()
            }
        };

        // The predecessors differ exactly in their first character, in
        // increasing order, so a binary search on it finds the match.
        let t = util::binary_search_leftmost_that_fulfills_pred(
            |t| self.first_symbol(selector(t)),
            |s| s >= x,
            num_predecessors,
        );
        if t == num_predecessors {
            return None;
        }
        let e = selector(t);
        if self.first_symbol(e) == x {
            Some(self.edge_to_node(e))
        } else {
            None
        }
    }

    /// All predecessor nodes of v in colex order.
    pub fn predecessors(&self, v: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let j = self.node_to_edge(v);
        let y = self.symbol_access(j);
        if y == 0 {
            return result;
        }
        let i_first = self.backward(j);
        let i_last = self.next_edge(i_first, y);
        let flagged = with_flag(y, true);
        let base_rank = self.edges.rank(flagged, i_first);
        let num_predecessors = self.edges.rank(flagged, i_last) - base_rank + 1;

        result.push(self.edge_to_node(i_first));
        for t in 1..num_predecessors {
            let e = self.edges.select(flagged, base_rank + t - 1).unwrap();
            result.push(self.edge_to_node(e));
        }
        result
    }

    /// The k-1 character label of node v, `$`-padded on the left for
    /// partial (dummy) nodes.
    pub fn node_label(&self, v: usize) -> Vec<u8> {
        self.node_label_from_edge(self.node_to_edge(v))
    }

    /// The label of the source node of edge i.
    pub fn node_label_from_edge(&self, mut i: usize) -> Vec<u8> {
        let mut label = vec![b'$'; self.k - 1];
        for pos in (0..self.k - 1).rev() {
            let x = self.symbol_access(i);
            label[pos] = self.alphabet[x as usize];
            // Everything to the left of a $ is $
            if x == 0 {
                break;
            }
            i = self.backward(i);
        }
        label
    }

    /// The full k character label of edge i.
    pub fn edge_label(&self, i: usize) -> Vec<u8> {
        let mut label = self.node_label_from_edge(i);
        label.push(self.alphabet[(self.edges.access(i) >> 1) as usize]);
        label
    }

    /// Finds the edge range of the nodes whose label is suffixed by the
    /// pattern (ascii ACGT, at most k characters). For a k character
    /// pattern this is a k-mer membership query: the returned pair is the
    /// first and last edge of the target node of the matched edge.
    pub fn search(&self, pattern: &[u8]) -> Option<(usize, usize)> {
        debug_assert!(pattern.len() <= self.k);
        let mut first = 0_usize;
        let mut last = self.num_edges() - 1;
        for &chr in pattern {
            let x = ACGT_TO_0123[chr as usize];
            if x == 255 {
                return None;
            }
            let x = x + 1;
            let plain = with_flag(x, false);
            let flagged = with_flag(x, true);

            let n_plain = self.edges.rank(plain, last + 1) - self.edges.rank(plain, first);
            let n_flagged = self.edges.rank(flagged, last + 1) - self.edges.rank(flagged, first);
            if n_plain == 0 && n_flagged == 0 {
                return None;
            }

            // Targets of the x-edges in the range. A flagged edge shares the
            // target of the nearest unflagged x-edge before it, which may
            // precede the range.
            let hi = self.edges.rank(plain, last + 1) - 1;
            let first_plain = if n_plain > 0 {
                self.edges.select(plain, self.edges.rank(plain, first)).unwrap()
            } else {
                last + 1
            };
            let flagged_before_plain =
                self.edges.rank(flagged, first_plain) - self.edges.rank(flagged, first) > 0;
            let lo = self.edges.rank(plain, first) - flagged_before_plain as usize;

            let block_first_node = self.last.rank(self.symbol_start(x));
            first = self.node_to_edge(block_first_node + lo);
            last = self.last_edge_of_node(block_first_node + hi);
        }
        Some((first, last))
    }

    /// Writes the index to the writer. Returns the number of bytes written.
    pub fn serialize<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n_written = 0_usize;
        n_written += util::write_bytes(out, &(self.k as u64).to_le_bytes())?;

        self.last.serialize(out)?;
        n_written += self.last.size_in_bytes();

        n_written += self.edges.serialize(out)?;

        for x in self.symbol_ends.iter() {
            n_written += util::write_bytes(out, &x.to_le_bytes())?;
        }
        for x in self.max_ranks.iter() {
            n_written += util::write_bytes(out, &x.to_le_bytes())?;
        }

        n_written += util::write_bytes(out, &(self.alphabet.len() as u64).to_le_bytes())?;
        n_written += util::write_bytes(out, &self.alphabet)?;

        n_written += util::write_bytes(out, &(self.num_nodes as u64).to_le_bytes())?;
        Ok(n_written)
    }

    /// Loads an index previously written with [`DbgIndex::serialize`].
    pub fn load<R: std::io::Read>(input: &mut R) -> std::io::Result<Self> {
        let k = util::read_u64(input)? as usize;
        let last = SparseVector::load(input)?;
        let edges = WaveletMatrix::load(input)?;

        let mut symbol_ends = Vec::with_capacity(SIGMA + 1);
        for _ in 0..=SIGMA {
            symbol_ends.push(util::read_u64(input)?);
        }
        let mut max_ranks = Vec::with_capacity(SIGMA + 1);
        for _ in 0..=SIGMA {
            max_ranks.push(util::read_u64(input)?);
        }

        let alphabet_len = util::read_u64(input)? as usize;
        let mut alphabet = vec![0_u8; alphabet_len];
        input.read_exact(&mut alphabet)?;

        let num_nodes = util::read_u64(input)? as usize;

        if symbol_ends[SIGMA] as usize != edges.len() || last.len() != edges.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "edge table sizes disagree",
            ));
        }

        Ok(Self { k, last, edges, symbol_ends, max_ranks, alphabet, num_nodes })
    }
}

impl PartialEq for DbgIndex {
    fn eq(&self, other: &Self) -> bool {
        self.k == other.k
            && self.edges == other.edges
            && self.symbol_ends == other.symbol_ends
            && self.max_ranks == other.max_ranks
            && self.alphabet == other.alphabet
            && self.num_nodes == other.num_nodes
            && self.last.len() == other.last.len()
            && self.last.one_iter().eq(other.last.one_iter())
    }
}

impl Eq for DbgIndex {}
