//! The three-way merge that linearizes the graph into BOSS order.
//!
//! Three sorted streams are consumed in one pass: the node-ordered real
//! edges, the sorted dummy records, and the edge-ordered real edges, whose
//! k-1 suffixes enumerate the target nodes in colex order. Source-node
//! groups come from the first two streams (a node is either `$`-padded or
//! real, never both); the third stream contributes an outgoing-`$` edge for
//! every node that is a target but never a source. Records leave the merge
//! in strict (source node colex, symbol) order, each carrying its symbol
//! with the duplicate-target flag, the node boundary bit, and the length of
//! the label prefix shared with the previously emitted record.

use std::path::Path;

use crate::ingest::EdgeRec;
use crate::kmer::{DummyRecord, LongKmer};
use crate::sorter::RecordCursor;
use crate::util::SIGMA;
use crate::Error;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EdgeTag {
    /// A real edge of the input k-mer set.
    Standard,
    /// A `$`-padded edge keeping the graph closed under predecessors.
    InDummy,
    /// A `$`-labeled edge out of a node with no real successor.
    OutDummy,
}

/// One edge in emission order.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct EdgeRecord<const B: usize> {
    pub tag: EdgeTag,
    /// Standard and InDummy: the packed edge k-mer (the prefix record for
    /// dummies). OutDummy: the packed source node.
    pub kmer: LongKmer<B>,
    /// Number of non-`$` characters: k for standard edges, the prefix
    /// length for in-dummies, k-1 for out-dummies.
    pub this_k: usize,
    /// Length of the longest common colex prefix with the previously
    /// emitted edge label, in 0..k-1.
    pub lcs: u8,
    /// The edge symbol with its flag bit: `(symbol << 1) | flag`.
    pub w: u8,
    /// True on the last edge of each source-node group.
    pub node_last: bool,
    pub colors: u64,
}

impl<const B: usize> EdgeRecord<B> {
    /// The plain symbol in 0..=4.
    pub fn symbol(&self) -> u8 {
        self.w >> 1
    }

    pub fn flag(&self) -> bool {
        self.w & 1 == 1
    }

    /// The last symbol of the source-node label in 0..=4. This is the
    /// symbol the F-table counts.
    pub fn node_last_symbol(&self) -> u8 {
        match self.tag {
            EdgeTag::Standard | EdgeTag::InDummy => {
                if self.this_k <= 1 {
                    0
                } else {
                    self.kmer.get_from_left(1) + 1
                }
            }
            EdgeTag::OutDummy => {
                if self.this_k == 0 {
                    0
                } else {
                    self.kmer.get_from_left(0) + 1
                }
            }
        }
    }
}

#[derive(Copy, Clone, Default, Debug)]
pub struct MergeStats {
    pub n_edges: usize,
    pub n_out_dummies: usize,
}

// A source or target node: the packed label suffix and the number of
// non-$ characters. The derived order (words, then shorter first) is node
// colex order with $-padding.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
struct NodeKey<const B: usize> {
    kmer: LongKmer<B>,
    len: usize,
}

impl<const B: usize> NodeKey<B> {
    fn of_edge(kmer: &LongKmer<B>, k: usize) -> Self {
        debug_assert!(k >= 1);
        Self { kmer: kmer.left_shift(1), len: k - 1 }
    }

    fn of_dummy(record: &DummyRecord<B>) -> Self {
        Self { kmer: record.0.left_shift(1), len: (record.1 as usize).saturating_sub(1) }
    }

    fn of_target(kmer: &LongKmer<B>, k: usize) -> Self {
        Self { kmer: kmer.first_chars(k - 1), len: k - 1 }
    }

    // Number of shared label-suffix characters with another node,
    // $-padding excluded.
    fn shared_suffix(&self, other: &Self) -> usize {
        LongKmer::<B>::lcp(&self.kmer, &other.kmer).min(self.len).min(other.len)
    }
}

// One pending edge of the current source-node group.
struct GroupEdge<const B: usize> {
    tag: EdgeTag,
    kmer: LongKmer<B>,
    this_k: usize,
    symbol: u8,
    colors: u64,
}

struct Emitter<const B: usize, V> {
    k: usize,
    visitor: V,
    // Flag state: which symbols have appeared since the start of the
    // current run of nodes sharing a (k-2)-suffix
    run_symbols: [bool; SIGMA + 1],
    prev_node: Option<NodeKey<B>>,
    // (node, symbol) of the previous record, for the lcs values
    prev_emitted: Option<(NodeKey<B>, u8)>,
    stats: MergeStats,
}

impl<const B: usize, V: FnMut(&EdgeRecord<B>)> Emitter<B, V> {
    fn new(k: usize, visitor: V) -> Self {
        Self {
            k,
            visitor,
            run_symbols: [false; SIGMA + 1],
            prev_node: None,
            prev_emitted: None,
            stats: MergeStats::default(),
        }
    }

    fn emit_group(&mut self, node: NodeKey<B>, edges: &[GroupEdge<B>]) {
        debug_assert!(!edges.is_empty());

        // Two edges share a target exactly when their source nodes share a
        // (k-2)-suffix and their symbols agree, so the flag state resets
        // whenever that suffix run ends.
        let run_continues = match &self.prev_node {
            Some(prev) => prev.shared_suffix(&node) >= self.k - 2,
            None => false,
        };
        if !run_continues {
            self.run_symbols = [false; SIGMA + 1];
        }
        self.prev_node = Some(node);

        for (i, edge) in edges.iter().enumerate() {
            let flagged = edge.symbol != 0 && self.run_symbols[edge.symbol as usize];
            self.run_symbols[edge.symbol as usize] = true;

            let lcs = match &self.prev_emitted {
                Some((prev_node, prev_symbol)) if *prev_symbol == edge.symbol => {
                    1 + prev_node.shared_suffix(&node)
                }
                Some(_) => 0,
                None => 0,
            };
            self.prev_emitted = Some((node, edge.symbol));

            let record = EdgeRecord {
                tag: edge.tag,
                kmer: edge.kmer,
                this_k: edge.this_k,
                lcs: lcs as u8,
                w: (edge.symbol << 1) | flagged as u8,
                node_last: i + 1 == edges.len(),
                colors: edge.colors,
            };
            (self.visitor)(&record);
            self.stats.n_edges += 1;
            if edge.tag == EdgeTag::OutDummy {
                self.stats.n_out_dummies += 1;
            }
        }
    }
}

/// Merges the three sorted streams and hands every edge record to the
/// visitor in BOSS order. Duplicate edges of the canonical stream are
/// collapsed into one record with the union of their color masks.
pub fn merge_edges<const B: usize, V: FnMut(&EdgeRecord<B>)>(
    node_sorted: &Path,
    edge_sorted: &Path,
    dummies: &Path,
    k: usize,
    visitor: V,
) -> Result<MergeStats, Error> {
    let mut reals = RecordCursor::<EdgeRec<B>>::open(node_sorted)?;
    let mut targets = RecordCursor::<EdgeRec<B>>::open(edge_sorted)?;
    let mut dummy_records = RecordCursor::<DummyRecord<B>>::open(dummies)?;

    let mut emitter = Emitter::new(k, visitor);
    let mut group = Vec::<GroupEdge<B>>::new();
    let mut prev_source: Option<NodeKey<B>> = None;
    let mut prev_target: Option<NodeKey<B>> = None;

    loop {
        let real_node = reals.peek().map(|rec| NodeKey::of_edge(&rec.kmer, k));
        let dummy_node = dummy_records.peek().map(NodeKey::of_dummy);
        let target_node = targets.peek().map(|rec| NodeKey::of_target(&rec.kmer, k));

        // The next source-node group comes from whichever stream holds the
        // smaller node. Real and dummy nodes are never equal because dummy
        // labels contain $.
        let source_node = match (real_node, dummy_node) {
            (Some(r), Some(d)) => {
                debug_assert!(r != d);
                Some(if r < d { r } else { d })
            }
            (r, d) => r.or(d),
        };

        match (source_node, target_node) {
            (None, None) => break,
            (source, Some(target)) if source.is_none() || target < source.unwrap() => {
                // A node with no outgoing edge: give it a $-labeled edge
                if let Some(prev) = prev_target {
                    if target < prev {
                        return Err(Error::SortInvariant { stage: "merge (edge stream)" });
                    }
                }
                prev_target = Some(target);
                while let Some(rec) = targets.peek() {
                    if NodeKey::of_target(&rec.kmer, k) != target {
                        break;
                    }
                    targets.advance()?;
                }
                group.clear();
                group.push(GroupEdge {
                    tag: EdgeTag::OutDummy,
                    kmer: target.kmer,
                    this_k: target.len,
                    symbol: 0,
                    colors: 0,
                });
                emitter.emit_group(target, &group);
            }
            (Some(source), target) => {
                if let Some(prev) = prev_source {
                    if source < prev {
                        return Err(Error::SortInvariant { stage: "merge (node stream)" });
                    }
                }
                prev_source = Some(source);

                // This source node covers any equal targets
                if target == Some(source) {
                    prev_target = Some(source);
                    while let Some(rec) = targets.peek() {
                        if NodeKey::of_target(&rec.kmer, k) != source {
                            break;
                        }
                        targets.advance()?;
                    }
                }

                group.clear();
                if real_node == Some(source) {
                    // Collapse duplicates and collect the node's edges in
                    // symbol order
                    while let Some(rec) = reals.peek().copied() {
                        if NodeKey::of_edge(&rec.kmer, k) != source {
                            break;
                        }
                        reals.advance()?;
                        match group.last_mut() {
                            Some(last) if last.kmer == rec.kmer => last.colors |= rec.colors,
                            _ => group.push(GroupEdge {
                                tag: EdgeTag::Standard,
                                kmer: rec.kmer,
                                this_k: k,
                                symbol: rec.kmer.last_char() + 1,
                                colors: rec.colors,
                            }),
                        }
                    }
                } else {
                    while let Some(rec) = dummy_records.peek().copied() {
                        if NodeKey::of_dummy(&rec) != source {
                            break;
                        }
                        dummy_records.advance()?;
                        let (kmer, len) = rec;
                        group.push(GroupEdge {
                            tag: EdgeTag::InDummy,
                            kmer,
                            this_k: len as usize,
                            symbol: if len == 0 { 0 } else { kmer.last_char() + 1 },
                            colors: 0,
                        });
                    }
                }
                emitter.emit_group(source, &group);
            }
            (None, _) => unreachable!(),
        }
    }

    log::info!(
        "Merge emitted {} edges ({} outgoing dummies)",
        emitter.stats.n_edges,
        emitter.stats.n_out_dummies
    );
    Ok(emitter.stats)
}
