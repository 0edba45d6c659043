//! # Introduction
//!
//! This crate builds and queries a succinct de Bruijn graph in the BOSS
//! representation (Bowe-Onodera-Sadakane-Shibuya) for the DNA alphabet ACGT.
//! The input is a file of sorted k-mers produced by an external k-mer
//! counter; the output is a compressed, immutable index supporting neighbor
//! queries (indegree, outdegree, forward and backward edge traversal,
//! predecessor and successor enumeration), k-mer membership, and label
//! reconstruction, in a few bits per edge.
//!
//! # API quick start
//!
//! ```no_run
//! use bossdbg::{DbgBuilder, DbgIndex};
//! use std::io::{BufReader, BufWriter};
//! use std::fs::File;
//! use std::path::Path;
//!
//! // Build the graph from a file of raw little-endian 3-mers
//! let dbg = DbgBuilder::new()
//!     .k(3)
//!     .mem_mb(1024)
//!     .temp_dir(Path::new("./temp"))
//!     .build_from_files(&[Path::new("kmers.bin").to_path_buf()])
//!     .unwrap()
//!     .index;
//!
//! // Query a k-mer
//! if dbg.search(b"ACG").is_some() {
//!     println!("ACG is in the graph");
//! }
//!
//! // Walk the graph
//! let (first, _last) = dbg.search(b"ACG").unwrap();
//! let v = dbg.edge_to_node(first);
//! println!("outdegree of {} is {}", String::from_utf8_lossy(&dbg.node_label(v)), dbg.outdegree(v));
//!
//! // Write the index to disk for later use
//! dbg.serialize(&mut BufWriter::new(File::create("index.dbg").unwrap())).unwrap();
//! let dbg2 = DbgIndex::load(&mut BufReader::new(File::open("index.dbg").unwrap())).unwrap();
//! assert_eq!(dbg, dbg2);
//! ```
//!
//! # The build pipeline
//!
//! Construction runs in five stages, spilling intermediate results to disk
//! so that inputs larger than RAM stay within the configured memory budget:
//!
//! 1. Every input k-mer is recoded into a colex-comparable packed form and
//!    paired with its reverse complement ([`kmer`], [`ingest`]).
//! 2. The canonical stream is sorted twice with bounded memory: once by
//!    source node (colex on the k-1 prefix) and once by full edge
//!    ([`sorter`]).
//! 3. K-mers whose source node is not the target of any edge get incoming
//!    dummy edges, expanded into all of their `$`-padded shifts and sorted
//!    ([`dummies`]).
//! 4. A three-way merge of the two edge streams and the dummy stream emits
//!    every edge in BOSS order with its symbol, flag bit and node boundary
//!    bit ([`merge`]).
//! 5. The emitted records are packed into the edge-symbol wavelet matrix,
//!    the node boundary vector, and the per-symbol count tables of the
//!    final index ([`wavelet`], [`graph`]), optionally together with a
//!    per-edge color bitmap ([`color`]).
//!
//! The built [`DbgIndex`] is read-only and can be shared freely across
//! threads.

// We use single upper-case names for BWT-index tables where the literature does
#![allow(non_snake_case)]

pub mod color;
pub mod dummies;
pub mod graph;
pub mod ingest;
pub mod kmer;
pub mod merge;
pub mod pack;
pub mod sorter;
pub mod tempfile;
pub mod util;
pub mod wavelet;

mod builder;
pub use builder::*;

pub use color::ColorMatrix;
pub use graph::DbgIndex;
pub use kmer::LongKmer;
pub use util::{ALPHABET, SIGMA};

use std::path::PathBuf;

/// Errors of the build pipeline. All of them are fatal: the build either
/// completes or returns one of these after cleaning up its partial outputs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unrecognized input contents, a truncated footer, or an unsupported k.
    #[error("bad input {path}: {reason}")]
    InputFormat { path: PathBuf, reason: String },

    /// A compile-time limit (maximum k, maximum color count) was exceeded.
    #[error("{0}")]
    ResourceExceeded(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stream that is required to be sorted was observed out of order.
    /// This indicates a bug or corrupted intermediate files.
    #[error("sorted stream out of order in {stage}")]
    SortInvariant { stage: &'static str },
}
