//! A builder pattern interface for constructing a [`DbgIndex`].

use std::path::{Path, PathBuf};

use crate::color::{ColorAssembler, ColorMatrix};
use crate::dummies::find_sorted_dummies;
use crate::graph::{DbgAssembler, DbgIndex};
use crate::ingest::{ingest_kmer_files, EdgeRec};
use crate::kmer::{cmp_by_edge, cmp_by_node};
use crate::merge::merge_edges;
use crate::pack::PackedEdgeWriter;
use crate::sorter::ExternalSorter;
use crate::tempfile::TempFileManager;
use crate::Error;

/// Everything a build produces: the index, and the optional color bitmap
/// and per-edge lcs bytes when those were requested.
pub struct BuildOutput {
    pub index: DbgIndex,
    pub colors: Option<ColorMatrix>,
    pub lcs: Option<Vec<u8>>,
}

/// Configures and runs the build pipeline.
///
/// The memory budget bounds the sorter buffers: each of the two edge
/// sorters gets half of it, and the dummy sorter runs under the full
/// budget after the edge sorters have been materialized.
#[derive(Clone, Debug)]
pub struct DbgBuilder {
    k: usize,
    mem_bytes: usize,
    temp_dir: PathBuf,
    variable_order: bool,
    track_colors: bool,
}

impl Default for DbgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DbgBuilder {
    /// Sets up the builder with default values:
    /// - k = 31
    /// - 4 GB of sorting memory
    /// - the current directory for temporary files
    /// - no lcs bytes, no colors
    pub fn new() -> Self {
        Self {
            k: 31,
            mem_bytes: 4 * (1_usize << 30),
            temp_dir: PathBuf::from("."),
            variable_order: false,
            track_colors: false,
        }
    }

    /// Sets the edge length k (nodes have length k-1). Supported range is
    /// 2..=64; up to 32 the pipeline runs on one-word k-mers.
    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Sets the sorting memory budget in megabytes.
    pub fn mem_mb(mut self, mem_mb: usize) -> Self {
        self.mem_bytes = mem_mb * (1_usize << 20);
        self
    }

    /// Sets the directory for temporary files. The `BOSSDBG_SCRATCH`
    /// environment variable overrides this.
    pub fn temp_dir(mut self, temp_dir: &Path) -> Self {
        self.temp_dir = temp_dir.to_path_buf();
        self
    }

    /// Whether to keep the per-edge lcs byte for variable-order use.
    pub fn variable_order(mut self, enable: bool) -> Self {
        self.variable_order = enable;
        self
    }

    /// Whether to record one color per input file.
    pub fn colors(mut self, enable: bool) -> Self {
        self.track_colors = enable;
        self
    }

    /// Runs the full pipeline and assembles the index in memory.
    pub fn build_from_files(&self, inputs: &[PathBuf]) -> Result<BuildOutput, Error> {
        match self.check_k()? {
            1 => self.run::<1>(inputs),
            2 => self.run::<2>(inputs),
            _ => unreachable!(),
        }
    }

    /// Runs the pipeline but writes the packed edge file (and the optional
    /// lcs sidecar) instead of assembling the index. Partial outputs are
    /// removed on failure.
    pub fn pack_to_file(&self, inputs: &[PathBuf], packed_path: &Path) -> Result<u64, Error> {
        let result = match self.check_k()? {
            1 => self.run_pack::<1>(inputs, packed_path),
            2 => self.run_pack::<2>(inputs, packed_path),
            _ => unreachable!(),
        };
        if result.is_err() {
            let _ = std::fs::remove_file(packed_path);
            let _ = std::fs::remove_file(lcs_path(packed_path));
        }
        result
    }

    // Number of u64 words per k-mer.
    fn check_k(&self) -> Result<usize, Error> {
        match self.k {
            0 | 1 => Err(Error::InputFormat {
                path: PathBuf::new(),
                reason: format!("k = {} does not give a graph (nodes are k-1 characters)", self.k),
            }),
            2..=32 => Ok(1),
            33..=64 => Ok(2),
            _ => Err(Error::ResourceExceeded(format!(
                "k = {} exceeds the supported maximum of 64",
                self.k
            ))),
        }
    }

    fn run<const B: usize>(&self, inputs: &[PathBuf]) -> Result<BuildOutput, Error> {
        let mut assembler = DbgAssembler::new(self.k);
        let mut colors = if self.track_colors && !inputs.is_empty() {
            Some(ColorAssembler::new(inputs.len()))
        } else {
            None
        };
        let mut lcs = if self.variable_order { Some(Vec::<u8>::new()) } else { None };

        self.run_merge::<B, _>(inputs, |record| {
            assembler.push(record);
            if let Some(colors) = colors.as_mut() {
                colors.push(record.colors);
            }
            if let Some(lcs) = lcs.as_mut() {
                lcs.push(record.lcs);
            }
        })?;

        log::info!("Building the succinct graph tables");
        let index = assembler.finish();
        log::info!(
            "Built a graph with {} edges and {} nodes ({:.2} bits per edge)",
            index.num_edges(),
            index.num_nodes(),
            index.size_in_bytes() as f64 * 8.0 / index.num_edges() as f64
        );
        Ok(BuildOutput { index, colors: colors.map(ColorAssembler::finish), lcs })
    }

    fn run_pack<const B: usize>(&self, inputs: &[PathBuf], packed_path: &Path) -> Result<u64, Error> {
        let out = std::io::BufWriter::new(std::fs::File::create(packed_path)?);
        let mut writer = PackedEdgeWriter::new(out, self.k);
        let mut lcs_out = if self.variable_order {
            Some(std::io::BufWriter::new(std::fs::File::create(lcs_path(packed_path))?))
        } else {
            None
        };

        let mut io_error = None;
        self.run_merge::<B, _>(inputs, |record| {
            if io_error.is_some() {
                return;
            }
            if let Err(e) = writer.push(record) {
                io_error = Some(e);
                return;
            }
            if let Some(lcs_out) = lcs_out.as_mut() {
                if let Err(e) = std::io::Write::write_all(lcs_out, &[record.lcs]) {
                    io_error = Some(e);
                }
            }
        })?;
        if let Some(e) = io_error {
            return Err(e.into());
        }

        let n_edges = writer.finish()?;
        if let Some(mut lcs_out) = lcs_out {
            std::io::Write::flush(&mut lcs_out)?;
        }
        log::info!("Packed {} edges to {}", n_edges, packed_path.display());
        Ok(n_edges)
    }

    // The shared part of the pipeline: ingest, dual sort, dummy discovery,
    // and the merge, driving the given record visitor.
    fn run_merge<const B: usize, V: FnMut(&crate::merge::EdgeRecord<B>)>(
        &self,
        inputs: &[PathBuf],
        visitor: V,
    ) -> Result<crate::merge::MergeStats, Error> {
        let mut temp_file_manager = TempFileManager::new(&self.temp_dir)?;
        let scratch = temp_file_manager.directory().to_path_buf();

        log::info!("Reading and recoding the input");
        let mut node_sorter = ExternalSorter::<EdgeRec<B>, _>::new(
            |a: &EdgeRec<B>, b: &EdgeRec<B>| cmp_by_node(&a.kmer, &b.kmer),
            self.mem_bytes / 2,
            &scratch,
        )?;
        let mut edge_sorter = ExternalSorter::<EdgeRec<B>, _>::new(
            |a: &EdgeRec<B>, b: &EdgeRec<B>| cmp_by_edge(&a.kmer, &b.kmer),
            self.mem_bytes / 2,
            &scratch,
        )?;
        ingest_kmer_files::<B, _, _>(inputs, self.k, self.track_colors, &mut node_sorter, &mut edge_sorter)?;

        log::info!("Sorting the canonical edge stream twice");
        let node_sorted = node_sorter.finish()?;
        let edge_sorted = edge_sorter.finish()?;

        log::info!("Searching for nodes requiring incoming dummy edges");
        let (dummies, _) = find_sorted_dummies::<B>(
            &node_sorted.path,
            &edge_sorted.path,
            self.k,
            self.mem_bytes,
            &mut temp_file_manager,
        )?;

        log::info!("Merging dummies and real edges");
        merge_edges::<B, V>(&node_sorted.path, &edge_sorted.path, &dummies.path, self.k, visitor)
    }
}

fn lcs_path(packed_path: &Path) -> PathBuf {
    let mut name = packed_path.as_os_str().to_owned();
    name.push(".lcs");
    PathBuf::from(name)
}
