use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use bossdbg::{DbgBuilder, DbgIndex};

#[derive(Parser)]
#[command(name = "bossdbg")]
#[command(version)]
#[command(about = "Succinct de Bruijn graphs over DNA k-mer sets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a graph from raw sorted k-mer files and write the index
    Build {
        /// Input k-mer files (little-endian binary). Each file is one color.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Length of edges (nodes are k-1)
        #[arg(short)]
        k: usize,

        /// Internal memory to use (MB)
        #[arg(short, long, default_value = "4096")]
        mem_mb: usize,

        /// Output prefix. Defaults to the basename of the first input.
        #[arg(short, long)]
        output_prefix: Option<String>,

        /// Also write the per-edge lcs bytes for variable-order support
        #[arg(short, long)]
        variable_order: bool,

        /// Record which input file(s) each edge came from
        #[arg(short, long)]
        colors: bool,

        /// Directory for temporary files
        #[arg(short, long, default_value = ".")]
        temp_dir: PathBuf,
    },

    /// Run the pipeline but stop at the packed edge file
    Pack {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Length of edges (nodes are k-1)
        #[arg(short)]
        k: usize,

        /// Internal memory to use (MB)
        #[arg(short, long, default_value = "4096")]
        mem_mb: usize,

        /// Output prefix. Defaults to the basename of the first input.
        #[arg(short, long)]
        output_prefix: Option<String>,

        /// Also write the per-edge lcs sidecar file
        #[arg(short, long)]
        variable_order: bool,

        /// Directory for temporary files
        #[arg(short, long, default_value = ".")]
        temp_dir: PathBuf,
    },

    /// Query the k-mers of a FASTA/FASTQ file against a built index
    Query {
        /// A .dbg file written by build
        index: PathBuf,

        /// Queries, one k-mer per sequence
        queries: PathBuf,
    },

    /// Reverse complement every sequence of a FASTA file
    Rc {
        input: PathBuf,
        output: PathBuf,
    },
}

fn default_prefix(inputs: &[PathBuf], output_prefix: Option<String>) -> Result<String> {
    match output_prefix {
        Some(prefix) => Ok(prefix),
        None => {
            let stem = inputs[0]
                .file_stem()
                .context("cannot derive an output prefix from the input name")?;
            Ok(stem.to_string_lossy().into_owned())
        }
    }
}

fn cmd_build(
    inputs: Vec<PathBuf>,
    k: usize,
    mem_mb: usize,
    output_prefix: Option<String>,
    variable_order: bool,
    colors: bool,
    temp_dir: PathBuf,
) -> Result<()> {
    let prefix = default_prefix(&inputs, output_prefix)?;
    let built = DbgBuilder::new()
        .k(k)
        .mem_mb(mem_mb)
        .temp_dir(&temp_dir)
        .variable_order(variable_order)
        .colors(colors)
        .build_from_files(&inputs)
        .context("building the graph failed")?;

    let dbg_path = format!("{}.dbg", prefix);
    let mut out = BufWriter::new(std::fs::File::create(&dbg_path)?);
    built.index.serialize(&mut out)?;
    out.flush()?;
    log::info!("Wrote {}", dbg_path);

    if let Some(color_matrix) = built.colors {
        let color_path = format!("{}.colors", prefix);
        let mut out = BufWriter::new(std::fs::File::create(&color_path)?);
        color_matrix.serialize(&mut out)?;
        out.flush()?;
        log::info!("Wrote {}", color_path);
    }

    if let Some(lcs) = built.lcs {
        let lcs_path = format!("{}.lcs", prefix);
        std::fs::write(&lcs_path, &lcs)?;
        log::info!("Wrote {}", lcs_path);
    }

    Ok(())
}

fn cmd_pack(
    inputs: Vec<PathBuf>,
    k: usize,
    mem_mb: usize,
    output_prefix: Option<String>,
    variable_order: bool,
    temp_dir: PathBuf,
) -> Result<()> {
    let prefix = default_prefix(&inputs, output_prefix)?;
    let packed_path = PathBuf::from(format!("{}.packed", prefix));
    DbgBuilder::new()
        .k(k)
        .mem_mb(mem_mb)
        .temp_dir(&temp_dir)
        .variable_order(variable_order)
        .pack_to_file(&inputs, &packed_path)
        .context("packing the edges failed")?;
    log::info!("Wrote {}", packed_path.display());
    Ok(())
}

fn cmd_query(index: PathBuf, queries: PathBuf) -> Result<()> {
    let mut reader = BufReader::new(
        std::fs::File::open(&index).with_context(|| format!("cannot open {}", index.display()))?,
    );
    let dbg = DbgIndex::load(&mut reader).context("loading the index failed")?;

    eprintln!("k             : {}", dbg.k());
    eprintln!("num_nodes()   : {}", dbg.num_nodes());
    eprintln!("num_edges()   : {}", dbg.num_edges());
    eprintln!("index size    : {:.2} MB", dbg.size_in_bytes() as f64 / (1024.0 * 1024.0));
    eprintln!("bits per edge : {:.2}", dbg.size_in_bytes() as f64 * 8.0 / dbg.num_edges() as f64);

    let query_file = std::fs::File::open(&queries)
        .with_context(|| format!("cannot open {}", queries.display()))?;
    let mut query_reader = jseqio::reader::DynamicFastXReader::new(BufReader::new(query_file))
        .map_err(|e| anyhow::anyhow!("cannot parse {}: {}", queries.display(), e))?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut n_queries = 0_usize;
    let mut n_found = 0_usize;
    let mut total_micros = 0_u128;
    while let Some(rec) = query_reader.read_next().map_err(|e| anyhow::anyhow!("{}", e))? {
        let seq = rec.seq;
        let t0 = Instant::now();
        let result = if seq.len() < dbg.k() { None } else { dbg.search(&seq[0..dbg.k()]) };
        let elapsed = t0.elapsed().as_micros();
        total_micros += elapsed;
        n_queries += 1;

        match result {
            Some((first, last)) => {
                n_found += 1;
                writeln!(
                    out,
                    "{}\tfound\tedges {}..{}\t{} us",
                    String::from_utf8_lossy(&seq[0..dbg.k().min(seq.len())]),
                    first,
                    last,
                    elapsed
                )?;
            }
            None => {
                writeln!(out, "{}\tabsent\t-\t{} us", String::from_utf8_lossy(seq), elapsed)?;
            }
        }
    }
    if n_queries == 0 {
        bail!("no queries in {}", queries.display());
    }
    writeln!(out, "Found {}/{} k-mers", n_found, n_queries)?;
    writeln!(out, "Total query time us/kmer without I/O: {:.2}", total_micros as f64 / n_queries as f64)?;
    out.flush()?;
    Ok(())
}

fn cmd_rc(input: PathBuf, output: PathBuf) -> Result<()> {
    let in_file =
        std::fs::File::open(&input).with_context(|| format!("cannot open {}", input.display()))?;
    let mut reader = jseqio::reader::DynamicFastXReader::new(BufReader::new(in_file))
        .map_err(|e| anyhow::anyhow!("cannot parse {}: {}", input.display(), e))?;
    let mut out = BufWriter::new(std::fs::File::create(&output)?);

    let mut seq_buf = Vec::<u8>::new();
    while let Some(rec) = reader.read_next().map_err(|e| anyhow::anyhow!("{}", e))? {
        seq_buf.clear();
        seq_buf.extend_from_slice(rec.seq);
        jseqio::reverse_complement_in_place(&mut seq_buf);
        out.write_all(b">")?;
        out.write_all(rec.head)?;
        out.write_all(b"\n")?;
        out.write_all(&seq_buf)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build { inputs, k, mem_mb, output_prefix, variable_order, colors, temp_dir } => {
            cmd_build(inputs, k, mem_mb, output_prefix, variable_order, colors, temp_dir)
        }
        Commands::Pack { inputs, k, mem_mb, output_prefix, variable_order, temp_dir } => {
            cmd_pack(inputs, k, mem_mb, output_prefix, variable_order, temp_dir)
        }
        Commands::Query { index, queries } => cmd_query(index, queries),
        Commands::Rc { input, output } => cmd_rc(input, output),
    }
}
