//! Reading raw k-mer-counter output into the canonical edge stream.
//!
//! The input is a contiguous array of fixed-width little-endian integers,
//! one k-mer each, in the counter's encoding (A,C,T,G = 0,1,2,3). Every
//! k-mer is recoded into the internal colex-packed form and emitted twice,
//! once as-is and once reverse complemented, into both the node-order and
//! the edge-order sorter. When several input files are given, each file is
//! one color and the records carry the color as a bitmask.

use std::cmp::Ordering;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

use crate::kmer::LongKmer;
use crate::sorter::{ExternalSorter, SortRecord};
use crate::Error;

/// Compile-time limit on the number of colors: one bit each in the record mask.
pub const MAX_COLORS: usize = 64;

/// One edge of the canonical stream: a packed k-mer plus the set of input
/// files it came from.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct EdgeRec<const B: usize> {
    pub kmer: LongKmer<B>,
    pub colors: u64,
}

impl<const B: usize> SortRecord for EdgeRec<B> {
    fn record_bytes() -> usize {
        LongKmer::<B>::byte_size() + 8
    }

    fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.kmer.serialize(out)?;
        out.write_all(&self.colors.to_le_bytes())
    }

    fn read_from<R: Read>(input: &mut R) -> std::io::Result<Option<Self>> {
        let kmer = match LongKmer::<B>::load(input)? {
            Some(kmer) => kmer,
            None => return Ok(None),
        };
        let mut buf = [0_u8; 8];
        input.read_exact(&mut buf)?;
        Ok(Some(Self { kmer, colors: u64::from_le_bytes(buf) }))
    }
}

/// Streams the raw k-mer files into the two sorters. Returns the number of
/// canonical records pushed (input k-mers plus reverse complements).
pub fn ingest_kmer_files<const B: usize, C1, C2>(
    paths: &[PathBuf],
    k: usize,
    track_colors: bool,
    node_sorter: &mut ExternalSorter<EdgeRec<B>, C1>,
    edge_sorter: &mut ExternalSorter<EdgeRec<B>, C2>,
) -> Result<usize, Error>
where
    C1: Fn(&EdgeRec<B>, &EdgeRec<B>) -> Ordering + Sync,
    C2: Fn(&EdgeRec<B>, &EdgeRec<B>) -> Ordering + Sync,
{
    if track_colors && paths.len() > MAX_COLORS {
        return Err(Error::ResourceExceeded(format!(
            "{} input files given but at most {} colors are supported",
            paths.len(),
            MAX_COLORS
        )));
    }

    let record_bytes = LongKmer::<B>::byte_size();
    let mut n_pushed = 0_usize;

    for (file_idx, path) in paths.iter().enumerate() {
        let metadata = std::fs::metadata(path).map_err(|e| Error::InputFormat {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if metadata.len() as usize % record_bytes != 0 {
            return Err(Error::InputFormat {
                path: path.clone(),
                reason: format!(
                    "file size {} is not a multiple of the {}-byte k-mer record",
                    metadata.len(),
                    record_bytes
                ),
            });
        }

        let colors = if track_colors { 1_u64 << file_idx } else { 0 };
        let mut reader = BufReader::new(std::fs::File::open(path)?);

        log::info!(
            "Reading {} k-mers from {}",
            metadata.len() as usize / record_bytes,
            path.display()
        );

        while let Some(raw) = read_raw_words::<B, _>(&mut reader)? {
            let x = LongKmer::<B>::from_raw_le(raw, k);
            let y = x.reverse_complement(k);
            for kmer in [x, y] {
                let record = EdgeRec { kmer, colors };
                node_sorter.push(record)?;
                edge_sorter.push(record)?;
            }
            n_pushed += 2;
        }
    }

    log::info!("Added {} k-mers and their reverse complements", n_pushed / 2);
    Ok(n_pushed)
}

fn read_raw_words<const B: usize, R: Read>(input: &mut R) -> std::io::Result<Option<[u64; B]>> {
    use read_exact::ReadExactExt;
    let mut words = [0_u64; B];
    let mut buf = [0_u8; 8];
    for (i, word) in words.iter_mut().enumerate() {
        match input.read_exact_or_eof(&mut buf)? {
            true => *word = u64::from_le_bytes(buf),
            false if i == 0 => return Ok(None),
            false => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "raw k-mer record truncated",
                ))
            }
        }
    }
    Ok(Some(words))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::cmp_by_edge;
    use crate::sorter::RecordCursor;
    use std::io::Write;

    // Packs an ascii k-mer in the external counter encoding (A,C,T,G = 0..3,
    // i-th character from the end at bits 2i).
    fn external_encode(ascii: &[u8]) -> u64 {
        let mut word = 0_u64;
        for (i, c) in ascii.iter().rev().enumerate() {
            let v: u64 = match c {
                b'A' => 0,
                b'C' => 1,
                b'T' => 2,
                b'G' => 3,
                _ => panic!("bad test input"),
            };
            word |= v << (2 * i);
        }
        word
    }

    #[test]
    fn canonical_stream_contents() {
        let mut mgr = crate::tempfile::TempFileManager::new(std::path::Path::new("/tmp")).unwrap();
        let mut input = mgr.create_new_file("ingest-test-", 10, ".bin").unwrap();
        for kmer in [b"ACG", b"CGT"] {
            input.write_all(&external_encode(kmer).to_le_bytes()).unwrap();
        }
        input.flush().unwrap();

        let temp = std::path::Path::new("/tmp");
        let mut node_sorter =
            ExternalSorter::<EdgeRec<1>, _>::new(|a: &EdgeRec<1>, b: &EdgeRec<1>| crate::kmer::cmp_by_node(&a.kmer, &b.kmer), 1 << 20, temp).unwrap();
        let mut edge_sorter =
            ExternalSorter::<EdgeRec<1>, _>::new(|a: &EdgeRec<1>, b: &EdgeRec<1>| cmp_by_edge(&a.kmer, &b.kmer), 1 << 20, temp).unwrap();

        let n = ingest_kmer_files(&[input.path.clone()], 3, false, &mut node_sorter, &mut edge_sorter).unwrap();
        assert_eq!(n, 4);

        let sorted = edge_sorter.finish().unwrap();
        let mut cursor = RecordCursor::<EdgeRec<1>>::open(&sorted.path).unwrap();
        let mut seen = Vec::new();
        while let Some(rec) = cursor.advance().unwrap() {
            seen.push(rec.kmer.unpack(3));
        }
        // ACG and CGT are reverse complements of each other, so the canonical
        // stream has each twice. Colex order: ACG < CGT.
        assert_eq!(seen, vec![b"ACG".to_vec(), b"ACG".to_vec(), b"CGT".to_vec(), b"CGT".to_vec()]);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut mgr = crate::tempfile::TempFileManager::new(std::path::Path::new("/tmp")).unwrap();
        let mut input = mgr.create_new_file("ingest-trunc-", 10, ".bin").unwrap();
        input.write_all(&[1, 2, 3]).unwrap(); // not a multiple of 8
        input.flush().unwrap();

        let temp = std::path::Path::new("/tmp");
        let mut node_sorter =
            ExternalSorter::<EdgeRec<1>, _>::new(|a: &EdgeRec<1>, b: &EdgeRec<1>| crate::kmer::cmp_by_node(&a.kmer, &b.kmer), 1 << 20, temp).unwrap();
        let mut edge_sorter =
            ExternalSorter::<EdgeRec<1>, _>::new(|a: &EdgeRec<1>, b: &EdgeRec<1>| cmp_by_edge(&a.kmer, &b.kmer), 1 << 20, temp).unwrap();

        let err = ingest_kmer_files(&[input.path.clone()], 3, false, &mut node_sorter, &mut edge_sorter);
        assert!(matches!(err, Err(crate::Error::InputFormat { .. })));
    }
}
