//! Discovery and expansion of incoming dummy edges.
//!
//! A k-mer needs an incoming dummy edge when its source node (the k-1
//! prefix) is not the target (the k-1 suffix) of any edge. Both sorted
//! streams of the canonical edge set are walked in parallel with two
//! cursors: the node-sorted stream yields the prefixes in colex order and
//! the edge-sorted stream yields the suffixes in colex order, so one linear
//! pass decides every prefix. Each hit is expanded into its k-1 shifted
//! prefixes, which keeps backward traversal near `$` well defined, and the
//! expanded records are sorted under the same memory budget and
//! deduplicated.

use std::io::{Read, Seek, Write};

use crate::ingest::EdgeRec;
use crate::kmer::{cmp_dummies, DummyRecord, LongKmer};
use crate::sorter::{ExternalSorter, RecordCursor, SortRecord};
use crate::tempfile::{TempFile, TempFileManager};
use crate::Error;

impl<const B: usize> SortRecord for DummyRecord<B> {
    fn record_bytes() -> usize {
        LongKmer::<B>::byte_size() + 1
    }

    fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.0.serialize(out)?;
        out.write_all(&[self.1])
    }

    fn read_from<R: Read>(input: &mut R) -> std::io::Result<Option<Self>> {
        let kmer = match LongKmer::<B>::load(input)? {
            Some(kmer) => kmer,
            None => return Ok(None),
        };
        let mut buf = [0_u8; 1];
        input.read_exact(&mut buf)?;
        Ok(Some((kmer, buf[0])))
    }
}

/// Finds the k-mers requiring incoming dummies, expands the shifts, and
/// materializes the sorted, deduplicated dummy records. The returned file
/// always contains at least the empty record standing for the all-`$` edge.
pub fn find_sorted_dummies<const B: usize>(
    node_sorted: &std::path::Path,
    edge_sorted: &std::path::Path,
    k: usize,
    mem_bytes: usize,
    temp_file_manager: &mut TempFileManager,
) -> Result<(TempFile, usize), Error> {
    let mut prefixes = RecordCursor::<EdgeRec<B>>::open(node_sorted)?;
    let mut suffixes = RecordCursor::<EdgeRec<B>>::open(edge_sorted)?;

    let mut sorter = ExternalSorter::<DummyRecord<B>, _>::new(
        |a, b| cmp_dummies(a, b),
        mem_bytes,
        temp_file_manager.directory(),
    )?;

    // The all-$ edge is always present: it is the source the search starts
    // from and the fixed point of backward traversal.
    sorter.push((LongKmer::<B>::from_u64_data([0; B]), 0))?;

    let mut n_required = 0_usize;
    let mut prev_prefix: Option<LongKmer<B>> = None;
    let mut prev_suffix: Option<LongKmer<B>> = None;

    while let Some(rec) = prefixes.peek().copied() {
        let prefix = rec.kmer.left_shift(1);

        if let Some(prev) = prev_prefix {
            if prefix < prev {
                return Err(Error::SortInvariant { stage: "dummy detection (node stream)" });
            }
            if prefix == prev {
                // Same source node as the previous edge: already decided
                prefixes.advance()?;
                continue;
            }
        }
        prev_prefix = Some(prefix);

        // Advance the suffix cursor until it reaches or passes the prefix
        let mut covered = false;
        while let Some(brec) = suffixes.peek() {
            let suffix = brec.kmer.first_chars(k - 1);
            if let Some(prev) = prev_suffix {
                if suffix < prev {
                    return Err(Error::SortInvariant { stage: "dummy detection (edge stream)" });
                }
            }
            prev_suffix = Some(suffix);

            match suffix.cmp(&prefix) {
                std::cmp::Ordering::Less => {
                    suffixes.advance()?;
                }
                std::cmp::Ordering::Equal => {
                    covered = true;
                    break;
                }
                std::cmp::Ordering::Greater => break,
            }
        }

        if !covered {
            n_required += 1;
            // All k-1 shifted prefixes of the edge k-mer, longest first
            let mut p = rec.kmer;
            for t in (1..k).rev() {
                p = p.left_shift(1);
                sorter.push((p, t as u8))?;
            }
        }

        prefixes.advance()?;
    }

    log::info!("{} k-mers require incoming dummy edges", n_required);

    // Sort and deduplicate: shift sets of k-mers sharing a proper prefix overlap.
    let sorted = sorter.finish()?;
    let mut cursor = RecordCursor::<DummyRecord<B>>::open(&sorted.path)?;
    let mut out = temp_file_manager.create_new_file("dummies-", 10, ".bin")?;
    let mut n_dummies = 0_usize;
    {
        let mut writer = std::io::BufWriter::new(&mut out.file);
        let mut prev: Option<DummyRecord<B>> = None;
        while let Some(rec) = cursor.advance()? {
            if prev != Some(rec) {
                rec.write_to(&mut writer)?;
                n_dummies += 1;
            }
            prev = Some(rec);
        }
        writer.flush()?;
    }
    out.file.seek(std::io::SeekFrom::Start(0))?;

    log::info!("{} dummy edges after shift expansion", n_dummies);
    Ok((out, n_dummies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::{cmp_by_edge, cmp_by_node};
    use std::path::Path;

    fn sorted_edge_files(kmers: &[&[u8]], k: usize) -> (TempFile, TempFile) {
        let temp = Path::new("/tmp");
        let mut node_sorter =
            ExternalSorter::<EdgeRec<1>, _>::new(|a: &EdgeRec<1>, b: &EdgeRec<1>| cmp_by_node(&a.kmer, &b.kmer), 1 << 20, temp)
                .unwrap();
        let mut edge_sorter =
            ExternalSorter::<EdgeRec<1>, _>::new(|a: &EdgeRec<1>, b: &EdgeRec<1>| cmp_by_edge(&a.kmer, &b.kmer), 1 << 20, temp)
                .unwrap();
        for ascii in kmers {
            assert_eq!(ascii.len(), k);
            let rec = EdgeRec { kmer: LongKmer::<1>::from_ascii(ascii).unwrap(), colors: 0 };
            node_sorter.push(rec).unwrap();
            edge_sorter.push(rec).unwrap();
        }
        (node_sorter.finish().unwrap(), edge_sorter.finish().unwrap())
    }

    fn dummy_labels(file: &TempFile, k: usize) -> Vec<String> {
        let mut cursor = RecordCursor::<DummyRecord<1>>::open(&file.path).unwrap();
        let mut out = Vec::new();
        while let Some((kmer, len)) = cursor.advance().unwrap() {
            let mut label = String::new();
            for _ in 0..(k - len as usize) {
                label.push('$');
            }
            label.push_str(std::str::from_utf8(&kmer.unpack(len as usize)).unwrap());
            out.push(label);
        }
        out
    }

    #[test]
    fn simple_path_needs_dummies_for_the_start() {
        // Edges AAT, ATC: node AA is nobody's target, node AT is AAT's target.
        let k = 3;
        let (a, b) = sorted_edge_files(&[b"AAT", b"ATC"], k);
        let mut mgr = TempFileManager::new(Path::new("/tmp")).unwrap();
        let (dummies, n) = find_sorted_dummies::<1>(&a.path, &b.path, k, 1 << 20, &mut mgr).unwrap();
        // AAT expands to $AA and $$A, plus the always-present $$$
        assert_eq!(n, 3);
        assert_eq!(dummy_labels(&dummies, k), vec!["$$$", "$$A", "$AA"]);
    }

    #[test]
    fn cycle_needs_no_dummies() {
        // ACG, CGA, GAC form a cycle: every prefix is a suffix.
        let (a, b) = sorted_edge_files(&[b"ACG", b"CGA", b"GAC"], 3);
        let mut mgr = TempFileManager::new(Path::new("/tmp")).unwrap();
        let (dummies, n) = find_sorted_dummies::<1>(&a.path, &b.path, 3, 1 << 20, &mut mgr).unwrap();
        assert_eq!(n, 1); // only the ghost record
        assert_eq!(dummy_labels(&dummies, 3), vec!["$$$"]);
    }

    #[test]
    fn overlapping_shift_sets_are_deduplicated() {
        // ACGA and ACGC share the prefixes ACG, AC, A.
        let k = 4;
        let (a, b) = sorted_edge_files(&[b"ACGA", b"ACGC"], k);
        let mut mgr = TempFileManager::new(Path::new("/tmp")).unwrap();
        let (dummies, n) = find_sorted_dummies::<1>(&a.path, &b.path, k, 1 << 20, &mut mgr).unwrap();
        assert_eq!(n, 4); // $$$$, $$$A, $$AC, $ACG
        assert_eq!(dummy_labels(&dummies, k), vec!["$$$$", "$$$A", "$$AC", "$ACG"]);
    }
}
