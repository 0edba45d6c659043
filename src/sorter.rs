//! A bounded-memory external sorter for fixed-size records.
//!
//! Records are pushed into an in-memory buffer sized from the memory budget.
//! When the buffer fills up it is sorted in parallel and spilled to a
//! temporary run file. Finishing the sorter merges the runs into a single
//! sorted temp file that is then read back as a sequential stream. If
//! everything fits in the buffer, no run files are created and the merge
//! degenerates to one in-memory sort.

use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use rayon::prelude::*;

use crate::tempfile::{TempFile, TempFileManager};

/// A fixed-size record that can be spilled to disk and streamed back.
pub trait SortRecord: Copy + Send {
    /// On-disk size of one record in bytes.
    fn record_bytes() -> usize;

    fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()>;

    /// Returns `Ok(None)` on a clean end of stream.
    fn read_from<R: Read>(input: &mut R) -> std::io::Result<Option<Self>>;
}

pub struct ExternalSorter<T: SortRecord, C: Fn(&T, &T) -> std::cmp::Ordering + Sync> {
    cmp: C,
    buffer: Vec<T>,
    run_capacity: usize,
    runs: Vec<TempFile>,
    temp_file_manager: TempFileManager,
    n_records: usize,
}

impl<T: SortRecord, C: Fn(&T, &T) -> std::cmp::Ordering + Sync> ExternalSorter<T, C> {
    /// `mem_bytes` bounds the size of the in-memory run buffer.
    pub fn new(cmp: C, mem_bytes: usize, temp_dir: &Path) -> std::io::Result<Self> {
        let run_capacity = std::cmp::max(1024, mem_bytes / T::record_bytes());
        Ok(Self {
            cmp,
            buffer: Vec::with_capacity(std::cmp::min(run_capacity, 1 << 20)),
            run_capacity,
            runs: Vec::new(),
            temp_file_manager: TempFileManager::new(temp_dir)?,
            n_records: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.n_records
    }

    pub fn is_empty(&self) -> bool {
        self.n_records == 0
    }

    pub fn push(&mut self, record: T) -> std::io::Result<()> {
        self.buffer.push(record);
        self.n_records += 1;
        if self.buffer.len() >= self.run_capacity {
            self.spill_run()?;
        }
        Ok(())
    }

    fn spill_run(&mut self) -> std::io::Result<()> {
        let cmp = &self.cmp;
        self.buffer.par_sort_unstable_by(|a, b| cmp(a, b));

        let mut run = self.temp_file_manager.create_new_file("sort-run-", 10, ".bin")?;
        log::debug!("Spilling a sorted run of {} records to {}", self.buffer.len(), run.path.display());
        {
            let mut writer = BufWriter::new(&mut run.file);
            for record in self.buffer.iter() {
                record.write_to(&mut writer)?;
            }
            writer.flush()?;
        }
        run.file.seek(SeekFrom::Start(0))?;
        self.runs.push(run);
        self.buffer.clear();
        Ok(())
    }

    /// Sorts everything pushed so far and materializes the result into a
    /// single temp file, rewound and ready for sequential reading.
    pub fn finish(mut self) -> std::io::Result<TempFile> {
        let cmp = &self.cmp;
        self.buffer.par_sort_unstable_by(|a, b| cmp(a, b));

        let mut out = self.temp_file_manager.create_new_file("sorted-", 10, ".bin")?;
        {
            let mut writer = BufWriter::new(&mut out.file);
            if self.runs.is_empty() {
                // Everything fit in memory
                for record in self.buffer.iter() {
                    record.write_to(&mut writer)?;
                }
            } else {
                log::debug!("Merging {} sorted runs", self.runs.len() + 1);
                let mut heads: Vec<Option<T>> = Vec::new();
                let mut readers: Vec<BufReader<&std::fs::File>> = Vec::new();
                for run in self.runs.iter() {
                    let mut reader = BufReader::new(&run.file);
                    heads.push(T::read_from(&mut reader)?);
                    readers.push(reader);
                }
                // The leftover buffer acts as one more (in-memory) run
                let mut buffer_pos = 0_usize;

                loop {
                    // Linear scan over the run heads. The run count is small
                    // enough that a tournament tree does not pay off.
                    let mut min_idx: Option<usize> = None;
                    for (i, head) in heads.iter().enumerate() {
                        if let Some(h) = head {
                            match min_idx {
                                None => min_idx = Some(i),
                                Some(m) => {
                                    if (self.cmp)(h, heads[m].as_ref().unwrap()).is_lt() {
                                        min_idx = Some(i);
                                    }
                                }
                            }
                        }
                    }
                    let buffer_head = self.buffer.get(buffer_pos);
                    match (min_idx, buffer_head) {
                        (None, None) => break,
                        (Some(i), buf) => {
                            let run_head = heads[i].as_ref().unwrap();
                            if buf.is_some() && (self.cmp)(buf.unwrap(), run_head).is_lt() {
                                buf.unwrap().write_to(&mut writer)?;
                                buffer_pos += 1;
                            } else {
                                run_head.write_to(&mut writer)?;
                                heads[i] = T::read_from(&mut readers[i])?;
                            }
                        }
                        (None, Some(record)) => {
                            record.write_to(&mut writer)?;
                            buffer_pos += 1;
                        }
                    }
                }
            }
            writer.flush()?;
        }
        out.file.seek(SeekFrom::Start(0))?;
        self.runs.clear(); // deletes the run files
        Ok(out)
    }
}

/// A peekable cursor over a file of sorted records. This is how the dummy
/// finder and the merge walk their input streams.
pub struct RecordCursor<T: SortRecord> {
    reader: BufReader<std::fs::File>,
    head: Option<T>,
    position: usize,
}

impl<T: SortRecord> RecordCursor<T> {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let mut reader = BufReader::new(std::fs::File::open(path)?);
        let head = T::read_from(&mut reader)?;
        Ok(Self { reader, head, position: 0 })
    }

    pub fn peek(&self) -> Option<&T> {
        self.head.as_ref()
    }

    /// Returns the current record and loads the next one.
    pub fn advance(&mut self) -> std::io::Result<Option<T>> {
        let current = self.head.take();
        if current.is_some() {
            self.head = T::read_from(&mut self.reader)?;
            self.position += 1;
        }
        Ok(current)
    }

    /// Number of records consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl SortRecord for u64 {
    fn record_bytes() -> usize {
        8
    }

    fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(&self.to_le_bytes())
    }

    fn read_from<R: Read>(input: &mut R) -> std::io::Result<Option<Self>> {
        use read_exact::ReadExactExt;
        let mut buf = [0_u8; 8];
        match input.read_exact_or_eof(&mut buf)? {
            true => Ok(Some(u64::from_le_bytes(buf))),
            false => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::{RngCore, SeedableRng};

    fn sort_with_budget(values: &[u64], mem_bytes: usize) -> Vec<u64> {
        let mut sorter =
            ExternalSorter::<u64, _>::new(|a, b| a.cmp(b), mem_bytes, std::path::Path::new("/tmp")).unwrap();
        for &v in values {
            sorter.push(v).unwrap();
        }
        let sorted_file = sorter.finish().unwrap();
        let mut cursor = RecordCursor::<u64>::open(&sorted_file.path).unwrap();
        let mut out = Vec::new();
        while let Some(v) = cursor.advance().unwrap() {
            out.push(v);
        }
        out
    }

    #[test]
    fn in_memory_and_external_agree() {
        let mut rng = rand_chacha::ChaCha20Rng::from_seed([7; 32]);
        let values: Vec<u64> = (0..50_000).map(|_| rng.next_u64() % 1000).collect();

        let mut expected = values.clone();
        expected.sort_unstable();

        // Large budget: single in-memory sort. Small budget: forces
        // (50000 * 8) / (1024 * 8) ≈ 48 spilled runs.
        assert_eq!(sort_with_budget(&values, 1 << 30), expected);
        assert_eq!(sort_with_budget(&values, 1024 * 8), expected);
    }

    #[test]
    fn empty_input() {
        assert!(sort_with_budget(&[], 1 << 20).is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let values = vec![5, 5, 1, 5, 1];
        assert_eq!(sort_with_budget(&values, 1 << 20), vec![1, 1, 5, 5, 5]);
    }
}
