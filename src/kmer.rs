//! Fixed-width packed k-mers and the comparison orders of the build pipeline.
//!
//! A [`LongKmer`] stores its characters in *reversed* order, 2 bits per
//! nucleotide, so that plain integer comparison of the packed words is
//! colexicographic comparison of the original k-mers. Position 0 of the
//! stored k-mer is therefore the last character of the edge, which is also
//! the edge's symbol in the graph.

use read_exact::ReadExactExt;

#[derive(Debug)]
pub enum KmerEncodingError {
    InvalidNucleotide(char), // contains the offending char
    TooLong(usize),          // contains the length of the k-mer which was too long
}

// B is the number of u64 words in a k-mer, so a LongKmer<B> can hold
// up to 32*B characters. Unused positions are zero, which compares like 'A':
// comparisons of k-mers of different lengths must bring their own length
// tiebreak (see the dummy record ordering below).
#[derive(Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Debug)]
pub struct LongKmer<const B: usize> {
    data: [u64; B],
}

impl<const B: usize> LongKmer<B> {
    /// Packs an ascii k-mer. The *last* character of the input lands at
    /// stored position 0, so derived integer order is colex order on the input.
    pub fn from_ascii(ascii: &[u8]) -> Result<Self, KmerEncodingError> {
        if ascii.len() > B * 32 {
            return Err(KmerEncodingError::TooLong(ascii.len()));
        }
        let mut data = [0_u64; B];
        for (i, c) in ascii.iter().rev().enumerate() {
            let bitpair: u64 = match *c {
                b'A' | b'a' => 0,
                b'C' | b'c' => 1,
                b'G' | b'g' => 2,
                b'T' | b't' => 3,
                _ => return Err(KmerEncodingError::InvalidNucleotide(*c as char)),
            };
            let block = i / 32;
            let off = 31 - i % 32;
            data[block] |= bitpair << (2 * off);
        }

        Ok(Self { data })
    }

    /// Decodes a k-mer from the raw little-endian words of an external
    /// k-mer-counter file. The external convention packs the i-th character
    /// from the *end* at bits `2i` with A,C,T,G = 0,1,2,3; we swap the
    /// encodings of G and T and land the characters in reversed order, which
    /// is exactly the stored layout.
    pub fn from_raw_le(words: [u64; B], k: usize) -> Self {
        debug_assert!(k <= B * 32);
        let mut kmer = Self { data: [0_u64; B] };
        for j in 0..k {
            let raw = (words[j / 32] >> (2 * (j % 32))) & 3;
            let c = if raw < 2 { raw } else { raw ^ 1 }; // T<->G swap
            kmer = kmer.set_from_left(j, c as u8);
        }
        kmer
    }

    pub fn set_from_left(&self, i: usize, c: u8) -> Self {
        let block = i / 32;
        let off = 31 - i % 32;
        let mask = 3_u64 << (2 * off);

        let mut data_copy = self.data;
        data_copy[block] = (data_copy[block] & !mask) | ((c as u64) << (2 * off));

        Self { data: data_copy }
    }

    pub fn get_from_left(&self, i: usize) -> u8 {
        let block = i / 32;
        let off = 31 - i % 32;
        ((self.data[block] >> (2 * off)) & 3) as u8
    }

    /// The stored character at position 0: the last character of the k-mer,
    /// i.e. the symbol of the edge (0..3, without the sentinel offset).
    pub fn last_char(&self) -> u8 {
        self.get_from_left(0)
    }

    /// Drops `chars` characters from the front. On the stored representation
    /// this removes the last characters of the k-mer, so shifting a packed
    /// edge left by one yields its source-node prefix.
    pub fn left_shift(&self, chars: usize) -> Self {
        let chars = chars as isize;
        let mut new_data = [0_u64; B];
        for block in 0..(B as isize) {
            let b1 = block - (chars + 31) / 32; // Which block the first char lands on
            let o1 = ((32 - (chars % 32)) * 2) % 64; // Which bit within block the first char lands on
            let b2 = block - chars / 32; // Which block the last char lands on
            if b1 >= 0 {
                new_data[b1 as usize] |= self.data[block as usize] >> o1;
            }
            if b2 >= 0 {
                let shift = 64 - o1;

                // shift by 64 is panic
                if shift < 64 {
                    new_data[b2 as usize] |= self.data[block as usize] << shift;
                }
            }
        }
        Self { data: new_data }
    }

    /// Keeps the first `n` stored characters and zeroes the rest. Truncating
    /// a packed edge to k-1 characters yields its target-node suffix.
    pub fn first_chars(&self, n: usize) -> Self {
        let mut new_data = self.data;
        for block in 0..B {
            let lo = block * 32;
            if n <= lo {
                new_data[block] = 0;
            } else if n < lo + 32 {
                let keep = n - lo;
                new_data[block] &= !(u64::MAX >> (2 * keep));
            }
        }
        Self { data: new_data }
    }

    /// The reverse complement of the first `k` characters.
    pub fn reverse_complement(&self, k: usize) -> Self {
        let mut rc = Self { data: [0_u64; B] };
        for j in 0..k {
            rc = rc.set_from_left(j, self.get_from_left(k - 1 - j) ^ 3);
        }
        rc
    }

    /// Unpacks the first `k` characters into ascii in natural (not stored) order.
    pub fn unpack(&self, k: usize) -> Vec<u8> {
        (0..k)
            .map(|i| crate::util::ALPHABET[1 + self.get_from_left(k - 1 - i) as usize])
            .collect()
    }

    pub fn from_u64_data(data: [u64; B]) -> Self {
        Self { data }
    }

    pub fn byte_size() -> usize {
        8 * B
    }

    pub fn serialize<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut written = 0;
        for block in self.data.iter() {
            let bytes = block.to_le_bytes();
            out.write_all(&bytes)?;
            written += bytes.len();
        }
        Ok(written)
    }

    // Returns Ok(None) if the stream gives an EOF at a record boundary
    pub fn load<R: std::io::Read>(input: &mut R) -> std::io::Result<Option<Self>> {
        let mut data = [0_u64; B];
        let mut buf = [0_u8; 8];
        for (i, block) in data.iter_mut().enumerate() {
            match input.read_exact_or_eof(&mut buf) {
                Ok(true) => *block = u64::from_le_bytes(buf),
                Ok(false) if i == 0 => return Ok(None), // EOF
                Ok(false) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "k-mer record truncated",
                    ))
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Some(Self::from_u64_data(data)))
    }

    /// Length of the longest common stored prefix, which is the longest
    /// common colexicographic suffix of the underlying labels.
    pub fn lcp(a: &Self, b: &Self) -> usize {
        for i in 0..B {
            let xor = a.data[i] ^ b.data[i];
            if xor != 0 {
                return 32 * i + xor.leading_zeros() as usize / 2;
            }
        }
        B * 32 // 32 characters per block
    }
}

/// Orders edges by their source node (colex on the first k-1 characters),
/// breaking ties by the full edge. Since the stored position 0 is the edge
/// symbol, the tiebreak orders a node's edges by their outgoing symbol,
/// which is the emission order of the merge.
pub fn cmp_by_node<const B: usize>(a: &LongKmer<B>, b: &LongKmer<B>) -> std::cmp::Ordering {
    a.left_shift(1).cmp(&b.left_shift(1)).then_with(|| a.cmp(b))
}

/// Orders edges colexicographically on the full k-mer, which groups edges
/// by their target-node suffix.
pub fn cmp_by_edge<const B: usize>(a: &LongKmer<B>, b: &LongKmer<B>) -> std::cmp::Ordering {
    a.cmp(b)
}

/// A dummy record: a proper prefix of an edge k-mer together with its
/// length. The record with length t stands for the `$`-padded edge
/// `$^(k-t) p[0..t]`, whose source node is `$^(k-t) p[0..t-1]` and whose
/// symbol is the last character of the prefix.
pub type DummyRecord<const B: usize> = (LongKmer<B>, u8);

/// Orders dummy records the way their edges are emitted: by source node in
/// colex order, then by symbol. The node comparison is packed words first
/// and on equal words the shorter prefix first, because the remaining
/// positions of the shorter one are `$` which sorts before every
/// nucleotide. On equal nodes the packed prefixes differ only in their
/// first stored character, the symbol.
pub fn cmp_dummies<const B: usize>(a: &DummyRecord<B>, b: &DummyRecord<B>) -> std::cmp::Ordering {
    a.0.left_shift(1)
        .cmp(&b.0.left_shift(1))
        .then_with(|| a.1.cmp(&b.1))
        .then_with(|| a.0.cmp(&b.0))
}
