//! End-to-end tests: raw k-mer files through the full pipeline to queries.

use std::io::Write;

use rand_chacha::rand_core::{RngCore, SeedableRng};

use bossdbg::tempfile::{TempFile, TempFileManager};
use bossdbg::{DbgBuilder, DbgIndex};

// Packs an ascii k-mer the way the external counter does: A,C,T,G = 0..3,
// the i-th character from the end at bits 2i.
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

fn write_kmer_file(mgr: &mut TempFileManager, kmers: &[Vec<u8>]) -> TempFile {
    let mut file = mgr.create_new_file("pipeline-kmers-", 10, ".bin").unwrap();
    for kmer in kmers {
        file.write_all(&external_encode(kmer).to_le_bytes()).unwrap();
    }
    file.flush().unwrap();
    file
}

fn build(kmers: &[Vec<u8>], k: usize) -> DbgIndex {
    let mut mgr = TempFileManager::new(&std::env::temp_dir()).unwrap();
    let input = write_kmer_file(&mut mgr, kmers);
    DbgBuilder::new()
        .k(k)
        .mem_mb(16)
        .temp_dir(&std::env::temp_dir())
        .build_from_files(&[input.path.clone()])
        .unwrap()
        .index
}

fn kmers_of(seq: &[u8], k: usize) -> Vec<Vec<u8>> {
    seq.windows(k).map(|w| w.to_vec()).collect()
}

fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|c| match c {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            _ => panic!("bad test input"),
        })
        .collect()
}

fn node_of(dbg: &DbgIndex, label: &[u8]) -> usize {
    assert_eq!(label.len(), dbg.k() - 1);
    let (first, _) = dbg.search(label).unwrap();
    dbg.edge_to_node(first)
}

#[test]
fn two_kmers_and_their_dummies() {
    // ACG and CGT are each other's reverse complements, so the canonical
    // stream holds each twice and the merge collapses the copies. Node AC
    // needs the dummy chain, node GT gets an outgoing $.
    let dbg = build(&[b"ACG".to_vec(), b"CGT".to_vec()], 3);
    assert_eq!(dbg.num_edges(), 6);
    assert_eq!(dbg.num_nodes(), 5);

    assert!(dbg.search(b"ACG").is_some());
    assert!(dbg.search(b"CGT").is_some());
    assert!(dbg.search(b"ACT").is_none());

    assert_eq!(dbg.outdegree(node_of(&dbg, b"AC")), 1);
    assert_eq!(dbg.outdegree(node_of(&dbg, b"GT")), 0); // only the $ edge
}

#[test]
fn branching_node() {
    let dbg = build(&[b"AAA".to_vec(), b"AAT".to_vec(), b"ATC".to_vec()], 3);

    let aa = node_of(&dbg, b"AA");
    assert_eq!(dbg.outdegree(aa), 2);

    let via_a = dbg.outgoing(aa, 1).unwrap();
    let via_t = dbg.outgoing(aa, 4).unwrap();
    assert_ne!(via_a, via_t);
    assert_eq!(via_a, aa); // AAA loops
    assert_eq!(via_t, node_of(&dbg, b"AT"));
}

#[test]
fn cycle_has_no_outgoing_dummies() {
    let dbg = build(&[b"ACG".to_vec(), b"CGA".to_vec(), b"GAC".to_vec()], 3);

    // Only the all-$ edge carries the $ label: no node lacks a successor
    let dollar_edges: Vec<usize> =
        (0..dbg.num_edges()).filter(|&i| *dbg.edge_label(i).last().unwrap() == b'$').collect();
    assert_eq!(dollar_edges, vec![0]);

    // Walking forward three times from ACG comes back around
    let acg_edge = (0..dbg.num_edges()).find(|&i| dbg.edge_label(i) == b"ACG").unwrap();
    let e1 = dbg.forward(acg_edge).unwrap();
    let e2 = dbg.forward(e1).unwrap();
    let e3 = dbg.forward(e2).unwrap();
    assert_eq!(e3, acg_edge);
}

#[test]
fn empty_input_gives_the_dollar_graph() {
    let dbg = build(&[], 3);
    assert_eq!(dbg.num_edges(), 1);
    assert_eq!(dbg.num_nodes(), 1);
    assert_eq!(dbg.node_label(0), b"$$");
    assert!(dbg.search(b"AAA").is_none());
    assert_eq!(dbg.outdegree(0), 0);
    assert_eq!(dbg.indegree(0), 0);
}

#[test]
fn random_read_full_lookup() {
    let k = 5;
    let mut rng = rand_chacha::ChaCha20Rng::from_seed([99; 32]);
    let read: Vec<u8> = (0..100)
        .map(|_| match rng.next_u32() % 4 {
            0 => b'A',
            1 => b'C',
            2 => b'G',
            _ => b'T',
        })
        .collect();

    let kmers = kmers_of(&read, k);
    let dbg = build(&kmers, k);

    // Every k-mer of the read and of its reverse complement is found
    for kmer in kmers.iter() {
        assert!(dbg.search(kmer).is_some(), "{} missing", String::from_utf8_lossy(kmer));
        assert!(dbg.search(&revcomp(kmer)).is_some());
    }

    // A k-mer over a different alphabet letter is rejected outright
    assert!(dbg.search(b"ACGTN").is_none());
}

// Every edge's target node label is the k-1 suffix of the edge label, and
// following the edge backward from its target lands in a node that reaches
// the same target.
#[test]
fn forward_backward_inverse() {
    let k = 4;
    let mut rng = rand_chacha::ChaCha20Rng::from_seed([7; 32]);
    let read: Vec<u8> = (0..200)
        .map(|_| match rng.next_u32() % 4 {
            0 => b'A',
            1 => b'C',
            2 => b'G',
            _ => b'T',
        })
        .collect();
    let dbg = build(&kmers_of(&read, k), k);

    for i in 0..dbg.num_edges() {
        let label = dbg.edge_label(i);
        match dbg.forward(i) {
            Some(target_edge) => {
                let target = dbg.edge_to_node(target_edge);
                assert_eq!(dbg.node_label(target), label[1..k].to_vec());

                let back = dbg.backward(target_edge);
                assert_eq!(
                    dbg.forward(back).map(|e| dbg.edge_to_node(e)),
                    Some(target),
                    "backward of edge {} is not an inverse",
                    i
                );
            }
            None => assert_eq!(label[k - 1], b'$'),
        }
    }
}

// Each non-$ edge contributes exactly one incoming edge to its target, and
// incoming() finds every predecessor by its first symbol.
#[test]
fn predecessor_closure() {
    let k = 4;
    let mut rng = rand_chacha::ChaCha20Rng::from_seed([21; 32]);
    let read: Vec<u8> = (0..150)
        .map(|_| match rng.next_u32() % 4 {
            0 => b'A',
            1 => b'C',
            2 => b'G',
            _ => b'T',
        })
        .collect();
    let dbg = build(&kmers_of(&read, k), k);

    let n_real_edges =
        (0..dbg.num_edges()).filter(|&i| *dbg.edge_label(i).last().unwrap() != b'$').count();
    let indegree_sum: usize = (0..dbg.num_nodes()).map(|v| dbg.indegree(v)).sum();
    assert_eq!(indegree_sum, n_real_edges);

    for i in 0..dbg.num_edges() {
        let label = dbg.edge_label(i);
        if label[k - 1] == b'$' || label[0] == b'$' {
            continue;
        }
        let source = dbg.edge_to_node(i);
        let target = dbg.edge_to_node(dbg.forward(i).unwrap());
        let first_symbol = match label[0] {
            b'A' => 1,
            b'C' => 2,
            b'G' => 3,
            b'T' => 4,
            _ => unreachable!(),
        };
        assert_eq!(dbg.incoming(target, first_symbol), Some(source));
        assert!(dbg.predecessors(target).contains(&source));
    }
}

#[test]
fn reverse_complement_stability() {
    let k = 4;
    let read = b"ACGGTTACAGGATTTACCAGT".to_vec();
    let forward_kmers = kmers_of(&read, k);
    let rc_kmers = kmers_of(&revcomp(&read), k);

    let dbg1 = build(&forward_kmers, k);
    let dbg2 = build(&rc_kmers, k);

    // Both strands are always indexed, so the graphs are identical
    assert_eq!(dbg1, dbg2);
    for kmer in forward_kmers.iter().chain(rc_kmers.iter()) {
        assert!(dbg1.search(kmer).is_some());
        assert!(dbg2.search(kmer).is_some());
    }
}

#[test]
fn persistence_roundtrip() {
    let k = 6;
    let mut rng = rand_chacha::ChaCha20Rng::from_seed([55; 32]);
    let read: Vec<u8> = (0..300)
        .map(|_| match rng.next_u32() % 4 {
            0 => b'A',
            1 => b'C',
            2 => b'G',
            _ => b'T',
        })
        .collect();
    let dbg = build(&kmers_of(&read, k), k);

    let mut buf = Vec::<u8>::new();
    dbg.serialize(&mut buf).unwrap();
    let loaded = DbgIndex::load(&mut buf.as_slice()).unwrap();
    assert_eq!(dbg, loaded);

    // The loaded index answers queries like the original
    for kmer in kmers_of(&read, k).iter().take(20) {
        assert_eq!(dbg.search(kmer), loaded.search(kmer));
    }
}

#[test]
fn wide_kmers_use_two_words() {
    // k = 33 exercises the two-word k-mer path end to end
    let k = 33;
    let mut rng = rand_chacha::ChaCha20Rng::from_seed([3; 32]);
    let read: Vec<u8> = (0..120)
        .map(|_| match rng.next_u32() % 4 {
            0 => b'A',
            1 => b'C',
            2 => b'G',
            _ => b'T',
        })
        .collect();

    let kmers = kmers_of(&read, k);
    let mut mgr = TempFileManager::new(&std::env::temp_dir()).unwrap();
    let mut file = mgr.create_new_file("pipeline-wide-", 10, ".bin").unwrap();
    for kmer in kmers.iter() {
        // Two little-endian words per record
        let mut words = [0_u64; 2];
        for (i, c) in kmer.iter().rev().enumerate() {
            let v: u64 = match c {
                b'A' => 0,
                b'C' => 1,
                b'T' => 2,
                b'G' => 3,
                _ => unreachable!(),
            };
            words[i / 32] |= v << (2 * (i % 32));
        }
        file.write_all(&words[0].to_le_bytes()).unwrap();
        file.write_all(&words[1].to_le_bytes()).unwrap();
    }
    file.flush().unwrap();

    let dbg = DbgBuilder::new()
        .k(k)
        .mem_mb(16)
        .temp_dir(&std::env::temp_dir())
        .build_from_files(&[file.path.clone()])
        .unwrap()
        .index;

    for kmer in kmers.iter() {
        assert!(dbg.search(kmer).is_some());
        assert!(dbg.search(&revcomp(kmer)).is_some());
    }
    assert!(dbg.search(&vec![b'A'; k]).is_none());
}

#[test]
fn double_reverse_complement_is_identity() {
    let mut seq = b"ACGGTTACAGGATTTACCAGT".to_vec();
    let original = seq.clone();
    jseqio::reverse_complement_in_place(&mut seq);
    assert_ne!(seq, original);
    jseqio::reverse_complement_in_place(&mut seq);
    assert_eq!(seq, original);
}
