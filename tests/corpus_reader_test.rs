//! End-to-end tests for the corpus reader over generated on-disk fixtures

use std::fmt::Write as _;
use std::io::Write as _;

use tempfile::NamedTempFile;
use textfeed::{
    CorpusReader, ReaderOptions, SequenceData, StreamDescriptor, TextFeedError, TraceLevel,
};

fn write_corpus(data: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("Failed to create fixture");
    tmp.write_all(data.as_bytes()).expect("Failed to write fixture");
    tmp.flush().expect("Failed to flush fixture");
    tmp
}

fn options() -> ReaderOptions {
    ReaderOptions {
        trace_level: TraceLevel::Error,
        max_allowed_errors: 0,
        chunk_size_bytes: u64::MAX,
        chunk_cache_size: 4,
        skip_sequence_ids: false,
        num_retries: 0,
    }
}

#[test]
fn large_corpus_crosses_window_refills() {
    // well past the 64 KiB window, so decoding spans many refills
    const ROWS: usize = 8_000;

    let mut data = String::with_capacity(ROWS * 24);
    for i in 0..ROWS {
        writeln!(data, "|x {} {}.5", i, i).unwrap();
    }
    let tmp = write_corpus(&data);

    let streams = vec![StreamDescriptor::dense("features", "x", 2)];
    let mut reader_options = options();
    reader_options.chunk_size_bytes = 16 * 1024;

    let mut reader: CorpusReader<f64> =
        CorpusReader::open(tmp.path(), streams, reader_options).expect("Failed to open corpus");

    let descriptions = reader.chunk_descriptions();
    assert!(
        descriptions.len() > 4,
        "expected several chunks, got {}",
        descriptions.len()
    );
    let total_sequences: usize = descriptions.iter().map(|c| c.number_of_sequences).sum();
    assert_eq!(total_sequences, ROWS);

    let mut next_row = 0usize;
    for description in descriptions {
        let chunk = reader.get_chunk(description.id).expect("Failed to load chunk");
        for sequence_id in chunk.sequence_ids().collect::<Vec<_>>() {
            let data = chunk.get_sequence(sequence_id).expect("Missing sequence");
            let dense = data[0].as_dense().expect("dense stream");
            assert_eq!(dense.values().len(), dense.number_of_samples() * 2);
            assert_eq!(dense.values()[0], next_row as f64);
            assert_eq!(dense.values()[1], next_row as f64 + 0.5);
            next_row += 1;
        }
    }
    assert_eq!(next_row, ROWS);
}

#[test]
fn chunks_decode_in_any_order() {
    let mut data = String::new();
    for i in 0..100 {
        writeln!(data, "|x {i}").unwrap();
    }
    let tmp = write_corpus(&data);

    let streams = vec![StreamDescriptor::dense("features", "x", 1)];
    let mut reader_options = options();
    reader_options.chunk_size_bytes = 64; // a handful of sequences per chunk

    let mut reader: CorpusReader<f32> =
        CorpusReader::open(tmp.path(), streams, reader_options).expect("Failed to open corpus");

    let mut ids: Vec<u32> = reader.chunk_descriptions().iter().map(|c| c.id).collect();
    ids.reverse();

    for chunk_id in ids {
        let sequences = reader.sequences_for_chunk(chunk_id).unwrap();
        let chunk = reader.get_chunk(chunk_id).unwrap();
        assert_eq!(chunk.number_of_sequences(), sequences.len());
        for descriptor in &sequences {
            let data = chunk.get_sequence(descriptor.id).unwrap();
            let dense = data[0].as_dense().unwrap();
            assert_eq!(dense.values(), &[descriptor.id as f32]);
        }
    }
}

#[test]
fn sparse_invariants_hold_across_a_jagged_corpus() {
    const DIMENSION: usize = 50;

    // jagged: sample i has i % 5 pairs
    let mut data = String::new();
    let mut id = 0u64;
    for row in 0..200usize {
        let pairs = row % 5;
        write!(data, "{id} |y").unwrap();
        for p in 0..pairs {
            write!(data, " {}:{}.25", (row + p * 7) % DIMENSION, p).unwrap();
        }
        data.push('\n');
        if row % 3 == 2 {
            id += 1;
        }
    }
    let tmp = write_corpus(&data);

    let streams = vec![StreamDescriptor::sparse("labels", "y", DIMENSION)];
    let mut reader: CorpusReader<f32> =
        CorpusReader::open(tmp.path(), streams, options()).expect("Failed to open corpus");

    for description in reader.chunk_descriptions() {
        let chunk = reader.get_chunk(description.id).unwrap();
        for sequence_id in chunk.sequence_ids().collect::<Vec<_>>() {
            let data = chunk.get_sequence(sequence_id).unwrap();
            let sparse = data[0].as_sparse().unwrap();

            assert_eq!(sparse.values().len(), sparse.indices().len());
            assert_eq!(sparse.values().len(), sparse.total_nnz());
            assert_eq!(
                sparse.nnz_counts().iter().sum::<usize>(),
                sparse.total_nnz()
            );
            assert_eq!(sparse.nnz_counts().len(), sparse.number_of_samples());
            for &index in sparse.indices() {
                assert!((index as usize) < DIMENSION);
            }
        }
    }
}

#[test]
fn written_reals_round_trip_within_tolerance() {
    let values: Vec<f64> = (0..500)
        .map(|i| (i as f64 - 250.0) * 0.3125 + 1.0 / (i as f64 + 1.0))
        .collect();

    let mut data = String::from("|x");
    for v in &values {
        write!(data, " {v}").unwrap();
    }
    data.push('\n');
    let tmp = write_corpus(&data);

    let streams = vec![StreamDescriptor::dense("features", "x", values.len())];
    let mut reader: CorpusReader<f64> =
        CorpusReader::open(tmp.path(), streams, options()).expect("Failed to open corpus");

    let chunk = reader.get_chunk(0).unwrap();
    let data = chunk.get_sequence(0).unwrap();
    let decoded = data[0].as_dense().unwrap().values();

    assert_eq!(decoded.len(), values.len());
    for (parsed, original) in decoded.iter().zip(&values) {
        // the scanner accumulates in f64 and scales by powers of ten, so a
        // 17-digit decimal picks up a few ulps relative to the writer
        let tolerance = original.abs() * 1e-12 + 1e-24;
        assert!(
            (parsed - original).abs() <= tolerance,
            "parsed {parsed}, wrote {original}"
        );
    }
}

#[test]
fn chunk_retrieval_is_idempotent() {
    let mut data = String::new();
    for i in 0..50 {
        writeln!(data, "|x {i} {}", i * 2).unwrap();
    }
    let tmp = write_corpus(&data);

    let streams = vec![StreamDescriptor::dense("features", "x", 2)];
    let mut reader_options = options();
    reader_options.chunk_size_bytes = 100;

    let mut reader: CorpusReader<f32> =
        CorpusReader::open(tmp.path(), streams, reader_options).expect("Failed to open corpus");

    for description in reader.chunk_descriptions() {
        let first = reader.get_chunk(description.id).unwrap();
        let second = reader.get_chunk(description.id).unwrap();
        for sequence_id in first.sequence_ids().collect::<Vec<_>>() {
            let a = first.get_sequence(sequence_id).unwrap();
            let b = second.get_sequence(sequence_id).unwrap();
            match (&a[0], &b[0]) {
                (SequenceData::Dense(x), SequenceData::Dense(y)) => {
                    assert_eq!(x.values(), y.values());
                }
                _ => panic!("expected dense data on both handles"),
            }
        }
    }
}

#[test]
fn error_budget_is_shared_across_a_chunk() {
    // two over-full rows, each charging one error at decode
    let data = "|x 1\n|x 2 |x 3\n|x 4\n|x 5 |x 6\n|x 7\n";
    let streams = vec![StreamDescriptor::dense("features", "x", 1)];

    let tmp = write_corpus(data);
    let mut short_budget = options();
    short_budget.max_allowed_errors = 1;
    let mut reader: CorpusReader<f32> =
        CorpusReader::open(tmp.path(), streams.clone(), short_budget).unwrap();
    assert!(matches!(
        reader.get_chunk(0),
        Err(TextFeedError::ErrorBudgetExhausted { .. })
    ));

    let tmp = write_corpus(data);
    let mut enough_budget = options();
    enough_budget.max_allowed_errors = 2;
    let mut reader: CorpusReader<f32> =
        CorpusReader::open(tmp.path(), streams, enough_budget).unwrap();
    let chunk = reader.get_chunk(0).unwrap();
    assert_eq!(chunk.number_of_sequences(), 5);

    // the over-full rows kept both of their samples
    let sample_counts: Vec<usize> = chunk
        .sequence_ids()
        .collect::<Vec<_>>()
        .into_iter()
        .map(|id| chunk.get_sequence(id).unwrap()[0].number_of_samples())
        .collect();
    assert_eq!(sample_counts, vec![1, 2, 1, 2, 1]);
}

#[test]
fn descriptor_surface_matches_decoded_contents() {
    let data = "10 |x 1\n10 |x 2\n10 |x 3\n20 |x 4\n30 |x 5\n30 |x 6\n";
    let tmp = write_corpus(data);

    let streams = vec![StreamDescriptor::dense("features", "x", 1)];
    let mut reader: CorpusReader<f32> =
        CorpusReader::open(tmp.path(), streams, options()).expect("Failed to open corpus");

    assert!(reader.has_sequence_ids());
    assert_eq!(reader.stream_descriptions().len(), 1);

    let descriptions = reader.chunk_descriptions();
    assert_eq!(descriptions.len(), 1);
    assert_eq!(descriptions[0].number_of_sequences, 3);
    assert_eq!(descriptions[0].number_of_samples, 6);

    let sequences = reader.sequences_for_chunk(0).unwrap();
    assert_eq!(
        sequences.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![10, 20, 30]
    );
    assert_eq!(
        sequences
            .iter()
            .map(|s| s.number_of_samples)
            .collect::<Vec<_>>(),
        vec![3, 1, 2]
    );
    for descriptor in &sequences {
        assert!(descriptor.is_valid);
        assert_eq!(descriptor.key, Some(descriptor.id));
        assert_eq!(descriptor.chunk_id, 0);
    }

    let chunk = reader.get_chunk(0).unwrap();
    for descriptor in &sequences {
        let data = chunk.get_sequence(descriptor.id).unwrap();
        let dense = data[0].as_dense().unwrap();
        assert_eq!(dense.number_of_samples(), descriptor.number_of_samples);
        assert_eq!(dense.sequence_id(), descriptor.id);
    }
}

#[test]
fn a_sequence_id_mismatch_is_structural_corruption() {
    // the index is built against this file; rewriting a row's id between
    // indexing and decoding simulates in-place corruption
    let tmp = write_corpus("10 |x 1\n20 |x 2\n");
    let streams = vec![StreamDescriptor::dense("features", "x", 1)];
    let mut reader: CorpusReader<f32> =
        CorpusReader::open(tmp.path(), streams, options()).expect("Failed to open corpus");

    std::fs::write(tmp.path(), "10 |x 1\n99 |x 2\n").unwrap();

    assert!(matches!(
        reader.get_chunk(0),
        Err(TextFeedError::SequenceIdMismatch { expected: 20, .. })
    ));
}

#[test]
fn handles_outlive_the_reader() {
    let tmp = write_corpus("|x 1 2 3\n");
    let streams = vec![StreamDescriptor::dense("features", "x", 3)];

    let data = {
        let mut reader: CorpusReader<f32> =
            CorpusReader::open(tmp.path(), streams, options()).unwrap();
        let chunk = reader.get_chunk(0).unwrap();
        chunk.get_sequence(0).unwrap()
    };

    // reader and cache are gone; the shared chunk keeps the data alive
    assert_eq!(data[0].as_dense().unwrap().values(), &[1.0, 2.0, 3.0]);
}
