//! Reference comparison against exported MiniLM weights.
//!
//! Set `MINILM_FIXTURES` to a directory holding `bert_weights.tbf`, `vocab.txt` and
//! `str_a.bin` (the stored embedding of `"a"`). Without it these tests are skipped.
//! The seeded demo model checks below always run.

use minilm_oxidized::model::{create_demo_model_seeded, demo_vocabulary, load_tensor_file};
use minilm_oxidized::{nearest, BatchMode, Embedding, Session, SessionConfig};
use std::path::PathBuf;

const SEED: u64 = 42;
/// Summed absolute difference allowed against the golden output, covering float drift over 6 layers.
const GOLDEN_TOLERANCE: f32 = 25.0;
const CAPITALS: [&str; 5] = ["paris", "london", "berlin", "madrid", "rome"];
const QUERY: &str = "what's the capital of germany?";

fn fixtures() -> Option<PathBuf> {
    let dir = PathBuf::from(std::env::var_os("MINILM_FIXTURES")?);
    if dir.join("bert_weights.tbf").is_file() && dir.join("vocab.txt").is_file() {
        Some(dir)
    } else {
        eprintln!("MINILM_FIXTURES set but incomplete; skipping");
        None
    }
}

fn open_reference(dir: &PathBuf) -> Session {
    Session::open(dir.join("bert_weights.tbf"), dir.join("vocab.txt")).unwrap()
}

#[test]
fn reference_capital_of_germany_is_berlin() {
    let Some(dir) = fixtures() else {
        return;
    };
    let session = open_reference(&dir);
    let query = session.embed(QUERY).unwrap();
    let candidates = session
        .embed_batch(&CAPITALS, BatchMode::Sequential)
        .unwrap();

    let by_distance = candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            query
                .l2_distance_squared(a)
                .total_cmp(&query.l2_distance_squared(b))
        })
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(CAPITALS[by_distance], "berlin");
    assert_eq!(nearest(&query, &candidates), Some(by_distance));
}

#[test]
fn reference_golden_embedding_of_a() {
    let Some(dir) = fixtures() else {
        return;
    };
    let golden_path = dir.join("str_a.bin");
    if !golden_path.is_file() {
        eprintln!("no str_a.bin in fixtures; skipping");
        return;
    }
    let golden = load_tensor_file(&golden_path).unwrap();
    let golden = Embedding::from_values(golden.into_data()).unwrap();
    let session = open_reference(&dir);
    let got = session.embed("a").unwrap();
    let diff = got.abs_diff_sum(&golden);
    assert!(
        diff < GOLDEN_TOLERANCE,
        "summed abs diff {} >= {}",
        diff,
        GOLDEN_TOLERANCE
    );
}

#[test]
fn reference_comparison_determinism() {
    let session = Session::from_model(
        create_demo_model_seeded(SEED).unwrap(),
        demo_vocabulary().unwrap(),
        SessionConfig::default(),
    )
    .unwrap();
    let a = session.embed(QUERY).unwrap();
    let b = session.embed(QUERY).unwrap();
    assert!(a.abs_diff_sum(&b) < 1e-4);
}

#[test]
fn reference_comparison_seed_reproducible() {
    let build = || {
        Session::from_model(
            create_demo_model_seeded(SEED).unwrap(),
            demo_vocabulary().unwrap(),
            SessionConfig::default(),
        )
        .unwrap()
    };
    let a = build().embed("berlin").unwrap();
    let b = build().embed("berlin").unwrap();
    assert!(a.abs_diff_sum(&b) < 1e-4);
    assert!(
        a.as_slice().iter().any(|&x| x != 0.0),
        "embedding should not be all zero"
    );
}
