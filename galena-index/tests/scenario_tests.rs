//! End-to-end scenarios: geometry sanity, self-retrieval, persistence
//! round-trips, evaluation budgets, batched-versus-single construction, and
//! recall behavior against exhaustive groundtruth.

use galena_core::{DensePoint, Euclidean};
use galena_index::{HnswIndex, HnswParams, IndexError, SearchControl, SearchResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

fn uniform_points(n: usize, dim: usize, seed: u64) -> Vec<DensePoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let coords = (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect();
            DensePoint::new(i as u32, coords)
        })
        .collect()
}

fn recall_against(hits: &[SearchResult], truth: &[SearchResult]) -> f64 {
    let truth_ids: HashSet<u32> = truth.iter().map(|r| r.id).collect();
    let found = hits.iter().filter(|r| truth_ids.contains(&r.id)).count();
    found as f64 / truth.len() as f64
}

/// Three labeled points in the plane; the nearest is unambiguous, the second
/// is a perfect tie.
#[test]
fn test_three_point_geometry() {
    let points = vec![
        DensePoint::new(0, vec![0.0, 0.0]),
        DensePoint::new(1, vec![10.0, 0.0]),
        DensePoint::new(2, vec![0.0, 10.0]),
    ];
    let index = HnswIndex::<Euclidean>::build(HnswParams::new(2, 1.2), &points).unwrap();

    let q = DensePoint::new(9, vec![1.0, 1.0]);
    let hits = index.search(&q, 2, 16, &SearchControl::default()).unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, 0);
    assert!((hits[0].distance - 1.4142135).abs() < 1e-3);
    assert!(hits[1].id == 1 || hits[1].id == 2);
    assert!((hits[1].distance - 82.0f32.sqrt()).abs() < 1e-3);
}

/// Every inserted point is its own nearest neighbor.
#[test]
fn test_self_retrieval() {
    let points = uniform_points(250, 32, 11);
    let index = HnswIndex::<Euclidean>::build(HnswParams::new(32, 1.2), &points).unwrap();

    for p in points.iter().step_by(10) {
        let hits = index.search(p, 1, 32, &SearchControl::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, p.id, "point {} did not find itself", p.id);
        assert!(hits[0].distance < 1e-6);
    }
}

/// Save, load, and re-query: results must be identical, id for id and bit
/// for bit.
#[test]
fn test_save_load_requery_identical() -> anyhow::Result<()> {
    let points = uniform_points(800, 16, 3);
    let params = HnswParams::new(16, 1.2).with_m_l(0.36);
    let index = HnswIndex::<Euclidean>::build(params, &points)?;

    let file = tempfile::NamedTempFile::new()?;
    index.save(file.path())?;

    let by_id: HashMap<u32, DensePoint> = points.iter().map(|p| (p.id, p.clone())).collect();
    let loaded = HnswIndex::<Euclidean>::load(file.path(), |id| by_id.get(&id).cloned())?;

    let queries = uniform_points(50, 16, 17);
    for q in &queries {
        let before = index.search(q, 10, 50, &SearchControl::default())?;
        let after = loaded.search(q, 10, 50, &SearchControl::default())?;
        assert_eq!(before, after);
    }
    Ok(())
}

/// With an evaluation budget of one, a query seeded at a vertex holding the
/// query point goes no further than that vertex.
#[test]
fn test_limit_eval_returns_entrance() {
    let points = uniform_points(300, 8, 5);
    let index = HnswIndex::<Euclidean>::build(HnswParams::new(8, 1.2), &points).unwrap();

    // Query the entrance's own point through the normal descent.
    let entrance = index.entry_points()[0];
    let q = index.point(entrance).unwrap().clone();
    let ctrl = SearchControl {
        limit_eval: Some(1),
        ..SearchControl::default()
    };
    let hits = index.search(&q, 1, 16, &ctrl).unwrap();
    assert_eq!(hits[0].id, index.external_id(entrance).unwrap());
    assert_eq!(hits[0].distance, 0.0);

    // Same with an explicit entry point, skipping the descent.
    let pinned = 42u32;
    let q = index.point(pinned).unwrap().clone();
    let ctrl = SearchControl {
        limit_eval: Some(1),
        entry_point: Some(pinned),
        ..SearchControl::default()
    };
    let hits = index.search(&q, 1, 16, &ctrl).unwrap();
    assert_eq!(hits[0].id, index.external_id(pinned).unwrap());
    assert_eq!(hits[0].distance, 0.0);
}

/// Two-stage and single-stage construction of the same corpus land within
/// two recall points of each other.
#[test]
fn test_split_and_single_construction_agree() {
    let points = uniform_points(1000, 8, 23);
    let params = HnswParams::new(8, 1.2).with_m_l(0.36);

    let mut split = HnswIndex::<Euclidean>::build(params, &points[..500]).unwrap();
    for chunk in points[500..].chunks(50) {
        split.insert(chunk).unwrap();
    }
    let single = HnswIndex::<Euclidean>::build(params, &points).unwrap();

    let queries = uniform_points(50, 8, 29);
    let mut recall_split = 0.0;
    let mut recall_single = 0.0;
    for q in &queries {
        let truth = split.search_exact(q, 10).unwrap();
        let ctrl = SearchControl::default();
        recall_split += recall_against(&split.search(q, 10, 100, &ctrl).unwrap(), &truth);
        recall_single += recall_against(&single.search(q, 10, 100, &ctrl).unwrap(), &truth);
    }
    recall_split /= queries.len() as f64;
    recall_single /= queries.len() as f64;

    assert!(
        (recall_split - recall_single).abs() <= 0.02,
        "split {recall_split} vs single {recall_single}"
    );
}

/// A flipped version byte fails the load cleanly.
#[test]
fn test_version_corruption_rejected() {
    let points = uniform_points(50, 4, 31);
    let index =
        HnswIndex::<Euclidean>::build(HnswParams::new(4, 1.2).with_m_l(0.36), &points).unwrap();

    let file = tempfile::NamedTempFile::new().unwrap();
    index.save(file.path()).unwrap();

    // The version is a little-endian u32 at bytes 4..8.
    let mut bytes = std::fs::read(file.path()).unwrap();
    bytes[4] = 2;
    std::fs::write(file.path(), &bytes).unwrap();

    let by_id: HashMap<u32, DensePoint> = points.iter().map(|p| (p.id, p.clone())).collect();
    let res = HnswIndex::<Euclidean>::load(file.path(), |id| by_id.get(&id).cloned());
    assert!(matches!(res, Err(IndexError::InvalidFormat(_))));
}

/// Corrupt magic, truncation, and a getter with missing points all fail as
/// format errors without yielding a partial index.
#[test]
fn test_other_corruptions_rejected() {
    let points = uniform_points(50, 4, 37);
    let index =
        HnswIndex::<Euclidean>::build(HnswParams::new(4, 1.2).with_m_l(0.36), &points).unwrap();

    let file = tempfile::NamedTempFile::new().unwrap();
    index.save(file.path()).unwrap();
    let bytes = std::fs::read(file.path()).unwrap();
    let by_id: HashMap<u32, DensePoint> = points.iter().map(|p| (p.id, p.clone())).collect();

    // Wrong magic.
    let mut corrupt = bytes.clone();
    corrupt[0] = b'X';
    std::fs::write(file.path(), &corrupt).unwrap();
    assert!(matches!(
        HnswIndex::<Euclidean>::load(file.path(), |id| by_id.get(&id).cloned()),
        Err(IndexError::InvalidFormat(_))
    ));

    // Truncated stream.
    std::fs::write(file.path(), &bytes[..20]).unwrap();
    assert!(matches!(
        HnswIndex::<Euclidean>::load(file.path(), |id| by_id.get(&id).cloned()),
        Err(IndexError::InvalidFormat(_))
    ));

    // Point store cannot resolve an id.
    std::fs::write(file.path(), &bytes).unwrap();
    assert!(matches!(
        HnswIndex::<Euclidean>::load(file.path(), |_| None::<DensePoint>),
        Err(IndexError::InvalidFormat(_))
    ));
}

/// On a corpus small enough that the layer-0 cap never binds, the beam
/// search with a corpus-wide beam is exhaustive.
#[test]
fn test_matches_exact_on_tiny_corpus() {
    let points = uniform_points(30, 8, 41);
    let index = HnswIndex::<Euclidean>::build(HnswParams::new(8, 1.2), &points).unwrap();

    let queries = uniform_points(10, 8, 43);
    for q in &queries {
        let approx = index.search(q, 10, 64, &SearchControl::default()).unwrap();
        let exact = index.search_exact(q, 10).unwrap();
        assert_eq!(approx, exact);
    }
}

/// Recall against exhaustive groundtruth does not degrade as the beam
/// widens.
#[test]
fn test_recall_grows_with_beam() {
    let points = uniform_points(400, 16, 47);
    let params = HnswParams::new(16, 1.2).with_m_l(0.36);
    let index = HnswIndex::<Euclidean>::build(params, &points).unwrap();

    let queries = uniform_points(30, 16, 53);
    let mut recalls = Vec::new();
    for ef in [10usize, 40, 400] {
        let mut total = 0.0;
        for q in &queries {
            let truth = index.search_exact(q, 10).unwrap();
            let hits = index.search(q, 10, ef, &SearchControl::default()).unwrap();
            total += recall_against(&hits, &truth);
        }
        recalls.push(total / queries.len() as f64);
    }

    assert!(recalls[0] <= recalls[1] + 1e-9, "recalls: {recalls:?}");
    assert!(recalls[1] <= recalls[2] + 1e-9, "recalls: {recalls:?}");
    assert!(recalls[2] > 0.95, "recalls: {recalls:?}");
}

/// The caller-owned comparison counter sees every distance computation; the
/// per-worker statistics accumulate and reset.
#[test]
fn test_comparison_counting_and_stats() {
    let points = uniform_points(200, 8, 59);
    let index = HnswIndex::<Euclidean>::build(HnswParams::new(8, 1.2), &points).unwrap();
    index.search_stats().reset();

    let counter = AtomicU64::new(0);
    let ctrl = SearchControl {
        count_cmps: Some(&counter),
        ..SearchControl::default()
    };
    let q = uniform_points(1, 8, 61).pop().unwrap();
    index.search(&q, 5, 32, &ctrl).unwrap();

    assert!(counter.load(Ordering::Relaxed) > 0);
    assert!(index.search_stats().visited.total() >= counter.load(Ordering::Relaxed));
    assert!(index.search_stats().evaluated.total() > 0);

    index.search_stats().reset();
    assert_eq!(index.search_stats().visited.total(), 0);
}

/// Tightening beta can only shorten the search, never break it.
#[test]
fn test_beta_early_termination() {
    let points = uniform_points(200, 8, 67);
    let index = HnswIndex::<Euclidean>::build(HnswParams::new(8, 1.2), &points).unwrap();
    let q = uniform_points(1, 8, 71).pop().unwrap();

    let loose = AtomicU64::new(0);
    let tight = AtomicU64::new(0);

    let ctrl = SearchControl {
        count_cmps: Some(&loose),
        ..SearchControl::default()
    };
    let full = index.search(&q, 5, 32, &ctrl).unwrap();

    let ctrl = SearchControl {
        beta: 0.5,
        count_cmps: Some(&tight),
        ..SearchControl::default()
    };
    let cut = index.search(&q, 5, 32, &ctrl).unwrap();

    assert!(!cut.is_empty());
    assert!(cut.len() <= full.len());
    assert!(tight.load(Ordering::Relaxed) <= loose.load(Ordering::Relaxed));
}
