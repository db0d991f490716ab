//! End-to-end acquisition against a scripted HTTP client.
//!
//! Run with: `cargo test --test acquisition_integration`

mod common;

use crossview::acquisition::{AcquisitionEngine, AcquisitionTarget, AssetDirs, CellState};
use crossview::coord::TileId;
use crossview::geometry::Bounds;
use crossview::provider::ProviderError;
use crossview::record::Record;
use crossview::store::read_jsonl;
use tempfile::TempDir;

use common::{fast_fetch_config, page, status, ScriptedClient};

type Script = Vec<Result<Vec<u8>, ProviderError>>;

// ============================================================================
// Helper Functions
// ============================================================================

fn tile() -> TileId {
    TileId::new(10, 430, 720)
}

fn region() -> Bounds {
    Bounds::new(4.88, 52.36, 4.90, 52.38)
}

fn target(dir: &TempDir) -> AcquisitionTarget {
    AcquisitionTarget {
        meta_path: dir.path().join("imagery/10-430-720/meta.jsonl"),
        assets: AssetDirs {
            images: dir.path().join("imagery/10-430-720/images"),
            images_full: dir.path().join("imagery/10-430-720/images_full"),
        },
    }
}

fn ids(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("{}{}", prefix, i)).collect()
}

/// Four cells: 150 records, 80 records with 10 shared with the first
/// cell, then two empty cells.
fn overlapping_script() -> Script {
    let first = ids("a", 0..150);
    let mut second = ids("a", 140..150);
    second.extend(ids("b", 0..70));
    let empty: Vec<String> = Vec::new();
    vec![page(&first), page(&second), page(&empty), page(&empty)]
}

fn engine(script: Script, retries: u32) -> AcquisitionEngine<ScriptedClient> {
    let config = fast_fetch_config(retries)
        .with_subdivide(2)
        .with_max_records(0);
    AcquisitionEngine::new(ScriptedClient::new(script), ScriptedClient::empty(), config)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_overlapping_cells_are_deduplicated() {
    let temp = TempDir::new().unwrap();
    let target = target(&temp);

    let report = engine(overlapping_script(), 0)
        .run(tile(), region(), &target)
        .await
        .unwrap();

    assert_eq!(report.cells.len(), 4);
    assert_eq!(report.accepted, 220);
    assert_eq!(report.dedup_size, 220);
    assert_eq!(report.cells[0].accepted, 150);
    assert_eq!(report.cells[1].accepted, 70);
    assert_eq!(report.cells[1].duplicates, 10);
    assert!(report.cells.iter().all(|c| c.state == CellState::Done));
    assert!(!report.cap_reached);

    let rows: Vec<Record> = read_jsonl(&target.meta_path).unwrap();
    assert_eq!(rows.len(), 220);
    assert!(rows.iter().all(|r| r.tile_id == tile()));
}

#[tokio::test]
async fn test_rerun_adds_nothing() {
    let temp = TempDir::new().unwrap();
    let target = target(&temp);

    engine(overlapping_script(), 0)
        .run(tile(), region(), &target)
        .await
        .unwrap();
    let report = engine(overlapping_script(), 0)
        .run(tile(), region(), &target)
        .await
        .unwrap();

    assert_eq!(report.accepted, 0);
    assert_eq!(report.dedup_size, 220);
    assert_eq!(report.cells[0].duplicates, 150);
    assert_eq!(report.cells[1].duplicates, 80);

    let rows: Vec<Record> = read_jsonl(&target.meta_path).unwrap();
    assert_eq!(rows.len(), 220);
}

#[tokio::test]
async fn test_retry_exhaustion_fails_cell_and_run_continues() {
    let temp = TempDir::new().unwrap();
    let target = target(&temp);
    let empty: Vec<String> = Vec::new();
    let script = vec![
        status(503),
        status(503),
        page(&ids("c", 0..5)),
        page(&empty),
        page(&empty),
    ];

    let engine = engine(script, 1);
    let report = engine.run(tile(), region(), &target).await.unwrap();

    assert_eq!(report.failed_cells(), 1);
    assert_eq!(report.cells[0].state, CellState::Failed);
    assert_eq!(report.cells[0].attempts, 2);
    assert!(report.cells[0].error.is_some());
    assert_eq!(report.cells[1].state, CellState::Done);
    assert_eq!(report.dedup_size, 5);
}

#[tokio::test]
async fn test_record_cap_stops_acquisition() {
    let temp = TempDir::new().unwrap();
    let target = target(&temp);
    let config = fast_fetch_config(0).with_subdivide(2).with_max_records(100);
    let engine = AcquisitionEngine::new(
        ScriptedClient::new(overlapping_script()),
        ScriptedClient::empty(),
        config,
    );

    let report = engine.run(tile(), region(), &target).await.unwrap();
    assert!(report.cap_reached);
    assert_eq!(report.dedup_size, 100);
    assert!(report.cells.len() < 4);
}
