//! Orchestrator runs over a real on-disk data layout.
//!
//! Run with: `cargo test --test pipeline_integration`

mod common;

use std::path::Path;
use std::time::Duration;

use crossview::acquisition::AcquisitionEngine;
use crossview::coord::TileId;
use crossview::crs::{Projection, RdNew};
use crossview::filter::FilterConfig;
use crossview::manifest::read_manifest;
use crossview::pipeline::{
    DataLayout, FsArtifactStore, PipelineConfig, PipelineOrchestrator, Step, StepStatus,
    TileStepExecutor,
};
use crossview::record::{AnnotatedRecord, Record};
use crossview::store::{read_jsonl, RecordStore};
use crossview::tiles::TileIndex;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{fast_fetch_config, page, status, ScriptedClient};

// ============================================================================
// Helper Functions
// ============================================================================

const TILE: TileId = TileId::new(10, 430, 720);

// Tile square in RD New around central Amsterdam.
const MIN_X: f64 = 120_000.0;
const MIN_Y: f64 = 486_000.0;
const MAX_X: f64 = 123_000.0;
const MAX_Y: f64 = 489_000.0;

fn write_tile_index(layout: &DataLayout) {
    let wkt = format!(
        "POLYGON(({x0} {y0},{x1} {y0},{x1} {y1},{x0} {y1},{x0} {y0}))",
        x0 = MIN_X,
        y0 = MIN_Y,
        x1 = MAX_X,
        y1 = MAX_Y
    );
    let index = json!({
        "crs": "EPSG:28992",
        "tiles": [ { "tile_id": TILE.slash(), "polygon": wkt } ]
    });
    write(&layout.tile_index, &index.to_string());
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn square_wkt(cx: f64, cy: f64, half: f64) -> String {
    format!(
        "POLYGON(({x0} {y0},{x1} {y0},{x1} {y1},{x0} {y1},{x0} {y0}))",
        x0 = cx - half,
        y0 = cy - half,
        x1 = cx + half,
        y1 = cy + half
    )
}

fn api_item(id: &str, lon: f64, lat: f64) -> serde_json::Value {
    json!({
        "id": id,
        "captured_at": 1_600_000_000_000i64,
        "computed_geometry": { "type": "Point", "coordinates": [lon, lat] },
    })
}

/// Seeds `meta.jsonl` with three records and a footprint at the first one.
///
/// - `near` sits inside the footprint (clean)
/// - `far` is inside the tile but ~200 m from any footprint
/// - `outside` lies west of the tile
fn seed_acquired_tile(layout: &DataLayout) {
    let rd = RdNew;
    let near = (4.8926, 52.3731);
    let (nx, ny) = rd.forward(near.0, near.1);
    assert!(nx > MIN_X && nx < MAX_X && ny > MIN_Y && ny < MAX_Y);
    let (fx, fy) = (nx + 200.0, ny);
    let far = rd.inverse(fx, fy);
    let outside = rd.inverse(MIN_X - 500.0, ny);

    let mut store = RecordStore::open(layout.meta(&TILE)).unwrap();
    for (id, (lon, lat)) in [("near", near), ("far", far), ("outside", outside)] {
        let record = Record::from_api(&api_item(id, lon, lat), TILE, "test").unwrap();
        store.append(&record).unwrap();
    }

    let footprints = json!({
        "crs": "EPSG:28992",
        "layers": { "lod22_2d": [ square_wkt(nx, ny, 10.0) ] }
    });
    write(&layout.footprints(&TILE), &footprints.to_string());
    write(&layout.acquire_marker(&TILE), "{}");
}

fn orchestrator(
    layout: &DataLayout,
    config: PipelineConfig,
) -> PipelineOrchestrator<TileStepExecutor<ScriptedClient>, FsArtifactStore> {
    // No acquisition is expected; every request would 404.
    orchestrator_with_api(layout, config, ScriptedClient::empty())
}

/// Orchestrator whose acquisition splits the region into four cells.
fn orchestrator_with_api(
    layout: &DataLayout,
    config: PipelineConfig,
    api: ScriptedClient,
) -> PipelineOrchestrator<TileStepExecutor<ScriptedClient>, FsArtifactStore> {
    let index = TileIndex::load(&layout.tile_index).unwrap();
    let engine = AcquisitionEngine::new(
        api,
        ScriptedClient::empty(),
        fast_fetch_config(0).with_subdivide(2),
    );
    let executor = TileStepExecutor::new(layout.clone(), index, engine, FilterConfig::default());
    PipelineOrchestrator::new(
        executor,
        FsArtifactStore,
        layout.clone(),
        config.with_step_delay(Duration::ZERO),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_run_after_acquisition() {
    let temp = TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path());
    write_tile_index(&layout);
    seed_acquired_tile(&layout);

    let report = orchestrator(&layout, PipelineConfig::default())
        .run(&[TILE])
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.tiles[0].error);

    let tile = &report.tiles[0];
    assert_eq!(tile.status(Step::Acquire), Some(&StepStatus::Skipped));
    assert_eq!(
        tile.executed(),
        vec![Step::Resolve, Step::Derive, Step::Filter, Step::Clean, Step::Manifest]
    );

    let annotated: Vec<AnnotatedRecord> = read_jsonl(layout.meta_annotated(&TILE)).unwrap();
    assert_eq!(annotated.len(), 3);
    let clean: Vec<AnnotatedRecord> = read_jsonl(layout.meta_clean(&TILE)).unwrap();
    let clean_ids: Vec<_> = clean.iter().map(|r| r.id()).collect();
    assert_eq!(clean_ids, vec!["near"]);

    let manifest = read_manifest(&layout.manifest(&TILE)).unwrap();
    assert_eq!(manifest.tile_id, TILE);
    assert_eq!(manifest.crs, "EPSG:28992");
    assert_eq!(manifest.imagery.counts.raw, Some(3));
    assert_eq!(manifest.imagery.counts.clean, Some(1));
    assert_eq!(manifest.imagery.counts.images, None);
    assert_eq!(manifest.reference.layer.as_deref(), Some("lod22_2d"));
}

#[tokio::test]
async fn test_only_missing_manifest_is_rebuilt() {
    let temp = TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path());
    write_tile_index(&layout);
    seed_acquired_tile(&layout);

    orchestrator(&layout, PipelineConfig::default())
        .run(&[TILE])
        .await
        .unwrap();
    std::fs::remove_file(layout.manifest(&TILE)).unwrap();

    let report = orchestrator(&layout, PipelineConfig::default())
        .run(&[TILE])
        .await
        .unwrap();
    let tile = &report.tiles[0];
    assert_eq!(tile.executed(), vec![Step::Manifest]);
    for step in [Step::Resolve, Step::Acquire, Step::Derive, Step::Filter, Step::Clean] {
        assert_eq!(tile.status(step), Some(&StepStatus::Skipped));
    }
    assert!(layout.manifest(&TILE).exists());

    // Everything present: nothing runs.
    let report = orchestrator(&layout, PipelineConfig::default())
        .run(&[TILE])
        .await
        .unwrap();
    assert!(report.tiles[0].executed().is_empty());
}

#[tokio::test]
async fn test_missing_reference_fails_filter_only_for_that_tile() {
    let temp = TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path());
    write_tile_index(&layout);
    seed_acquired_tile(&layout);
    std::fs::remove_file(layout.footprints(&TILE)).unwrap();

    let report = orchestrator(&layout, PipelineConfig::default())
        .run(&[TILE])
        .await
        .unwrap();
    let tile = &report.tiles[0];
    assert!(tile.is_failed());
    assert_eq!(tile.status(Step::Derive), Some(&StepStatus::Executed));
    assert_eq!(tile.status(Step::Filter), Some(&StepStatus::Failed));
    assert_eq!(tile.status(Step::Manifest), Some(&StepStatus::NotReached));
    assert!(!layout.meta_annotated(&TILE).exists());
}

#[tokio::test]
async fn test_partial_acquisition_is_retried_on_next_run() {
    let temp = TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path());
    write_tile_index(&layout);
    let steps = || {
        PipelineConfig::default().with_steps(vec![Step::Resolve, Step::Acquire, Step::Derive])
    };
    let empty: Vec<String> = Vec::new();

    // First cell exhausts its retries; the others succeed.
    let api = ScriptedClient::new(vec![status(503), page(&["p1"]), page(&["p2"]), page(&empty)]);
    let report = orchestrator_with_api(&layout, steps(), api)
        .run(&[TILE])
        .await
        .unwrap();
    let tile = &report.tiles[0];
    assert_eq!(tile.status(Step::Acquire), Some(&StepStatus::Executed));
    assert_eq!(tile.status(Step::Derive), Some(&StepStatus::Executed));
    assert!(layout.meta(&TILE).exists());
    assert!(!layout.acquire_marker(&TILE).exists());

    // Acquisition is still pending, so the next run fetches again.
    let api = ScriptedClient::new(vec![page(&["p0"]), page(&["p1"]), page(&["p2"]), page(&empty)]);
    let report = orchestrator_with_api(&layout, steps(), api)
        .run(&[TILE])
        .await
        .unwrap();
    let tile = &report.tiles[0];
    assert_eq!(tile.status(Step::Resolve), Some(&StepStatus::Skipped));
    assert_eq!(tile.status(Step::Acquire), Some(&StepStatus::Executed));
    assert!(layout.acquire_marker(&TILE).exists());
    let rows: Vec<Record> = read_jsonl(layout.meta(&TILE)).unwrap();
    let mut ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["p0", "p1", "p2"]);

    // Complete: acquisition is skipped from now on.
    let report = orchestrator(&layout, steps()).run(&[TILE]).await.unwrap();
    assert_eq!(report.tiles[0].status(Step::Acquire), Some(&StepStatus::Skipped));
}

#[tokio::test]
async fn test_cancelled_acquisition_stays_pending() {
    let temp = TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path());
    write_tile_index(&layout);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let config = PipelineConfig::default().with_steps(vec![Step::Resolve, Step::Acquire]);
    let index = TileIndex::load(&layout.tile_index).unwrap();
    let engine = AcquisitionEngine::new(
        ScriptedClient::new(vec![page(&["p0"])]),
        ScriptedClient::empty(),
        fast_fetch_config(0),
    )
    .with_cancellation(cancel);
    let executor = TileStepExecutor::new(layout.clone(), index, engine, FilterConfig::default());
    let orch = PipelineOrchestrator::new(
        executor,
        FsArtifactStore,
        layout.clone(),
        config.with_step_delay(Duration::ZERO),
    );

    let report = orch.run(&[TILE]).await.unwrap();
    let tile = &report.tiles[0];
    assert_eq!(tile.status(Step::Resolve), Some(&StepStatus::Executed));
    assert_eq!(tile.status(Step::Acquire), Some(&StepStatus::Failed));
    assert!(!layout.acquire_marker(&TILE).exists());
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path());
    write_tile_index(&layout);

    let report = orchestrator(&layout, PipelineConfig::default().with_dry_run(true))
        .run(&[TILE])
        .await
        .unwrap();
    assert!(report.tiles[0]
        .steps
        .iter()
        .all(|(_, s)| *s == StepStatus::Planned));
    assert!(!layout.tile_descriptor(&TILE).exists());
    assert!(!layout.meta(&TILE).exists());
}
