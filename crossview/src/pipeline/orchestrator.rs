//! Multi-tile step orchestration.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{ArtifactStore, DataLayout, PipelineError, Step, StepExecutor};
use crate::acquisition::sleep_or_cancel;
use crate::coord::TileId;

/// Default delay after each executed step.
pub const DEFAULT_STEP_DELAY_MS: u64 = 500;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Selected steps, canonical order.
    pub steps: Vec<Step>,
    /// Rerun steps whose output already exists.
    pub force: bool,
    /// Log what would run without running it.
    pub dry_run: bool,
    /// Politeness delay after each executed step.
    pub step_delay: Duration,
    /// Tiles processed concurrently.
    pub parallel_tiles: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            steps: Step::ALL.to_vec(),
            force: false,
            dry_run: false,
            step_delay: Duration::from_millis(DEFAULT_STEP_DELAY_MS),
            parallel_tiles: 1,
        }
    }
}

impl PipelineConfig {
    pub fn with_steps(mut self, mut steps: Vec<Step>) -> Self {
        steps.sort();
        steps.dedup();
        self.steps = steps;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_parallel_tiles(mut self, n: usize) -> Self {
        self.parallel_tiles = n.max(1);
        self
    }
}

/// Outcome of one step for one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Output existed; nothing ran.
    Skipped,
    Executed,
    /// Would run (dry run).
    Planned,
    Failed,
    /// An earlier step failed or the run was cancelled.
    NotReached,
}

/// Per-tile outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct TileReport {
    pub tile: TileId,
    pub steps: Vec<(Step, StepStatus)>,
    /// First failure, if any.
    pub error: Option<String>,
}

impl TileReport {
    pub fn new(tile: TileId) -> Self {
        Self {
            tile,
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Status recorded for `step`, if it was selected.
    pub fn status(&self, step: Step) -> Option<&StepStatus> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, st)| st)
    }

    /// Steps that actually ran.
    pub fn executed(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|(_, st)| *st == StepStatus::Executed)
            .map(|(s, _)| *s)
            .collect()
    }
}

/// Outcome of a whole run, tiles in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub tiles: Vec<TileReport>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn failed_tiles(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_failed()).count()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed_tiles() == 0
    }
}

/// Drives the selected steps over a list of tiles.
pub struct PipelineOrchestrator<E: StepExecutor, S: ArtifactStore> {
    executor: E,
    artifacts: S,
    layout: DataLayout,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<E: StepExecutor, S: ArtifactStore> PipelineOrchestrator<E, S> {
    pub fn new(executor: E, artifacts: S, layout: DataLayout, config: PipelineConfig) -> Self {
        Self {
            executor,
            artifacts,
            layout,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs every tile. Only an empty tile list is an error; tile failures
    /// are recorded in the report.
    pub async fn run(&self, tiles: &[TileId]) -> Result<RunReport, PipelineError> {
        if tiles.is_empty() {
            return Err(PipelineError::NoTiles);
        }

        info!(
            tiles = tiles.len(),
            steps = ?self.config.steps.iter().map(Step::name).collect::<Vec<_>>(),
            force = self.config.force,
            dry_run = self.config.dry_run,
            parallel = self.config.parallel_tiles,
            "Starting pipeline"
        );

        let mut reports: Vec<(usize, TileReport)> = stream::iter(tiles.iter().enumerate())
            .map(|(i, tile)| async move { (i, self.run_tile(tile).await) })
            .buffer_unordered(self.config.parallel_tiles.max(1))
            .collect()
            .await;
        reports.sort_by_key(|(i, _)| *i);

        let report = RunReport {
            tiles: reports.into_iter().map(|(_, r)| r).collect(),
            cancelled: self.cancel.is_cancelled(),
        };
        info!(
            tiles = report.tiles.len(),
            failed = report.failed_tiles(),
            cancelled = report.cancelled,
            "Pipeline finished"
        );
        Ok(report)
    }

    async fn run_tile(&self, tile: &TileId) -> TileReport {
        let mut report = TileReport::new(*tile);
        let mut steps = self.config.steps.iter().copied();

        for step in steps.by_ref() {
            if self.cancel.is_cancelled() {
                report.steps.push((step, StepStatus::NotReached));
                break;
            }

            let output = step.output(&self.layout, tile);
            if !self.config.force && self.artifacts.exists(&output) {
                info!(tile = %tile, step = %step, "Skipping, output already present");
                report.steps.push((step, StepStatus::Skipped));
                continue;
            }

            if self.config.dry_run {
                info!(tile = %tile, step = %step, output = %output.display(), "Would run");
                report.steps.push((step, StepStatus::Planned));
                continue;
            }

            if let Some(input) = step.input(&self.layout, tile) {
                if !self.artifacts.exists(&input) {
                    let e = PipelineError::MissingInput { step, path: input };
                    error!(tile = %tile, step = %step, error = %e, "Step cannot run");
                    report.steps.push((step, StepStatus::Failed));
                    report.error = Some(e.to_string());
                    break;
                }
            }

            info!(tile = %tile, step = %step, "Running step");
            match self.executor.execute(step, tile).await {
                Ok(()) => report.steps.push((step, StepStatus::Executed)),
                Err(e) => {
                    error!(tile = %tile, step = %step, error = %e, "Step failed, skipping rest of tile");
                    report.steps.push((step, StepStatus::Failed));
                    report.error = Some(e.to_string());
                    break;
                }
            }

            if !sleep_or_cancel(&self.cancel, self.config.step_delay).await {
                warn!(tile = %tile, "Cancelled");
            }
        }

        report
            .steps
            .extend(steps.map(|s| (s, StepStatus::NotReached)));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MemoryArtifactStore, StepFuture};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records calls and writes outputs into a shared memory store.
    struct RecordingExecutor {
        calls: Mutex<Vec<(Step, TileId)>>,
        fail: Option<(Step, TileId)>,
    }

    impl RecordingExecutor {
        fn new(fail: Option<(Step, TileId)>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
            }
        }

        fn calls(&self) -> Vec<(Step, TileId)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl StepExecutor for RecordingExecutor {
        fn execute<'a>(&'a self, step: Step, tile: &'a TileId) -> StepFuture<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push((step, *tile));
                if self.fail == Some((step, *tile)) {
                    return Err(PipelineError::Cancelled);
                }
                Ok(())
            })
        }
    }

    /// Artifact store that reports every output of an executed step, plus
    /// the records file an acquisition leaves behind.
    struct Outputs<'a> {
        base: MemoryArtifactStore,
        executor: &'a RecordingExecutor,
        layout: DataLayout,
    }

    impl ArtifactStore for Outputs<'_> {
        fn exists(&self, path: &std::path::Path) -> bool {
            self.base.exists(path)
                || self
                    .executor
                    .calls()
                    .iter()
                    .any(|(s, t)| {
                        s.output(&self.layout, t) == path
                            || (*s == Step::Acquire && self.layout.meta(t) == path)
                    })
        }
    }

    fn tile() -> TileId {
        TileId::new(10, 430, 720)
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_step_delay(Duration::ZERO)
    }

    fn layout() -> DataLayout {
        DataLayout::new("/d")
    }

    #[tokio::test]
    async fn test_empty_tile_list() {
        let orch = PipelineOrchestrator::new(
            RecordingExecutor::new(None),
            MemoryArtifactStore::default(),
            layout(),
            config(),
        );
        assert!(matches!(orch.run(&[]).await, Err(PipelineError::NoTiles)));
    }

    #[tokio::test]
    async fn test_existing_outputs_are_skipped() {
        let l = layout();
        let t = tile();
        let present: Vec<PathBuf> = [Step::Resolve, Step::Acquire, Step::Derive, Step::Filter, Step::Clean]
            .iter()
            .map(|s| s.output(&l, &t))
            .collect();
        let orch = PipelineOrchestrator::new(
            RecordingExecutor::new(None),
            MemoryArtifactStore::new(present),
            l,
            config(),
        );

        let report = orch.run(&[t]).await.unwrap();
        assert_eq!(orch.executor().calls(), vec![(Step::Manifest, t)]);
        assert_eq!(report.tiles[0].executed(), vec![Step::Manifest]);
        assert_eq!(report.tiles[0].status(Step::Acquire), Some(&StepStatus::Skipped));
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_records_without_completion_rerun_acquire() {
        let l = layout();
        let t = tile();
        let orch = PipelineOrchestrator::new(
            RecordingExecutor::new(None),
            MemoryArtifactStore::new([Step::Resolve.output(&l, &t), l.meta(&t)]),
            l,
            config().with_steps(vec![Step::Acquire, Step::Derive]),
        );

        let report = orch.run(&[t]).await.unwrap();
        assert_eq!(
            orch.executor().calls(),
            vec![(Step::Acquire, t), (Step::Derive, t)]
        );
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_force_reruns_everything() {
        let l = layout();
        let t = tile();
        let present: Vec<PathBuf> = Step::ALL.iter().map(|s| s.output(&l, &t)).collect();
        let orch = PipelineOrchestrator::new(
            RecordingExecutor::new(None),
            MemoryArtifactStore::new(present),
            l,
            config().with_force(true).with_steps(vec![Step::Manifest, Step::Resolve]),
        );

        orch.run(&[t]).await.unwrap();
        assert_eq!(
            orch.executor().calls(),
            vec![(Step::Resolve, t), (Step::Manifest, t)]
        );
    }

    #[tokio::test]
    async fn test_failure_isolated_to_tile() {
        let bad = TileId::new(10, 1, 1);
        let good = TileId::new(10, 2, 2);
        let executor = RecordingExecutor::new(Some((Step::Derive, bad)));
        let l = layout();
        let store = Outputs {
            base: MemoryArtifactStore::default(),
            executor: &executor,
            layout: l.clone(),
        };
        let orch = PipelineOrchestrator::new(&executor, store, l, config());

        let report = orch.run(&[bad, good]).await.unwrap();
        assert_eq!(report.failed_tiles(), 1);

        let bad_report = &report.tiles[0];
        assert_eq!(bad_report.tile, bad);
        assert_eq!(bad_report.status(Step::Derive), Some(&StepStatus::Failed));
        assert_eq!(bad_report.status(Step::Filter), Some(&StepStatus::NotReached));
        assert_eq!(bad_report.status(Step::Manifest), Some(&StepStatus::NotReached));

        let good_report = &report.tiles[1];
        assert_eq!(good_report.executed(), Step::ALL.to_vec());
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_missing_input_fails_tile() {
        let orch = PipelineOrchestrator::new(
            RecordingExecutor::new(None),
            MemoryArtifactStore::default(),
            layout(),
            config().with_steps(vec![Step::Derive, Step::Manifest]),
        );

        let report = orch.run(&[tile()]).await.unwrap();
        let t = &report.tiles[0];
        assert_eq!(t.status(Step::Derive), Some(&StepStatus::Failed));
        assert_eq!(t.status(Step::Manifest), Some(&StepStatus::NotReached));
        assert!(t.error.as_deref().unwrap().contains("meta.jsonl"));
        assert!(orch.executor().calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let l = layout();
        let t = tile();
        let orch = PipelineOrchestrator::new(
            RecordingExecutor::new(None),
            MemoryArtifactStore::new([Step::Resolve.output(&l, &t)]),
            l,
            config().with_dry_run(true),
        );

        let report = orch.run(&[t]).await.unwrap();
        assert!(orch.executor().calls().is_empty());
        assert_eq!(report.tiles[0].status(Step::Resolve), Some(&StepStatus::Skipped));
        assert_eq!(report.tiles[0].status(Step::Acquire), Some(&StepStatus::Planned));
    }

    #[tokio::test]
    async fn test_cancelled_run_reaches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orch = PipelineOrchestrator::new(
            RecordingExecutor::new(None),
            MemoryArtifactStore::default(),
            layout(),
            config(),
        )
        .with_cancellation(cancel);

        let report = orch.run(&[tile()]).await.unwrap();
        assert!(report.cancelled);
        assert!(report.tiles[0]
            .steps
            .iter()
            .all(|(_, s)| *s == StepStatus::NotReached));
    }

    #[tokio::test]
    async fn test_parallel_tiles_keep_input_order() {
        let tiles: Vec<TileId> = (0..6).map(|x| TileId::new(10, x, 0)).collect();
        let orch = PipelineOrchestrator::new(
            RecordingExecutor::new(None),
            MemoryArtifactStore::default(),
            layout(),
            config()
                .with_steps(vec![Step::Resolve])
                .with_parallel_tiles(3),
        );

        let report = orch.run(&tiles).await.unwrap();
        let order: Vec<TileId> = report.tiles.iter().map(|t| t.tile).collect();
        assert_eq!(order, tiles);
        assert_eq!(orch.executor().calls().len(), 6);
    }
}
