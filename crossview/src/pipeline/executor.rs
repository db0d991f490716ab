//! Step execution against the real components.

use std::future::Future;
use std::pin::Pin;

use serde_json::json;
use tracing::{info, warn};

use super::{DataLayout, PipelineError, Step, TileDescriptor};
use crate::acquisition::AcquisitionEngine;
use crate::coord::TileId;
use crate::derive::derive_file;
use crate::filter::{
    annotate_file, link_images, load_reference, write_clean_subset, CleanOutcome, FilterConfig, FilterError,
    LinkMode, SpatialFilter,
};
use crate::manifest::{build_manifest, collect_inputs, write_manifest, ReferenceInputs};
use crate::provider::AsyncHttpClient;
use crate::store::{write_atomic, StoreError};
use crate::tiles::{RegionSource, TileIndex};

/// Boxed future returned by [`StepExecutor::execute`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>>;

/// Executes one step for one tile.
///
/// Implementations write the step's declared output on success. Inputs
/// have already been checked by the orchestrator.
pub trait StepExecutor: Send + Sync {
    fn execute<'a>(&'a self, step: Step, tile: &'a TileId) -> StepFuture<'a>;
}

impl<T: StepExecutor + ?Sized> StepExecutor for &T {
    fn execute<'a>(&'a self, step: Step, tile: &'a TileId) -> StepFuture<'a> {
        (**self).execute(step, tile)
    }
}

/// Executor wiring the tile index, acquisition engine, derive, filter and
/// manifest components.
pub struct TileStepExecutor<C: AsyncHttpClient> {
    layout: DataLayout,
    index: TileIndex,
    engine: AcquisitionEngine<C>,
    filter: FilterConfig,
    region_sources: Vec<RegionSource>,
}

impl<C: AsyncHttpClient> TileStepExecutor<C> {
    /// Creates an executor.
    ///
    /// The acquisition region is resolved from the index polygon, falling
    /// back to the envelope of the tile's reference footprints.
    pub fn new(
        layout: DataLayout,
        index: TileIndex,
        engine: AcquisitionEngine<C>,
        filter: FilterConfig,
    ) -> Self {
        let region_sources = vec![
            RegionSource::IndexPolygon,
            RegionSource::FootprintBounds {
                mesh_root: layout.mesh_root.clone(),
                layers: filter.layers.clone(),
            },
        ];
        Self {
            layout,
            index,
            engine,
            filter,
            region_sources,
        }
    }

    pub fn with_region_sources(mut self, sources: Vec<RegionSource>) -> Self {
        self.region_sources = sources;
        self
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    fn resolve(&self, tile: &TileId) -> Result<(), PipelineError> {
        let entry = self.index.lookup_by_id(tile)?;
        let margin = self.engine.config().margin_m;
        let region = self
            .index
            .resolve_region_with(tile, margin, &self.region_sources)?;
        let query_bbox = region.bounds.to_geographic(self.index.projection());

        let descriptor = TileDescriptor::new(entry, &region, margin, query_bbox);
        descriptor.save(&self.layout.tile_descriptor(tile))?;
        info!(
            tile = %tile,
            source = region.source,
            bbox = ?query_bbox,
            "Resolved tile region"
        );
        Ok(())
    }

    async fn acquire(&self, tile: &TileId) -> Result<(), PipelineError> {
        let descriptor = TileDescriptor::load(&self.layout.tile_descriptor(tile))?;
        let target = self.layout.acquisition_target(tile);
        let marker = self.layout.acquire_marker(tile);

        // A forced rerun is pending until it completes again.
        match std::fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&marker, e).into()),
        }

        let report = self
            .engine
            .run(*tile, descriptor.query_bbox, &target)
            .await?;

        if report.cancelled {
            return Err(PipelineError::Cancelled);
        }
        if report.is_complete() {
            let body = json!({
                "tile": tile,
                "records": report.dedup_size,
                "cells": report.cells.len(),
                "cap_reached": report.cap_reached,
                "completed_at": chrono::Utc::now(),
            });
            write_atomic(&marker, body.to_string().as_bytes())?;
        }
        let failed = report.failed_cells();
        if failed == report.cells.len() && !report.cells.is_empty() && report.dedup_size == 0 {
            return Err(PipelineError::AcquisitionFailed {
                tile: *tile,
                failed_cells: failed,
            });
        }
        if failed > 0 {
            warn!(
                tile = %tile,
                failed_cells = failed,
                "Some cells failed; acquisition stays pending and a rerun retries it"
            );
        }
        info!(
            tile = %tile,
            accepted = report.accepted,
            total = report.dedup_size,
            cap_reached = report.cap_reached,
            "Acquisition finished"
        );
        Ok(())
    }

    fn derive(&self, tile: &TileId) -> Result<(), PipelineError> {
        derive_file(
            &self.layout.meta(tile),
            &self.layout.meta_projected(tile),
            self.index.projection(),
        )?;
        Ok(())
    }

    fn filter(&self, tile: &TileId) -> Result<(), PipelineError> {
        let entry = self.index.lookup_by_id(tile)?;
        let reference = load_reference(&self.layout.footprints(tile), &self.filter.layers)
            .map_err(FilterError::from)?;
        let filter = SpatialFilter::new(
            entry.polygon.clone(),
            reference.polygons,
            self.filter.distance_threshold_m,
        );
        annotate_file(
            &filter,
            &self.layout.meta_projected(tile),
            &self.layout.meta_annotated(tile),
        )?;
        Ok(())
    }

    fn clean(&self, tile: &TileId) -> Result<CleanOutcome, PipelineError> {
        let (total, clean) = write_clean_subset(
            &self.layout.meta_annotated(tile),
            &self.layout.meta_clean(tile),
        )?;
        let ids = || clean.iter().map(|r| r.id());
        let mode = LinkMode::default();
        let outcome = CleanOutcome {
            total,
            clean: clean.len(),
            images_linked: link_images(
                &self.layout.images(tile),
                &self.layout.images_clean(tile),
                ids(),
                mode,
            )?,
            images_full_linked: link_images(
                &self.layout.images_full(tile),
                &self.layout.images_full_clean(tile),
                ids(),
                mode,
            )?,
        };
        info!(
            tile = %tile,
            total = outcome.total,
            clean = outcome.clean,
            images = outcome.images_linked,
            images_full = outcome.images_full_linked,
            "Clean subset ready"
        );
        Ok(outcome)
    }

    fn manifest(&self, tile: &TileId) -> Result<(), PipelineError> {
        let polygon = self.index.lookup_by_id(tile).ok().map(|t| t.polygon.clone());
        let reference = match load_reference(&self.layout.footprints(tile), &self.filter.layers) {
            Ok(r) => ReferenceInputs::from(&r),
            Err(e) => {
                warn!(tile = %tile, error = %e, "No reference geometry for manifest");
                ReferenceInputs::default()
            }
        };

        let inputs = collect_inputs(
            &self.layout,
            tile,
            self.index.crs(),
            polygon,
            reference,
            chrono::Utc::now(),
        );
        let manifest = build_manifest(inputs);
        let path = self.layout.manifest(tile);
        write_manifest(&path, &manifest)?;
        info!(
            tile = %tile,
            path = %path.display(),
            raw = manifest.imagery.counts.raw,
            clean = manifest.imagery.counts.clean,
            "Wrote manifest"
        );
        Ok(())
    }
}

impl<C: AsyncHttpClient> StepExecutor for TileStepExecutor<C> {
    fn execute<'a>(&'a self, step: Step, tile: &'a TileId) -> StepFuture<'a> {
        Box::pin(async move {
            match step {
                Step::Resolve => self.resolve(tile),
                Step::Acquire => self.acquire(tile).await,
                Step::Derive => self.derive(tile),
                Step::Filter => self.filter(tile),
                Step::Clean => self.clean(tile).map(|_| ()),
                Step::Manifest => self.manifest(tile),
            }
        })
    }
}
