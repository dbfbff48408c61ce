// THEORY:
// `InspectionPool` runs many inspections against one shared `InspectionPipeline`
// without letting CPU-heavy work stall the async runtime.
//
// - Each inspection runs on `spawn_blocking`; the pipeline itself stays synchronous.
// - A semaphore bounds in-flight inspections, by default to the number of CPUs.
// - Batches are gathered with `join_all`, so results come back in request order
//   regardless of completion order.
//
// Inputs carry their encoded bytes behind `Arc<[u8]>`, so a reference image shared
// by a whole batch is never copied or mutated.

use crate::error::{InspectionError, InspectionOutcome};
use crate::pipeline::{ImageInput, InspectionPipeline, InspectionReport};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// One (test, reference) pair queued for inspection.
#[derive(Debug, Clone)]
pub struct InspectionRequest {
    pub test: ImageInput,
    pub reference: ImageInput,
}

impl InspectionRequest {
    pub fn new(test: ImageInput, reference: ImageInput) -> Self {
        Self { test, reference }
    }
}

pub struct InspectionPool {
    pipeline: Arc<InspectionPipeline>,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl InspectionPool {
    pub fn new(pipeline: Arc<InspectionPipeline>) -> Self {
        Self::with_limit(pipeline, num_cpus::get())
    }

    pub fn with_limit(pipeline: Arc<InspectionPipeline>, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Maximum number of inspections running at once.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn inspect(&self, request: InspectionRequest) -> InspectionOutcome<InspectionReport> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| InspectionError::Worker(err.to_string()))?;

        let pipeline = Arc::clone(&self.pipeline);
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.inspect(&request.test, &request.reference)
        });

        handle
            .await
            .map_err(|err| InspectionError::Worker(err.to_string()))?
    }

    /// Runs every request and returns the outcomes in request order.
    pub async fn inspect_all(&self, requests: Vec<InspectionRequest>) -> Vec<InspectionOutcome<InspectionReport>> {
        debug!(requests = requests.len(), limit = self.limit, "inspection batch started");
        join_all(requests.into_iter().map(|request| self.inspect(request))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InspectionConfig;
    use crate::core_modules::artifact_store::MemoryArtifactStore;
    use crate::core_modules::image_helper::encode_png;
    use image::{Rgb, RgbImage};

    fn board(lit: bool) -> Vec<u8> {
        let mut image = RgbImage::new(64, 64);
        if lit {
            for y in 20..32 {
                for x in 20..32 {
                    image.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        encode_png(&image).unwrap()
    }

    #[tokio::test]
    async fn batch_results_keep_request_order() {
        let store = Arc::new(MemoryArtifactStore::new());
        let pipeline = Arc::new(InspectionPipeline::new(InspectionConfig::default(), store.clone()));
        let pool = InspectionPool::with_limit(pipeline, 2);
        assert_eq!(pool.limit(), 2);

        let reference = ImageInput::bytes("reference.png", board(true));
        let requests: Vec<_> = (0..6)
            .map(|i| {
                let test = ImageInput::bytes(format!("test_{i}.png"), board(i % 2 == 0));
                InspectionRequest::new(test, reference.clone())
            })
            .collect();

        let outcomes = pool.inspect_all(requests).await;
        assert_eq!(outcomes.len(), 6);
        for (i, outcome) in outcomes.into_iter().enumerate() {
            let result = outcome.unwrap().result;
            assert_eq!(result.analyzed_image_ref, format!("test_{i}.png"));
            assert_eq!(result.approved, i % 2 == 0);
        }
        assert_eq!(store.len(), 6);
    }

    #[tokio::test]
    async fn failures_stay_with_their_request() {
        let pipeline = Arc::new(InspectionPipeline::new(
            InspectionConfig::default(),
            Arc::new(MemoryArtifactStore::new()),
        ));
        let pool = InspectionPool::with_limit(pipeline, 0);
        assert_eq!(pool.limit(), 1);

        let reference = ImageInput::bytes("reference.png", board(true));
        let outcomes = pool
            .inspect_all(vec![
                InspectionRequest::new(ImageInput::bytes("broken.png", b"junk".to_vec()), reference.clone()),
                InspectionRequest::new(ImageInput::bytes("good.png", board(true)), reference),
            ])
            .await;
        assert!(matches!(outcomes[0], Err(InspectionError::Decode { .. })));
        assert!(outcomes[1].as_ref().unwrap().result.approved);
    }
}
