//! Best-effort measurement of many reference/degraded pairs

use crate::engine::Visqol;
use crate::loader::AudioInput;
use crate::result::MeasurementResult;
use crate::{Result, VisqolError};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(VisqolError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One pair of a batch and what became of it
#[derive(Debug)]
pub struct BatchEntry {
    /// Reference identifier (path, or `"array"`)
    pub reference: String,

    /// Degraded identifier (path, or `"array"`)
    pub degraded: String,

    pub outcome: std::result::Result<MeasurementResult, VisqolError>,
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn result(&self) -> Option<&MeasurementResult> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&VisqolError> {
        self.outcome.as_ref().err()
    }
}

/// Runs pairs through one engine on a bounded worker pool
pub struct BatchRunner<'a> {
    engine: &'a Visqol,
    max_concurrency: usize,
    cancel: CancelToken,
}

impl<'a> BatchRunner<'a> {
    /// Runner bounded by the engine's `max_concurrency`
    pub fn new(engine: &'a Visqol) -> Self {
        Self {
            engine,
            max_concurrency: engine.config().max_concurrency,
            cancel: CancelToken::new(),
        }
    }

    /// Set max parallel pairs (0 = rayon default)
    pub fn with_max_concurrency(mut self, threads: usize) -> Self {
        self.max_concurrency = threads;
        self
    }

    /// Share a cancellation flag with the caller
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Measure all pairs; output order matches input order
    pub fn run(&self, pairs: &[(AudioInput, AudioInput)]) -> Vec<BatchEntry> {
        let start = Instant::now();
        let measure = |(reference, degraded): &(AudioInput, AudioInput)| {
            let outcome = self.cancel.check().and_then(|_| {
                self.engine
                    .measure_inputs(reference, degraded, Some(&self.cancel))
            });
            if let Err(e) = &outcome {
                warn!(
                    "{} vs {} failed: {}",
                    reference.identifier(),
                    degraded.identifier(),
                    e
                );
            }
            BatchEntry {
                reference: reference.identifier(),
                degraded: degraded.identifier(),
                outcome,
            }
        };

        let entries: Vec<BatchEntry> = match self.build_pool() {
            Ok(pool) => pool.install(|| pairs.par_iter().map(measure).collect()),
            Err(e) => {
                warn!("Could not build worker pool ({}), measuring sequentially", e);
                pairs.iter().map(measure).collect()
            }
        };

        let summary = BatchSummary::from_entries(&entries);
        info!(
            "Batch done in {:.2}s: {} pairs, {} failed",
            start.elapsed().as_secs_f64(),
            summary.count,
            summary.failures
        );
        entries
    }

    /// Worker pool for one run, `max_concurrency` threads wide
    fn build_pool(&self) -> std::result::Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if self.max_concurrency > 0 {
            builder = builder.num_threads(self.max_concurrency);
        }
        builder.build()
    }
}

/// Aggregate statistics over a finished batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub count: usize,
    pub failures: usize,
    pub mean_moslqo: Option<f64>,
    pub min_moslqo: Option<f64>,
    pub max_moslqo: Option<f64>,
}

impl BatchSummary {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let scores: Vec<f64> = entries
            .iter()
            .filter_map(|e| e.result().map(MeasurementResult::moslqo))
            .collect();

        let (mean, min, max) = if scores.is_empty() {
            (None, None, None)
        } else {
            (
                Some(scores.iter().sum::<f64>() / scores.len() as f64),
                Some(scores.iter().copied().fold(f64::INFINITY, f64::min)),
                Some(scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            )
        };

        Self {
            count: entries.len(),
            failures: entries.len() - scores.len(),
            mean_moslqo: mean,
            min_moslqo: min,
            max_moslqo: max,
        }
    }

    pub fn successes(&self) -> usize {
        self.count - self.failures
    }
}
