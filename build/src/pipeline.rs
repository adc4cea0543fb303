//! Weighted multi-stage progress pipeline.
//!
//! A pipeline is an ordered list of named async stages, each with a relative
//! weight. Running it threads a context value through the stages and reports
//! fractional progress over a channel: the stage's starting fraction before
//! each body, intra-stage fractions scaled into the stage's share of the
//! whole, and a single completion event after the last stage.

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// Progress events emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Overall fraction in `[0, 1)` and the label of the stage now running.
    Stage { fraction: f64, label: String },
    /// The pipeline completed; reported exactly once, and only on success.
    Finished,
}

/// Reporter handed to a stage body for intra-stage progress.
///
/// A stage-local fraction in `[0, 1]` is scaled into the stage's share of
/// the overall pipeline and offset by the work already completed, so a
/// stage halfway through its own work reports the correct overall fraction.
pub struct ProgressHandle {
    tx: mpsc::Sender<ProgressUpdate>,
    label: String,
    base: f64,
    span: f64,
}

impl ProgressHandle {
    /// Report stage-local progress; values outside `[0, 1]` are clamped.
    pub async fn report(&self, fraction: f64) {
        let update = ProgressUpdate::Stage {
            fraction: self.base + self.span * fraction.clamp(0.0, 1.0),
            label: self.label.clone(),
        };
        // A departed listener is not the stage's problem.
        let _ = self.tx.send(update).await;
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A stage body: consumes the context, returns it on success.
pub type StageFuture<C> = BoxFuture<'static, Result<C>>;

type StageBody<C> = Box<dyn FnOnce(C, ProgressHandle) -> StageFuture<C> + Send>;

struct Stage<C> {
    label: String,
    weight: f64,
    body: StageBody<C>,
}

/// Ordered stages consumed by [`WeightedPipeline::run`].
pub struct WeightedPipeline<C> {
    stages: Vec<Stage<C>>,
}

impl<C: Send + 'static> Default for WeightedPipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + 'static> WeightedPipeline<C> {
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage with the default weight of 1.
    #[must_use]
    pub fn stage<F>(self, label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(C, ProgressHandle) -> StageFuture<C> + Send + 'static,
    {
        self.weighted_stage(label, 1.0, body)
    }

    /// Append a stage whose share of overall progress is `weight` relative
    /// to the other stages' weights. Negative weights are treated as zero;
    /// a zero-weight stage still runs, it just claims no progress span.
    #[must_use]
    pub fn weighted_stage<F>(mut self, label: impl Into<String>, weight: f64, body: F) -> Self
    where
        F: FnOnce(C, ProgressHandle) -> StageFuture<C> + Send + 'static,
    {
        self.stages.push(Stage {
            label: label.into(),
            weight: weight.max(0.0),
            body: Box::new(body),
        });
        self
    }

    /// Run every stage in order, threading `ctx` through.
    ///
    /// Before each stage body runs, the stage's starting fraction is sent;
    /// after the final stage, [`ProgressUpdate::Finished`]. A failing stage
    /// propagates its error immediately: later stages never run and no
    /// completion event is sent. An empty pipeline completes immediately.
    pub async fn run(self, mut ctx: C, progress: &mpsc::Sender<ProgressUpdate>) -> Result<C> {
        // Every body runs regardless of weight; if all weights are zero the
        // stages split the progress span evenly instead.
        let weighted: f64 = self.stages.iter().map(|s| s.weight).sum();
        let uniform = weighted <= 0.0;
        let total = if uniform {
            self.stages.len() as f64
        } else {
            weighted
        };
        let mut completed = 0.0;
        for stage in self.stages {
            let weight = if uniform { 1.0 } else { stage.weight };
            let base = completed / total;
            tracing::info!(stage = %stage.label, fraction = base, "stage starting");
            let _ = progress
                .send(ProgressUpdate::Stage {
                    fraction: base,
                    label: stage.label.clone(),
                })
                .await;
            let handle = ProgressHandle {
                tx: progress.clone(),
                label: stage.label.clone(),
                base,
                span: weight / total,
            };
            ctx = (stage.body)(ctx, handle)
                .await
                .with_context(|| format!("stage '{}' failed", stage.label))?;
            completed += weight;
        }
        let _ = progress.send(ProgressUpdate::Finished).await;
        Ok(ctx)
    }
}
