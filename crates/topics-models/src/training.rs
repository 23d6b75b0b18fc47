//! Incremental training schedule shared by the samplers.
//!
//! Training runs in fixed increments so callers can observe progress and
//! stop early between increments.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use topics_types::{AttributeId, TrainingSettings};
use tracing::debug;

use crate::error::ModelError;

/// Total iterations split into increments of `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSchedule {
    iterations: usize,
    step: usize,
}

impl TrainingSchedule {
    /// Create a schedule; `step` must be positive.
    pub fn new(iterations: usize, step: usize) -> Result<Self, ModelError> {
        if step == 0 {
            return Err(ModelError::InvalidConfig(
                "training step must be > 0".to_string(),
            ));
        }
        Ok(Self { iterations, step })
    }

    /// Total iterations.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Iterations per increment.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Increment sizes in order; the last one may be shorter.
    pub fn increments(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.iterations)
            .step_by(self.step)
            .map(move |start| self.step.min(self.iterations - start))
    }
}

impl TryFrom<&TrainingSettings> for TrainingSchedule {
    type Error = ModelError;

    fn try_from(settings: &TrainingSettings) -> Result<Self, Self::Error> {
        Self::new(settings.iterations, settings.step)
    }
}

/// Progress after one training increment.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Attribute being trained
    pub attribute: AttributeId,
    /// Iterations completed so far
    pub completed: usize,
    /// Iterations in the schedule
    pub total: usize,
    /// Log-likelihood per word at this point
    pub ll_per_word: f64,
}

/// A Gibbs sampler that can be advanced a number of sweeps at a time.
pub trait GibbsSampler {
    /// Attribute whose documents are being sampled.
    fn attribute(&self) -> &AttributeId;

    /// Run `iterations` full sweeps over the corpus.
    fn sweep(&mut self, iterations: usize);

    /// Current log-likelihood per word.
    fn ll_per_word(&self) -> f64;
}

/// Advance `sampler` through `schedule`, reporting after each increment.
///
/// Returns the number of iterations actually run; `on_step` returning
/// `ControlFlow::Break` stops training after the current increment.
pub fn run_schedule<S, F>(sampler: &mut S, schedule: &TrainingSchedule, mut on_step: F) -> usize
where
    S: GibbsSampler + ?Sized,
    F: FnMut(&StepReport) -> ControlFlow<()>,
{
    let mut completed = 0;
    for increment in schedule.increments() {
        sampler.sweep(increment);
        completed += increment;

        let report = StepReport {
            attribute: sampler.attribute().clone(),
            completed,
            total: schedule.iterations(),
            ll_per_word: sampler.ll_per_word(),
        };
        debug!(
            attribute = %report.attribute,
            completed,
            total = report.total,
            ll_per_word = report.ll_per_word,
            "Training step"
        );
        if on_step(&report).is_break() {
            break;
        }
    }
    completed
}
