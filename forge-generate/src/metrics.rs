//! Step-timing metrics, matching the teacher's `Metrics`/`Profiler`
//! (`rten-generate/src/generator.rs`), which wraps the generator iterator
//! and times each `next()` call. Here `ConversationSession` plays that
//! wrapping role: every step the driver runs is timed and fed into the
//! session's `Metrics`, so it accumulates across every `generate` call made
//! on that session rather than being scoped to one turn.

use std::time::Duration;

#[derive(Debug, Default)]
pub struct Metrics {
    warmup: Option<Duration>,
    steps: Vec<Duration>,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn add_step_duration(&mut self, duration: Duration) {
        if self.warmup.is_none() {
            self.warmup = Some(duration);
        } else {
            self.steps.push(duration);
        }
    }

    pub fn warmup_duration(&self) -> Option<Duration> {
        self.warmup
    }

    pub fn step_durations(&self) -> &[Duration] {
        &self.steps
    }

    pub fn tokens_per_second(&self) -> Option<f64> {
        if self.steps.is_empty() {
            return None;
        }
        let total: Duration = self.steps.iter().sum();
        if total.is_zero() {
            return None;
        }
        Some(self.steps.len() as f64 / total.as_secs_f64())
    }
}
