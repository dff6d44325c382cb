//! Shared plumbing for headless SugarScape runs: a wealth recorder that
//! hooks into the engine's step observer and serializes samples for
//! offline aggregation.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use sugarscape_core::{StepBatch, WorldObserver};

/// Wealth of every live agent at the end of one step.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WealthSample {
    pub tick: u64,
    pub wealth: Vec<i64>,
}

/// Step observer that collects per-step wealth distributions behind a
/// shared handle, so the caller keeps access after handing the observer
/// to the world.
#[derive(Clone, Default)]
pub struct WealthRecorder {
    samples: Arc<Mutex<Vec<WealthSample>>>,
}

impl WealthRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.lock().map(|samples| samples.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out all recorded samples.
    #[must_use]
    pub fn samples(&self) -> Vec<WealthSample> {
        self.samples
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }

    /// Serialize every sample as one JSON object per line.
    pub fn write_json_lines<W: Write>(&self, writer: &mut W) -> Result<()> {
        for sample in self.samples() {
            serde_json::to_writer(&mut *writer, &sample)?;
            writeln!(writer)?;
        }
        Ok(())
    }
}

impl WorldObserver for WealthRecorder {
    fn on_step(&mut self, batch: &StepBatch) {
        let sample = WealthSample {
            tick: batch.summary.tick.0,
            wealth: batch
                .agents
                .iter()
                .map(|snapshot| snapshot.agent.wealth)
                .collect(),
        };
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(sample);
        }
    }
}
