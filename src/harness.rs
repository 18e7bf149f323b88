use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backends::DefaultLobBackend;
use crate::error::{Error, Result};
use crate::lob_store::LobStore;
use crate::log::{LobBackend, RowId};
use crate::payload::{PayloadShape, RealtimeData, Workload};

/// Fraction of the pre-compaction size a compaction must reclaim by default
pub const DEFAULT_MIN_RECLAIM_RATIO: f64 = 0.5;

/// Store size observed after a given iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub iteration: u64,
    pub file_size_bytes: u64,
}

/// Outcome of one `run` call
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub first_iteration: u64,
    pub iterations: u64,
    pub samples: Vec<Sample>,
    /// Length of the last payload written
    pub payload_len: usize,
    pub size_before: u64,
    pub size_after: u64,
}

/// Sizes around a compaction (or a close)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompactionReport {
    pub size_before: u64,
    pub size_after: u64,
    pub reclaimed: u64,
    pub payload_len: usize,
}

impl CompactionReport {
    pub fn reclaimed_ratio(&self) -> f64 {
        if self.size_before == 0 {
            return 0.0;
        }
        self.reclaimed as f64 / self.size_before as f64
    }
}

/// Drives repeated updates of the same rows and records how the store grows
pub struct GrowthHarness<B: LobBackend = DefaultLobBackend> {
    store: LobStore<B>,
    workload: Workload,
    rows: Vec<RowId>,
    samples: Vec<Sample>,
    iterations_done: u64,
    payload_len: usize,
    pause: Duration,
    min_reclaim_ratio: f64,
}

impl<B: LobBackend> GrowthHarness<B> {
    /// Creates rows `1..=row_count`, each holding the initial payload
    pub fn initialize(mut store: LobStore<B>, row_count: u64, shape: PayloadShape) -> Result<Self> {
        if row_count == 0 {
            return Err(Error::Config("row_count must be at least 1".to_string()));
        }

        let workload = Workload::new(&shape);
        let payload = workload.current_payload();
        let rows: Vec<RowId> = (1..=row_count).collect();
        for &row_id in &rows {
            store.put(row_id, &payload)?;
        }

        info!(
            rows = row_count,
            entries = shape.entries,
            payload_len = payload.len(),
            size = store.current_size_bytes(),
            "initialized growth harness"
        );

        Ok(Self {
            store,
            workload,
            rows,
            samples: Vec::new(),
            iterations_done: 0,
            payload_len: payload.len(),
            pause: Duration::ZERO,
            min_reclaim_ratio: DEFAULT_MIN_RECLAIM_RATIO,
        })
    }

    /// Sleep between iterations; zero (the default) means back to back
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_min_reclaim_ratio(mut self, ratio: f64) -> Self {
        self.min_reclaim_ratio = ratio;
        self
    }

    pub fn run(&mut self, iterations: u64, sample_every: u64) -> Result<RunReport> {
        self.run_with_progress(iterations, sample_every, |_| {})
    }

    /// Runs `iterations` updates of every row, sampling the store size on
    /// iterations divisible by `sample_every` and handing each sample to
    /// `on_sample`. Iteration numbers continue across calls.
    pub fn run_with_progress<F>(
        &mut self,
        iterations: u64,
        sample_every: u64,
        mut on_sample: F,
    ) -> Result<RunReport>
    where
        F: FnMut(&Sample),
    {
        if sample_every == 0 {
            return Err(Error::Config("sample_every must be at least 1".to_string()));
        }

        let first_iteration = self.iterations_done;
        let size_before = self.store.current_size_bytes();
        let mut samples = Vec::new();

        for _ in 0..iterations {
            let iteration = self.iterations_done;
            // The workload only moves forward once every row took the payload
            let mut next = self.workload.clone();
            let payload = next.next_payload();
            for &row_id in &self.rows {
                self.store
                    .put(row_id, &payload)
                    .map_err(|source| Error::Aborted {
                        iteration,
                        source: Box::new(source),
                    })?;
            }
            self.workload = next;
            self.payload_len = payload.len();
            self.iterations_done += 1;

            if iteration % sample_every == 0 {
                let sample = Sample {
                    iteration,
                    file_size_bytes: self.store.current_size_bytes(),
                };
                debug!(iteration, size = sample.file_size_bytes, "sampled store size");
                on_sample(&sample);
                samples.push(sample);
                self.samples.push(sample);
            }

            if !self.pause.is_zero() {
                thread::sleep(self.pause);
            }
        }

        Ok(RunReport {
            first_iteration,
            iterations,
            samples,
            payload_len: self.payload_len,
            size_before,
            size_after: self.store.current_size_bytes(),
        })
    }

    /// Compacts the store and checks that it shrank by at least the
    /// configured reclaim ratio
    pub fn verify_compaction(&mut self) -> Result<CompactionReport> {
        let size_before = self.store.current_size_bytes();
        let reclaimed = self.store.compact()?;
        let size_after = self.store.current_size_bytes();

        let report = CompactionReport {
            size_before,
            size_after,
            reclaimed,
            payload_len: self.payload_len,
        };
        info!(
            before = size_before,
            after = size_after,
            ratio = report.reclaimed_ratio(),
            "verified compaction"
        );

        if report.reclaimed_ratio() < self.min_reclaim_ratio {
            return Err(Error::CompactionIneffective {
                before: size_before,
                after: size_after,
            });
        }
        Ok(report)
    }

    /// Closes the store, which compacts it, and reports the sizes around it
    pub fn shutdown(self) -> Result<CompactionReport> {
        let size_before = self.store.current_size_bytes();
        let reclaimed = self.store.close()?;
        Ok(CompactionReport {
            size_before,
            size_after: size_before - reclaimed,
            reclaimed,
            payload_len: self.payload_len,
        })
    }

    pub fn store(&self) -> &LobStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LobStore<B> {
        &mut self.store
    }

    /// Every sample taken so far, across runs
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn rows(&self) -> &[RowId] {
        &self.rows
    }

    pub fn iterations_done(&self) -> u64 {
        self.iterations_done
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Logical payload as of the last iteration
    pub fn data(&self) -> &RealtimeData {
        self.workload.data()
    }
}
