//! Staged progress simulation for the skin scan
//!
//! Progress is derived from wall-clock time elapsed since the run started, so
//! late or dropped ticks never change where a run ends up: every sample lands
//! on the same linear ramp and the final sample reads exactly 100%.

use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const DEFAULT_STAGES: [(&str, u64); 9] = [
    ("Initializing scan", 800),
    ("Detecting facial features", 1200),
    ("Analyzing skin texture", 1500),
    ("Identifying skin concerns", 1000),
    ("Evaluating hydration levels", 800),
    ("Measuring pore visibility", 700),
    ("Checking for UV damage signs", 900),
    ("Building skin profile", 1000),
    ("Finalizing results...", 500),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStage {
    pub name: String,
    pub duration_ms: u64,
}

impl ScanStage {
    pub fn new(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            duration_ms,
        }
    }

    pub fn defaults() -> Vec<ScanStage> {
        DEFAULT_STAGES
            .iter()
            .map(|(name, ms)| ScanStage::new(*name, *ms))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    pub stage_index: usize,
    pub current_stage: String,
    pub percent_complete: f64,
}

impl ProgressState {
    pub fn is_complete(&self) -> bool {
        self.percent_complete >= 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageChanged { index: usize, name: String },
    Progress(ProgressState),
    Completed,
}

pub type ProgressSender = mpsc::Sender<ProgressEvent>;
pub type ProgressReceiver = mpsc::Receiver<ProgressEvent>;

pub fn create_progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::channel(256)
}

#[derive(Debug, Clone)]
pub struct ProgressSimulator {
    stages: Vec<ScanStage>,
    total_ms: u64,
}

impl ProgressSimulator {
    pub fn new(stages: Vec<ScanStage>) -> io::Result<Self> {
        if stages.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "A scan needs at least one stage",
            ));
        }
        if let Some(stage) = stages.iter().find(|s| s.duration_ms == 0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Stage '{}' must have a positive duration", stage.name),
            ));
        }

        let total_ms = stages.iter().map(|s| s.duration_ms).sum();
        Ok(Self { stages, total_ms })
    }

    pub fn with_default_stages() -> Self {
        let stages = ScanStage::defaults();
        let total_ms = stages.iter().map(|s| s.duration_ms).sum();
        Self { stages, total_ms }
    }

    pub fn stages(&self) -> &[ScanStage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.total_ms)
    }

    pub fn initial_state(&self) -> ProgressState {
        self.state_at(Duration::ZERO)
    }

    /// Progress after `elapsed` wall-clock time into the run.
    pub fn state_at(&self, elapsed: Duration) -> ProgressState {
        let total = self.total_ms as f64;
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        let mut start_ms = 0u64;
        for (index, stage) in self.stages.iter().enumerate() {
            let end_ms = start_ms + stage.duration_ms;
            if elapsed_ms < end_ms as f64 {
                let start_pct = start_ms as f64 / total * 100.0;
                let end_pct = end_ms as f64 / total * 100.0;
                let fraction = (elapsed_ms - start_ms as f64) / stage.duration_ms as f64;
                return ProgressState {
                    stage_index: index,
                    current_stage: stage.name.clone(),
                    percent_complete: start_pct + (end_pct - start_pct) * fraction.clamp(0.0, 1.0),
                };
            }
            start_ms = end_ms;
        }

        self.final_state()
    }

    fn final_state(&self) -> ProgressState {
        let last = self.stages.len() - 1;
        ProgressState {
            stage_index: last,
            current_stage: self.stages[last].name.clone(),
            percent_complete: 100.0,
        }
    }

    /// Percentage at which stage `index` ends.
    fn stage_end_percent(&self, index: usize) -> f64 {
        if index + 1 == self.stages.len() {
            return 100.0;
        }
        let end_ms: u64 = self.stages[..=index].iter().map(|s| s.duration_ms).sum();
        end_ms as f64 / self.total_ms as f64 * 100.0
    }

    /// Run the stage sequence on a timer, publishing events to `tx`.
    ///
    /// The run stops early if the receiver goes away.
    pub fn start(self, tx: ProgressSender, tick: Duration) -> ProgressRun {
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_stage: Option<usize> = None;

            loop {
                interval.tick().await;
                let state = self.state_at(started.elapsed());

                // A late tick may jump over short stages; report each one in order.
                let first_new = last_stage.map_or(0, |i| i + 1);
                for index in first_new..=state.stage_index {
                    let name = self.stages[index].name.clone();
                    if tx
                        .send(ProgressEvent::StageChanged { index, name: name.clone() })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    if index < state.stage_index {
                        let skipped = ProgressState {
                            stage_index: index,
                            current_stage: name,
                            percent_complete: self.stage_end_percent(index),
                        };
                        if tx.send(ProgressEvent::Progress(skipped)).await.is_err() {
                            return;
                        }
                    }
                }
                if first_new <= state.stage_index {
                    log::debug!("Scan stage {}: {}", state.stage_index, state.current_stage);
                    last_stage = Some(state.stage_index);
                }

                let complete = state.is_complete();
                if tx.send(ProgressEvent::Progress(state)).await.is_err() {
                    return;
                }
                if complete {
                    let _ = tx.send(ProgressEvent::Completed).await;
                    return;
                }
            }
        });

        ProgressRun {
            handle: Some(handle),
        }
    }
}

/// Handle to a running progress simulation. Dropping it cancels the run.
pub struct ProgressRun {
    handle: Option<JoinHandle<()>>,
}

impl ProgressRun {
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Wait for the run to reach its last stage.
    pub async fn finished(mut self) -> io::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.await.map_err(|e| {
                if e.is_cancelled() {
                    io::Error::new(io::ErrorKind::Interrupted, "Scan progress was cancelled")
                } else {
                    io::Error::other(format!("Scan progress task failed: {e}"))
                }
            }),
            None => Ok(()),
        }
    }
}

impl Drop for ProgressRun {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
