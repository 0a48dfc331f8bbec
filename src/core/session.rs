use crate::core::analysis::ResultProvider;
use crate::core::backend::{HistoryBackend, ScanRecord};
use crate::core::camera::{CameraSource, CameraStream};
use crate::core::models::ScanResults;
use crate::core::overlay::{CanvasSize, Frame, OverlayLoop};
use crate::core::progress::{
    ProgressEvent, ProgressSimulator, ProgressState, create_progress_channel,
};
use log::{info, warn};
use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);
const DEFAULT_PROGRESS_TICK: Duration = Duration::from_millis(50);

/// Fold one progress event into the displayed state.
///
/// Percent never moves backwards within a run.
pub fn apply_progress_event(state: &mut ProgressState, event: &ProgressEvent) {
    match event {
        ProgressEvent::StageChanged { index, name } => {
            state.stage_index = *index;
            state.current_stage = name.clone();
        }
        ProgressEvent::Progress(next) => {
            if next.percent_complete >= state.percent_complete {
                *state = next.clone();
            }
        }
        ProgressEvent::Completed => {}
    }
}

fn scan_cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "Scan was cancelled")
}

/// Clears the analyzing flag however the capture ends.
struct AnalyzingGuard<'a>(&'a watch::Sender<bool>);

impl<'a> AnalyzingGuard<'a> {
    fn raise(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for AnalyzingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// State of the scan flow: camera, overlay, progress and results.
pub struct ScanSession {
    camera: Option<CameraStream>,
    overlay: Option<OverlayLoop>,
    analyzing: watch::Sender<bool>,
    simulator: ProgressSimulator,
    progress: ProgressState,
    results: Option<ScanResults>,
    last_error: Option<String>,
    provider: Box<dyn ResultProvider>,
    history: Option<Arc<dyn HistoryBackend>>,
    frame_interval: Duration,
    progress_tick: Duration,
}

impl ScanSession {
    pub fn new(provider: Box<dyn ResultProvider>) -> Self {
        let simulator = ProgressSimulator::with_default_stages();
        let (analyzing, _) = watch::channel(false);
        Self {
            camera: None,
            overlay: None,
            analyzing,
            progress: simulator.initial_state(),
            simulator,
            results: None,
            last_error: None,
            provider,
            history: None,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            progress_tick: DEFAULT_PROGRESS_TICK,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryBackend>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_simulator(mut self, simulator: ProgressSimulator, tick: Duration) -> Self {
        self.progress = simulator.initial_state();
        self.simulator = simulator;
        self.progress_tick = tick;
        self
    }

    pub fn is_camera_active(&self) -> bool {
        self.camera.as_ref().is_some_and(|c| !c.is_released())
    }

    pub fn is_analyzing(&self) -> bool {
        *self.analyzing.borrow()
    }

    pub fn analyzing(&self) -> watch::Receiver<bool> {
        self.analyzing.subscribe()
    }

    pub fn camera_label(&self) -> Option<&str> {
        self.camera.as_ref().map(|c| c.label())
    }

    pub fn camera_resolution(&self) -> Option<CanvasSize> {
        self.camera.as_ref().map(|c| c.resolution())
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn stages(&self) -> &ProgressSimulator {
        &self.simulator
    }

    pub fn results(&self) -> Option<&ScanResults> {
        self.results.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Overlay frames for the active camera, if any.
    pub fn overlay_frames(&self) -> Option<watch::Receiver<Frame>> {
        self.overlay.as_ref().map(|o| o.frames())
    }

    pub fn resize_host(&self, size: CanvasSize) {
        if let Some(camera) = &self.camera {
            camera.resize_host(size);
        }
    }

    /// Acquire a camera and start the overlay loop on it.
    ///
    /// On failure the session stays idle and the error is kept for display.
    pub async fn start_camera(&mut self, source: &dyn CameraSource) -> io::Result<()> {
        if self.camera.is_some() {
            self.stop_camera();
        }

        let stream = match source.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Could not start camera '{}': {e}", source.name());
                self.last_error = Some(format!("Could not access camera: {e}"));
                return Err(e);
            }
        };

        self.overlay = Some(OverlayLoop::start(
            stream.host_size(),
            self.analyzing.subscribe(),
            self.frame_interval,
        ));
        self.camera = Some(stream);
        self.last_error = None;
        info!("Camera '{}' started", source.name());
        Ok(())
    }

    /// Stop the overlay, release the camera and clear results.
    pub fn stop_camera(&mut self) {
        if let Some(overlay) = self.overlay.take() {
            overlay.stop();
        }
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
        self.analyzing.send_replace(false);
        self.results = None;
        self.progress = self.simulator.initial_state();
    }

    /// Capture a frame, run the staged progress and populate results.
    ///
    /// `on_progress` sees every state change; returning `Break` cancels the
    /// scan with `ErrorKind::Interrupted`.
    pub async fn capture_and_analyze<F>(&mut self, mut on_progress: F) -> io::Result<ScanResults>
    where
        F: FnMut(&ProgressState) -> ControlFlow<()>,
    {
        let camera = self.camera.as_ref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                "Start the camera before capturing",
            )
        })?;
        let frame = camera.capture()?;

        let _analyzing = AnalyzingGuard::raise(&self.analyzing);
        self.results = None;
        self.progress = self.simulator.initial_state();
        if on_progress(&self.progress).is_break() {
            return Err(scan_cancelled());
        }

        let (tx, mut rx) = create_progress_channel();
        let run = self.simulator.clone().start(tx, self.progress_tick);
        while let Some(event) = rx.recv().await {
            apply_progress_event(&mut self.progress, &event);
            if on_progress(&self.progress).is_break() {
                run.cancel();
                info!("Scan cancelled at {:.0}%", self.progress.percent_complete);
                return Err(scan_cancelled());
            }
            if event == ProgressEvent::Completed {
                break;
            }
        }
        run.finished().await?;

        info!("Analyzing frame with {:?} provider", self.provider.kind());
        let results = self.provider.analyze(&frame).await.inspect_err(|e| {
            warn!("Analysis failed: {e}");
        })?;

        if let Some(history) = self.history.as_ref().filter(|h| h.is_enabled()) {
            let record = ScanRecord {
                results: results.clone(),
                scan_image: Some(frame.to_data_url()),
            };
            if let Err(e) = history.save_scan(&record).await {
                warn!("Scan history was not saved: {e}");
            }
        }

        info!("Scan complete: {} skin", results.skin_type);
        self.results = Some(results.clone());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::SimulatedProvider;
    use crate::core::backend::{ChatRecord, HistoryKind};
    use crate::core::camera::SimulatedCamera;
    use crate::core::camera::tests::UnavailableCamera;
    use crate::core::models::{SKIN_ISSUE_OPTIONS, SKIN_TONE_OPTIONS, SkinType};
    use crate::core::progress::ScanStage;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHistory {
        enabled: bool,
        fail: bool,
        scans: Mutex<Vec<ScanRecord>>,
    }

    #[async_trait]
    impl HistoryBackend for RecordingHistory {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn save_chat(&self, _record: &ChatRecord) -> io::Result<()> {
            Ok(())
        }

        async fn save_scan(&self, record: &ScanRecord) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::other("history unavailable"));
            }
            self.scans.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn get_history(&self, _kind: HistoryKind) -> io::Result<Vec<serde_json::Value>> {
            Ok(Vec::new())
        }
    }

    fn session() -> ScanSession {
        let simulator = ProgressSimulator::new(vec![
            ScanStage::new("Initializing scan", 300),
            ScanStage::new("Analyzing skin texture", 500),
            ScanStage::new("Finalizing results...", 200),
        ])
        .unwrap();
        ScanSession::new(Box::new(SimulatedProvider::with_rng(StdRng::seed_from_u64(
            3,
        ))))
        .with_simulator(simulator, Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_runs_progress_to_completion() {
        let mut session = session();
        session
            .start_camera(&SimulatedCamera::new(64, 48))
            .await
            .unwrap();
        assert!(session.is_camera_active());
        assert!(session.overlay_frames().is_some());

        let analyzing = session.analyzing();
        let mut seen: Vec<ProgressState> = Vec::new();
        let results = session
            .capture_and_analyze(|state| {
                assert!(*analyzing.borrow());
                seen.push(state.clone());
                ControlFlow::Continue(())
            })
            .await
            .unwrap();

        assert_eq!(seen.first().unwrap().percent_complete, 0.0);
        assert!(
            seen.windows(2)
                .all(|w| w[0].percent_complete <= w[1].percent_complete)
        );
        assert_eq!(session.progress().percent_complete, 100.0);
        assert_eq!(session.progress().current_stage, "Finalizing results...");
        assert!(seen.iter().any(|s| s.current_stage == "Analyzing skin texture"));

        assert!(!session.is_analyzing());
        assert_eq!(session.results(), Some(&results));
        assert!(SkinType::ALL.contains(&results.skin_type));
        assert!(SKIN_ISSUE_OPTIONS.contains(&results.skin_issues.as_str()));
        assert!(SKIN_TONE_OPTIONS.contains(&results.skin_tone.as_str()));
    }

    #[tokio::test]
    async fn test_camera_failure_leaves_session_idle() {
        let mut session = session();
        let err = session.start_camera(&UnavailableCamera).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(!session.is_camera_active());
        assert!(session.overlay_frames().is_none());
        assert!(session.last_error().unwrap().contains("Could not access camera"));
    }

    #[tokio::test]
    async fn test_capture_requires_camera() {
        let mut session = session();
        let err = session
            .capture_and_analyze(|_| ControlFlow::Continue(()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(!session.is_analyzing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_capture_clears_analyzing() {
        let mut session = session();
        session.start_camera(&SimulatedCamera::new(32, 32)).await.unwrap();

        let err = session
            .capture_and_analyze(|state| {
                if state.percent_complete > 40.0 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(!session.is_analyzing());
        assert!(session.results().is_none());
        assert!(session.is_camera_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_camera_clears_state() {
        let mut session = session();
        session.start_camera(&SimulatedCamera::new(32, 32)).await.unwrap();
        let mut frames = session.overlay_frames().unwrap();
        session
            .capture_and_analyze(|_| ControlFlow::Continue(()))
            .await
            .unwrap();

        frames.borrow_and_update();
        session.stop_camera();
        assert!(!session.is_camera_active());
        assert!(session.results().is_none());
        assert_eq!(session.progress().percent_complete, 0.0);

        // The overlay task is gone, so the frame channel closes.
        assert!(frames.changed().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_is_saved_when_history_enabled() {
        let history = Arc::new(RecordingHistory {
            enabled: true,
            ..Default::default()
        });
        let mut session = session().with_history(history.clone());
        session.start_camera(&SimulatedCamera::new(16, 16)).await.unwrap();

        let results = session
            .capture_and_analyze(|_| ControlFlow::Continue(()))
            .await
            .unwrap();

        let scans = history.scans.lock().unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].results, results);
        assert!(
            scans[0]
                .scan_image
                .as_deref()
                .unwrap()
                .starts_with("data:image/jpeg;base64,")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_failures_are_swallowed() {
        let history = Arc::new(RecordingHistory {
            enabled: true,
            fail: true,
            ..Default::default()
        });
        let mut session = session().with_history(history);
        session.start_camera(&SimulatedCamera::new(16, 16)).await.unwrap();

        assert!(
            session
                .capture_and_analyze(|_| ControlFlow::Continue(()))
                .await
                .is_ok()
        );
        assert!(session.results().is_some());
    }

    #[test]
    fn test_progress_fold_never_goes_backwards() {
        let mut state = ProgressSimulator::with_default_stages().initial_state();
        apply_progress_event(
            &mut state,
            &ProgressEvent::StageChanged {
                index: 1,
                name: "Detecting facial features".to_string(),
            },
        );
        apply_progress_event(
            &mut state,
            &ProgressEvent::Progress(ProgressState {
                stage_index: 1,
                current_stage: "Detecting facial features".to_string(),
                percent_complete: 20.0,
            }),
        );
        apply_progress_event(
            &mut state,
            &ProgressEvent::Progress(ProgressState {
                stage_index: 1,
                current_stage: "Detecting facial features".to_string(),
                percent_complete: 10.0,
            }),
        );
        assert_eq!(state.stage_index, 1);
        assert_eq!(state.percent_complete, 20.0);
    }
}
