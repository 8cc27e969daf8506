//! Attendance capture session.
//!
//! One spawned task walks the setup states, then polls the provider on a
//! fixed cadence. Each pass is awaited before the next tick is taken, so
//! passes never overlap. State and attendance are published through `watch`
//! channels; the task is their only writer.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::overlay::Overlay;
use crate::provider::{CapabilityProvider, ProviderError, ReferenceImage};
use crate::report::AttendanceReport;
use crate::session::{AttendanceRecord, MarkOutcome, SessionStore};
use crate::types::{BoundingBox, Identity, LabeledDescriptor, MatchOutcome};
use crate::video::{CameraError, VideoFeed, VideoSource};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_DISTANCE: f32 = 0.6;
pub const DEFAULT_ASSET_BASE: &str = "/models";

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Where the provider loads its model artifacts from.
    pub asset_base: String,
    pub poll_interval: Duration,
    /// Largest descriptor distance still counted as a match (exclusive).
    pub max_distance: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            asset_base: DEFAULT_ASSET_BASE.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("failed to load models: {0}")]
    AssetLoad(String),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("failed to learn reference faces: {0}")]
    ReferenceLearning(String),
    #[error("no reference faces")]
    NoReferences,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Initializing,
    ModelsLoading,
    CameraStarting,
    LearningReferences,
    Ready,
    Polling,
    Error(CaptureError),
    Stopped,
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Error(_) | CaptureState::Stopped)
    }

    /// Status line shown to the operator.
    pub fn status_message(&self) -> String {
        match self {
            CaptureState::Initializing => "Initializing...".into(),
            CaptureState::ModelsLoading => "Loading models...".into(),
            CaptureState::CameraStarting => "Starting camera...".into(),
            CaptureState::LearningReferences => "Learning student faces...".into(),
            CaptureState::Ready => "Waiting for video...".into(),
            CaptureState::Polling => "Ready!".into(),
            CaptureState::Error(CaptureError::NoReferences) => {
                "Error: no student faces learned.".into()
            }
            CaptureState::Error(CaptureError::Camera(e)) => {
                format!("Camera error ({e}). Please allow camera access.")
            }
            CaptureState::Error(e) => format!("Error: {e}"),
            CaptureState::Stopped => "Stopped.".into(),
        }
    }
}

/// Handle to a running capture session.
///
/// Dropping the handle cancels the session.
pub struct CaptureHandle {
    roster: Vec<Identity>,
    state: watch::Receiver<CaptureState>,
    session: watch::Receiver<SessionStore>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn state(&self) -> CaptureState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CaptureState> {
        self.state.clone()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<SessionStore> {
        self.session.clone()
    }

    /// Wait until the state satisfies `pred`, or the session task is gone.
    pub async fn wait_for_state(&self, pred: impl Fn(&CaptureState) -> bool) -> CaptureState {
        let mut rx = self.state.clone();
        if let Ok(state) = rx.wait_for(|s| pred(s)).await {
            return state.clone();
        }
        let state = rx.borrow().clone();
        state
    }

    pub fn roster(&self) -> &[Identity] {
        &self.roster
    }

    /// Snapshot of every attendance record, in roster order.
    pub fn records(&self) -> Vec<(String, AttendanceRecord)> {
        self.session.borrow().all_records()
    }

    pub fn excluded(&self) -> Vec<String> {
        self.session.borrow().excluded().map(str::to_string).collect()
    }

    pub fn export(&self) -> AttendanceReport {
        AttendanceReport::build(&self.session.borrow(), &self.roster)
    }

    /// Cancel the session and wait for the task to finish. A detection pass
    /// already in flight completes, but its result is discarded.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "capture task panicked");
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn a capture session on the current tokio runtime.
///
/// `roster` is captured as-is; later roster edits do not reach the session.
pub fn spawn_capture(
    config: CaptureConfig,
    roster: Vec<Identity>,
    provider: Arc<dyn CapabilityProvider>,
    source: Box<dyn VideoSource>,
    overlay: Box<dyn Overlay>,
) -> CaptureHandle {
    let session = SessionStore::new(&roster);
    let (state_tx, state_rx) = watch::channel(CaptureState::Initializing);
    let (session_tx, session_rx) = watch::channel(session);
    let cancel = CancellationToken::new();

    let task = CaptureTask {
        config,
        roster: roster.clone(),
        provider,
        source,
        overlay,
        state_tx,
        session_tx,
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(task.run());

    CaptureHandle {
        roster,
        state: state_rx,
        session: session_rx,
        cancel,
        task: Some(task),
    }
}

struct CaptureTask {
    config: CaptureConfig,
    roster: Vec<Identity>,
    provider: Arc<dyn CapabilityProvider>,
    source: Box<dyn VideoSource>,
    overlay: Box<dyn Overlay>,
    state_tx: watch::Sender<CaptureState>,
    session_tx: watch::Sender<SessionStore>,
    cancel: CancellationToken,
}

/// Output of setup: everything polling needs.
struct Prepared {
    feed: VideoFeed,
    references: Vec<LabeledDescriptor>,
}

/// One detection pass, not yet applied.
struct PassResult {
    seen_at: chrono::DateTime<Utc>,
    faces: Vec<(BoundingBox, MatchOutcome)>,
}

impl CaptureTask {
    async fn run(mut self) {
        let cancel = self.cancel.clone();

        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.prepare() => Some(result),
        };

        match prepared {
            None => {
                tracing::info!("capture cancelled during setup");
                self.set_state(CaptureState::Stopped);
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "capture session failed");
                self.set_state(CaptureState::Error(e));
            }
            Some(Ok(prepared)) => {
                self.poll(prepared, &cancel).await;
                self.set_state(CaptureState::Stopped);
            }
        }
    }

    fn set_state(&self, state: CaptureState) {
        tracing::info!(state = ?state, "capture state");
        self.state_tx.send_replace(state);
    }

    async fn prepare(&mut self) -> Result<Prepared, CaptureError> {
        self.set_state(CaptureState::ModelsLoading);
        self.provider
            .load_models(&self.config.asset_base)
            .await
            .map_err(|e| CaptureError::AssetLoad(e.to_string()))?;

        self.set_state(CaptureState::CameraStarting);
        let mut feed = self.source.start().await?;

        self.set_state(CaptureState::LearningReferences);
        let references = self.learn_references().await?;

        self.set_state(CaptureState::Ready);
        let dimensions = feed.playable().await?;
        self.overlay.resize(dimensions);
        tracing::info!(%dimensions, references = references.len(), "video playable");

        self.set_state(CaptureState::Polling);
        Ok(Prepared { feed, references })
    }

    /// Learn one descriptor per identity. Identities without one are
    /// excluded from matching but keep their record.
    async fn learn_references(&mut self) -> Result<Vec<LabeledDescriptor>, CaptureError> {
        let requests: Vec<ReferenceImage> = self
            .roster
            .iter()
            .map(|identity| ReferenceImage {
                identity: identity.name.clone(),
                image: identity.reference_image.clone(),
            })
            .collect();

        let learned = self
            .provider
            .learn_references(&requests)
            .await
            .map_err(|e| CaptureError::ReferenceLearning(e.to_string()))?;

        let session = self.session_tx.borrow().clone();
        let mut references: Vec<LabeledDescriptor> = Vec::with_capacity(learned.len());
        for descriptor in learned {
            if session.record(&descriptor.identity).is_none() {
                tracing::warn!(identity = %descriptor.identity, "descriptor for unknown identity; ignoring");
                continue;
            }
            if references.iter().any(|r| r.identity == descriptor.identity) {
                continue;
            }
            references.push(descriptor);
        }

        let missing: Vec<String> = session
            .all_records()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| !references.iter().any(|r| &r.identity == name))
            .collect();
        for name in &missing {
            tracing::warn!(identity = %name, "no face found in reference photo; excluding from matching");
        }
        if !missing.is_empty() {
            self.session_tx.send_modify(|s| {
                for name in &missing {
                    s.exclude(name);
                }
            });
        }

        if references.is_empty() {
            return Err(CaptureError::NoReferences);
        }
        tracing::info!(learned = references.len(), excluded = missing.len(), "reference faces learned");
        Ok(references)
    }

    async fn poll(&mut self, prepared: Prepared, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let result =
                        detection_pass(self.provider.as_ref(), &self.config, &prepared).await;
                    if cancel.is_cancelled() {
                        tracing::debug!("discarding detection pass finished after teardown");
                        break;
                    }
                    passes += 1;
                    match result {
                        Ok(Some(pass)) => self.apply(pass),
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, pass = passes, "detection pass failed"),
                    }
                }
            }
        }
        tracing::info!(passes, "polling stopped");
    }

    fn apply(&mut self, pass: PassResult) {
        self.overlay.clear();
        for (bbox, outcome) in &pass.faces {
            self.overlay.draw_box(bbox, &outcome.to_string());

            let Some(name) = outcome.identity() else {
                continue;
            };
            let marked = self
                .session_tx
                .send_if_modified(|s| s.mark_present(name, pass.seen_at) == MarkOutcome::Marked);
            if marked {
                tracing::info!(identity = name, at = %pass.seen_at, "marked present");
            }
        }
    }
}

/// Detect and match against the current frame. Touches no shared state.
async fn detection_pass(
    provider: &dyn CapabilityProvider,
    config: &CaptureConfig,
    prepared: &Prepared,
) -> Result<Option<PassResult>, ProviderError> {
    let Some(frame) = prepared.feed.current_frame() else {
        return Ok(None);
    };
    let seen_at = Utc::now();
    let detections = provider.detect(&frame).await?;
    let faces = detections
        .into_iter()
        .map(|d| {
            let outcome = provider.match_best(&d.descriptor, &prepared.references, config.max_distance);
            (d.bbox, outcome)
        })
        .collect();
    Ok(Some(PassResult { seen_at, faces }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Dimensions, Frame};
    use crate::overlay::{NoopOverlay, SharedCanvas};
    use crate::scripted::{Scenario, ScriptedProvider};
    use crate::session::AttendanceStatus;
    use crate::types::{Descriptor, Detection};
    use crate::video::{self, SyntheticSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            poll_interval: Duration::from_millis(10),
            ..CaptureConfig::default()
        }
    }

    fn source() -> Box<dyn VideoSource> {
        Box::new(SyntheticSource::new(Dimensions::new(64, 48), Duration::from_millis(5)))
    }

    fn roster(names: &[&str]) -> Vec<Identity> {
        names
            .iter()
            .map(|n| Identity::new(*n, format!("faces/{}.jpg", n.to_lowercase())))
            .collect()
    }

    fn scripted(text: &str) -> Arc<dyn CapabilityProvider> {
        Arc::new(ScriptedProvider::new(Scenario::from_toml(text).unwrap()))
    }

    async fn wait_present(handle: &CaptureHandle, name: &str) -> AttendanceRecord {
        let mut rx = handle.subscribe_session();
        let store = tokio::time::timeout(
            WAIT,
            rx.wait_for(|s| s.record(name).is_some_and(|r| r.is_present())),
        )
        .await
        .expect("timed out waiting for attendance")
        .expect("session channel closed");
        store.record(name).unwrap()
    }

    async fn wait_terminal(handle: &CaptureHandle) -> CaptureState {
        tokio::time::timeout(WAIT, handle.wait_for_state(CaptureState::is_terminal))
            .await
            .expect("timed out waiting for terminal state")
    }

    const ALICE_AND_BOB: &str = r#"
        [[reference]]
        image = "faces/alice.jpg"
        descriptor = [1.0, 0.0]

        [[reference]]
        image = "faces/bob.jpg"
        descriptor = [0.0, 1.0]

        [[appearance]]
        descriptor = [0.95, 0.05]
        from_ms = 50
    "#;

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_only_alice_present() {
        let before = Utc::now();
        let mut handle = spawn_capture(
            fast_config(),
            roster(&["Alice", "Bob"]),
            scripted(ALICE_AND_BOB),
            source(),
            Box::new(NoopOverlay),
        );

        let alice = wait_present(&handle, "Alice").await;
        assert!(alice.timestamp.unwrap() >= before);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let report = handle.export();
        let rows = report.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Alice");
        assert_eq!(rows[0].status, AttendanceStatus::Present);
        assert_eq!(rows[1].name, "Bob");
        assert_eq!(rows[1].status, AttendanceStatus::Absent);
        assert!(report.to_csv().contains("\"Bob\",\"Absent\",\"N/A\""));
        assert_eq!(handle.state(), CaptureState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_timestamp_never_changes() {
        let handle = spawn_capture(
            fast_config(),
            roster(&["Alice", "Bob"]),
            scripted(ALICE_AND_BOB),
            source(),
            Box::new(NoopOverlay),
        );

        let first = wait_present(&handle, "Alice").await;
        // Alice stays in view for many more passes.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let later = handle.session.borrow().record("Alice").unwrap();
        assert_eq!(first, later);
    }

    #[tokio::test(start_paused = true)]
    async fn test_faceless_reference_excluded_but_reported() {
        let scenario = r#"
            [[reference]]
            image = "faces/alice.jpg"
            descriptor = [1.0, 0.0]

            [[reference]]
            image = "faces/bob.jpg"

            [[appearance]]
            descriptor = [0.0, 1.0]
        "#;
        let mut handle = spawn_capture(
            fast_config(),
            roster(&["Alice", "Bob"]),
            scripted(scenario),
            source(),
            Box::new(NoopOverlay),
        );

        let state = tokio::time::timeout(WAIT, handle.wait_for_state(|s| *s == CaptureState::Polling))
            .await
            .unwrap();
        assert_eq!(state, CaptureState::Polling);
        assert_eq!(handle.excluded(), vec!["Bob".to_string()]);

        // Bob's face is in view but has no reference to match.
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await;

        let report = handle.export();
        assert_eq!(report.rows().len(), 2);
        assert!(report.rows().iter().all(|r| r.status == AttendanceStatus::Absent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reference_faces_is_error() {
        let scenario = r#"
            [[reference]]
            image = "faces/alice.jpg"
        "#;
        let handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            scripted(scenario),
            source(),
            Box::new(NoopOverlay),
        );

        let state = wait_terminal(&handle).await;
        assert_eq!(state, CaptureState::Error(CaptureError::NoReferences));
        assert_eq!(state.status_message(), "Error: no student faces learned.");

        let csv = handle.export().to_csv();
        assert!(csv.contains("\"Alice\",\"Absent\",\"N/A\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_load_failure_is_error() {
        let scenario = r#"load_error = "unreachable""#;
        let handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            scripted(scenario),
            source(),
            Box::new(NoopOverlay),
        );

        let state = wait_terminal(&handle).await;
        assert!(matches!(state, CaptureState::Error(CaptureError::AssetLoad(m)) if m.contains("unreachable")));
    }

    struct DeniedCamera;

    #[async_trait]
    impl VideoSource for DeniedCamera {
        async fn start(&mut self) -> Result<VideoFeed, CameraError> {
            Err(CameraError::PermissionDenied("/dev/video0".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_failure_is_error() {
        let handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            scripted(ALICE_AND_BOB),
            Box::new(DeniedCamera),
            Box::new(NoopOverlay),
        );

        let state = wait_terminal(&handle).await;
        assert_eq!(
            state,
            CaptureState::Error(CaptureError::Camera(CameraError::PermissionDenied(
                "/dev/video0".into()
            )))
        );

        // The task is gone; waiting for a state it never reached returns the last one.
        let last = handle.wait_for_state(|s| *s == CaptureState::Polling).await;
        assert_eq!(last, state);
    }

    /// Provider whose detect outlasts the poll interval and records overlap.
    struct SlowProvider {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl SlowProvider {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl CapabilityProvider for SlowProvider {
        async fn load_models(&self, _asset_base: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn learn_references(
            &self,
            references: &[ReferenceImage],
        ) -> Result<Vec<LabeledDescriptor>, ProviderError> {
            Ok(references
                .iter()
                .map(|r| LabeledDescriptor {
                    identity: r.identity.clone(),
                    descriptor: Descriptor::new(vec![1.0]),
                })
                .collect())
        }

        async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![Detection {
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                    confidence: 1.0,
                },
                descriptor: Descriptor::new(vec![1.0]),
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_never_overlap() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(35)));
        let canvas = SharedCanvas::new();
        let mut handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            provider.clone(),
            source(),
            Box::new(canvas.clone()),
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop().await;

        assert!(provider.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 1);

        let snapshot = canvas.snapshot();
        assert_eq!(snapshot.resize_count, 1);
        assert_eq!(snapshot.dimensions, Some(Dimensions::new(64, 48)));
        assert_eq!(snapshot.boxes.len(), 1);
        assert!(snapshot.boxes[0].1.starts_with("Alice ("));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_pass_discarded_after_stop() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(100)));
        let mut handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            provider.clone(),
            source(),
            Box::new(NoopOverlay),
        );

        tokio::time::timeout(WAIT, async {
            while provider.in_flight.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        handle.stop().await;

        // The pass ran to completion, but Alice was never marked.
        assert_eq!(provider.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(handle.records()[0].1, AttendanceRecord::ABSENT);
        assert_eq!(handle.state(), CaptureState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_session() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(1)));
        let handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            provider.clone(),
            source(),
            Box::new(NoopOverlay),
        );
        let mut state = handle.subscribe_state();
        drop(handle);

        let last = tokio::time::timeout(WAIT, state.wait_for(|s| s.is_terminal()))
            .await
            .unwrap()
            .map(|s| s.clone())
            .unwrap_or(CaptureState::Stopped);
        assert_eq!(last, CaptureState::Stopped);

        let calls = provider.calls.load(Ordering::SeqCst);
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
    }

    /// Source whose stream closes before delivering a frame.
    struct EmptyStream;

    #[async_trait]
    impl VideoSource for EmptyStream {
        async fn start(&mut self) -> Result<VideoFeed, CameraError> {
            let (publisher, feed) = video::feed();
            drop(publisher);
            Ok(feed)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ending_before_first_frame_is_error() {
        let canvas = SharedCanvas::new();
        let handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            scripted(ALICE_AND_BOB),
            Box::new(EmptyStream),
            Box::new(canvas.clone()),
        );

        let state = wait_terminal(&handle).await;
        assert_eq!(state, CaptureState::Error(CaptureError::Camera(CameraError::StreamEnded)));
        assert_eq!(canvas.snapshot().resize_count, 0);
    }

    /// Provider with scripted reference output and a number of failing
    /// `detect` calls before it starts reporting `face`.
    struct StubProvider {
        learned: Result<Vec<LabeledDescriptor>, ProviderError>,
        failing_detects: AtomicUsize,
        detects: AtomicUsize,
        face: Descriptor,
    }

    impl StubProvider {
        fn new(learned: Result<Vec<LabeledDescriptor>, ProviderError>, face: Vec<f32>) -> Self {
            Self {
                learned,
                failing_detects: AtomicUsize::new(0),
                detects: AtomicUsize::new(0),
                face: Descriptor::new(face),
            }
        }
    }

    fn labeled(name: &str, values: Vec<f32>) -> LabeledDescriptor {
        LabeledDescriptor {
            identity: name.to_string(),
            descriptor: Descriptor::new(values),
        }
    }

    #[async_trait]
    impl CapabilityProvider for StubProvider {
        async fn load_models(&self, _asset_base: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn learn_references(
            &self,
            _references: &[ReferenceImage],
        ) -> Result<Vec<LabeledDescriptor>, ProviderError> {
            self.learned.clone()
        }

        async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, ProviderError> {
            self.detects.fetch_add(1, Ordering::SeqCst);
            let failing = self.failing_detects.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_detects.store(failing - 1, Ordering::SeqCst);
                return Err(ProviderError::InferenceFailed("boom".into()));
            }
            Ok(vec![Detection {
                bbox: BoundingBox {
                    x: 4.0,
                    y: 4.0,
                    width: 20.0,
                    height: 20.0,
                    confidence: 0.9,
                },
                descriptor: self.face.clone(),
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_learning_failure_is_error() {
        let provider = StubProvider::new(
            Err(ProviderError::InferenceFailed("boom".into())),
            vec![1.0, 0.0],
        );
        let handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            Arc::new(provider),
            source(),
            Box::new(NoopOverlay),
        );

        let state = wait_terminal(&handle).await;
        assert_eq!(
            state,
            CaptureState::Error(CaptureError::ReferenceLearning("inference failed: boom".into()))
        );
        assert_eq!(handle.records()[0].1, AttendanceRecord::ABSENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_detection_pass_keeps_polling() {
        let provider = Arc::new(StubProvider::new(
            Ok(vec![labeled("Alice", vec![1.0, 0.0])]),
            vec![1.0, 0.0],
        ));
        provider.failing_detects.store(2, Ordering::SeqCst);
        let mut handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            provider.clone(),
            source(),
            Box::new(NoopOverlay),
        );

        let alice = wait_present(&handle, "Alice").await;
        assert!(alice.is_present());
        assert!(provider.detects.load(Ordering::SeqCst) >= 3);
        assert_eq!(handle.state(), CaptureState::Polling);
        handle.stop().await;
        assert_eq!(handle.state(), CaptureState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_descriptors_for_unknown_names_are_ignored() {
        // Mallory is not on the roster; her face is the one in view.
        let provider = StubProvider::new(
            Ok(vec![
                labeled("Mallory", vec![0.0, 1.0]),
                labeled("Alice", vec![1.0, 0.0]),
            ]),
            vec![0.0, 1.0],
        );
        let canvas = SharedCanvas::new();
        let mut handle = spawn_capture(
            fast_config(),
            roster(&["Alice"]),
            Arc::new(provider),
            source(),
            Box::new(canvas.clone()),
        );

        let state = tokio::time::timeout(WAIT, handle.wait_for_state(|s| *s == CaptureState::Polling))
            .await
            .unwrap();
        assert_eq!(state, CaptureState::Polling);
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await;

        assert!(handle.excluded().is_empty());
        let records = handle.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], ("Alice".to_string(), AttendanceRecord::ABSENT));

        let snapshot = canvas.snapshot();
        assert_eq!(snapshot.boxes.len(), 1);
        assert!(snapshot.boxes[0].1.starts_with("unknown"));
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(CaptureState::Polling.status_message(), "Ready!");
        assert!(CaptureState::Error(CaptureError::Camera(CameraError::DeviceBusy))
            .status_message()
            .contains("allow camera access"));
        assert!(!CaptureState::Ready.is_terminal());
        assert!(CaptureState::Stopped.is_terminal());
    }
}
