//! Turns one generation request into one new clip.
//!
//! ```text
//! Idle -> Submitting -> Polling -> Materializing -> Succeeded
//!             \            \            \
//!              +------------+------------+--> Failed
//! ```
//!
//! Status checks are paced by a [`PollTimer`] owned by the orchestrator: it is
//! armed only after a check has been fully processed, so at most one check
//! is ever outstanding, and it is cleared on every terminal transition and on
//! [`GenerationOrchestrator::teardown`].

pub mod gemini;
pub mod types;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{Sleep, sleep};

pub use self::types::{
    AspectRatio, GenerationRequest, GenerationService, OperationHandle, OperationStatus,
    QualityMode, SeedImage,
};

use super::error::{StudioError, classify_api_error};
use super::support::deadline::with_deadline;
use super::support::fetch::MediaFetcher;
use super::support::ffmpeg::MediaProbe;
use super::timeline::{ClipId, SourceLocation, Timeline};
use crate::ui::prelude::{Level, emit};

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationState {
    Idle,
    Submitting,
    Polling {
        operation: OperationHandle,
        checks: u32,
    },
    Materializing {
        location: String,
    },
    Succeeded {
        clip: ClipId,
    },
    Failed {
        error: StudioError,
    },
}

impl GenerationState {
    /// A generation is in flight; new submissions must wait.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            GenerationState::Submitting
                | GenerationState::Polling { .. }
                | GenerationState::Materializing { .. }
        )
    }
}

/// Result of a single status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Completed(ClipId),
}

/// Owned, cancellable wait before the next status check.
#[derive(Default)]
struct PollTimer {
    deadline: Option<Pin<Box<Sleep>>>,
}

impl PollTimer {
    fn arm(&mut self, interval: Duration) {
        self.deadline = Some(Box::pin(sleep(interval)));
    }

    fn clear(&mut self) {
        self.deadline = None;
    }

    fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    async fn wait(&mut self) {
        if let Some(deadline) = self.deadline.as_mut() {
            deadline.as_mut().await;
        }
        self.deadline = None;
    }
}

pub struct GenerationOrchestrator {
    service: Box<dyn GenerationService>,
    fetcher: Arc<dyn MediaFetcher>,
    probe: Arc<dyn MediaProbe>,
    media_dir: PathBuf,
    poll_interval: Duration,
    poll_timeout: Option<Duration>,
    state: GenerationState,
    timer: PollTimer,
    clip_name: Option<String>,
}

impl GenerationOrchestrator {
    pub fn new(
        service: Box<dyn GenerationService>,
        fetcher: Arc<dyn MediaFetcher>,
        probe: Arc<dyn MediaProbe>,
        media_dir: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            fetcher,
            probe,
            media_dir,
            poll_interval,
            poll_timeout: None,
            state: GenerationState::Idle,
            timer: PollTimer::default(),
            clip_name: None,
        }
    }

    pub fn with_poll_timeout(mut self, limit: Option<Duration>) -> Self {
        self.poll_timeout = limit;
        self
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn has_pending_poll(&self) -> bool {
        self.timer.is_armed()
    }

    fn transition(&mut self, next: GenerationState) {
        emit(
            Level::Debug,
            "video.generate.state",
            &format!("Generation state: {:?}", next),
            None,
        );
        self.state = next;
    }

    fn fail(&mut self, error: StudioError) -> StudioError {
        self.timer.clear();
        self.transition(GenerationState::Failed {
            error: error.clone(),
        });
        error
    }

    /// Start a generation. Callers must not submit while [`Self::is_busy`].
    pub async fn submit(&mut self, request: GenerationRequest) -> Result<OperationHandle, StudioError> {
        request.validate()?;

        self.timer.clear();
        self.clip_name = Some(request.prompt.trim().to_string());
        self.transition(GenerationState::Submitting);

        match self.service.submit(&request).await {
            Ok(operation) => {
                emit(
                    Level::Info,
                    "video.generate.started",
                    "Clip generation started. This may take a few minutes.",
                    None,
                );
                self.transition(GenerationState::Polling {
                    operation: operation.clone(),
                    checks: 0,
                });
                self.timer.arm(self.poll_interval);
                Ok(operation)
            }
            Err(err) => {
                let message = classify_api_error("starting video generation", &format!("{err:#}"));
                Err(self.fail(StudioError::Submission(message)))
            }
        }
    }

    /// Issue one status check and process its response.
    pub async fn poll_once(&mut self, timeline: &mut Timeline) -> Result<PollOutcome, StudioError> {
        let (operation, checks) = match &self.state {
            GenerationState::Polling { operation, checks } => (operation.clone(), *checks),
            other => {
                return Err(StudioError::Validation(format!(
                    "No generation is being polled (state: {other:?})"
                )));
            }
        };
        self.timer.clear();

        let status = match self.service.check_status(&operation).await {
            Ok(status) => status,
            Err(err) => {
                let message = classify_api_error(
                    "polling video generation status",
                    &format!("{err:#}"),
                );
                return Err(self.fail(StudioError::Polling(message)));
            }
        };

        if !status.done {
            emit(
                Level::Info,
                "video.generate.poll",
                "Still processing your clip...",
                None,
            );
            self.transition(GenerationState::Polling {
                operation,
                checks: checks + 1,
            });
            self.timer.arm(self.poll_interval);
            return Ok(PollOutcome::Pending);
        }

        if let Some(raw) = status.error {
            let message = classify_api_error("generating the clip", &raw);
            return Err(self.fail(StudioError::Polling(message)));
        }

        let Some(location) = status.result_location else {
            return Err(self.fail(StudioError::Materialization(
                "Generation completed, but no video URL was found.".to_string(),
            )));
        };

        self.transition(GenerationState::Materializing {
            location: location.clone(),
        });
        match self.materialize(location, timeline).await {
            Ok(clip) => {
                self.transition(GenerationState::Succeeded { clip });
                Ok(PollOutcome::Completed(clip))
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Keep checking until the clip lands on the timeline or polling fails.
    pub async fn run(&mut self, timeline: &mut Timeline) -> Result<ClipId, StudioError> {
        loop {
            self.timer.wait().await;
            if let PollOutcome::Completed(clip) = self.poll_once(timeline).await? {
                return Ok(clip);
            }
        }
    }

    /// [`Self::run`] bounded by the configured poll timeout and by `shutdown`.
    /// Either one tears the orchestrator down.
    pub async fn run_until<F>(&mut self, timeline: &mut Timeline, shutdown: F) -> Result<ClipId, StudioError>
    where
        F: Future<Output = ()>,
    {
        let limit = self.poll_timeout;
        let outcome = tokio::select! {
            result = with_deadline(limit, "Clip generation", self.run(timeline)) => Some(result),
            _ = shutdown => None,
        };

        match outcome {
            Some(Err(err @ StudioError::Timeout { .. })) => {
                self.teardown();
                Err(self.fail(err))
            }
            Some(result) => result,
            None => {
                self.teardown();
                Err(StudioError::Cancelled("Generation"))
            }
        }
    }

    /// Submit `request` and poll it to completion. `shutdown` is honoured from
    /// the moment the request is sent, not only once polling has started.
    pub async fn generate_until<F>(
        &mut self,
        request: GenerationRequest,
        timeline: &mut Timeline,
        shutdown: F,
    ) -> Result<ClipId, StudioError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let submitted = tokio::select! {
            result = self.submit(request) => Some(result),
            _ = &mut shutdown => None,
        };

        match submitted {
            Some(Ok(_)) => self.run_until(timeline, shutdown).await,
            Some(Err(err)) => Err(err),
            None => {
                self.teardown();
                Err(StudioError::Cancelled("Generation"))
            }
        }
    }

    /// Cancel any pending status check, whatever the current state.
    pub fn teardown(&mut self) {
        self.timer.clear();
        if self.state.is_busy() {
            self.transition(GenerationState::Failed {
                error: StudioError::Cancelled("Generation"),
            });
        }
    }

    async fn materialize(
        &mut self,
        location: String,
        timeline: &mut Timeline,
    ) -> Result<ClipId, StudioError> {
        let bytes = self
            .fetcher
            .fetch(&SourceLocation::Remote(location))
            .await
            .map_err(|err| {
                StudioError::Materialization(classify_api_error(
                    "downloading the generated clip",
                    &format!("{err:#}"),
                ))
            })?;

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|err| {
                StudioError::Materialization(format!(
                    "Could not create {}: {err}",
                    self.media_dir.display()
                ))
            })?;
        let path = self.media_dir.join(new_clip_file_name());
        tokio::fs::write(&path, &bytes).await.map_err(|err| {
            StudioError::Materialization(format!("Could not save {}: {err}", path.display()))
        })?;

        let duration = match self.probe.duration_seconds(&path).await {
            Ok(duration) => duration,
            Err(err) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(StudioError::Materialization(format!(
                    "The generated clip is not playable: {err:#}"
                )));
            }
        };

        let name = self
            .clip_name
            .take()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Clip {}", timeline.clips().len() + 1));
        let clip = timeline.append_clip(SourceLocation::Owned(path), name, duration);

        emit(
            Level::Success,
            "video.generate.done",
            &format!("Clip is ready! Added {clip} ({duration:.1}s)"),
            None,
        );
        Ok(clip)
    }
}

fn new_clip_file_name() -> String {
    let suffix: u16 = rand::thread_rng().r#gen();
    format!(
        "clip-{}-{:04x}.mp4",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedService {
        submit_error: Option<String>,
        stall_submit: bool,
        statuses: Mutex<VecDeque<Result<OperationStatus>>>,
        checks: Arc<AtomicUsize>,
    }

    impl ScriptedService {
        fn with_statuses(statuses: Vec<Result<OperationStatus>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn submit(&self, _request: &GenerationRequest) -> Result<OperationHandle> {
            if self.stall_submit {
                std::future::pending::<()>().await;
            }
            match &self.submit_error {
                Some(msg) => Err(anyhow!(msg.clone())),
                None => Ok(OperationHandle("operations/test".into())),
            }
        }

        async fn check_status(&self, _operation: &OperationHandle) -> Result<OperationStatus> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(OperationStatus::pending()))
        }
    }

    struct StaticFetcher;

    #[async_trait]
    impl MediaFetcher for StaticFetcher {
        async fn fetch(&self, _location: &SourceLocation) -> Result<Bytes> {
            Ok(Bytes::from_static(b"mp4"))
        }
    }

    struct FixedProbe(f64);

    #[async_trait]
    impl MediaProbe for FixedProbe {
        async fn duration_seconds(&self, _path: &Path) -> Result<f64> {
            Ok(self.0)
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a lighthouse at dusk".into(),
            seed_image: Some(SeedImage {
                bytes: vec![0],
                mime_type: "image/png".into(),
            }),
            aspect_ratio: AspectRatio::Landscape,
            quality: QualityMode::Fast,
        }
    }

    fn orchestrator(service: ScriptedService, dir: &Path, interval: Duration) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            Box::new(service),
            Arc::new(StaticFetcher),
            Arc::new(FixedProbe(6.5)),
            dir.join("clips"),
            interval,
        )
    }

    #[tokio::test]
    async fn pending_then_done_appends_exactly_one_clip() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::with_statuses(vec![
            Ok(OperationStatus::pending()),
            Ok(OperationStatus::completed("https://files.test/clip")),
        ]);
        let checks = service.checks.clone();
        let mut orch = orchestrator(service, dir.path(), Duration::from_secs(10));
        let mut timeline = Timeline::new();

        orch.submit(request()).await.unwrap();
        assert!(matches!(orch.state(), GenerationState::Polling { checks: 0, .. }));
        assert!(orch.has_pending_poll());

        assert_eq!(orch.poll_once(&mut timeline).await.unwrap(), PollOutcome::Pending);
        assert!(matches!(orch.state(), GenerationState::Polling { checks: 1, .. }));
        assert!(orch.has_pending_poll());
        assert_eq!(checks.load(Ordering::SeqCst), 1);
        assert!(timeline.is_empty());

        let outcome = orch.poll_once(&mut timeline).await.unwrap();
        let PollOutcome::Completed(id) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(checks.load(Ordering::SeqCst), 2);
        assert_eq!(timeline.clips().len(), 1);

        let clip = timeline.clip(id).unwrap();
        assert_eq!(clip.trim_start, 0.0);
        assert_eq!(clip.trim_end, 6.5);
        assert_eq!(clip.name, "a lighthouse at dusk");
        assert!(clip.source.is_owned());
        assert_eq!(orch.state(), &GenerationState::Succeeded { clip: id });
        assert!(!orch.has_pending_poll());
    }

    #[tokio::test]
    async fn run_polls_until_complete() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::with_statuses(vec![
            Ok(OperationStatus::pending()),
            Ok(OperationStatus::pending()),
            Ok(OperationStatus::completed("https://files.test/clip")),
        ]);
        let checks = service.checks.clone();
        let mut orch = orchestrator(service, dir.path(), Duration::from_millis(1));
        let mut timeline = Timeline::new();

        orch.submit(request()).await.unwrap();
        orch.run(&mut timeline).await.unwrap();

        assert_eq!(checks.load(Ordering::SeqCst), 3);
        assert_eq!(timeline.clips().len(), 1);
    }

    #[tokio::test]
    async fn submission_failure_returns_to_idle_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService {
            submit_error: Some("429 RESOURCE_EXHAUSTED: quota".into()),
            ..ScriptedService::default()
        };
        let mut orch = orchestrator(service, dir.path(), Duration::from_secs(10));

        let err = orch.submit(request()).await.unwrap_err();
        assert!(matches!(err, StudioError::Submission(ref m) if m.contains("quota")));
        assert!(!orch.is_busy());
        assert!(!orch.has_pending_poll());
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_service() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(ScriptedService::default(), dir.path(), Duration::from_secs(10));
        let mut bad = request();
        bad.seed_image = None;

        assert!(matches!(
            orch.submit(bad).await,
            Err(StudioError::Validation(_))
        ));
        assert_eq!(orch.state(), &GenerationState::Idle);
    }

    #[tokio::test]
    async fn status_failure_stops_polling() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::with_statuses(vec![Err(anyhow!("connection reset"))]);
        let mut orch = orchestrator(service, dir.path(), Duration::from_millis(1));
        let mut timeline = Timeline::new();

        orch.submit(request()).await.unwrap();
        let err = orch.run(&mut timeline).await.unwrap_err();

        assert!(matches!(err, StudioError::Polling(_)));
        assert!(!orch.has_pending_poll());
        assert!(timeline.is_empty());
    }

    #[tokio::test]
    async fn done_without_location_is_a_materialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::with_statuses(vec![Ok(OperationStatus {
            done: true,
            ..OperationStatus::default()
        })]);
        let mut orch = orchestrator(service, dir.path(), Duration::from_millis(1));
        let mut timeline = Timeline::new();

        orch.submit(request()).await.unwrap();
        let err = orch.run(&mut timeline).await.unwrap_err();
        assert!(matches!(err, StudioError::Materialization(_)));
        assert!(timeline.is_empty());
    }

    #[tokio::test]
    async fn shutdown_tears_down_pending_poll() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(ScriptedService::default(), dir.path(), Duration::from_secs(3600));
        let mut timeline = Timeline::new();

        orch.submit(request()).await.unwrap();
        let err = orch
            .run_until(&mut timeline, std::future::ready(()))
            .await
            .unwrap_err();

        assert_eq!(err, StudioError::Cancelled("Generation"));
        assert!(!orch.has_pending_poll());
        assert!(!orch.is_busy());
    }

    #[tokio::test]
    async fn shutdown_during_submission_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService {
            stall_submit: true,
            ..ScriptedService::default()
        };
        let checks = service.checks.clone();
        let mut orch = orchestrator(service, dir.path(), Duration::from_millis(1));
        let mut timeline = Timeline::new();

        let err = orch
            .generate_until(request(), &mut timeline, std::future::ready(()))
            .await
            .unwrap_err();

        assert_eq!(err, StudioError::Cancelled("Generation"));
        assert!(!orch.is_busy());
        assert!(!orch.has_pending_poll());
        assert_eq!(checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generate_until_submits_and_polls() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::with_statuses(vec![Ok(OperationStatus::completed(
            "https://files.test/clip",
        ))]);
        let mut orch = orchestrator(service, dir.path(), Duration::from_millis(1));
        let mut timeline = Timeline::new();

        let id = orch
            .generate_until(request(), &mut timeline, std::future::pending())
            .await
            .unwrap();

        assert_eq!(timeline.clips().len(), 1);
        assert_eq!(orch.state(), &GenerationState::Succeeded { clip: id });
    }

    #[tokio::test]
    async fn poll_timeout_fails_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(ScriptedService::default(), dir.path(), Duration::from_millis(1))
            .with_poll_timeout(Some(Duration::from_millis(20)));
        let mut timeline = Timeline::new();

        orch.submit(request()).await.unwrap();
        let err = orch
            .run_until(&mut timeline, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, StudioError::Timeout { .. }));
        assert!(matches!(orch.state(), GenerationState::Failed { .. }));
        assert!(!orch.has_pending_poll());
    }

    #[tokio::test]
    async fn teardown_when_idle_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(ScriptedService::default(), dir.path(), Duration::from_secs(1));
        orch.teardown();
        assert_eq!(orch.state(), &GenerationState::Idle);
    }
}
