//! The experiment runner.
//!
//! Sequences a session from configuration to teardown: fetch and validate
//! the configuration, open a session, dispatch the resource download without
//! awaiting it, drive the scheduler through the frame loop, and on quit
//! upload the collected data and close the session. Every failure along the
//! way is folded into one envelope chain so the terminal report names each
//! level from the runner down to the leaf cause.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use stim_assets::{ResourceManager, ResourceRequest};
use stim_core::config::Configuration;
use stim_core::error::Cause;
use stim_core::{Envelope, SaveFormat, SessionContext};
use stim_net::Remote;
use stim_sched::{FrameConfig, FrameLoop, Scheduler, Signal, StopHandle, Task, TaskArgs};

use crate::data::ExperimentData;
use crate::participant::ParticipantInfo;

/// Lifecycle of an [`ExperimentRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    NotConfigured,
    Configuring,
    Configured,
    Started,
    /// A start or quit sequence failed part-way through.
    Stopped,
    Finished,
}

/// A task that repeats until every requested resource has loaded.
///
/// Schedule it ahead of the first task that needs an asset: the experiment
/// holds on this step, one frame at a time, while the download pipeline runs
/// in the background.
#[must_use]
pub fn wait_for_resources(manager: &ResourceManager) -> Task {
    let manager = manager.clone();
    Task::step(move |_| {
        if manager.resources_ready() {
            Signal::Continue
        } else {
            Signal::Repeat
        }
    })
}

/// Orchestrator tying the manager, the scheduler, and the frame loop into
/// one session lifecycle.
pub struct ExperimentRunner {
    manager: ResourceManager,
    scheduler: Scheduler,
    frame_loop: FrameLoop,
    stop: StopHandle,
    status: RunStatus,
    config: Option<Configuration>,
    ctx: Option<SessionContext>,
    data: ExperimentData,
    participant: ParticipantInfo,
    geo: Option<(Arc<dyn Remote>, String)>,
}

impl ExperimentRunner {
    #[must_use]
    pub fn new(manager: ResourceManager, frame_config: FrameConfig) -> Self {
        let frame_loop = FrameLoop::new(frame_config);
        let stop = frame_loop.stop_handle();
        Self {
            manager,
            scheduler: Scheduler::new(),
            frame_loop,
            stop,
            status: RunStatus::NotConfigured,
            config: None,
            ctx: None,
            data: ExperimentData::new(),
            participant: ParticipantInfo::placeholder(),
            geo: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    #[must_use]
    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    /// The session context, present once configured.
    #[must_use]
    pub fn context(&self) -> Option<&SessionContext> {
        self.ctx.as_ref()
    }

    /// The validated configuration document, present once configured.
    #[must_use]
    pub fn configuration(&self) -> Option<&Configuration> {
        self.config.as_ref()
    }

    #[must_use]
    pub fn data(&self) -> &ExperimentData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ExperimentData {
        &mut self.data
    }

    #[must_use]
    pub fn participant(&self) -> &ParticipantInfo {
        &self.participant
    }

    /// Opt in to participant network info collection. Off by default; when
    /// off, [`ExperimentRunner::start`] fills in placeholder values.
    pub fn collect_participant_info(&mut self, remote: Arc<dyn Remote>, geo_url: impl Into<String>) {
        self.geo = Some((remote, geo_url.into()));
    }

    /// A handle that stops the frame loop at the top of the next frame.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Append a task to the scheduler.
    pub fn schedule(&mut self, task: Task, args: TaskArgs) {
        debug!(pending = self.scheduler.pending(), "scheduling task");
        self.scheduler.enqueue(task, args);
    }

    /// Append a conditional entry; the predicate is evaluated when the
    /// scheduler reaches it.
    pub fn schedule_conditional(
        &mut self,
        condition: impl FnMut() -> bool + Send + 'static,
        when_true: Task,
        when_false: Task,
    ) {
        debug!(pending = self.scheduler.pending(), "scheduling conditional task");
        self.scheduler
            .enqueue_conditional(condition, when_true, when_false);
    }

    /// Fetch and validate the configuration document and build the session
    /// context from it.
    ///
    /// # Errors
    ///
    /// Returns an envelope wrapping the manager's configuration failure.
    pub async fn configure(&mut self, config_url: &str) -> Result<(), Envelope> {
        const ORIGIN: &str = "ExperimentRunner.configure";
        self.status = RunStatus::Configuring;
        let config = self
            .manager
            .get_configuration(config_url)
            .await
            .map_err(Envelope::wrap(ORIGIN, "when configuring the experiment runner"))?;
        info!(
            experiment = %config.experiment.name,
            manager_url = %config.manager.url,
            "experiment configured"
        );
        self.ctx = Some(SessionContext::from_configuration(&config));
        self.config = Some(config);
        self.status = RunStatus::Configured;
        Ok(())
    }

    /// Run the start sequence: configure, collect participant info, open a
    /// session, and dispatch the resource download.
    ///
    /// The download is deliberately not awaited; the scheduler starts
    /// immediately and tasks gate on asset readiness themselves (see
    /// [`wait_for_resources`]).
    ///
    /// # Errors
    ///
    /// Any failing step short-circuits the sequence; the returned envelope
    /// chains from the runner down to the leaf cause.
    pub async fn start(
        &mut self,
        config_url: &str,
        resources: Vec<ResourceRequest>,
    ) -> Result<(), Envelope> {
        const ORIGIN: &str = "ExperimentRunner.start";
        match self.start_inner(config_url, resources).await {
            Ok(()) => {
                self.status = RunStatus::Started;
                Ok(())
            }
            Err(source) => {
                self.status = RunStatus::Stopped;
                Err(Envelope::new(ORIGIN, "when starting the experiment", source))
            }
        }
    }

    async fn start_inner(
        &mut self,
        config_url: &str,
        resources: Vec<ResourceRequest>,
    ) -> Result<(), Cause> {
        self.configure(config_url).await?;

        self.participant = match &self.geo {
            Some((remote, geo_url)) => ParticipantInfo::fetch(remote.as_ref(), geo_url).await?,
            None => ParticipantInfo::placeholder(),
        };

        let ctx = self.ctx.as_mut().ok_or("no session context")?;
        let session = self.manager.open_session(ctx).await?;
        ctx.token = Some(session.token);
        info!(experiment = %ctx.experiment_name, "session opened");

        self.manager.download(ctx, resources)?;
        Ok(())
    }

    /// Drive the scheduler at display rate until it drains, the stop handle
    /// is raised, or the frame budget is reached. Returns the last scheduler
    /// signal.
    pub fn run_frames(&mut self, render: impl FnMut()) -> Signal {
        self.frame_loop.run(&mut self.scheduler, render)
    }

    /// Run the quit sequence: upload the collected data, close the session,
    /// and stop the frame loop.
    ///
    /// Returns the terminal message to present to the participant.
    ///
    /// # Errors
    ///
    /// Upload or close failures are folded into one envelope chain; the
    /// frame loop is stopped either way.
    pub async fn quit(
        &mut self,
        message: Option<&str>,
        is_completed: bool,
    ) -> Result<String, Envelope> {
        const ORIGIN: &str = "ExperimentRunner.quit";
        info!(is_completed, "ending the experiment");
        let outcome = self.quit_inner(is_completed).await;
        self.stop.stop();
        match outcome {
            Ok(()) => {
                self.status = RunStatus::Finished;
                let mut text =
                    String::from("Thank you for your patience. The data have been saved.\n\n");
                text.push_str(message.unwrap_or("Goodbye!"));
                Ok(text)
            }
            Err(source) => {
                self.status = RunStatus::Stopped;
                Err(Envelope::new(ORIGIN, "when terminating the experiment", source))
            }
        }
    }

    async fn quit_inner(&mut self, is_completed: bool) -> Result<(), Cause> {
        let ctx = self.ctx.as_ref().ok_or("the experiment was never started")?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        let (key, value) = match ctx.save_format {
            SaveFormat::Csv => (
                format!("{}_{timestamp}.csv", ctx.experiment_name),
                self.data.to_csv(),
            ),
            SaveFormat::Database => (
                format!("{}_{timestamp}.json", ctx.experiment_name),
                self.data.to_json(),
            ),
        };
        self.manager.upload_data(ctx, &key, value).await?;
        self.manager.close_session(ctx, is_completed).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use tokio::sync::broadcast;

    use stim_assets::fetch::{AudioClip, AudioFetcher, BulkFetcher, Payload};
    use stim_assets::ResourceEvent;
    use stim_net::NetError;

    use super::*;

    struct FakeRemote {
        config: serde_json::Value,
        post: serde_json::Value,
        fail: bool,
        commands: Mutex<Vec<String>>,
    }

    impl FakeRemote {
        fn ok() -> Self {
            Self {
                config: json!({
                    "experiment": { "name": "stroop", "fullpath": "demos/stroop" },
                    "psychoJsManager": { "URL": "http://server/manager" }
                }),
                post: json!({ "token": "9", "saved": true }),
                fail: false,
                commands: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::ok()
            }
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Remote for FakeRemote {
        async fn get_json(
            &self,
            _url: &str,
            _query: &[(&str, &str)],
        ) -> Result<serde_json::Value, NetError> {
            if self.fail {
                return Err(NetError::Server("remote unavailable".into()));
            }
            Ok(self.config.clone())
        }

        async fn post_form(
            &self,
            _url: &str,
            query: &[(&str, &str)],
            _form: &[(&str, String)],
        ) -> Result<serde_json::Value, NetError> {
            if self.fail {
                return Err(NetError::Server("remote unavailable".into()));
            }
            if let Some((_, command)) = query.first() {
                self.commands.lock().unwrap().push((*command).to_string());
            }
            Ok(self.post.clone())
        }

        async fn get_bytes(&self, url: &str) -> Result<Bytes, NetError> {
            Ok(Bytes::from(url.to_string()))
        }
    }

    struct FakeBulk;

    #[async_trait]
    impl BulkFetcher for FakeBulk {
        async fn fetch(&self, path: &str) -> Result<Bytes, NetError> {
            Ok(Bytes::from(path.to_string()))
        }
    }

    struct FakeAudio;

    #[async_trait]
    impl AudioFetcher for FakeAudio {
        async fn fetch(&self, path: &str) -> Result<AudioClip, NetError> {
            Ok(AudioClip {
                bytes: Bytes::from(path.to_string()),
            })
        }
    }

    fn manager(remote: Arc<FakeRemote>) -> ResourceManager {
        ResourceManager::new(remote, Arc::new(FakeBulk), Arc::new(FakeAudio))
    }

    fn fast_config() -> FrameConfig {
        FrameConfig {
            frame_rate: 10_000.0,
            max_frames: 0,
        }
    }

    async fn wait_complete(rx: &mut broadcast::Receiver<ResourceEvent>) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for download completion")
                .expect("event channel closed");
            if event == ResourceEvent::DownloadCompleted {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_start_opens_session_and_dispatches_download() {
        let remote = Arc::new(FakeRemote::ok());
        let manager = manager(Arc::clone(&remote));
        let mut rx = manager.subscribe();
        let mut runner = ExperimentRunner::new(manager.clone(), fast_config());

        runner
            .start(
                "http://server/config.json",
                vec![ResourceRequest::new("a.png", "http://res/a.png")],
            )
            .await
            .unwrap();

        assert_eq!(runner.status(), RunStatus::Started);
        assert_eq!(runner.context().unwrap().token.as_deref(), Some("9"));
        assert_eq!(runner.participant(), &ParticipantInfo::placeholder());
        assert_eq!(remote.commands(), vec!["open_session"]);

        // The download was dispatched fire-and-forget; completion arrives
        // through the event stream.
        wait_complete(&mut rx).await;
        assert!(manager.resources_ready());
        assert_eq!(
            manager.get_resource("a.png").unwrap(),
            Some(Payload::Binary(Bytes::from("http://res/a.png")))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_gate_on_resources_then_run_trials() {
        let remote = Arc::new(FakeRemote::ok());
        let manager = manager(remote);
        let mut runner = ExperimentRunner::new(manager.clone(), fast_config());
        runner
            .start(
                "http://server/config.json",
                vec![ResourceRequest::new("a.png", "http://res/a.png")],
            )
            .await
            .unwrap();

        runner.schedule(wait_for_resources(&manager), TaskArgs::none());
        let trial_manager = manager.clone();
        let recorded = Arc::new(Mutex::new(None));
        let recorded_in_task = Arc::clone(&recorded);
        runner.schedule(
            Task::step(move |_| {
                let payload = trial_manager.get_resource("a.png");
                *recorded_in_task.lock().unwrap() = Some(payload);
                Signal::Continue
            }),
            TaskArgs::none(),
        );

        let signal = runner.run_frames(|| {});
        assert_eq!(signal, Signal::Terminate);
        // The trial ran only after the asset was available.
        let payload = recorded.lock().unwrap().take().expect("trial ran");
        assert!(payload.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_start_failure_short_circuits_with_chain() {
        let manager = manager(Arc::new(FakeRemote::failing()));
        let mut runner = ExperimentRunner::new(manager, fast_config());

        let err = runner
            .start("http://server/config.json", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.origin, "ExperimentRunner.start");
        assert_eq!(runner.status(), RunStatus::Stopped);

        let lines: Vec<String> = err.report().lines().map(str::to_string).collect();
        assert_eq!(lines.first().unwrap(), "- when starting the experiment");
        assert_eq!(
            lines.get(1).unwrap(),
            "- when configuring the experiment runner"
        );
        assert!(lines.last().unwrap().contains("remote unavailable"));
    }

    #[tokio::test]
    async fn test_quit_uploads_closes_and_stops() {
        let remote = Arc::new(FakeRemote::ok());
        let manager = manager(Arc::clone(&remote));
        let mut rx = manager.subscribe();
        let mut runner = ExperimentRunner::new(manager, fast_config());
        runner
            .start(
                "http://server/config.json",
                vec![ResourceRequest::new("a.png", "http://res/a.png")],
            )
            .await
            .unwrap();
        wait_complete(&mut rx).await;

        runner.data_mut().add("trial", 1);
        runner.data_mut().add("rt", 0.5);
        runner.data_mut().next_entry();

        let text = runner.quit(Some("Merci!"), true).await.unwrap();
        assert!(text.starts_with("Thank you for your patience."));
        assert!(text.ends_with("Merci!"));
        assert_eq!(runner.status(), RunStatus::Finished);
        assert!(runner.stop_handle().is_stopped());
        assert_eq!(
            remote.commands(),
            vec!["open_session", "save_data", "close_session"]
        );
    }

    #[tokio::test]
    async fn test_quit_default_message() {
        let remote = Arc::new(FakeRemote::ok());
        let manager = manager(remote);
        let mut rx = manager.subscribe();
        let mut runner = ExperimentRunner::new(manager, fast_config());
        runner
            .start(
                "http://server/config.json",
                vec![ResourceRequest::new("a.png", "http://res/a.png")],
            )
            .await
            .unwrap();
        wait_complete(&mut rx).await;

        let text = runner.quit(None, false).await.unwrap();
        assert!(text.ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn test_quit_before_start_is_an_error() {
        let manager = manager(Arc::new(FakeRemote::ok()));
        let mut runner = ExperimentRunner::new(manager, fast_config());
        let err = runner.quit(None, false).await.unwrap_err();
        assert_eq!(err.origin, "ExperimentRunner.quit");
        assert!(err.leaf().to_string().contains("never started"));
        assert_eq!(runner.status(), RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_participant_info_collected_when_enabled() {
        struct GeoRemote;

        #[async_trait]
        impl Remote for GeoRemote {
            async fn get_json(
                &self,
                _url: &str,
                _query: &[(&str, &str)],
            ) -> Result<serde_json::Value, NetError> {
                Ok(json!({
                    "geoplugin_request": "203.0.113.7",
                    "geoplugin_countryName": "Iceland"
                }))
            }

            async fn post_form(
                &self,
                _url: &str,
                _query: &[(&str, &str)],
                _form: &[(&str, String)],
            ) -> Result<serde_json::Value, NetError> {
                Err(NetError::Protocol("unexpected post"))
            }

            async fn get_bytes(&self, _url: &str) -> Result<Bytes, NetError> {
                Err(NetError::Protocol("unexpected get_bytes"))
            }
        }

        let manager = manager(Arc::new(FakeRemote::ok()));
        let mut runner = ExperimentRunner::new(manager, fast_config());
        runner.collect_participant_info(Arc::new(GeoRemote), "http://geo");
        runner
            .start(
                "http://server/config.json",
                vec![ResourceRequest::new("a.png", "p")],
            )
            .await
            .unwrap();
        assert_eq!(runner.participant().ip, "203.0.113.7");
        assert_eq!(runner.participant().country, "Iceland");
    }
}
