//! Cycle scheduler: fetch → generate → send → wait, forever.
//!
//! One scheduler drives one channel. Per-cycle failures are contained here;
//! only the startup identity check can stop the loop with an error.
//! Cancellation is observed between steps and during every wait.

use crate::BotIdentity;
use crate::agent::generator::Generator;
use crate::config::{Config, ScheduleConfig};
use crate::conversation::history::{HistoryFetcher, HistoryWindow};
use crate::error::{Error, Result};
use crate::llm::model::CompletionModel;
use crate::messaging::sender::{Delivery, Sender};
use crate::messaging::traits::ChatPlatformDyn;
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    Generating,
    Sending,
    Waiting,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Fetching => write!(f, "fetching"),
            SchedulerState::Generating => write!(f, "generating"),
            SchedulerState::Sending => write!(f, "sending"),
            SchedulerState::Waiting => write!(f, "waiting"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Result of one completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Sent,
    /// Dry-run: the message was logged instead of posted.
    Logged,
    SendFailed,
    /// Generation gave up; nothing was sent.
    Skipped,
    /// Shutdown was requested partway through.
    Cancelled,
}

/// Drives the fetch/generate/send loop for a single channel.
pub struct Scheduler<M> {
    platform: Arc<dyn ChatPlatformDyn>,
    fetcher: HistoryFetcher,
    generator: Generator<M>,
    sender: Sender,
    schedule: ScheduleConfig,
    rng: StdRng,
    state: SchedulerState,
    shutdown_rx: watch::Receiver<bool>,
    run_once: bool,
}

impl<M> std::fmt::Debug for Scheduler<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<M: CompletionModel> Scheduler<M> {
    pub fn new(
        platform: Arc<dyn ChatPlatformDyn>,
        generator: Generator<M>,
        config: &Config,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            fetcher: HistoryFetcher::new(platform.clone()),
            sender: Sender::new(platform.clone()),
            platform,
            generator,
            schedule: config.schedule,
            rng,
            state: SchedulerState::Idle,
            shutdown_rx,
            run_once: false,
        }
    }

    /// Log messages instead of posting them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.sender = Sender::new(self.platform.clone()).dry_run(dry_run);
        self
    }

    /// Stop after the first cycle instead of waiting for the next.
    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn generator(&self) -> &Generator<M> {
        &self.generator
    }

    fn transition(&mut self, next: SchedulerState) {
        tracing::trace!(from = %self.state, to = %next, "scheduler transition");
        self.state = next;
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Verify the credential before any cycle runs. Failure stops the scheduler.
    pub async fn start(&mut self) -> Result<BotIdentity> {
        tracing::info!(adapter = self.platform.name(), "verifying credential");

        let identity = match self.platform.identity().await {
            Ok(identity) => identity,
            Err(error) => {
                self.transition(SchedulerState::Stopped);
                return Err(Error::Startup(format!(
                    "identity check against {} failed: {error}",
                    self.platform.name()
                )));
            }
        };

        if self.schedule.skip_own_messages && !identity.id.is_empty() {
            self.fetcher.exclude_author(identity.id.clone());
        }

        Ok(identity)
    }

    /// Run until cancelled. Returns early only when the startup check fails.
    pub async fn run(mut self) -> Result<()> {
        let identity = self.start().await?;
        tracing::info!(
            username = %identity.username,
            run_once = self.run_once,
            "starting message loop"
        );

        loop {
            if self.is_cancelled() {
                break;
            }

            let outcome = match self.run_cycle().await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(%error, "cycle failed unexpectedly");
                    if self.run_once {
                        break;
                    }
                    self.transition(SchedulerState::Waiting);
                    if self.wait(self.schedule.recovery_delay()).await {
                        break;
                    }
                    continue;
                }
            };

            tracing::debug!(?outcome, "cycle finished");
            if outcome == CycleOutcome::Cancelled || self.run_once {
                break;
            }

            self.transition(SchedulerState::Waiting);
            let wait_secs = self
                .rng
                .random_range(self.schedule.min_interval_secs..=self.schedule.max_interval_secs);
            tracing::info!(wait_secs, "waiting before next message");
            if self.wait(Duration::from_secs(wait_secs)).await {
                break;
            }
        }

        self.transition(SchedulerState::Stopped);
        tracing::info!("message loop stopped");
        Ok(())
    }

    /// One fetch → generate → send pass.
    ///
    /// Any fetch failure degrades to an empty window (the quiet-chat prompt).
    /// Send and generation failures are reported through the outcome.
    /// Anything returned as `Err` is unexpected and earns the caller's
    /// recovery wait.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.transition(SchedulerState::Fetching);
        let history = match self.fetcher.fetch(self.schedule.history_limit).await {
            Ok(history) => history,
            Err(error) => {
                tracing::warn!(
                    %error,
                    "failed to fetch channel history, continuing without context"
                );
                HistoryWindow::default()
            }
        };

        if self.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        self.transition(SchedulerState::Generating);
        let generated = match self.generator.generate(&history, &mut self.rng).await {
            Ok(generated) => generated,
            Err(failure) => {
                tracing::warn!(%failure, "no message generated, skipping send");
                return Ok(CycleOutcome::Skipped);
            }
        };

        if self.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        self.transition(SchedulerState::Sending);
        match self
            .sender
            .send(&generated.text, generated.reply_target.as_deref())
            .await
        {
            Ok(Delivery::Posted) => Ok(CycleOutcome::Sent),
            Ok(Delivery::Logged) => Ok(CycleOutcome::Logged),
            Err(error) => {
                tracing::warn!(%error, "failed to send message");
                Ok(CycleOutcome::SendFailed)
            }
        }
    }

    /// Sleep for `duration`. Returns `true` if shutdown was requested first.
    async fn wait(&self, duration: Duration) -> bool {
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = async {
                // A dropped sender can never cancel us; keep sleeping.
                if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
                    std::future::pending::<()>().await;
                }
            } => {
                tracing::info!("shutdown requested during wait");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, MessagingError};
    use crate::llm::model::CompletionRequest;
    use crate::messaging::traits::ChatPlatform;
    use crate::{ChatMessage, OutboundMessage};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeChannel {
        /// Newest first, like the platform.
        page: Vec<ChatMessage>,
        posted: Mutex<Vec<OutboundMessage>>,
        fetches: AtomicUsize,
        fail_identity: bool,
        fail_fetch: Option<MessagingError>,
        fail_post: bool,
        /// Requests shutdown while serving the history read.
        shutdown_on_fetch: Mutex<Option<watch::Sender<bool>>>,
    }

    impl FakeChannel {
        fn posted(&self) -> Vec<OutboundMessage> {
            self.posted.lock().unwrap().clone()
        }
    }

    impl ChatPlatform for FakeChannel {
        fn name(&self) -> &str {
            "fake"
        }

        async fn identity(&self) -> Result<BotIdentity> {
            if self.fail_identity {
                return Err(MessagingError::Status {
                    endpoint: "users/@me".into(),
                    status: 401,
                    body: "401: Unauthorized".into(),
                }
                .into());
            }
            Ok(BotIdentity {
                id: "self".into(),
                username: "chatter".into(),
            })
        }

        async fn recent_messages(&self, _limit: u32) -> Result<Vec<ChatMessage>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(shutdown_tx) = self.shutdown_on_fetch.lock().unwrap().as_ref() {
                let _ = shutdown_tx.send(true);
            }
            if let Some(error) = &self.fail_fetch {
                return Err(error.clone().into());
            }
            Ok(self.page.clone())
        }

        async fn post(&self, message: &OutboundMessage) -> Result<()> {
            if self.fail_post {
                return Err(MessagingError::Status {
                    endpoint: "channels/1/messages".into(),
                    status: 500,
                    body: String::new(),
                }
                .into());
            }
            self.posted.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct ScriptedModel {
        script: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<CompletionRequest>>,
        /// Requests shutdown while the completion is in flight.
        shutdown_on_complete: Mutex<Option<watch::Sender<bool>>>,
    }

    impl ScriptedModel {
        fn new(script: &[&str]) -> Self {
            Self {
                script: Mutex::new(script.iter().map(|s| s.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
                shutdown_on_complete: Mutex::new(None),
            }
        }
    }

    impl CompletionModel for ScriptedModel {
        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> std::result::Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(shutdown_tx) = self.shutdown_on_complete.lock().unwrap().as_ref() {
                let _ = shutdown_tx.send(true);
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::ProviderRequest("script exhausted".into()))
        }
    }

    fn config(interval_secs: u64) -> Config {
        let mut config = Config::default();
        config.seed = Some(1);
        config.generation.retry_delay_secs = 0;
        config.schedule.min_interval_secs = interval_secs;
        config.schedule.max_interval_secs = interval_secs;
        config.schedule.recovery_delay_secs = 0;
        config
    }

    fn build(
        channel: Arc<FakeChannel>,
        script: &[&str],
        config: &Config,
    ) -> (Scheduler<ScriptedModel>, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let generator = Generator::from_config(ScriptedModel::new(script), config);
        (Scheduler::new(channel, generator, config, shutdown_rx), shutdown_tx)
    }

    #[tokio::test]
    async fn cycle_sends_generated_message_without_reply() {
        let channel = Arc::new(FakeChannel {
            page: vec![ChatMessage::new("m1", "Alice", "excited about the event")],
            ..Default::default()
        });
        let (mut scheduler, _shutdown_tx) =
            build(channel.clone(), &["ngl the event is fire rn"], &config(0));

        let outcome = scheduler.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Sent);
        assert_eq!(
            channel.posted(),
            vec![OutboundMessage {
                text: "ngl the event is fire rn".into(),
                reply_to: None,
            }]
        );
        assert_eq!(scheduler.state(), SchedulerState::Sending);
    }

    #[tokio::test]
    async fn mention_becomes_reply_reference() {
        let channel = Arc::new(FakeChannel {
            page: vec![
                ChatMessage::new("m2", "alice", "same"),
                ChatMessage::new("m1", "Tom", "who pulled the secret"),
            ],
            ..Default::default()
        });
        let (mut scheduler, _shutdown_tx) = build(channel.clone(), &["tom you good?"], &config(0));

        scheduler.run_cycle().await.unwrap();

        assert_eq!(channel.posted()[0].reply_to.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn generation_failure_skips_send() {
        let channel = Arc::new(FakeChannel::default());
        let (mut scheduler, _shutdown_tx) = build(channel.clone(), &["", "  ", "\"\""], &config(0));

        let outcome = scheduler.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Skipped);
        assert!(channel.posted().is_empty());
        assert_eq!(scheduler.generator().recent_outputs().len(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_quiet_prompt() {
        let channel = Arc::new(FakeChannel {
            fail_fetch: Some(MessagingError::Transport {
                endpoint: "channels/1/messages".into(),
                message: "connection reset".into(),
            }),
            ..Default::default()
        });
        let (mut scheduler, _shutdown_tx) =
            build(channel.clone(), &["hatching all day"], &config(0));

        let outcome = scheduler.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Sent);
        let requests = scheduler.generator.model_requests();
        assert!(requests[0].messages[1].content.starts_with("Chat is quiet."));
    }

    #[tokio::test]
    async fn malformed_history_falls_back_to_quiet_prompt() {
        let channel = Arc::new(FakeChannel {
            fail_fetch: Some(MessagingError::Decode {
                endpoint: "channels/1/messages".into(),
                message: "expected value at line 1 column 1".into(),
            }),
            ..Default::default()
        });
        let (mut scheduler, _shutdown_tx) =
            build(channel.clone(), &["grinding rebirths rn"], &config(0));

        let outcome = scheduler.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Sent);
        let requests = scheduler.generator.model_requests();
        assert!(requests[0].messages[1].content.starts_with("Chat is quiet."));
        assert_eq!(channel.posted()[0].text, "grinding rebirths rn");
    }

    #[tokio::test]
    async fn shutdown_during_fetch_cancels_before_generating() {
        let channel = Arc::new(FakeChannel {
            page: vec![ChatMessage::new("m1", "alice", "gm")],
            ..Default::default()
        });
        let (mut scheduler, shutdown_tx) = build(channel.clone(), &["never"], &config(0));
        *channel.shutdown_on_fetch.lock().unwrap() = Some(shutdown_tx);

        let outcome = scheduler.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert!(scheduler.generator.model_requests().is_empty());
        assert!(channel.posted().is_empty());
    }

    #[tokio::test]
    async fn shutdown_during_generation_cancels_before_sending() {
        let channel = Arc::new(FakeChannel::default());
        let (mut scheduler, shutdown_tx) = build(channel.clone(), &["about to post"], &config(0));
        *scheduler.generator.model().shutdown_on_complete.lock().unwrap() = Some(shutdown_tx);

        let outcome = scheduler.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert_eq!(scheduler.generator.model_requests().len(), 1);
        assert!(channel.posted().is_empty());
    }

    #[tokio::test]
    async fn cancelled_cycle_ends_the_loop_without_posting() {
        let channel = Arc::new(FakeChannel::default());
        let (scheduler, shutdown_tx) = build(channel.clone(), &["never"], &config(3600));
        *channel.shutdown_on_fetch.lock().unwrap() = Some(shutdown_tx);

        scheduler.run().await.unwrap();

        assert_eq!(channel.fetches.load(Ordering::SeqCst), 1);
        assert!(channel.posted().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_contained() {
        let channel = Arc::new(FakeChannel {
            fail_post: true,
            ..Default::default()
        });
        let (mut scheduler, _shutdown_tx) = build(channel.clone(), &["gg"], &config(0));

        assert_eq!(scheduler.run_cycle().await.unwrap(), CycleOutcome::SendFailed);
    }

    #[tokio::test]
    async fn failed_identity_check_stops_before_any_cycle() {
        let channel = Arc::new(FakeChannel {
            fail_identity: true,
            ..Default::default()
        });
        let (scheduler, _shutdown_tx) = build(channel.clone(), &["never"], &config(0));

        let error = scheduler.run().await.unwrap_err();

        assert!(matches!(error, Error::Startup(_)));
        assert_eq!(channel.fetches.load(Ordering::SeqCst), 0);
        assert!(channel.posted().is_empty());
    }

    #[tokio::test]
    async fn run_once_performs_a_single_cycle() {
        let channel = Arc::new(FakeChannel::default());
        let (scheduler, _shutdown_tx) = build(channel.clone(), &["first", "second"], &config(0));

        scheduler.run_once(true).run().await.unwrap();

        assert_eq!(channel.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(channel.posted().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_no_cycle() {
        let channel = Arc::new(FakeChannel::default());
        let (scheduler, shutdown_tx) = build(channel.clone(), &["never"], &config(0));
        shutdown_tx.send(true).unwrap();

        scheduler.run().await.unwrap();

        assert_eq!(channel.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_interrupts_the_wait() {
        let channel = Arc::new(FakeChannel::default());
        let (scheduler, shutdown_tx) = build(channel.clone(), &["first", "second"], &config(3600));

        let handle = tokio::spawn(scheduler.run());
        while channel.posted().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler should stop promptly")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(channel.posted().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loop_keeps_cycling_after_failures() {
        let channel = Arc::new(FakeChannel::default());
        // First cycle fails all three attempts, second cycle succeeds.
        let (scheduler, shutdown_tx) =
            build(channel.clone(), &["", "", "", "back again"], &config(0));

        let handle = tokio::spawn(scheduler.run());
        while channel.posted().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(channel.posted()[0].text, "back again");
        assert!(channel.fetches.load(Ordering::SeqCst) >= 2);
    }

    impl Generator<ScriptedModel> {
        fn model_requests(&self) -> Vec<CompletionRequest> {
            self.model().requests.lock().unwrap().clone()
        }
    }
}
