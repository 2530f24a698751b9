//! Tracker - the main interface for tally-track.
//!
//! This module provides [`Tracker`], the handle applications use to report
//! lifecycle transitions and events, and the `ActivityHandler` task that
//! does the work.
//!
//! # Architecture
//!
//! Every public call becomes a `Command` on one channel. A single task
//! owns the activity state, the attribution record and the package queue,
//! so commands are processed strictly one at a time. Delivery attempts run
//! on spawned tasks and report back through the same channel.
//!
//! ```text
//! Application → Tracker ─┐
//!                        ├→ ActivityHandler → PackageHandler → storage
//! delivery task ─────────┘        ↓                ↓
//!                          track-core        RequestHandler → Transport
//! ```
//!
//! # Example
//!
//! ```ignore
//! use track_client::{MockTransport, Tracker, TrackerConfig};
//! use track_types::Event;
//!
//! let config = TrackerConfig::new("abc123").with_data_dir("/tmp/tally");
//! let tracker = Tracker::initialize(config, MockTransport::new()).await?;
//!
//! tracker.start().await?;
//! tracker.track_event(Event::new("abc123")).await?;
//! tracker.shutdown().await?;
//! ```

use std::future::pending;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use track_core::{
    build, session, Action, AttributionTracker, BuildContext, FailureOutcome, Lifecycle,
    LifecycleEvent, PackageRequest, SdkState, SessionWindow,
};
use track_types::{
    ActivityKind, ActivityPackage, ActivityState, Attribution, AttributionUpdate, Event,
};

use crate::config::{ConfigError, TrackerConfig};
use crate::error::{StorageError, TrackError};
use crate::package_handler::PackageHandler;
use crate::request::{DeliveryOutcome, RequestHandler, ResponseData};
use crate::storage::{self, FileStorage, Storage, ATTRIBUTION, STATE};
use crate::transport::Transport;

/// Commands waiting for the handler.
const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, TrackError>>;

/// Work items for the `ActivityHandler` task.
#[derive(Debug)]
enum Command {
    Start(Reply<()>),
    Resume(Reply<()>),
    Pause(Reply<()>),
    TrackEvent(Box<Event>, Reply<()>),
    SetEnabled(bool, Reply<()>),
    SetOffline(bool, Reply<()>),
    ForgetMe(Reply<()>),
    Attribution(AttributionUpdate, Reply<bool>),
    Status(oneshot::Sender<TrackerStatus>),
    Shutdown(Reply<()>),
    /// Sent by a delivery task.
    Delivered {
        package: ActivityPackage,
        outcome: DeliveryOutcome,
    },
}

/// Snapshot of a tracker for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerStatus {
    /// Externally visible state.
    pub state: SdkState,
    /// Identifiers, counters and flags.
    pub activity: ActivityState,
    /// Packages waiting, including one in flight.
    pub queued: usize,
    /// A delivery attempt is outstanding.
    pub in_flight: bool,
    /// Stored attribution with its sequence.
    pub attribution: Option<AttributionUpdate>,
}

/// Handle to a running tracker.
///
/// Cheap to clone; every clone talks to the same task. The task stops on
/// [`shutdown`](Tracker::shutdown) or when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct Tracker {
    tx: mpsc::Sender<Command>,
    attribution_rx: watch::Receiver<Option<Attribution>>,
}

impl Tracker {
    /// Start a tracker persisting under `config.tracker.data_dir`.
    pub async fn initialize<T: Transport + 'static>(
        config: TrackerConfig,
        transport: T,
    ) -> Result<Self, TrackError> {
        let dir = config.tracker.data_dir.clone().ok_or_else(|| {
            TrackError::Config(ConfigError::Invalid("tracker.data_dir is not set".into()))
        })?;
        Self::initialize_with_storage(config, transport, Arc::new(FileStorage::new(dir))).await
    }

    /// Start a tracker on the given storage.
    pub async fn initialize_with_storage<T: Transport + 'static>(
        config: TrackerConfig,
        transport: T,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, TrackError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handler = ActivityHandler::load(config, Arc::new(transport), storage, &tx).await?;
        let attribution_rx = handler.attribution_tx.subscribe();

        tokio::spawn(handler.run(rx));

        Ok(Self { tx, attribution_rx })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, TrackError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| TrackError::Closed)?;
        rx.await.map_err(|_| TrackError::Closed)?
    }

    /// Begin tracking. Equivalent to the app coming to the foreground.
    pub async fn start(&self) -> Result<(), TrackError> {
        self.request(Command::Start).await
    }

    /// The app came to the foreground.
    pub async fn on_resume(&self) -> Result<(), TrackError> {
        self.request(Command::Resume).await
    }

    /// The app went to the background.
    pub async fn on_pause(&self) -> Result<(), TrackError> {
        self.request(Command::Pause).await
    }

    /// Queue an event.
    ///
    /// Returns once the package is persisted. Ignored (and `Ok`) while
    /// tracking is disabled.
    pub async fn track_event(&self, event: Event) -> Result<(), TrackError> {
        self.request(|reply| Command::TrackEvent(Box::new(event), reply))
            .await
    }

    /// Switch tracking on or off.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), TrackError> {
        self.request(|reply| Command::SetEnabled(enabled, reply))
            .await
    }

    /// Switch offline mode on or off. Offline, events queue but nothing is
    /// sent.
    pub async fn set_offline_mode(&self, offline: bool) -> Result<(), TrackError> {
        self.request(|reply| Command::SetOffline(offline, reply))
            .await
    }

    /// Ask the collector to forget this install, then wipe local data.
    ///
    /// Tracking is disabled for good.
    pub async fn gdpr_forget_me(&self) -> Result<(), TrackError> {
        self.request(Command::ForgetMe).await
    }

    /// Offer an attribution obtained outside the normal response flow.
    ///
    /// Returns true if it replaced the stored attribution.
    pub async fn receive_attribution(&self, update: AttributionUpdate) -> Result<bool, TrackError> {
        self.request(|reply| Command::Attribution(update, reply))
            .await
    }

    /// The stored attribution, if any.
    pub fn attribution(&self) -> Option<Attribution> {
        self.attribution_rx.borrow().clone()
    }

    /// Watch attribution changes.
    pub fn subscribe_attribution(&self) -> watch::Receiver<Option<Attribution>> {
        self.attribution_rx.clone()
    }

    /// Current status snapshot.
    pub async fn status(&self) -> Result<TrackerStatus, TrackError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status(reply))
            .await
            .map_err(|_| TrackError::Closed)?;
        rx.await.map_err(|_| TrackError::Closed)
    }

    /// Persist everything and stop the task.
    ///
    /// A delivery in flight is not awaited; its package stays queued and is
    /// sent again on the next start.
    pub async fn shutdown(&self) -> Result<(), TrackError> {
        self.request(Command::Shutdown).await
    }
}

/// Owns the tracker state and processes commands one at a time.
struct ActivityHandler {
    config: TrackerConfig,
    window: SessionWindow,
    state: ActivityState,
    lifecycle: Lifecycle,
    attribution: AttributionTracker,
    packages: PackageHandler,
    requests: RequestHandler,
    storage: Arc<dyn Storage>,
    attribution_tx: watch::Sender<Option<Attribution>>,
    self_tx: mpsc::WeakSender<Command>,
    timer: Option<Interval>,
    ask_at: Option<Instant>,
}

impl ActivityHandler {
    async fn load(
        config: TrackerConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        tx: &mpsc::Sender<Command>,
    ) -> Result<Self, TrackError> {
        let state = match storage::load_record::<ActivityState>(storage.as_ref(), STATE).await? {
            Some(state) => state,
            None => {
                let state = ActivityState::new();
                storage::store_record(storage.as_ref(), STATE, &state).await?;
                tracing::info!(install_id = %state.install_id(), "Created new install");
                state
            }
        };

        let attribution =
            match storage::load_record::<AttributionUpdate>(storage.as_ref(), ATTRIBUTION).await? {
                Some(update) => AttributionTracker::with_update(update),
                None => AttributionTracker::new(),
            };

        let mut packages = PackageHandler::load(
            storage.clone(),
            config.delivery.queue_capacity,
            config.backoff(),
            config.delivery.max_retries,
        )
        .await?;

        let lifecycle = Lifecycle::new(
            state.enabled,
            state.offline,
            state.gdpr_forgotten,
            config.delivery.send_in_background,
        );
        if !lifecycle.delivery_allowed() {
            packages.pause();
        }

        let ask_at = (state.ask_in_pending && lifecycle.accepts_tracking()).then(Instant::now);
        let (attribution_tx, _) = watch::channel(attribution.current().cloned());

        tracing::info!(
            install_id = %state.install_id(),
            state = ?lifecycle.state(),
            queued = packages.len(),
            "Tracker initialized"
        );

        Ok(Self {
            window: config.session_window(),
            requests: RequestHandler::new(transport, config.request_timeout()),
            config,
            state,
            lifecycle,
            attribution,
            packages,
            storage,
            attribution_tx,
            self_tx: tx.downgrade(),
            timer: None,
            ask_at,
        })
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        loop {
            self.dispatch();

            let retry_at = if self.packages.is_paused() || self.packages.is_in_flight() {
                None
            } else {
                self.packages.retry_at()
            };
            let ask_at = self.ask_at;

            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        let _ = reply.send(self.persist_all().await);
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        if let Err(e) = self.persist_all().await {
                            tracing::error!(error = %e, "Failed to persist on close");
                        }
                        break;
                    }
                },
                _ = sleep_until_opt(retry_at) => {}
                _ = sleep_until_opt(ask_at) => self.ask_attribution().await,
                _ = tick(&mut self.timer) => self.on_timer().await,
            }
        }
        tracing::info!("Tracker stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                tracing::info!("Tracking started");
                let _ = reply.send(self.apply(LifecycleEvent::Resumed).await);
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.apply(LifecycleEvent::Resumed).await);
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.apply(LifecycleEvent::Backgrounded).await);
            }
            Command::TrackEvent(event, reply) => {
                let _ = reply.send(self.track_event(*event).await);
            }
            Command::SetEnabled(enabled, reply) => {
                if enabled && self.lifecycle.forgotten {
                    tracing::warn!("Install was forgotten, tracking stays disabled");
                }
                let _ = reply.send(self.apply(LifecycleEvent::EnabledChanged(enabled)).await);
            }
            Command::SetOffline(offline, reply) => {
                let _ = reply.send(self.apply(LifecycleEvent::OfflineChanged(offline)).await);
            }
            Command::ForgetMe(reply) => {
                let _ = reply.send(self.forget_me().await);
            }
            Command::Attribution(update, reply) => {
                let _ = reply.send(self.receive_attribution(update).await);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown(reply) => {
                // Handled by the run loop.
                let _ = reply.send(Ok(()));
            }
            Command::Delivered { package, outcome } => {
                self.on_delivered(package, outcome).await;
            }
        }
    }

    /// Run a lifecycle transition and execute its actions.
    ///
    /// Every action runs even if an earlier one fails; the first error is
    /// returned.
    async fn apply(&mut self, event: LifecycleEvent) -> Result<(), TrackError> {
        let before = self.lifecycle.state();
        let (next, actions) = self.lifecycle.on_event(event);
        self.lifecycle = next;

        if before != next.state() {
            tracing::info!(from = ?before, to = ?next.state(), "Tracker state changed");
        }

        let mut result = Ok(());
        for action in actions {
            let outcome = match action {
                Action::TrackResume => self.track_resume().await,
                Action::TrackPause => self.track_pause().await,
                Action::StartForegroundTimer => {
                    self.start_timer();
                    Ok(())
                }
                Action::StopForegroundTimer => {
                    self.timer = None;
                    Ok(())
                }
                Action::PauseDelivery => {
                    self.packages.pause();
                    Ok(())
                }
                Action::ResumeDelivery => {
                    self.packages.resume();
                    Ok(())
                }
                Action::PersistFlags => {
                    self.state.enabled = self.lifecycle.enabled;
                    self.state.offline = self.lifecycle.offline;
                    self.state.gdpr_forgotten = self.lifecycle.forgotten;
                    self.persist_state().await.map_err(TrackError::from)
                }
            };
            if let Err(e) = outcome {
                tracing::error!(?action, error = %e, "Lifecycle action failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    async fn track_resume(&mut self) -> Result<(), TrackError> {
        let now = now_ms();
        let mut next = self.state.clone();
        let outcome = self.window.resume(&mut next, now);

        if outcome.starts_session() {
            let package = build(&PackageRequest::SessionStart, &next, &self.context(now))?;
            self.packages.enqueue(package).await?;
            tracing::info!(session = next.session_count(), "Session started");
        } else {
            tracing::debug!(?outcome, "Resumed");
        }

        self.state = next;
        self.persist_state().await?;
        Ok(())
    }

    async fn track_pause(&mut self) -> Result<(), TrackError> {
        let now = now_ms();
        let mut next = self.state.clone();
        session::accrue(&mut next, now);

        let package = build(&PackageRequest::SessionEnd, &next, &self.context(now))?;
        self.packages.enqueue(package).await?;

        self.state = next;
        self.persist_state().await?;
        tracing::debug!(time_spent = self.state.time_spent(), "Paused");
        Ok(())
    }

    async fn track_event(&mut self, event: Event) -> Result<(), TrackError> {
        if !self.lifecycle.accepts_tracking() {
            tracing::info!(token = %event.token, "Tracking disabled, event ignored");
            return Ok(());
        }

        let now = now_ms();
        let mut next = self.state.clone();
        next.record_event();
        if self.lifecycle.foreground {
            session::accrue(&mut next, now);
        }

        let package = match build(&PackageRequest::Event(event), &next, &self.context(now)) {
            Ok(package) => package,
            Err(e) => {
                tracing::warn!(error = %e, "Event rejected");
                return Err(e.into());
            }
        };
        self.packages.enqueue(package).await?;

        self.state = next;
        self.persist_state().await?;
        Ok(())
    }

    async fn forget_me(&mut self) -> Result<(), TrackError> {
        if self.lifecycle.forgotten {
            tracing::debug!("Forget already requested");
            return Ok(());
        }

        let package = build(
            &PackageRequest::GdprForgetMe,
            &self.state,
            &self.context(now_ms()),
        )?;
        self.packages.replace_all(package).await?;
        self.ask_at = None;
        self.state.ask_in_pending = false;

        tracing::info!("Forget requested, tracking disabled");
        self.apply(LifecycleEvent::ForgetRequested).await
    }

    async fn receive_attribution(&mut self, update: AttributionUpdate) -> Result<bool, TrackError> {
        if self.lifecycle.forgotten {
            return Ok(false);
        }

        let seq_before = self.attribution.seq();
        let incoming = update.seq;
        let changed = self.attribution.apply(update);

        if self.attribution.seq() == seq_before {
            tracing::debug!(seq = incoming, stored = seq_before, "Stale attribution ignored");
            return Ok(false);
        }

        if let Some(snapshot) = self.attribution.snapshot() {
            storage::store_record(self.storage.as_ref(), ATTRIBUTION, &snapshot).await?;
        }
        if changed {
            tracing::info!(seq = self.attribution.seq(), "Attribution updated");
            self.attribution_tx
                .send_replace(self.attribution.current().cloned());
        }
        Ok(changed)
    }

    fn status(&self) -> TrackerStatus {
        TrackerStatus {
            state: self.lifecycle.state(),
            activity: self.state.clone(),
            queued: self.packages.len(),
            in_flight: self.packages.is_in_flight(),
            attribution: self.attribution.snapshot(),
        }
    }

    /// Start a delivery attempt if one may run now.
    fn dispatch(&mut self) {
        if !self.lifecycle.delivery_allowed() || self.packages.is_in_flight() {
            return;
        }
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let Some(package) = self.packages.send_next() else {
            return;
        };

        tracing::debug!(package = %package.describe(), retries = package.retries(), "Sending");

        let requests = self.requests.clone();
        let sent_at = now_ms();
        tokio::spawn(async move {
            let outcome = requests.send(&package, sent_at).await;
            let _ = tx.send(Command::Delivered { package, outcome }).await;
        });
    }

    async fn on_delivered(&mut self, package: ActivityPackage, outcome: DeliveryOutcome) {
        let id = package.id();
        let description = package.describe();
        tracing::debug!(package = %description, outcome = outcome.label(), "Attempt finished");

        match outcome {
            DeliveryOutcome::Success(data) => {
                match self.packages.on_success(&id).await {
                    Ok(Some(_)) => {
                        tracing::info!(package = %description, "Package delivered");
                    }
                    Ok(None) => {
                        tracing::debug!(package = %description, "Outcome for dropped package ignored");
                        return;
                    }
                    Err(e) => {
                        tracing::error!(package = %description, error = %e, "Failed to persist queue");
                    }
                }
                if let Some(message) = &data.message {
                    tracing::debug!(package = %description, %message, "Collector message");
                }

                if package.kind() == ActivityKind::GdprForgetMe {
                    self.wipe().await;
                } else {
                    self.on_response(package.kind(), data).await;
                }
            }
            DeliveryOutcome::Retryable(reason) => {
                self.on_failure(package, true, &reason).await;
            }
            DeliveryOutcome::Permanent(reason) => {
                self.on_failure(package, false, &reason).await;
            }
        }
    }

    async fn on_failure(&mut self, package: ActivityPackage, retryable: bool, reason: &str) {
        let description = package.describe();

        match self.packages.on_failure(&package.id(), retryable).await {
            Ok(Some(FailureOutcome::Retry { retries })) => {
                tracing::warn!(package = %description, retries, %reason, "Delivery failed, will retry");
            }
            Ok(Some(FailureOutcome::Dropped { package })) => {
                tracing::warn!(
                    package = %description,
                    retries = package.retries(),
                    %reason,
                    "Delivery failed, package dropped"
                );
                if package.kind() == ActivityKind::GdprForgetMe {
                    // The collector will not take it; forget locally anyway.
                    self.wipe().await;
                }
            }
            Ok(None) => {
                tracing::debug!(package = %description, "Outcome for dropped package ignored");
            }
            Err(e) => {
                tracing::error!(package = %description, error = %e, "Failed to persist queue");
            }
        }
    }

    /// Act on a successful response: attribution and `ask_in` scheduling.
    async fn on_response(&mut self, kind: ActivityKind, data: ResponseData) {
        let mut state_changed = false;

        if let Some(update) = data.attribution {
            if let Err(e) = self.receive_attribution(update).await {
                tracing::error!(error = %e, "Failed to store attribution");
            }
            if self.state.ask_in_pending {
                self.state.ask_in_pending = false;
                self.ask_at = None;
                state_changed = true;
            }
        } else if let Some(delay) = data.ask_in {
            tracing::debug!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Attribution requested later"
            );
            self.ask_at = Some(Instant::now() + delay);
            if !self.state.ask_in_pending {
                self.state.ask_in_pending = true;
                state_changed = true;
            }
        } else if kind == ActivityKind::AttributionRequest && self.state.ask_in_pending {
            self.state.ask_in_pending = false;
            state_changed = true;
        }

        if state_changed {
            if let Err(e) = self.persist_state().await {
                tracing::error!(error = %e, "Failed to persist state");
            }
        }
    }

    /// The `ask_in` delay ran out: queue an attribution request.
    async fn ask_attribution(&mut self) {
        self.ask_at = None;
        if !self.lifecycle.accepts_tracking() {
            return;
        }

        let result = match build(
            &PackageRequest::AttributionRequest,
            &self.state,
            &self.context(now_ms()),
        ) {
            Ok(package) => self.packages.enqueue(package).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to queue attribution request");
        }
    }

    async fn on_timer(&mut self) {
        session::accrue(&mut self.state, now_ms());
        if let Err(e) = self.persist_state().await {
            tracing::error!(error = %e, "Failed to persist state");
        }
    }

    fn start_timer(&mut self) {
        let period = self.config.timer_interval();
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    /// Erase state, attribution and queue after a forget request went out.
    ///
    /// A tombstone state stays behind so the install remains disabled
    /// across restarts.
    async fn wipe(&mut self) {
        if let Err(e) = self.packages.wipe().await {
            tracing::error!(error = %e, "Failed to wipe queue");
        }
        if let Err(e) = self.storage.remove(ATTRIBUTION).await {
            tracing::error!(error = %e, "Failed to wipe attribution");
        }
        self.attribution.reset();
        self.attribution_tx.send_replace(None);
        self.ask_at = None;
        self.timer = None;

        let mut tombstone = ActivityState::new();
        tombstone.enabled = false;
        tombstone.gdpr_forgotten = true;
        tombstone.offline = self.state.offline;
        self.state = tombstone;
        if let Err(e) = self.persist_state().await {
            tracing::error!(error = %e, "Failed to persist state");
        }

        tracing::info!("Local data wiped");
    }

    fn context(&self, now: u64) -> BuildContext<'_> {
        BuildContext {
            app_token: &self.config.tracker.app_token,
            environment: self.config.tracker.environment,
            now,
        }
    }

    async fn persist_state(&self) -> Result<(), StorageError> {
        storage::store_record(self.storage.as_ref(), STATE, &self.state).await
    }

    /// Account foreground time and persist everything.
    async fn persist_all(&mut self) -> Result<(), TrackError> {
        if self.lifecycle.timer_running() {
            session::accrue(&mut self.state, now_ms());
        }
        self.timer = None;

        self.persist_state().await?;
        self.packages.flush().await?;
        if let Some(snapshot) = self.attribution.snapshot() {
            storage::store_record(self.storage.as_ref(), ATTRIBUTION, &snapshot).await?;
        }
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}
