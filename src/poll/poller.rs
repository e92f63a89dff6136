//! Adaptive status polling.
//!
//! Each watch runs one driver task that owns its [`PollSession`]. The task
//! is the only thing that fetches, so there is never more than one fetch in
//! flight per resource and never more than one pending deadline. Stopping
//! cancels the task's token; anything the task observes after that point is
//! discarded without notifying.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backoff::BackoffSchedule;
use super::error::{FetchError, PollError};
use super::fetcher::StatusFetcher;
use super::lifecycle::{AppState, LifecycleSource};
use super::status::StatusValue;
use crate::config::LapseConfig;
use crate::util::timeout::with_timeout;

/// Called with `(previous, current)` whenever a fetched status differs from
/// the last one seen.
pub type TransitionCallback<S> = Arc<dyn Fn(&S, &S) + Send + Sync>;

/// Receives every observable step of every watch on a poller.
pub type PollEventSink<S> = Arc<dyn Fn(PollEvent<S>) + Send + Sync>;

/// Polling timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    pub base_interval: Duration,
    pub backoff: BackoffSchedule,
    pub request_timeout: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&LapseConfig::default())
    }
}

impl From<&LapseConfig> for PollerSettings {
    fn from(config: &LapseConfig) -> Self {
        Self {
            base_interval: config.base_interval,
            backoff: config.backoff.clone(),
            request_timeout: config.request_timeout,
        }
    }
}

/// Observable state of one watched resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSession<S> {
    pub resource_id: String,
    /// Fetches attempted since the watch started or was last refreshed by hand.
    pub attempt_count: u32,
    pub last_known_status: Option<S>,
    /// Delay that applies before the next scheduled fetch.
    pub current_interval: Duration,
    pub is_active: bool,
    pub is_paused_by_background: bool,
}

impl<S> PollSession<S> {
    fn new(resource_id: String, interval: Duration) -> Self {
        Self {
            resource_id,
            attempt_count: 0,
            last_known_status: None,
            current_interval: interval,
            is_active: true,
            is_paused_by_background: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollEvent<S> {
    pub resource_id: String,
    /// Attempt number the event belongs to.
    pub attempt: u32,
    pub kind: PollEventKind<S>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEventKind<S> {
    Fetched { status: S },
    Transition { from: S, to: S },
    FetchFailed { error: FetchError },
    Paused,
    Resumed,
    Terminal { status: S },
    Stopped,
}

/// Roughly 30 years: where an unrepresentable deadline is parked.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + delay`, saturating instead of overflowing `Instant`.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

type Registry = Arc<Mutex<HashMap<String, Uuid>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<String, Uuid>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn release(registry: &Registry, resource_id: &str, id: Uuid) {
    let mut active = lock_registry(registry);
    if active.get(resource_id) == Some(&id) {
        active.remove(resource_id);
    }
}

enum PollCommand {
    RefreshNow,
}

/// Watches resources until they reach a terminal status.
///
/// # Example
/// ```ignore
/// let poller = StatusPoller::new(PollerSettings::default(), fetcher, lifecycle);
/// let handle = poller.watch("res-42", |from, to| println!("{from:?} -> {to:?}"))?;
/// handle.refresh_now()?;
/// handle.stop();
/// ```
pub struct StatusPoller<S: StatusValue> {
    settings: PollerSettings,
    fetcher: Arc<dyn StatusFetcher<S>>,
    lifecycle: Arc<dyn LifecycleSource>,
    events: Option<PollEventSink<S>>,
    registry: Registry,
}

impl<S: StatusValue> Clone for StatusPoller<S> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            fetcher: Arc::clone(&self.fetcher),
            lifecycle: Arc::clone(&self.lifecycle),
            events: self.events.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: StatusValue> StatusPoller<S> {
    pub fn new(
        settings: PollerSettings,
        fetcher: Arc<dyn StatusFetcher<S>>,
        lifecycle: Arc<dyn LifecycleSource>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            lifecycle,
            events: None,
            registry: Arc::default(),
        }
    }

    pub fn with_event_sink(mut self, sink: impl Fn(PollEvent<S>) + Send + Sync + 'static) -> Self {
        self.events = Some(Arc::new(sink));
        self
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub fn is_watching(&self, resource_id: &str) -> bool {
        lock_registry(&self.registry).contains_key(resource_id)
    }

    pub fn active_count(&self) -> usize {
        lock_registry(&self.registry).len()
    }

    /// Start watching `resource_id`. The first fetch happens immediately.
    ///
    /// Fails with [`PollError::AlreadyWatching`] if a live watch on the same
    /// resource exists on this poller. Must be called from within a Tokio
    /// runtime.
    pub fn watch(
        &self,
        resource_id: impl Into<String>,
        on_transition: impl Fn(&S, &S) + Send + Sync + 'static,
    ) -> Result<WatchHandle<S>, PollError> {
        let resource_id = resource_id.into();
        let id = Uuid::new_v4();
        {
            let mut active = lock_registry(&self.registry);
            if active.contains_key(&resource_id) {
                return Err(PollError::AlreadyWatching(resource_id));
            }
            active.insert(resource_id.clone(), id);
        }

        let cancel = CancellationToken::new();
        // One queued request is enough: extras collapse into it.
        let (commands_tx, commands_rx) = mpsc::channel(1);
        let (session_tx, session_rx) = watch::channel(PollSession::new(
            resource_id.clone(),
            self.settings.base_interval,
        ));
        let session_tx = Arc::new(session_tx);

        let driver = PollDriver {
            id,
            session: PollSession::new(resource_id.clone(), self.settings.base_interval),
            settings: self.settings.clone(),
            fetcher: Arc::clone(&self.fetcher),
            lifecycle: self.lifecycle.subscribe(),
            lifecycle_open: true,
            on_transition: Arc::new(on_transition),
            events: self.events.clone(),
            cancel: cancel.clone(),
            commands: commands_rx,
            publish: Arc::clone(&session_tx),
            registry: Arc::clone(&self.registry),
        };
        info!(resource_id = %resource_id, watch_id = %id, "Watching resource status");
        tokio::spawn(driver.run());

        Ok(WatchHandle {
            id,
            resource_id,
            cancel,
            commands: commands_tx,
            session_tx,
            session: session_rx,
            registry: Arc::clone(&self.registry),
        })
    }
}

/// Handle to one live watch. Dropping it stops the watch.
pub struct WatchHandle<S: StatusValue> {
    id: Uuid,
    resource_id: String,
    cancel: CancellationToken,
    commands: mpsc::Sender<PollCommand>,
    session_tx: Arc<watch::Sender<PollSession<S>>>,
    session: watch::Receiver<PollSession<S>>,
    registry: Registry,
}

impl<S: StatusValue> WatchHandle<S> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn snapshot(&self) -> PollSession<S> {
        self.session.borrow().clone()
    }

    pub fn watch_session(&self) -> watch::Receiver<PollSession<S>> {
        self.session.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.session.borrow().is_active
    }

    /// Reset the backoff and fetch now, whatever the pending deadline.
    ///
    /// Requests made while a fetch is in flight are answered by that fetch,
    /// and requests already queued collapse into one.
    pub fn refresh_now(&self) -> Result<(), PollError> {
        if !self.is_active() {
            return Err(PollError::NotActive(self.resource_id.clone()));
        }
        match self.commands.try_send(PollCommand::RefreshNow) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(PollError::NotActive(self.resource_id.clone())),
        }
    }

    /// Stop watching. Takes effect before this returns: no fetch is started
    /// and no callback fires for this watch afterwards.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.session_tx.send_modify(|session| {
            session.is_active = false;
            session.is_paused_by_background = false;
        });
        release(&self.registry, &self.resource_id, self.id);
        info!(resource_id = %self.resource_id, watch_id = %self.id, "Stopped watching resource");
    }

    /// Resolve once the watch has ended, by [`stop`](Self::stop) or a
    /// terminal status.
    pub async fn finished(&self) {
        let mut session = self.session.clone();
        // The sender lives as long as this handle, so this only returns on inactivity.
        let _ = session.wait_for(|session| !session.is_active).await;
    }
}

impl<S: StatusValue> Drop for WatchHandle<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: StatusValue> std::fmt::Debug for WatchHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id)
            .field("resource_id", &self.resource_id)
            .field("active", &self.is_active())
            .finish()
    }
}

struct PollDriver<S: StatusValue> {
    id: Uuid,
    session: PollSession<S>,
    settings: PollerSettings,
    fetcher: Arc<dyn StatusFetcher<S>>,
    lifecycle: watch::Receiver<AppState>,
    lifecycle_open: bool,
    on_transition: TransitionCallback<S>,
    events: Option<PollEventSink<S>>,
    cancel: CancellationToken,
    commands: mpsc::Receiver<PollCommand>,
    publish: Arc<watch::Sender<PollSession<S>>>,
    registry: Registry,
}

impl<S: StatusValue> PollDriver<S> {
    async fn run(mut self) {
        let mut next_fetch = self.fetch_and_plan().await;

        while self.session.is_active && !self.cancel.is_cancelled() {
            let deadline = next_fetch;
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(PollCommand::RefreshNow) => {
                        debug!(resource_id = %self.session.resource_id, "Manual status refresh");
                        self.session.attempt_count = 0;
                        next_fetch = self.fetch_and_plan().await;
                    }
                    None => break,
                },
                changed = self.lifecycle.changed(), if self.lifecycle_open => {
                    if changed.is_err() {
                        self.lifecycle_open = false;
                        continue;
                    }
                    let state = *self.lifecycle.borrow_and_update();
                    if state == AppState::Foreground && self.session.is_paused_by_background {
                        self.session.is_paused_by_background = false;
                        info!(resource_id = %self.session.resource_id, "Foregrounded; resuming status polling");
                        self.emit(PollEventKind::Resumed);
                        next_fetch = self.fetch_and_plan().await;
                    }
                }
                _ = timer => {
                    next_fetch = if self.in_foreground() {
                        self.fetch_and_plan().await
                    } else {
                        self.pause()
                    };
                }
            }
        }

        self.finish();
    }

    /// Fetch once, react to the result, and return when to fetch next.
    async fn fetch_and_plan(&mut self) -> Option<Instant> {
        let attempt = self.session.attempt_count;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = with_timeout(
                self.settings.request_timeout,
                self.fetcher.fetch_status(&self.session.resource_id),
            ) => result,
        };
        if self.cancel.is_cancelled() {
            return None;
        }
        let attempt = if self.take_refresh_requests() { 0 } else { attempt };

        match result {
            Ok(report) => {
                let status = report.status;
                self.emit(PollEventKind::Fetched {
                    status: status.clone(),
                });
                let previous = self.session.last_known_status.replace(status.clone());
                if let Some(previous) = previous.filter(|previous| *previous != status) {
                    info!(
                        resource_id = %self.session.resource_id,
                        from = ?previous,
                        to = ?status,
                        "Resource status changed"
                    );
                    (self.on_transition)(&previous, &status);
                    self.emit(PollEventKind::Transition {
                        from: previous,
                        to: status.clone(),
                    });
                }
                if status.is_terminal() {
                    info!(
                        resource_id = %self.session.resource_id,
                        status = ?status,
                        "Resource reached a terminal status; polling stopped"
                    );
                    self.session.is_active = false;
                    self.session.is_paused_by_background = false;
                    self.publish();
                    self.emit(PollEventKind::Terminal { status });
                    return None;
                }
            }
            Err(error) => {
                warn!(
                    resource_id = %self.session.resource_id,
                    attempt,
                    error = %error,
                    "Status fetch failed; keeping schedule"
                );
                self.emit(PollEventKind::FetchFailed { error });
            }
        }

        self.session.attempt_count = attempt.saturating_add(1);
        self.session.current_interval = self
            .settings
            .backoff
            .interval_for(self.settings.base_interval, self.session.attempt_count);

        if self.in_foreground() {
            self.session.is_paused_by_background = false;
            debug!(
                resource_id = %self.session.resource_id,
                attempt = self.session.attempt_count,
                next_in_ms = self.session.current_interval.as_millis() as u64,
                "Next status fetch scheduled"
            );
            self.publish();
            Some(deadline_after(self.session.current_interval))
        } else {
            self.pause()
        }
    }

    /// Drop refresh requests that arrived while a fetch was running. Returns
    /// whether there were any.
    fn take_refresh_requests(&mut self) -> bool {
        let mut any = false;
        while let Ok(PollCommand::RefreshNow) = self.commands.try_recv() {
            any = true;
        }
        if any {
            debug!(resource_id = %self.session.resource_id, "Refresh requested during fetch; answered by it");
        }
        any
    }

    fn pause(&mut self) -> Option<Instant> {
        if !self.session.is_paused_by_background {
            self.session.is_paused_by_background = true;
            info!(resource_id = %self.session.resource_id, "Backgrounded; status polling paused");
            self.emit(PollEventKind::Paused);
        }
        self.publish();
        None
    }

    fn in_foreground(&self) -> bool {
        *self.lifecycle.borrow() == AppState::Foreground
    }

    /// Mirror the session to handles unless the watch has been stopped.
    /// Runs under the channel lock, so it cannot overwrite a concurrent stop.
    fn publish(&self) {
        let cancel = &self.cancel;
        let session = &self.session;
        self.publish.send_if_modified(|current| {
            if cancel.is_cancelled() {
                return false;
            }
            *current = session.clone();
            true
        });
    }

    fn emit(&self, kind: PollEventKind<S>) {
        if let Some(sink) = &self.events {
            sink(PollEvent {
                resource_id: self.session.resource_id.clone(),
                attempt: self.session.attempt_count,
                kind,
            });
        }
    }

    fn finish(self) {
        release(&self.registry, &self.session.resource_id, self.id);
        if self.cancel.is_cancelled() {
            self.emit(PollEventKind::Stopped);
        }
        debug!(resource_id = %self.session.resource_id, watch_id = %self.id, "Poll driver exited");
    }
}
