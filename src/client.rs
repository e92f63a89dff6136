//! Application-facing surface tying the session, its renewal and resource
//! watches together.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::auth::{
    AuthError, Credential, CredentialRefresher, Reachability, RefreshOutcome, RefreshScheduler,
    RefreshSettings, RefreshState, Session, SessionStore, SignOutRequired,
};
use crate::config::LapseConfig;
use crate::error::LapseError;
use crate::poll::{
    LifecycleSource, PollError, PollEvent, PollerSettings, StatusFetcher, StatusPoller,
    StatusValue, WatchHandle,
};

/// One authenticated client: its session, the scheduler renewing it, and a
/// poller for resources it waits on.
///
/// # Example
/// ```ignore
/// let session = Arc::new(SessionStore::new());
/// let client = SessionClient::new(
///     LapseConfig::from_env()?,
///     Arc::clone(&session),
///     refresher,
///     Arc::new(AlwaysReachable),
///     fetcher,
///     lifecycle,
/// )?;
/// client.on_sign_out_required(|_| show_login());
/// client.start_session(credential);
/// let handle = client.watch("res-42", |from, to| println!("{from} -> {to}"))?;
/// ```
pub struct SessionClient<S: StatusValue> {
    config: LapseConfig,
    scheduler: RefreshScheduler,
    poller: StatusPoller<S>,
}

impl<S: StatusValue> SessionClient<S> {
    /// Build a client. Fails if `config` does not validate.
    pub fn new(
        config: LapseConfig,
        session: Arc<SessionStore>,
        refresher: Arc<dyn CredentialRefresher>,
        reachability: Arc<dyn Reachability>,
        fetcher: Arc<dyn StatusFetcher<S>>,
        lifecycle: Arc<dyn LifecycleSource>,
    ) -> Result<Self, LapseError> {
        config.validate()?;
        let scheduler = RefreshScheduler::new(
            RefreshSettings::from(&config),
            session,
            refresher,
            reachability,
        );
        let poller = StatusPoller::new(PollerSettings::from(&config), fetcher, lifecycle);
        Ok(Self {
            config,
            scheduler,
            poller,
        })
    }

    /// Forward every poll event to `sink`.
    pub fn with_poll_events(mut self, sink: impl Fn(PollEvent<S>) + Send + Sync + 'static) -> Self {
        self.poller = self.poller.with_event_sink(sink);
        self
    }

    pub fn config(&self) -> &LapseConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn poller(&self) -> &StatusPoller<S> {
        &self.poller
    }

    pub fn session_store(&self) -> &Arc<SessionStore> {
        self.scheduler.session()
    }

    /// Adopt `credential` and arm its renewal.
    pub fn start_session(&self, credential: Credential) -> Session {
        let session = self.scheduler.start(credential);
        info!(user_id = ?session.user_id, "Session started");
        session
    }

    /// Cancel pending renewal and clear the session. Resource watches are
    /// left running.
    pub fn end_session(&self) {
        self.scheduler.end();
    }

    /// Start a session from the persisted credential, if there is one.
    pub fn restore_session(&self) -> Result<bool, LapseError> {
        let Some(store) = self.session_store().persistence() else {
            return Ok(false);
        };
        match store.load()? {
            Some(credential) => {
                self.start_session(credential);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Renew the credential now, sharing the scheduler's single-flight guard.
    pub async fn refresh_credential(&self) -> Result<RefreshOutcome, AuthError> {
        self.scheduler.refresh_now().await
    }

    pub fn on_sign_out_required(&self, callback: impl Fn(&SignOutRequired) + Send + Sync + 'static) {
        self.scheduler.on_sign_out_required(callback);
    }

    pub fn session(&self) -> Option<Session> {
        self.session_store().get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_store().is_authenticated()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.scheduler.state()
    }

    pub fn watch_refresh_state(&self) -> watch::Receiver<RefreshState> {
        self.scheduler.watch_state()
    }

    /// Watch `resource_id` until it reaches a terminal status.
    pub fn watch(
        &self,
        resource_id: impl Into<String>,
        on_transition: impl Fn(&S, &S) + Send + Sync + 'static,
    ) -> Result<WatchHandle<S>, PollError> {
        self.poller.watch(resource_id, on_transition)
    }

    pub fn stop_watching(&self, handle: WatchHandle<S>) {
        handle.stop();
    }

    pub fn refresh_now(&self, handle: &WatchHandle<S>) -> Result<(), PollError> {
        handle.refresh_now()
    }
}
