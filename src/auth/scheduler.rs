//! Proactive credential renewal.
//!
//! [`RefreshScheduler`] keeps at most one pending timer per session. The
//! timer is a spawned task sleeping under a [`CancellationToken`]; every arm,
//! disarm and forced sign-out bumps a generation counter, and a firing timer
//! or a completing refresh whose generation is stale does nothing. That makes
//! teardown synchronous: once [`RefreshScheduler::disarm`] returns, no timer
//! can act and no in-flight refresh can write the session back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use strum::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backend::{CredentialRefresher, Reachability};
use super::claims;
use super::error::AuthError;
use super::session::SessionStore;
use super::token::{Credential, Session};
use crate::config::LapseConfig;
use crate::util::timeout::with_timeout;

/// Where the scheduler is in its renewal cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RefreshState {
    Idle,
    ScheduledAt(DateTime<Utc>),
    Refreshing,
    Failed,
}

/// What a single refresh attempt ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The session holds a new credential and the next renewal is armed.
    Refreshed,
    /// Another refresh was already in flight.
    Skipped,
    /// Network unavailable or a transient failure; a retry is armed.
    Deferred,
    /// The session was re-armed or ended while the refresh ran.
    Superseded,
    /// The refresh token was rejected and the session has been cleared.
    SignedOut,
}

/// Notice handed to sign-out listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutRequired {
    pub reason: String,
}

pub type SignOutCallback = Arc<dyn Fn(&SignOutRequired) + Send + Sync>;

/// Timing settings for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    pub buffer: Duration,
    pub network_retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self::from(&LapseConfig::default())
    }
}

impl From<&LapseConfig> for RefreshSettings {
    fn from(config: &LapseConfig) -> Self {
        Self {
            buffer: config.refresh_buffer,
            network_retry_delay: config.network_retry_delay,
            request_timeout: config.request_timeout,
        }
    }
}

/// Renews the session credential shortly before it expires.
///
/// Timer methods spawn onto the ambient Tokio runtime and must be called
/// from within one.
///
/// # Example
/// ```ignore
/// let scheduler = RefreshScheduler::new(settings, session, refresher, Arc::new(AlwaysReachable));
/// scheduler.on_sign_out_required(|notice| eprintln!("{}", notice.reason));
/// scheduler.start(credential);
/// ```
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    settings: RefreshSettings,
    session: Arc<SessionStore>,
    refresher: Arc<dyn CredentialRefresher>,
    reachability: Arc<dyn Reachability>,
    timer: Mutex<TimerSlot>,
    in_flight: AtomicBool,
    state_tx: watch::Sender<RefreshState>,
    sign_out: Mutex<Vec<SignOutCallback>>,
}

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    pending: Option<CancellationToken>,
}

impl TimerSlot {
    fn cancel_pending(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

/// Single-flight guard: held for the duration of one refresh.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefreshScheduler {
    pub fn new(
        settings: RefreshSettings,
        session: Arc<SessionStore>,
        refresher: Arc<dyn CredentialRefresher>,
        reachability: Arc<dyn Reachability>,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(RefreshState::Idle);
        Self {
            inner: Arc::new(Inner {
                settings,
                session,
                refresher,
                reachability,
                timer: Mutex::new(TimerSlot::default()),
                in_flight: AtomicBool::new(false),
                state_tx,
                sign_out: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.inner.settings
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    /// Install `credential` as the session and arm its renewal.
    pub fn start(&self, credential: Credential) -> Session {
        let mut timer = self.inner.lock_timer();
        let session = self.inner.session.set(credential.clone());
        self.inner.arm_locked(&mut timer, &credential, None);
        session
    }

    /// Schedule renewal of `credential`, replacing any pending timer.
    ///
    /// An expired or undecodable access token is renewed immediately.
    pub fn arm(&self, credential: &Credential) {
        let mut timer = self.inner.lock_timer();
        self.inner.arm_locked(&mut timer, credential, None);
    }

    /// Cancel any pending timer and return to `Idle`. The session is kept.
    pub fn disarm(&self) {
        let mut timer = self.inner.lock_timer();
        timer.cancel_pending();
        timer.generation += 1;
        self.inner.state_tx.send_replace(RefreshState::Idle);
    }

    /// Disarm and clear the session.
    pub fn end(&self) {
        self.disarm();
        if self.inner.session.clear() {
            info!("Session ended");
        }
    }

    /// Run one refresh now, outside the timer.
    ///
    /// Shares the single-flight guard with the timer: if a refresh is already
    /// running this returns [`RefreshOutcome::Skipped`] without a second
    /// outbound call.
    pub async fn refresh_now(&self) -> Result<RefreshOutcome, AuthError> {
        let generation = self.inner.lock_timer().generation;
        self.inner.refresh(generation).await
    }

    /// Register a listener for forced sign-out.
    pub fn on_sign_out_required(&self, callback: impl Fn(&SignOutRequired) + Send + Sync + 'static) {
        lock(&self.inner.sign_out).push(Arc::new(callback));
    }

    pub fn state(&self) -> RefreshState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RefreshState> {
        self.inner.state_tx.subscribe()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.inner.lock_timer().pending.is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        let mut timer = self.inner.lock_timer();
        timer.cancel_pending();
        timer.generation += 1;
    }
}

impl Inner {
    fn lock_timer(&self) -> MutexGuard<'_, TimerSlot> {
        lock(&self.timer)
    }

    /// Arm the renewal timer. `floor` bounds the delay from below; it is set
    /// after a successful refresh so a server handing out already-due tokens
    /// cannot drive a tight loop. A renewed token that is still live is never
    /// held past half its remaining lifetime, whatever the floor.
    fn arm_locked(self: &Arc<Self>, timer: &mut TimerSlot, credential: &Credential, floor: Option<Duration>) {
        timer.cancel_pending();
        timer.generation += 1;

        let now = Utc::now();
        let decoded = claims::decode(&credential.access_token);
        let mut delay = match &decoded {
            Ok(decoded) if decoded.is_expired(now) => {
                info!("Access token already expired; refreshing immediately");
                Duration::ZERO
            }
            Ok(decoded) => decoded.time_until_refresh(now, self.settings.buffer),
            Err(e) => {
                warn!(error = %e, "Access token could not be decoded; refreshing immediately");
                Duration::ZERO
            }
        };
        if let Some(floor) = floor {
            match &decoded {
                Ok(decoded) if !decoded.is_expired(now) => {
                    let remaining = decoded.time_until_expiry(now).to_std().unwrap_or_default();
                    let floor = floor.min(remaining / 2);
                    if delay < floor {
                        debug!(
                            delay_ms = floor.as_millis() as u64,
                            "Refreshed credential is short-lived; renewing at half its lifetime"
                        );
                        delay = floor;
                    }
                }
                _ if delay < floor => {
                    warn!(
                        delay_ms = floor.as_millis() as u64,
                        "Refreshed credential is already due; backing off"
                    );
                    delay = floor;
                }
                _ => {}
            }
        }

        let due = TimeDelta::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        debug!(delay_ms = delay.as_millis() as u64, due = %due, "Credential refresh scheduled");
        self.state_tx.send_replace(RefreshState::ScheduledAt(due));
        self.spawn_timer(timer, delay);
    }

    fn spawn_timer(self: &Arc<Self>, timer: &mut TimerSlot, delay: Duration) {
        let token = CancellationToken::new();
        timer.pending = Some(token.clone());
        let generation = timer.generation;
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.on_timer(generation).await,
            }
        });
    }

    async fn on_timer(self: &Arc<Self>, generation: u64) {
        {
            let mut timer = self.lock_timer();
            if timer.generation != generation {
                return;
            }
            timer.pending = None;
        }
        match self.refresh(generation).await {
            Ok(RefreshOutcome::Skipped) => {
                // The refresh in flight may belong to a stale generation and
                // never re-arm; keep a retry pending until something does.
                let mut timer = self.lock_timer();
                if timer.generation == generation && timer.pending.is_none() {
                    self.spawn_timer(&mut timer, self.settings.network_retry_delay);
                }
            }
            Ok(outcome) => debug!(?outcome, "Scheduled refresh finished"),
            Err(e) => {
                debug!(error = %e, "Scheduled refresh found no session");
                self.set_state_if_current(generation, RefreshState::Idle);
            }
        }
    }

    async fn refresh(self: &Arc<Self>, generation: u64) -> Result<RefreshOutcome, AuthError> {
        let Some(_flight) = InFlight::acquire(&self.in_flight) else {
            debug!("Credential refresh already in flight; skipping");
            return Ok(RefreshOutcome::Skipped);
        };
        let credential = self.session.credential().ok_or(AuthError::NotLoggedIn)?;

        if !self.reachability.is_reachable().await {
            warn!(
                retry_in_ms = self.settings.network_retry_delay.as_millis() as u64,
                "Network unreachable; deferring credential refresh"
            );
            return Ok(self.defer(generation));
        }
        if !self.set_state_if_current(generation, RefreshState::Refreshing) {
            return Ok(RefreshOutcome::Superseded);
        }

        let result = with_timeout(
            self.settings.request_timeout,
            self.refresher.refresh(&credential.refresh_token),
        )
        .await;

        match result {
            Ok(renewed) => {
                let mut timer = self.lock_timer();
                if timer.generation != generation {
                    debug!("Session changed during refresh; discarding new credential");
                    return Ok(RefreshOutcome::Superseded);
                }
                self.session.set(renewed.clone());
                info!("Credential refreshed");
                self.arm_locked(&mut timer, &renewed, Some(self.settings.network_retry_delay));
                Ok(RefreshOutcome::Refreshed)
            }
            Err(e) if e.is_fatal() => Ok(self.fail(generation, &e)),
            Err(e) => {
                warn!(error = %e, "Credential refresh failed; will retry");
                Ok(self.defer(generation))
            }
        }
    }

    fn defer(self: &Arc<Self>, generation: u64) -> RefreshOutcome {
        let mut timer = self.lock_timer();
        if timer.generation != generation {
            return RefreshOutcome::Superseded;
        }
        timer.cancel_pending();
        self.state_tx.send_replace(RefreshState::Idle);
        self.spawn_timer(&mut timer, self.settings.network_retry_delay);
        RefreshOutcome::Deferred
    }

    fn fail(&self, generation: u64, cause: &AuthError) -> RefreshOutcome {
        {
            let mut timer = self.lock_timer();
            if timer.generation != generation {
                return RefreshOutcome::Superseded;
            }
            timer.cancel_pending();
            timer.generation += 1;
            self.state_tx.send_replace(RefreshState::Failed);
        }
        self.session.clear();
        error!(error = %cause, "Refresh token rejected; sign-out required");

        let notice = SignOutRequired {
            reason: cause.to_string(),
        };
        let listeners = lock(&self.sign_out).clone();
        for listener in listeners {
            listener(&notice);
        }
        RefreshOutcome::SignedOut
    }

    fn set_state_if_current(&self, generation: u64, state: RefreshState) -> bool {
        let timer = self.lock_timer();
        if timer.generation != generation {
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let first = InFlight::acquire(&flag).expect("first acquire");
        assert!(InFlight::acquire(&flag).is_none());
        drop(first);
        assert!(InFlight::acquire(&flag).is_some());
    }

    #[test]
    fn settings_follow_config() {
        let config = LapseConfig::default()
            .with_refresh_buffer(Duration::from_secs(30))
            .with_network_retry_delay(Duration::from_secs(5));
        let settings = RefreshSettings::from(&config);
        assert_eq!(settings.buffer, Duration::from_secs(30));
        assert_eq!(settings.network_retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn cancelling_the_slot_clears_the_pending_token() {
        let mut slot = TimerSlot::default();
        let token = CancellationToken::new();
        slot.pending = Some(token.clone());
        slot.cancel_pending();
        assert!(token.is_cancelled());
        assert!(slot.pending.is_none());
    }
}
