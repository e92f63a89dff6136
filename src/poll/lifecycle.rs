//! Host application foreground/background signal.

use strum::{Display, EnumString};
use tokio::sync::watch;

/// Whether the host application is the active, user-visible process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AppState {
    Foreground,
    Background,
}

/// Source of lifecycle changes a poller subscribes to for as long as it
/// watches. Dropping the receiver unsubscribes.
pub trait LifecycleSource: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<AppState>;
}

/// Lifecycle signal driven by the embedding application.
///
/// # Example
/// ```
/// use lapse::poll::{AppLifecycle, AppState};
///
/// let lifecycle = AppLifecycle::foreground();
/// lifecycle.enter_background();
/// assert_eq!(lifecycle.current(), AppState::Background);
/// ```
#[derive(Debug)]
pub struct AppLifecycle {
    tx: watch::Sender<AppState>,
}

impl AppLifecycle {
    pub fn new(initial: AppState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn foreground() -> Self {
        Self::new(AppState::Foreground)
    }

    /// Record a lifecycle change. Subscribers are only woken when the state
    /// actually differs. Returns whether it did.
    pub fn set(&self, state: AppState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    pub fn enter_foreground(&self) -> bool {
        self.set(AppState::Foreground)
    }

    pub fn enter_background(&self) -> bool {
        self.set(AppState::Background)
    }

    pub fn current(&self) -> AppState {
        *self.tx.borrow()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::foreground()
    }
}

impl LifecycleSource for AppLifecycle {
    fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }
}
