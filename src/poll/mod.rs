//! Adaptive polling of a remote resource's status.

pub mod backoff;
pub mod error;
pub mod fetcher;
pub mod lifecycle;
pub mod poller;
pub mod status;

pub use backoff::BackoffSchedule;
pub use error::{FetchError, PollError};
pub use fetcher::{StatusFetcher, StatusReport};
pub use lifecycle::{AppLifecycle, AppState, LifecycleSource};
pub use poller::{
    PollEvent, PollEventKind, PollEventSink, PollSession, PollerSettings, StatusPoller,
    TransitionCallback, WatchHandle,
};
pub use status::{ReservationStatus, StatusValue};
