//! `lapse watch`.

use std::sync::Arc;

use crate::auth::{Credential, SessionStore};
use crate::cli::WatchArgs;
use crate::config::LapseConfig;
use crate::poll::{
    AppLifecycle, PollEventKind, PollerSettings, ReservationStatus, StatusPoller,
};
use crate::transport::HttpStatusFetcher;

/// Handle `lapse watch <RESOURCE_ID>`.
pub async fn handle_watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => LapseConfig::load(path)?,
        None => LapseConfig::from_env()?,
    };

    let session = Arc::new(SessionStore::new());
    if let Some(token) = args.token {
        session.set(Credential::new(token, ""));
    }

    let fetcher = HttpStatusFetcher::<ReservationStatus>::builder()
        .base_url(args.url)
        .session(Arc::clone(&session))
        .timeout(config.request_timeout)
        .build();
    let poller = StatusPoller::new(
        PollerSettings::from(&config),
        Arc::new(fetcher),
        Arc::new(AppLifecycle::foreground()),
    )
    .with_event_sink(|event| match event.kind {
        PollEventKind::Fetched { status } if event.attempt == 0 => {
            println!("{}: {status}", event.resource_id);
        }
        PollEventKind::FetchFailed { error } => {
            eprintln!("{}: fetch #{} failed: {error}", event.resource_id, event.attempt);
        }
        _ => {}
    });

    let handle = poller.watch(args.resource_id.as_str(), |from, to| {
        println!("{from} -> {to}");
    })?;

    tokio::select! {
        _ = handle.finished() => {}
        _ = tokio::signal::ctrl_c() => handle.stop(),
    }

    let last = handle.snapshot();
    match last.last_known_status {
        Some(status) => println!(
            "{}: {status} after {} attempts",
            last.resource_id, last.attempt_count
        ),
        None => println!("{}: no status observed", last.resource_id),
    }
    Ok(())
}
