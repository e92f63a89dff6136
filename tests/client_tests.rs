mod support;

use std::sync::Arc;
use std::time::Duration;

use lapse::auth::{
    AlwaysReachable, CredentialStore, MemoryCredentialStore, RefreshOutcome, RefreshState,
    SessionStore,
};
use lapse::config::LapseConfig;
use lapse::error::ErrorCategory;
use lapse::poll::{AppLifecycle, PollEventKind, ReservationStatus};
use lapse::SessionClient;

use support::{credential_expiring_in, event_log, settle, MockRefresher, ScriptedFetcher};

struct Fixture {
    client: SessionClient<ReservationStatus>,
    store: Arc<MemoryCredentialStore>,
    refresher: Arc<MockRefresher>,
    fetcher: Arc<ScriptedFetcher<ReservationStatus>>,
}

fn fixture(store: MemoryCredentialStore) -> Fixture {
    let store = Arc::new(store);
    let session = Arc::new(SessionStore::new().with_persistence(store.clone()));
    let refresher = Arc::new(MockRefresher::new());
    let fetcher = Arc::new(
        ScriptedFetcher::new(ReservationStatus::Pending)
            .then(ReservationStatus::Pending)
            .then(ReservationStatus::Confirmed)
            .then(ReservationStatus::Completed),
    );
    let client = SessionClient::new(
        LapseConfig::default(),
        session,
        refresher.clone(),
        Arc::new(AlwaysReachable),
        fetcher.clone(),
        Arc::new(AppLifecycle::foreground()),
    )
    .unwrap();
    Fixture {
        client,
        store,
        refresher,
        fetcher,
    }
}

#[tokio::test(start_paused = true)]
async fn start_session_persists_and_arms_renewal() {
    let f = fixture(MemoryCredentialStore::new());
    let credential = credential_expiring_in(3600, "r1");
    let session = f.client.start_session(credential.clone());

    assert_eq!(session.user_id.as_deref(), Some("user-1"));
    assert!(f.client.is_authenticated());
    assert_eq!(f.store.load().unwrap(), Some(credential));
    assert!(matches!(f.client.refresh_state(), RefreshState::ScheduledAt(_)));
}

#[tokio::test(start_paused = true)]
async fn end_session_clears_memory_and_storage() {
    let f = fixture(MemoryCredentialStore::new());
    f.client.start_session(credential_expiring_in(3600, "r1"));
    f.client.end_session();

    assert!(f.client.session().is_none());
    assert_eq!(f.store.load().unwrap(), None);
    assert!(!f.client.scheduler().has_pending_timer());

    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(f.refresher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn restore_session_uses_the_persisted_credential() {
    let saved = credential_expiring_in(-60, "persisted");
    let f = fixture(MemoryCredentialStore::with_credential(saved));

    assert!(f.client.restore_session().unwrap());
    settle().await;

    // Already expired, so renewal ran straight away and was written back.
    assert_eq!(f.refresher.refresh_tokens_seen(), vec!["persisted".to_string()]);
    assert_eq!(f.store.load().unwrap().unwrap().refresh_token, "refresh-1");
}

#[tokio::test(start_paused = true)]
async fn restore_without_saved_credential_starts_nothing() {
    let f = fixture(MemoryCredentialStore::new());
    assert!(!f.client.restore_session().unwrap());
    assert!(!f.client.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn refresh_credential_runs_on_demand() {
    let f = fixture(MemoryCredentialStore::new());
    f.client.start_session(credential_expiring_in(3600, "r1"));

    let outcome = f.client.refresh_credential().await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Refreshed);
    assert_eq!(f.client.session().unwrap().credential.refresh_token, "refresh-1");
}

#[tokio::test(start_paused = true)]
async fn watch_and_stop_through_the_client() {
    let f = fixture(MemoryCredentialStore::new());
    let (events, sink) = event_log();
    let client = f.client.with_poll_events(sink);

    let handle = client.watch("res-1", |_, _| {}).unwrap();
    settle().await;
    client.refresh_now(&handle).unwrap();
    settle().await;
    assert_eq!(f.fetcher.calls(), 2);

    client.stop_watching(handle);
    settle().await;
    assert!(!client.poller().is_watching("res-1"));
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| e.kind == PollEventKind::Stopped));
}

#[tokio::test(start_paused = true)]
async fn sign_out_listener_is_reachable_through_the_client() {
    let store = Arc::new(MemoryCredentialStore::new());
    let session = Arc::new(SessionStore::new().with_persistence(store.clone()));
    let refresher = Arc::new(MockRefresher::new().then(Err(
        lapse::auth::AuthError::CredentialRejected("revoked".into()),
    )));
    let client: SessionClient<ReservationStatus> = SessionClient::new(
        LapseConfig::default(),
        session,
        refresher,
        Arc::new(AlwaysReachable),
        Arc::new(ScriptedFetcher::new(ReservationStatus::Pending)),
        Arc::new(AppLifecycle::foreground()),
    )
    .unwrap();

    let reasons = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = reasons.clone();
    client.on_sign_out_required(move |notice| sink.lock().unwrap().push(notice.reason.clone()));
    client.start_session(credential_expiring_in(-1, "r1"));
    settle().await;

    assert_eq!(reasons.lock().unwrap().len(), 1);
    assert!(reasons.lock().unwrap()[0].contains("revoked"));
    assert_eq!(store.load().unwrap(), None);
    assert_eq!(client.refresh_state(), RefreshState::Failed);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let result = SessionClient::<ReservationStatus>::new(
        LapseConfig::default().with_base_interval(Duration::ZERO),
        Arc::new(SessionStore::new()),
        Arc::new(MockRefresher::new()),
        Arc::new(AlwaysReachable),
        Arc::new(ScriptedFetcher::new(ReservationStatus::Pending)),
        Arc::new(AppLifecycle::foreground()),
    );
    let err = result.err().expect("zero interval must be rejected");
    assert_eq!(err.category(), ErrorCategory::Configuration);
}
