#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use lapse::auth::{AuthError, Credential, CredentialRefresher, Reachability};
use lapse::poll::{FetchError, PollEvent, StatusFetcher, StatusReport, StatusValue};
use serde_json::{json, Value};
use tokio::time::Instant;

/// Build an unsigned JWT-shaped token around `claims`.
pub fn mint(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// Token whose `exp` is `secs` from the wall clock (negative for the past).
pub fn token_expiring_in(secs: i64) -> String {
    mint(json!({ "sub": "user-1", "exp": Utc::now().timestamp() + secs }))
}

pub fn credential_expiring_in(secs: i64, refresh_token: &str) -> Credential {
    Credential::new(token_expiring_in(secs), refresh_token)
}

/// Let spawned tasks run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Refresher that answers from a script, then with fresh credentials.
pub struct MockRefresher {
    script: Mutex<VecDeque<Result<Credential, AuthError>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    delay: Duration,
    renew_for_secs: i64,
}

impl MockRefresher {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            renew_for_secs: 3600,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Lifetime of the credentials handed out once the script runs dry.
    pub fn renewing_for(mut self, secs: i64) -> Self {
        self.renew_for_secs = secs;
        self
    }

    pub fn then(self, result: Result<Credential, AuthError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialRefresher for MockRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(refresh_token.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(credential_expiring_in(
                self.renew_for_secs,
                &format!("refresh-{call}"),
            ))
        })
    }
}

/// Reachability the test flips by hand.
pub struct ToggleReachability(AtomicBool);

impl ToggleReachability {
    pub fn new(reachable: bool) -> Self {
        Self(AtomicBool::new(reachable))
    }

    pub fn set(&self, reachable: bool) {
        self.0.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Reachability for ToggleReachability {
    async fn is_reachable(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fetcher that answers from a script, then repeats `fallback`.
pub struct ScriptedFetcher<S> {
    script: Mutex<VecDeque<Result<S, FetchError>>>,
    fallback: S,
    calls: Mutex<Vec<Instant>>,
    delay: Duration,
}

impl<S: StatusValue> ScriptedFetcher<S> {
    pub fn new(fallback: S) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then(self, status: S) -> Self {
        self.script.lock().unwrap().push_back(Ok(status));
        self
    }

    pub fn then_fail(self, error: FetchError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Gaps between consecutive fetch starts.
    pub fn intervals(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

#[async_trait]
impl<S: StatusValue> StatusFetcher<S> for ScriptedFetcher<S> {
    async fn fetch_status(&self, _resource_id: &str) -> Result<StatusReport<S>, FetchError> {
        self.calls.lock().unwrap().push(Instant::now());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted
            .unwrap_or_else(|| Ok(self.fallback.clone()))
            .map(StatusReport::new)
    }
}

/// Shared log of `(from, to)` transitions and a callback appending to it.
pub fn transition_log<S: StatusValue>() -> (Arc<Mutex<Vec<(S, S)>>>, impl Fn(&S, &S) + Send + Sync + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |from: &S, to: &S| {
        sink.lock().unwrap().push((from.clone(), to.clone()))
    })
}

/// Shared log of poll events and a sink appending to it.
pub fn event_log<S: StatusValue>() -> (Arc<Mutex<Vec<PollEvent<S>>>>, impl Fn(PollEvent<S>) + Send + Sync + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |event: PollEvent<S>| sink.lock().unwrap().push(event))
}
