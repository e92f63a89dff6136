//! Lapse — expiring credentials and slow-moving resources
//!
//! Keeps a client's bearer credential fresh by renewing it shortly before the
//! expiry embedded in the token, and watches a remote resource's status with
//! a staged backoff that pauses while the host application is backgrounded.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lapse::prelude::*;
//! use lapse::transport::{HttpRefresher, HttpStatusFetcher};
//!
//! # async fn example(credential: Credential) -> lapse::error::Result<()> {
//! let config = LapseConfig::from_env()?;
//! let session = Arc::new(SessionStore::new());
//! let refresher = HttpRefresher::builder()
//!     .refresh_url("https://auth.example.com/token/refresh")
//!     .build();
//! let fetcher = HttpStatusFetcher::<ReservationStatus>::builder()
//!     .base_url("https://api.example.com/reservations")
//!     .session(Arc::clone(&session))
//!     .build();
//!
//! let client = SessionClient::<ReservationStatus>::new(
//!     config,
//!     session,
//!     Arc::new(refresher),
//!     Arc::new(AlwaysReachable),
//!     Arc::new(fetcher),
//!     Arc::new(AppLifecycle::foreground()),
//! )?;
//! client.on_sign_out_required(|notice| eprintln!("sign in again: {}", notice.reason));
//! client.start_session(credential);
//!
//! let handle = client.watch("res-42", |from, to| println!("{from} -> {to}"))?;
//! handle.finished().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod poll;
pub mod prelude;
pub mod transport;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use client::SessionClient;
pub use config::LapseConfig;
pub use error::{LapseError, Result};
