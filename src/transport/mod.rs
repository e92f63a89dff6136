//! HTTP implementations of the refresh, status and reachability collaborators.

pub mod http;

pub use http::{HttpReachability, HttpRefresher, HttpStatusFetcher};
