//! Watched-resource status values.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A status the poller can watch.
///
/// The only thing the poller needs from the domain is whether a status is
/// terminal: once one is observed, nothing further is fetched.
pub trait StatusValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    fn is_terminal(&self) -> bool;
}

/// Lifecycle of a reservation awaiting confirmation.
///
/// # Example
/// ```
/// use lapse::poll::{ReservationStatus, StatusValue};
///
/// let status: ReservationStatus = "CONFIRMED".parse().unwrap();
/// assert_eq!(status, ReservationStatus::Confirmed);
/// assert!(!status.is_terminal());
/// assert!(ReservationStatus::Cancelled.is_terminal());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case", try_from = "String")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ReservationStatus {
    Pending,
    AwaitingPayment,
    Confirmed,
    CheckedIn,
    Completed,
    Rejected,
    Cancelled,
    Expired,
}

impl StatusValue for ReservationStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::Cancelled | Self::Expired
        )
    }
}

impl TryFrom<String> for ReservationStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.trim().parse()
    }
}
