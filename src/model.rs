//! Core domain documents for the booking and credit-ledger engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Credits;

/// Account (user) identifier.
pub type UserId = Uuid;

/// Skill offer identifier.
pub type OfferId = Uuid;

/// Booking identifier.
pub type BookingId = Uuid;

/// Credit transfer identifier.
pub type TransferId = Uuid;

/// Review identifier.
pub type ReviewId = Uuid;

/// A user's ledger account.
///
/// `reserved` is the subset of `credits` held against open bookings;
/// `credits - reserved` is what may be newly reserved. Balance fields are
/// only ever mutated through the store's atomic operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub name: String,
    pub credits: Credits,
    pub reserved: Credits,
    /// Sum of all ratings received as a provider. Kept as an incremental
    /// sum so a review lands as a pure atomic increment.
    pub rating_sum: u64,
    pub reviews_count: u64,
}

impl Account {
    pub fn new(name: impl Into<String>, credits: Credits) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            credits,
            reserved: Credits::ZERO,
            rating_sum: 0,
            reviews_count: 0,
        }
    }

    /// Credits available for a new reservation.
    pub fn effective(&self) -> Credits {
        self.credits.saturating_sub(self.reserved)
    }

    /// Average rating received as a provider, derived from the sums.
    pub fn rating_avg(&self) -> f64 {
        if self.reviews_count == 0 {
            0.0
        } else {
            self.rating_sum as f64 / self.reviews_count as f64
        }
    }
}

/// Whether an offer accepts new bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Active,
    Inactive,
}

/// A published skill offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub owner: UserId,
    pub title: String,
    pub cost_credits: Credits,
    pub status: OfferStatus,
    /// Number of completed bookings, incremented after each completion.
    pub bookings_count: u64,
    pub rating_sum: u64,
    pub reviews_count: u64,
}

impl Offer {
    pub fn new(owner: UserId, title: impl Into<String>, cost_credits: Credits) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            title: title.into(),
            cost_credits,
            status: OfferStatus::Active,
            bookings_count: 0,
            rating_sum: 0,
            reviews_count: 0,
        }
    }

    pub fn avg_rating(&self) -> f64 {
        if self.reviews_count == 0 {
            0.0
        } else {
            self.rating_sum as f64 / self.reviews_count as f64
        }
    }
}

/// Booking lifecycle states.
///
/// `Pending -> Accepted -> Completed` is the happy path; `Pending ->
/// Canceled` the decline path. `Completed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Completed,
    Canceled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Canceled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Completed => "completed",
            BookingStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A participant's role on a specific booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Requester,
    Provider,
}

/// A booked session against an offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub offer: OfferId,
    pub requester: UserId,
    /// Offer owner at booking time, snapshotted.
    pub provider: UserId,
    pub date_start: DateTime<Utc>,
    /// Exclusive end of the session interval.
    pub date_end: DateTime<Utc>,
    pub timezone: Option<String>,
    /// Offer price at booking time; later price edits never touch this.
    pub cost_credits: Credits,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub notes: Option<String>,
    /// Set exactly once, when the booking completes.
    pub credit_transfer: Option<TransferId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// The single place participant/ownership checks are derived from.
    pub fn role_of(&self, user: UserId) -> Option<Role> {
        if self.requester == user {
            Some(Role::Requester)
        } else if self.provider == user {
            Some(Role::Provider)
        } else {
            None
        }
    }

    /// Whether the booking still holds a credit reservation.
    pub fn is_open(&self) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::Accepted)
    }

    /// Half-open interval overlap against `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.date_start < end && self.date_end > start
    }
}

/// Whether a transfer stands or has been compensated.
///
/// `Reversed` is a documented extension point; no current code path
/// produces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Completed,
    Reversed,
}

/// Append-only ledger entry for a completed booking.
///
/// At most one entry may exist per `(booking, from_user, to_user)`; the
/// store enforces this, which is what makes completion retry-safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransfer {
    pub id: TransferId,
    pub booking: BookingId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub amount: Credits,
    pub status: TransferStatus,
    pub performed_at: DateTime<Utc>,
}

impl CreditTransfer {
    pub fn new(booking: BookingId, from_user: UserId, to_user: UserId, amount: Credits) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking,
            from_user,
            to_user,
            amount,
            status: TransferStatus::Completed,
            performed_at: Utc::now(),
        }
    }

    /// The uniqueness key the store indexes transfers by.
    pub fn unique_key(&self) -> (BookingId, UserId, UserId) {
        (self.booking, self.from_user, self.to_user)
    }
}

/// Review left by a requester for a completed booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub booking: BookingId,
    pub reviewer: UserId,
    pub provider: UserId,
    pub offer: OfferId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub const RATING_MIN: u8 = 1;
    pub const RATING_MAX: u8 = 5;
}
