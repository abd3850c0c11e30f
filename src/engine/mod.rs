//! Booking lifecycle and credit-ledger engine.
//!
//! The engine admits booking requests (reserving credits), drives the
//! booking state machine, runs the completion transaction that permanently
//! moves credits, and records reviews. It is safe to share behind an `Arc`
//! across concurrent request tasks: every mutation goes through the store's
//! atomic operations, never in-process locking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::model::{
    Account, Booking, BookingId, BookingStatus, Offer, OfferId, OfferStatus, Review, ReviewId,
    Role, UserId,
};
use crate::notify::{CreditBalance, Notification, NotificationSink, TracingSink};
use crate::Credits;
use crate::store::{MemStore, StoreError};

mod completion;
mod error;
mod stats;

pub use error::{
    CreateBookingError, EngineError, IntakeError, QueryError, ReviewError, TransitionError,
};

/// Parameters for a new booking request.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub offer: OfferId,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub timezone: Option<String>,
    pub notes: Option<String>,
}

/// The booking and credit-ledger engine.
pub struct Engine {
    pub(crate) store: MemStore,
    sink: Arc<dyn NotificationSink>,
}

impl Engine {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            store: MemStore::new(),
            sink,
        }
    }

    // ---- intake seams ----

    /// Create an account with its signup credit grant.
    pub async fn create_account(&self, name: impl Into<String>, credits: Credits) -> UserId {
        let account = Account::new(name, credits);
        let id = self.store.insert_account(account).await;
        info!(user = %id, "account created");
        id
    }

    /// Publish an offer owned by `owner`.
    pub async fn publish_offer(
        &self,
        owner: UserId,
        title: impl Into<String>,
        cost: Credits,
    ) -> Result<OfferId, IntakeError> {
        if cost.is_zero() {
            return Err(IntakeError::InvalidCost);
        }
        if self.store.account(owner).await.is_none() {
            return Err(IntakeError::AccountNotFound);
        }
        let offer = Offer::new(owner, title, cost);
        let id = self.store.insert_offer(offer).await;
        info!(offer = %id, owner = %owner, "offer published");
        Ok(id)
    }

    /// Owner-side activation toggle for an offer.
    pub async fn set_offer_status(
        &self,
        actor: UserId,
        offer: OfferId,
        status: OfferStatus,
    ) -> Result<(), IntakeError> {
        let current = self
            .store
            .offer(offer)
            .await
            .ok_or(IntakeError::OfferNotFound)?;
        if current.owner != actor {
            return Err(IntakeError::Forbidden);
        }
        self.store.set_offer_status(offer, status).await?;
        Ok(())
    }

    // ---- booking intake ----

    /// Admit a booking request: run all non-credit checks, then reserve the
    /// offer's cost against the requester in a single conditional atomic
    /// update, then persist the booking in `Pending` with a price snapshot.
    ///
    /// No credits are reserved until every non-credit check has passed, so a
    /// failed admission leaves no partial state behind.
    pub async fn create_booking(
        &self,
        requester: UserId,
        request: BookingRequest,
    ) -> Result<BookingId, CreateBookingError> {
        let result = self.admit_booking(requester, request).await;
        match &result {
            Ok(id) => info!(booking = %id, requester = %requester, "booking created"),
            Err(e) => info!(requester = %requester, reason = %e, "booking rejected"),
        }
        result
    }

    async fn admit_booking(
        &self,
        requester: UserId,
        request: BookingRequest,
    ) -> Result<BookingId, CreateBookingError> {
        if request.date_end <= request.date_start {
            return Err(CreateBookingError::InvalidSchedule);
        }

        let offer = self
            .store
            .offer(request.offer)
            .await
            .ok_or(CreateBookingError::OfferNotFound)?;
        if offer.status != OfferStatus::Active {
            return Err(CreateBookingError::OfferInactive);
        }
        if offer.owner == requester {
            return Err(CreateBookingError::SelfBooking);
        }
        if self.store.account(requester).await.is_none() {
            return Err(CreateBookingError::AccountNotFound);
        }

        // Read-then-write; the narrow race between this check and the insert
        // is accepted (no uniqueness constraint spans the overlap dimension).
        let overlapping = self
            .store
            .bookings_where(|b| {
                b.offer == offer.id
                    && b.requester == requester
                    && b.is_open()
                    && b.overlaps(request.date_start, request.date_end)
            })
            .await;
        if !overlapping.is_empty() {
            return Err(CreateBookingError::OverlappingBooking);
        }

        // reserved += cost where credits - reserved >= cost, one atomic step
        self.store
            .reserve_if_available(requester, offer.cost_credits)
            .await?
            .ok_or(CreateBookingError::InsufficientCredits)?;

        let now = Utc::now();
        let booking = Booking {
            id: uuid::Uuid::new_v4(),
            offer: offer.id,
            requester,
            provider: offer.owner,
            date_start: request.date_start,
            date_end: request.date_end,
            timezone: request.timezone,
            cost_credits: offer.cost_credits,
            status: BookingStatus::Pending,
            cancellation_reason: None,
            notes: request.notes,
            credit_transfer: None,
            created_at: now,
            updated_at: now,
        };
        Ok(self.store.insert_booking(booking).await)
    }

    // ---- state machine ----

    /// Drive a booking to `target`, enforcing role and status preconditions.
    /// Notifications fire only after the transition is durably committed.
    pub async fn transition_booking(
        &self,
        actor: UserId,
        booking: BookingId,
        target: BookingStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Booking, TransitionError> {
        let result = self
            .apply_transition(actor, booking, target, cancellation_reason)
            .await;
        match &result {
            Ok(b) => info!(booking = %booking, actor = %actor, status = %b.status, "transition applied"),
            Err(e) => info!(booking = %booking, actor = %actor, reason = %e, "transition rejected"),
        }
        result
    }

    async fn apply_transition(
        &self,
        actor: UserId,
        booking_id: BookingId,
        target: BookingStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Booking, TransitionError> {
        let booking = self
            .store
            .booking(booking_id)
            .await
            .ok_or(TransitionError::NotFound)?;
        let role = booking.role_of(actor).ok_or(TransitionError::Forbidden)?;

        match target {
            BookingStatus::Accepted => self.accept(booking, role).await,
            BookingStatus::Canceled => self.cancel(booking, cancellation_reason).await,
            BookingStatus::Completed => self.complete(booking, role).await,
            BookingStatus::Pending => Err(TransitionError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Pending,
            }),
        }
    }

    async fn accept(&self, booking: Booking, role: Role) -> Result<Booking, TransitionError> {
        if role != Role::Provider {
            return Err(TransitionError::Forbidden);
        }
        let updated = match self
            .store
            .transition_booking(
                booking.id,
                BookingStatus::Pending,
                BookingStatus::Accepted,
                |_| {},
            )
            .await?
        {
            Some(b) => b,
            None => return Err(self.stale_transition(booking.id, BookingStatus::Accepted).await),
        };

        self.sink
            .booking_update(&[updated.requester, updated.provider], &updated);
        self.sink.notify(
            updated.requester,
            Notification::success(
                "Booking Accepted",
                "Your booking has been accepted by the provider!",
            ),
        );
        Ok(updated)
    }

    async fn cancel(
        &self,
        booking: Booking,
        reason: Option<String>,
    ) -> Result<Booking, TransitionError> {
        // CAS first: only the winning canceler releases the reservation.
        let updated = match self
            .store
            .transition_booking(
                booking.id,
                BookingStatus::Pending,
                BookingStatus::Canceled,
                |b| b.cancellation_reason = reason,
            )
            .await?
        {
            Some(b) => b,
            None => return Err(self.stale_transition(booking.id, BookingStatus::Canceled).await),
        };

        let (requester_account, clamped) = self
            .store
            .release_reservation(updated.requester, updated.cost_credits)
            .await?;
        if clamped {
            warn!(
                booking = %updated.id,
                user = %updated.requester,
                amount = %updated.cost_credits,
                "reservation release clamped at zero"
            );
        }

        self.sink.credit_update(
            updated.requester,
            CreditBalance {
                current: requester_account.credits,
                reserved: requester_account.reserved,
            },
        );
        self.sink
            .booking_update(&[updated.requester, updated.provider], &updated);
        self.sink.notify(
            updated.requester,
            Notification::info(
                "Booking Canceled",
                "Your booking has been canceled. Reserved credits have been released.",
            ),
        );
        self.sink.notify(
            updated.provider,
            Notification::info("Booking Canceled", "A booking has been canceled."),
        );
        Ok(updated)
    }

    async fn complete(&self, booking: Booking, role: Role) -> Result<Booking, TransitionError> {
        if role != Role::Provider {
            return Err(TransitionError::Forbidden);
        }
        let outcome = completion::complete_booking(&self.store, booking.id).await?;

        // Post-commit side effects: never roll back the transfer. A failed
        // counter update is logged and reconciled out-of-band.
        stats::record_completion(&self.store, outcome.booking.offer).await;

        let cost = outcome.booking.cost_credits;
        self.sink.credit_update(
            outcome.booking.requester,
            CreditBalance {
                current: outcome.requester.credits,
                reserved: outcome.requester.reserved,
            },
        );
        self.sink.credit_update(
            outcome.booking.provider,
            CreditBalance {
                current: outcome.provider.credits,
                reserved: outcome.provider.reserved,
            },
        );
        self.sink.booking_update(
            &[outcome.booking.requester, outcome.booking.provider],
            &outcome.booking,
        );
        self.sink.notify(
            outcome.booking.requester,
            Notification::success(
                "Booking Completed",
                format!("Your booking has been completed. {cost} credits transferred."),
            ),
        );
        self.sink.notify(
            outcome.booking.provider,
            Notification::success(
                "Booking Completed",
                format!("Booking completed! You earned {cost} credits."),
            ),
        );
        Ok(outcome.booking)
    }

    /// Error for a status CAS that matched nothing: re-read so the error
    /// names the status the booking actually holds now.
    async fn stale_transition(&self, id: BookingId, to: BookingStatus) -> TransitionError {
        let from = self.store.booking(id).await.map(|b| b.status);
        if to == BookingStatus::Completed && from == Some(BookingStatus::Completed) {
            TransitionError::AlreadyCompleted
        } else {
            TransitionError::InvalidTransition {
                from: from.unwrap_or(to),
                to,
            }
        }
    }

    // ---- reviews ----

    /// Record a review for a completed booking and fold its rating into the
    /// provider's and the offer's aggregates as pure atomic increments.
    pub async fn submit_review(
        &self,
        reviewer: UserId,
        booking: BookingId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<ReviewId, ReviewError> {
        let result = self.record_review(reviewer, booking, rating, comment).await;
        match &result {
            Ok(id) => info!(review = %id, booking = %booking, rating, "review recorded"),
            Err(e) => info!(booking = %booking, reviewer = %reviewer, reason = %e, "review rejected"),
        }
        result
    }

    async fn record_review(
        &self,
        reviewer: UserId,
        booking_id: BookingId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<ReviewId, ReviewError> {
        if !(Review::RATING_MIN..=Review::RATING_MAX).contains(&rating) {
            return Err(ReviewError::InvalidRating);
        }

        let booking = self
            .store
            .booking(booking_id)
            .await
            .ok_or(ReviewError::BookingNotFound)?;
        if booking.role_of(reviewer) != Some(Role::Requester) {
            return Err(ReviewError::Forbidden);
        }
        if booking.status != BookingStatus::Completed {
            return Err(ReviewError::NotCompleted);
        }

        let review = Review {
            id: uuid::Uuid::new_v4(),
            booking: booking.id,
            reviewer,
            provider: booking.provider,
            offer: booking.offer,
            rating,
            comment,
            created_at: Utc::now(),
        };
        let id = self.store.insert_review(review).await.map_err(|e| match e {
            StoreError::DuplicateKey(_) => ReviewError::DuplicateReview,
            other => ReviewError::Store(other),
        })?;

        stats::record_review(&self.store, booking.provider, booking.offer, rating).await;
        Ok(id)
    }

    // ---- state access for the replay driver ----

    pub async fn accounts(&self) -> Vec<Account> {
        self.store.accounts().await
    }

    pub async fn account(&self, id: UserId) -> Option<Account> {
        self.store.account(id).await
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}
