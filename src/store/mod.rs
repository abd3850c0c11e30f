//! In-process document store.
//!
//! `MemStore` emulates the store primitives the engine's correctness rests
//! on: conditional single-document atomic updates, insert-if-absent
//! uniqueness constraints, and an all-or-nothing multi-document transaction
//! scope. All balance fields are mutated exclusively through these
//! operations, never by whole-document writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::Credits;
use crate::model::{
    Account, Booking, BookingId, BookingStatus, CreditTransfer, Offer, OfferId, Review, ReviewId,
    TransferId, UserId,
};

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Write-conflict abort of a transaction scope. Safe to retry.
    #[error("transient write conflict")]
    TransientConflict,

    #[error("duplicate key in {0}")]
    DuplicateKey(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),
}

#[derive(Debug, Default, Clone)]
struct Collections {
    accounts: HashMap<UserId, Account>,
    offers: HashMap<OfferId, Offer>,
    bookings: HashMap<BookingId, Booking>,
    transfers: HashMap<TransferId, CreditTransfer>,
    /// Uniqueness index on `(booking, from_user, to_user)`.
    transfer_keys: HashMap<(BookingId, UserId, UserId), TransferId>,
    reviews: HashMap<ReviewId, Review>,
    /// Uniqueness index on `(booking, reviewer)`.
    review_keys: HashMap<(BookingId, UserId), ReviewId>,
}

/// The backing document store.
///
/// A single `RwLock` over every collection stands in for the remote store's
/// atomicity: each method call holds the lock for exactly one atomic
/// operation, and [`MemStore::in_transaction`] holds the write half for a
/// whole multi-document scope.
#[derive(Debug, Default)]
pub struct MemStore {
    collections: RwLock<Collections>,
    /// Number of upcoming transaction commits to abort with
    /// [`StoreError::TransientConflict`]. Test hook for conflict-retry paths.
    inject_conflicts: AtomicU32,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the next `n` transaction commits with a transient conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.inject_conflicts.store(n, Ordering::SeqCst);
    }

    // ---- plain inserts and reads ----

    pub async fn insert_account(&self, account: Account) -> UserId {
        let id = account.id;
        self.collections.write().await.accounts.insert(id, account);
        id
    }

    pub async fn insert_offer(&self, offer: Offer) -> OfferId {
        let id = offer.id;
        self.collections.write().await.offers.insert(id, offer);
        id
    }

    pub async fn insert_booking(&self, booking: Booking) -> BookingId {
        let id = booking.id;
        self.collections.write().await.bookings.insert(id, booking);
        id
    }

    pub async fn account(&self, id: UserId) -> Option<Account> {
        self.collections.read().await.accounts.get(&id).cloned()
    }

    pub async fn offer(&self, id: OfferId) -> Option<Offer> {
        self.collections.read().await.offers.get(&id).cloned()
    }

    pub async fn booking(&self, id: BookingId) -> Option<Booking> {
        self.collections.read().await.bookings.get(&id).cloned()
    }

    pub async fn transfer(&self, id: TransferId) -> Option<CreditTransfer> {
        self.collections.read().await.transfers.get(&id).cloned()
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.collections.read().await.accounts.values().cloned().collect()
    }

    /// Bookings matching `filter`, in storage order.
    pub async fn bookings_where(&self, filter: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        self.collections
            .read()
            .await
            .bookings
            .values()
            .filter(|b| filter(b))
            .cloned()
            .collect()
    }

    /// Transfers matching `filter`, in storage order.
    pub async fn transfers_where(
        &self,
        filter: impl Fn(&CreditTransfer) -> bool,
    ) -> Vec<CreditTransfer> {
        self.collections
            .read()
            .await
            .transfers
            .values()
            .filter(|t| filter(t))
            .cloned()
            .collect()
    }

    // ---- conditional atomic field updates ----

    /// Reserve `amount` on the account, conditional on sufficient effective
    /// balance: `reserved += amount where credits - reserved >= amount`, as
    /// one atomic step. `Ok(None)` means the condition matched no document
    /// (insufficient effective balance).
    pub async fn reserve_if_available(
        &self,
        user: UserId,
        amount: Credits,
    ) -> Result<Option<Account>, StoreError> {
        let mut collections = self.collections.write().await;
        let account = collections
            .accounts
            .get_mut(&user)
            .ok_or(StoreError::NotFound("account"))?;
        if account.effective() < amount {
            return Ok(None);
        }
        account.reserved += amount;
        Ok(Some(account.clone()))
    }

    /// Release `amount` of reservation, clamped at zero. Returns the updated
    /// account and whether clamping occurred.
    pub async fn release_reservation(
        &self,
        user: UserId,
        amount: Credits,
    ) -> Result<(Account, bool), StoreError> {
        let mut collections = self.collections.write().await;
        let account = collections
            .accounts
            .get_mut(&user)
            .ok_or(StoreError::NotFound("account"))?;
        let clamped = account.reserved < amount;
        account.reserved = account.reserved.saturating_sub(amount);
        Ok((account.clone(), clamped))
    }

    /// Compare-and-swap on booking status: applies `mutate` and moves the
    /// booking to `to` only if the current status equals `from`. `Ok(None)`
    /// means the booking was no longer in `from`.
    pub async fn transition_booking(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        mutate: impl FnOnce(&mut Booking),
    ) -> Result<Option<Booking>, StoreError> {
        let mut collections = self.collections.write().await;
        let booking = collections
            .bookings
            .get_mut(&id)
            .ok_or(StoreError::NotFound("booking"))?;
        if booking.status != from {
            return Ok(None);
        }
        booking.status = to;
        booking.updated_at = Utc::now();
        mutate(booking);
        Ok(Some(booking.clone()))
    }

    /// `bookings_count += 1` on the offer.
    pub async fn incr_offer_bookings(&self, id: OfferId) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let offer = collections
            .offers
            .get_mut(&id)
            .ok_or(StoreError::NotFound("offer"))?;
        offer.bookings_count += 1;
        Ok(())
    }

    /// `rating_sum += rating, reviews_count += 1` on the provider account.
    pub async fn add_account_rating(&self, user: UserId, rating: u8) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let account = collections
            .accounts
            .get_mut(&user)
            .ok_or(StoreError::NotFound("account"))?;
        account.rating_sum += rating as u64;
        account.reviews_count += 1;
        Ok(())
    }

    /// `rating_sum += rating, reviews_count += 1` on the offer.
    pub async fn add_offer_rating(&self, id: OfferId, rating: u8) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let offer = collections
            .offers
            .get_mut(&id)
            .ok_or(StoreError::NotFound("offer"))?;
        offer.rating_sum += rating as u64;
        offer.reviews_count += 1;
        Ok(())
    }

    /// Flip an offer between active and inactive.
    pub async fn set_offer_status(
        &self,
        id: OfferId,
        status: crate::model::OfferStatus,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let offer = collections
            .offers
            .get_mut(&id)
            .ok_or(StoreError::NotFound("offer"))?;
        offer.status = status;
        Ok(())
    }

    // ---- insert-if-absent ----

    /// Insert a review, enforcing `(booking, reviewer)` uniqueness.
    pub async fn insert_review(&self, review: Review) -> Result<ReviewId, StoreError> {
        let mut collections = self.collections.write().await;
        let key = (review.booking, review.reviewer);
        if collections.review_keys.contains_key(&key) {
            return Err(StoreError::DuplicateKey("reviews"));
        }
        let id = review.id;
        collections.review_keys.insert(key, id);
        collections.reviews.insert(id, review);
        Ok(id)
    }

    // ---- multi-document transaction scope ----

    /// Run `f` as an all-or-nothing transaction. The closure operates on a
    /// shadow copy of the collections; the copy replaces the live state only
    /// if `f` returns `Ok` and the commit is not aborted by an injected
    /// conflict. On any `Err`, no mutation made inside `f` is visible.
    pub async fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut Txn<'_>) -> Result<T, E>,
    {
        let mut collections = self.collections.write().await;
        let mut shadow = collections.clone();
        let mut txn = Txn { collections: &mut shadow };
        let value = f(&mut txn)?;
        if self
            .inject_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::TransientConflict.into());
        }
        *collections = shadow;
        Ok(value)
    }
}

/// Handle to the shadow state inside a transaction scope.
pub struct Txn<'a> {
    collections: &'a mut Collections,
}

impl Txn<'_> {
    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.collections.bookings.get(&id)
    }

    pub fn booking_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.collections.bookings.get_mut(&id)
    }

    pub fn account(&self, id: UserId) -> Option<&Account> {
        self.collections.accounts.get(&id)
    }

    pub fn account_mut(&mut self, id: UserId) -> Option<&mut Account> {
        self.collections.accounts.get_mut(&id)
    }

    /// Insert a transfer under the `(booking, from_user, to_user)`
    /// uniqueness constraint. A key hit returns the already-committed
    /// transfer's id instead of an error, which is what makes a retried
    /// completion a no-op rather than a double payment.
    pub fn insert_transfer(&mut self, transfer: CreditTransfer) -> TransferId {
        let key = transfer.unique_key();
        if let Some(existing) = self.collections.transfer_keys.get(&key) {
            return *existing;
        }
        let id = transfer.id;
        self.collections.transfer_keys.insert(key, id);
        self.collections.transfers.insert(id, transfer);
        id
    }
}
