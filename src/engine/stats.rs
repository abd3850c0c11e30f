//! Statistics aggregator.
//!
//! Aggregates are stored as incremental sums (`rating_sum`, `reviews_count`)
//! so every update is a pure atomic increment; averages are derived on read.
//! All updates here are best-effort: a failure is logged for out-of-band
//! reconciliation and never propagated to the caller, because the event that
//! triggered it (transfer commit, review insert) has already succeeded.

use tracing::warn;

use crate::model::{OfferId, UserId};
use crate::store::MemStore;

/// Bump the offer's completed-bookings counter after a committed transfer.
pub(super) async fn record_completion(store: &MemStore, offer: OfferId) {
    if let Err(e) = store.incr_offer_bookings(offer).await {
        warn!(offer = %offer, reason = %e, "bookings count update failed, left for reconciliation");
    }
}

/// Fold a new rating into the provider's and the offer's aggregates.
pub(super) async fn record_review(store: &MemStore, provider: UserId, offer: OfferId, rating: u8) {
    if let Err(e) = store.add_account_rating(provider, rating).await {
        warn!(user = %provider, reason = %e, "provider rating update failed, left for reconciliation");
    }
    if let Err(e) = store.add_offer_rating(offer, rating).await {
        warn!(offer = %offer, reason = %e, "offer rating update failed, left for reconciliation");
    }
}
