//! Completion transaction coordinator.
//!
//! The only path that moves credits permanently between accounts. Everything
//! here runs inside one all-or-nothing store transaction: booking status,
//! both balances and the ledger entry either all change or none do. A caller
//! may retry the whole operation; the `(booking, from, to)` uniqueness
//! constraint on transfers turns a replay into a no-op instead of a second
//! payment.

use chrono::Utc;
use tracing::warn;

use crate::model::{Account, Booking, BookingId, BookingStatus, CreditTransfer};
use crate::store::{MemStore, StoreError};

use super::TransitionError;

/// Bounded retries for write-conflict aborts.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// State after the transfer committed, for post-commit notifications.
pub(super) struct CompletionOutcome {
    pub booking: Booking,
    pub requester: Account,
    pub provider: Account,
}

pub(super) async fn complete_booking(
    store: &MemStore,
    id: BookingId,
) -> Result<CompletionOutcome, TransitionError> {
    let mut attempt = 0;
    loop {
        let result = run_transaction(store, id).await;
        match result {
            Err(TransitionError::Store(StoreError::TransientConflict))
                if attempt < MAX_CONFLICT_RETRIES =>
            {
                attempt += 1;
                warn!(booking = %id, attempt, "completion aborted by write conflict, retrying");
            }
            other => return other,
        }
    }
}

async fn run_transaction(
    store: &MemStore,
    id: BookingId,
) -> Result<CompletionOutcome, TransitionError> {
    store
        .in_transaction(|txn| {
            // Re-read inside the transaction; the caller's snapshot may be stale.
            let booking = txn.booking(id).ok_or(TransitionError::NotFound)?.clone();
            match booking.status {
                BookingStatus::Accepted => {}
                BookingStatus::Completed => return Err(TransitionError::AlreadyCompleted),
                from => {
                    return Err(TransitionError::InvalidTransition {
                        from,
                        to: BookingStatus::Completed,
                    });
                }
            }
            let cost = booking.cost_credits;

            // Debit requester on both balances. Guards against lost updates:
            // the reservation must still cover the cost.
            let requester = txn
                .account_mut(booking.requester)
                .ok_or(TransitionError::Store(StoreError::NotFound("account")))?;
            requester.reserved = requester
                .reserved
                .checked_sub(cost)
                .ok_or(TransitionError::InsufficientCredits)?;
            requester.credits = requester
                .credits
                .checked_sub(cost)
                .ok_or(TransitionError::InsufficientCredits)?;
            let requester = requester.clone();

            let provider = txn
                .account_mut(booking.provider)
                .ok_or(TransitionError::Store(StoreError::NotFound("account")))?;
            provider.credits += cost;
            let provider = provider.clone();

            // A duplicate key here means a prior attempt already committed
            // the payment; reuse its id.
            let transfer_id = txn.insert_transfer(CreditTransfer::new(
                booking.id,
                booking.requester,
                booking.provider,
                cost,
            ));

            let booking = txn.booking_mut(id).ok_or(TransitionError::NotFound)?;
            booking.status = BookingStatus::Completed;
            booking.credit_transfer = Some(transfer_id);
            booking.updated_at = Utc::now();
            let booking = booking.clone();

            Ok(CompletionOutcome {
                booking,
                requester,
                provider,
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Credits;

    async fn seeded(
        requester_credits: u64,
        reserved: u64,
        status: BookingStatus,
    ) -> (MemStore, BookingId) {
        let store = MemStore::new();
        let mut requester = Account::new("alice", Credits::new(requester_credits));
        requester.reserved = Credits::new(reserved);
        let requester_id = store.insert_account(requester).await;
        let provider_id = store.insert_account(Account::new("bob", Credits::ZERO)).await;

        let now = Utc::now();
        let booking = Booking {
            id: uuid::Uuid::new_v4(),
            offer: uuid::Uuid::new_v4(),
            requester: requester_id,
            provider: provider_id,
            date_start: now,
            date_end: now + chrono::Duration::hours(1),
            timezone: None,
            cost_credits: Credits::new(5),
            status,
            cancellation_reason: None,
            notes: None,
            credit_transfer: None,
            created_at: now,
            updated_at: now,
        };
        let id = store.insert_booking(booking).await;
        (store, id)
    }

    #[tokio::test]
    async fn moves_credits_and_finalizes_booking() {
        let (store, id) = seeded(10, 5, BookingStatus::Accepted).await;

        let outcome = complete_booking(&store, id).await.unwrap();
        assert_eq!(outcome.requester.credits, Credits::new(5));
        assert_eq!(outcome.requester.reserved, Credits::ZERO);
        assert_eq!(outcome.provider.credits, Credits::new(5));
        assert_eq!(outcome.booking.status, BookingStatus::Completed);
        assert!(outcome.booking.credit_transfer.is_some());
    }

    #[tokio::test]
    async fn rejects_non_accepted_booking() {
        let (store, id) = seeded(10, 5, BookingStatus::Pending).await;

        let result = complete_booking(&store, id).await;
        assert!(matches!(
            result,
            Err(TransitionError::InvalidTransition {
                from: BookingStatus::Pending,
                to: BookingStatus::Completed,
            })
        ));
    }

    #[tokio::test]
    async fn rejects_missing_reservation() {
        // lost update left nothing reserved
        let (store, id) = seeded(10, 0, BookingStatus::Accepted).await;

        let result = complete_booking(&store, id).await;
        assert!(matches!(result, Err(TransitionError::InsufficientCredits)));

        // abort left the booking untouched
        let booking = store.booking(id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Accepted);
        assert!(booking.credit_transfer.is_none());
    }

    #[tokio::test]
    async fn bounded_retry_then_surface() {
        let (store, id) = seeded(10, 5, BookingStatus::Accepted).await;
        store.inject_conflicts(MAX_CONFLICT_RETRIES + 1);

        let result = complete_booking(&store, id).await;
        assert!(matches!(
            result,
            Err(TransitionError::Store(StoreError::TransientConflict))
        ));
    }

    #[tokio::test]
    async fn retry_within_bound_succeeds() {
        let (store, id) = seeded(10, 5, BookingStatus::Accepted).await;
        store.inject_conflicts(MAX_CONFLICT_RETRIES);

        complete_booking(&store, id).await.unwrap();
        assert_eq!(
            store.booking(id).await.unwrap().status,
            BookingStatus::Completed
        );
    }
}
