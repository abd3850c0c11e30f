//! Read-side projections.
//!
//! Denormalized views joining bookings, offers and accounts for display.
//! These are never the source of truth for balances: every figure here is
//! derived from the write-side documents at read time.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Credits;
use crate::engine::{Engine, QueryError};
use crate::model::{BookingId, BookingStatus, OfferId, Role, TransferId, TransferStatus, UserId};

/// Filter for [`Engine::list_bookings`].
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    /// Which side of the booking the user must be on; `None` means either.
    pub role: Option<Role>,
    pub status: Option<BookingStatus>,
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
}

/// Offset/limit pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct PageOf<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// A booking joined with the display fields of its offer and parties.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub id: BookingId,
    pub offer: OfferId,
    pub offer_title: Option<String>,
    pub requester: UserId,
    pub requester_name: Option<String>,
    pub provider: UserId,
    pub provider_name: Option<String>,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub status: BookingStatus,
    pub cost_credits: Credits,
    pub cancellation_reason: Option<String>,
}

/// Balance snapshot plus lifetime transfer totals.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub available: Credits,
    pub reserved: Credits,
    pub lifetime_income: Credits,
    pub lifetime_outcome: Credits,
}

/// A completed transfer seen from one user's perspective.
#[derive(Debug, Clone, Serialize)]
pub struct TransferView {
    pub id: TransferId,
    pub booking: BookingId,
    pub offer_title: Option<String>,
    pub counterparty: Option<String>,
    /// Positive for income, negative for outcome.
    pub amount: i64,
    pub performed_at: DateTime<Utc>,
}

impl Engine {
    /// Bookings the user participates in, filtered, newest start first.
    pub async fn list_bookings(
        &self,
        user: UserId,
        filter: BookingFilter,
        page: Page,
    ) -> PageOf<BookingView> {
        let mut bookings = self
            .store
            .bookings_where(|b| {
                let on_side = match filter.role {
                    Some(Role::Requester) => b.requester == user,
                    Some(Role::Provider) => b.provider == user,
                    None => b.requester == user || b.provider == user,
                };
                on_side
                    && filter.status.is_none_or(|s| b.status == s)
                    && filter.starts_after.is_none_or(|t| b.date_start >= t)
                    && filter.starts_before.is_none_or(|t| b.date_start <= t)
            })
            .await;
        bookings.sort_by(|a, b| b.date_start.cmp(&a.date_start));

        let total = bookings.len();
        let mut items = Vec::new();
        for booking in bookings.into_iter().skip(page.offset).take(page.limit) {
            items.push(self.booking_view(booking).await);
        }
        PageOf { items, total }
    }

    /// Joined view of a single booking, participants only.
    pub async fn booking_detail(
        &self,
        actor: UserId,
        booking: BookingId,
    ) -> Result<BookingView, QueryError> {
        let booking = self
            .store
            .booking(booking)
            .await
            .ok_or(QueryError::NotFound("booking"))?;
        if booking.role_of(actor).is_none() {
            return Err(QueryError::Forbidden);
        }
        Ok(self.booking_view(booking).await)
    }

    /// Balances plus lifetime income/outcome summed over completed transfers.
    pub async fn ledger_summary(&self, user: UserId) -> Result<LedgerSummary, QueryError> {
        let account = self
            .store
            .account(user)
            .await
            .ok_or(QueryError::NotFound("account"))?;

        let mut income = Credits::ZERO;
        let mut outcome = Credits::ZERO;
        for transfer in self
            .store
            .transfers_where(|t| {
                t.status == TransferStatus::Completed
                    && (t.from_user == user || t.to_user == user)
            })
            .await
        {
            if transfer.to_user == user {
                income += transfer.amount;
            } else {
                outcome += transfer.amount;
            }
        }

        Ok(LedgerSummary {
            available: account.effective(),
            reserved: account.reserved,
            lifetime_income: income,
            lifetime_outcome: outcome,
        })
    }

    /// Completed transfers touching the user, newest first, amounts signed
    /// from the user's perspective.
    pub async fn transfer_history(&self, user: UserId, page: Page) -> PageOf<TransferView> {
        let mut transfers = self
            .store
            .transfers_where(|t| {
                t.status == TransferStatus::Completed
                    && (t.from_user == user || t.to_user == user)
            })
            .await;
        transfers.sort_by(|a, b| b.performed_at.cmp(&a.performed_at));

        let total = transfers.len();
        let mut items = Vec::new();
        for transfer in transfers.into_iter().skip(page.offset).take(page.limit) {
            let booking = self.store.booking(transfer.booking).await;
            let offer_title = match &booking {
                Some(b) => self.store.offer(b.offer).await.map(|o| o.title),
                None => None,
            };
            let (counterparty_id, sign) = if transfer.to_user == user {
                (transfer.from_user, 1)
            } else {
                (transfer.to_user, -1)
            };
            let counterparty = self.store.account(counterparty_id).await.map(|a| a.name);
            items.push(TransferView {
                id: transfer.id,
                booking: transfer.booking,
                offer_title,
                counterparty,
                amount: sign * transfer.amount.get() as i64,
                performed_at: transfer.performed_at,
            });
        }
        PageOf { items, total }
    }

    async fn booking_view(&self, booking: crate::model::Booking) -> BookingView {
        let offer_title = self.store.offer(booking.offer).await.map(|o| o.title);
        let requester_name = self.store.account(booking.requester).await.map(|a| a.name);
        let provider_name = self.store.account(booking.provider).await.map(|a| a.name);
        BookingView {
            id: booking.id,
            offer: booking.offer,
            offer_title,
            requester: booking.requester,
            requester_name,
            provider: booking.provider,
            provider_name,
            date_start: booking.date_start,
            date_end: booking.date_end,
            status: booking.status,
            cost_credits: booking.cost_credits,
            cancellation_reason: booking.cancellation_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BookingRequest;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap()
    }

    struct World {
        engine: Arc<Engine>,
        alice: UserId,
        bob: UserId,
        offer: OfferId,
        booking: BookingId,
    }

    /// Alice books Bob's 5-credit offer; the booking is completed.
    async fn completed_world() -> World {
        let engine = Arc::new(Engine::default());
        let alice = engine.create_account("alice", Credits::new(10)).await;
        let bob = engine.create_account("bob", Credits::ZERO).await;
        let offer = engine
            .publish_offer(bob, "rust tutoring", Credits::new(5))
            .await
            .unwrap();
        let booking = engine
            .create_booking(
                alice,
                BookingRequest {
                    offer,
                    date_start: at(10),
                    date_end: at(11),
                    timezone: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        engine
            .transition_booking(bob, booking, BookingStatus::Accepted, None)
            .await
            .unwrap();
        engine
            .transition_booking(bob, booking, BookingStatus::Completed, None)
            .await
            .unwrap();
        World {
            engine,
            alice,
            bob,
            offer,
            booking,
        }
    }

    #[tokio::test]
    async fn ledger_summary_reports_lifetime_totals() {
        let w = completed_world().await;

        let alice = w.engine.ledger_summary(w.alice).await.unwrap();
        assert_eq!(alice.available, Credits::new(5));
        assert_eq!(alice.reserved, Credits::ZERO);
        assert_eq!(alice.lifetime_income, Credits::ZERO);
        assert_eq!(alice.lifetime_outcome, Credits::new(5));

        let bob = w.engine.ledger_summary(w.bob).await.unwrap();
        assert_eq!(bob.available, Credits::new(5));
        assert_eq!(bob.lifetime_income, Credits::new(5));
        assert_eq!(bob.lifetime_outcome, Credits::ZERO);
    }

    #[tokio::test]
    async fn ledger_summary_unknown_user_is_not_found() {
        let w = completed_world().await;
        let result = w.engine.ledger_summary(uuid::Uuid::new_v4()).await;
        assert!(matches!(result, Err(QueryError::NotFound("account"))));
    }

    #[tokio::test]
    async fn transfer_history_signs_amounts_per_viewer() {
        let w = completed_world().await;

        let alice = w.engine.transfer_history(w.alice, Page::default()).await;
        assert_eq!(alice.total, 1);
        assert_eq!(alice.items[0].amount, -5);
        assert_eq!(alice.items[0].counterparty.as_deref(), Some("bob"));
        assert_eq!(alice.items[0].offer_title.as_deref(), Some("rust tutoring"));

        let bob = w.engine.transfer_history(w.bob, Page::default()).await;
        assert_eq!(bob.items[0].amount, 5);
        assert_eq!(bob.items[0].counterparty.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn list_bookings_filters_by_role_and_status() {
        let w = completed_world().await;

        let as_requester = w
            .engine
            .list_bookings(
                w.alice,
                BookingFilter {
                    role: Some(Role::Requester),
                    ..Default::default()
                },
                Page::default(),
            )
            .await;
        assert_eq!(as_requester.total, 1);
        assert_eq!(as_requester.items[0].provider_name.as_deref(), Some("bob"));

        let as_provider = w
            .engine
            .list_bookings(
                w.alice,
                BookingFilter {
                    role: Some(Role::Provider),
                    ..Default::default()
                },
                Page::default(),
            )
            .await;
        assert_eq!(as_provider.total, 0);

        let canceled_only = w
            .engine
            .list_bookings(
                w.alice,
                BookingFilter {
                    status: Some(BookingStatus::Canceled),
                    ..Default::default()
                },
                Page::default(),
            )
            .await;
        assert_eq!(canceled_only.total, 0);
    }

    #[tokio::test]
    async fn list_bookings_paginates_newest_first() {
        let w = completed_world().await;
        // a second, later booking left pending
        let later = w
            .engine
            .create_booking(
                w.alice,
                BookingRequest {
                    offer: w.offer,
                    date_start: at(14),
                    date_end: at(15),
                    timezone: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let first_page = w
            .engine
            .list_bookings(
                w.alice,
                BookingFilter::default(),
                Page {
                    offset: 0,
                    limit: 1,
                },
            )
            .await;
        assert_eq!(first_page.total, 2);
        assert_eq!(first_page.items.len(), 1);
        assert_eq!(first_page.items[0].id, later);

        let second_page = w
            .engine
            .list_bookings(
                w.alice,
                BookingFilter::default(),
                Page {
                    offset: 1,
                    limit: 1,
                },
            )
            .await;
        assert_eq!(second_page.items[0].id, w.booking);
    }

    #[tokio::test]
    async fn booking_detail_is_participant_only() {
        let w = completed_world().await;
        let stranger = w.engine.create_account("mallory", Credits::ZERO).await;

        let result = w.engine.booking_detail(stranger, w.booking).await;
        assert!(matches!(result, Err(QueryError::Forbidden)));

        let view = w.engine.booking_detail(w.alice, w.booking).await.unwrap();
        assert_eq!(view.status, BookingStatus::Completed);
        assert_eq!(view.offer_title.as_deref(), Some("rust tutoring"));
    }
}
