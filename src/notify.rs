//! Notification fan-out boundary.
//!
//! The engine never reaches into ambient state to push events; a
//! [`NotificationSink`] is injected at construction and called only after
//! the relevant state is durably committed. Delivery is fire-and-forget.

use tracing::info;

use crate::Credits;
use crate::model::{Booking, UserId};

/// A user's balance snapshot pushed alongside credit-moving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditBalance {
    pub current: Credits,
    pub reserved: Credits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Info,
}

/// A human-facing toast/inbox message.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Delivery of state-change events to connected clients.
///
/// Implementations must not block the caller on delivery; failures are the
/// sink's problem to log and swallow, never the engine's to retry.
pub trait NotificationSink: Send + Sync {
    fn credit_update(&self, user: UserId, balance: CreditBalance);

    fn booking_update(&self, users: &[UserId], booking: &Booking);

    fn notify(&self, user: UserId, notification: Notification);
}

/// Default sink: structured log lines instead of a socket.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn credit_update(&self, user: UserId, balance: CreditBalance) {
        info!(
            user = %user,
            current = %balance.current,
            reserved = %balance.reserved,
            "credit update"
        );
    }

    fn booking_update(&self, users: &[UserId], booking: &Booking) {
        info!(
            recipients = users.len(),
            booking = %booking.id,
            status = %booking.status,
            "booking update"
        );
    }

    fn notify(&self, user: UserId, notification: Notification) {
        info!(
            user = %user,
            title = %notification.title,
            message = %notification.message,
            "notification"
        );
    }
}
