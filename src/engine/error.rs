//! Error taxonomy for the booking and credit-ledger engine.

use thiserror::Error;

use crate::store::StoreError;

/// Top-level error covering every engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("booking creation failed: {0}")]
    CreateBooking(#[from] CreateBookingError),

    #[error("transition failed: {0}")]
    Transition(#[from] TransitionError),

    #[error("review failed: {0}")]
    Review(#[from] ReviewError),

    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("intake failed: {0}")]
    Intake(#[from] IntakeError),
}

impl EngineError {
    /// Whether the boundary layer should map this to a 4xx (caller's fault)
    /// rather than a 5xx (store/infrastructure fault).
    pub fn is_client_error(&self) -> bool {
        match self {
            EngineError::CreateBooking(e) => !matches!(e, CreateBookingError::Store(_)),
            EngineError::Transition(e) => !matches!(e, TransitionError::Store(_)),
            EngineError::Review(e) => !matches!(e, ReviewError::Store(_)),
            EngineError::Query(_) => true,
            EngineError::Intake(e) => !matches!(e, IntakeError::Store(_)),
        }
    }
}

/// Admission failures when creating a booking.
#[derive(Debug, Error)]
pub enum CreateBookingError {
    #[error("offer not found")]
    OfferNotFound,

    #[error("offer is not active")]
    OfferInactive,

    #[error("cannot book your own offer")]
    SelfBooking,

    #[error("requester account not found")]
    AccountNotFound,

    #[error("schedule end must be after start")]
    InvalidSchedule,

    #[error("an open booking already covers this time slot")]
    OverlappingBooking,

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of the booking state machine.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("booking not found")]
    NotFound,

    #[error("only booking participants may act on it")]
    Forbidden,

    #[error("transition from {from} to {to} is not allowed")]
    InvalidTransition {
        from: crate::model::BookingStatus,
        to: crate::model::BookingStatus,
    },

    #[error("booking is already completed")]
    AlreadyCompleted,

    #[error("insufficient reserved credits")]
    InsufficientCredits,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures when submitting a review.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("booking not found")]
    BookingNotFound,

    #[error("only the requester may review a booking")]
    Forbidden,

    #[error("booking must be completed to review")]
    NotCompleted,

    #[error("rating must be between 1 and 5")]
    InvalidRating,

    #[error("a review already exists for this booking")]
    DuplicateReview,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of the read-side projections.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("only booking participants may view it")]
    Forbidden,
}

/// Failures of the account/offer intake seams.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("account not found")]
    AccountNotFound,

    #[error("offer not found")]
    OfferNotFound,

    #[error("only the owner may change an offer")]
    Forbidden,

    #[error("offer cost must be at least 1 credit")]
    InvalidCost,

    #[error(transparent)]
    Store(#[from] StoreError),
}
