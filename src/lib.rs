pub mod credits;
pub mod engine;
pub mod model;
pub mod notify;
pub mod query;
pub mod script;
pub mod store;

pub use credits::Credits;
pub use engine::Engine;
pub use model::{Account, Booking, BookingStatus, Offer, Review};
