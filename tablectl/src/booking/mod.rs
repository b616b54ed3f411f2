//! Booking core: availability resolution and reservation lifecycle.
//!
//! [`resolver`] answers "which table, if any, can seat this party in this
//! window" as a pure read. [`lifecycle`] owns every state change a
//! reservation goes through and re-runs the resolver inside the create
//! transaction so the answer is authoritative at write time.

pub mod lifecycle;
pub mod resolver;

pub use lifecycle::{CreateBooking, ReservationLifecycle};
pub use resolver::AvailabilityResolver;
