//! HTTP route handlers.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive the
//! API document; catchers keep guard and body failures in the same JSON
//! envelope as handler errors.

pub mod catchers;
pub mod health;
pub mod sync;
