//! Channel Gate - managed access to a restricted broadcast channel
//!
//! A chat bot that registers users, hands each one a single-use expiring
//! invite link, verifies channel membership before activating them, and
//! fans admin signals out to every active user with per-recipient delivery
//! records.
//!
//! Key principles:
//! - One invite link per user, never reused
//! - Invite expiry is checked lazily against the clock
//! - Per-user serialization of every state change
//! - Delivery failures are recorded, never fatal

pub mod admin;
pub mod bot;
pub mod clock;
pub mod distribution;
pub mod error;
pub mod gatekeeper;
pub mod platform;
pub mod store;

pub use error::{GatewayError, GatewayResult};
