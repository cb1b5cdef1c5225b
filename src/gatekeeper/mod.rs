//! Gatekeeper module: admission to the restricted channel
//!
//! - Invite: one-time, expiring invitation links
//! - Membership: presence checks against the channel
//! - Registration: the onboarding state machine over both
//! - User locks: per-user serialization shared with the admin console

pub mod invite;
pub mod membership;
pub mod registration;
pub mod user_locks;

pub use invite::InviteLinkManager;
pub use membership::MembershipVerifier;
pub use registration::{
    JoinOutcome, ProfileOutcome, ProfileSubmission, RegistrationWorkflow, StartOutcome,
};
pub use user_locks::UserLocks;
