//! Gateway error taxonomy.

use crate::platform::{PlatformError, UserId};
use crate::store::{StoreError, UserState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("User {user} is {actual}, cannot {operation}")]
    InvalidState {
        user: UserId,
        operation: &'static str,
        actual: UserState,
    },

    #[error("User {0} already holds an unused invite link")]
    DuplicateActiveLink(UserId),

    #[error("Membership verification unavailable: {0}")]
    VerificationUnavailable(String),

    #[error("User {0} is not authorized for admin operations")]
    Unauthorized(UserId),

    #[error("Delivery to {user} failed: {reason}")]
    DeliveryFailure { user: UserId, reason: String },

    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
