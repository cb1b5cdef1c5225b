//! Messaging Platform Trait Abstractions
//!
//! Everything the gateway needs from the chat platform goes through
//! `MessagingClient`, so the core can run against `MockMessagingClient`
//! in tests and `TelegramClient` in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Platform user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform channel identifier (negative for Telegram supergroups/channels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's role in a channel as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Administrator,
    Member,
    /// Restricted users may or may not still be in the channel
    Restricted { is_member: bool },
    Left,
    Kicked,
}

impl MemberRole {
    /// Whether this role counts as being present in the channel
    pub fn is_present(&self) -> bool {
        match self {
            MemberRole::Owner | MemberRole::Administrator | MemberRole::Member => true,
            MemberRole::Restricted { is_member } => *is_member,
            MemberRole::Left | MemberRole::Kicked => false,
        }
    }
}

/// Inbound platform update
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub id: i64,
    pub kind: UpdateKind,
}

/// Update payloads the gateway reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// Text (commands included) sent to the bot in a private chat
    Text { from: UserId, text: String },

    /// Contact card shared by the user
    Contact { from: UserId, phone: String },

    /// New post in a channel the bot can see
    ChannelPost { channel: ChannelId, text: String },

    /// A user's membership in a channel changed
    MemberChanged {
        channel: ChannelId,
        user: UserId,
        old: MemberRole,
        new: MemberRole,
    },
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform client errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Platform call timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Recipient unavailable: {0}")]
    RecipientUnavailable(String),
}

/// Chat platform abstraction
///
/// Implementations must be cheap to clone (shared handles) so that the
/// workflow, the distributor and the bot loop can each hold one.
#[async_trait]
pub trait MessagingClient: Clone + Send + Sync + 'static {
    /// Send a text message to a user's private chat
    async fn send_message(&self, user: UserId, text: &str) -> PlatformResult<()>;

    /// Create an invite link that admits exactly one user and expires after `ttl`
    ///
    /// Returns the link URL.
    async fn create_single_use_invite(
        &self,
        channel: ChannelId,
        ttl: Duration,
    ) -> PlatformResult<String>;

    /// Revoke a previously created invite link
    async fn revoke_invite(&self, channel: ChannelId, url: &str) -> PlatformResult<()>;

    /// Query a user's role in a channel
    async fn check_membership(&self, channel: ChannelId, user: UserId)
        -> PlatformResult<MemberRole>;

    /// Fetch pending updates (long-poll)
    async fn receive_updates(&self) -> PlatformResult<Vec<Update>>;
}
