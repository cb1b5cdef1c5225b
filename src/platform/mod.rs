//! Chat Platform Integration Module
//!
//! The gateway only talks to the chat platform through `MessagingClient`:
//! - send a private message
//! - create / revoke single-use channel invites
//! - query a user's channel membership
//! - long-poll inbound updates
//!
//! Every call made by the core is bounded with `retry::with_timeout`.

pub mod mock;
pub mod retry;
pub mod telegram;
pub mod traits;

pub use mock::MockMessagingClient;
pub use telegram::TelegramClient;
pub use traits::{
    ChannelId, MemberRole, MessagingClient, PlatformError, PlatformResult, Update, UpdateKind,
    UserId,
};
