//! Bot module: the chat-facing side of the gateway
//!
//! - Commands: parsing of private chat messages
//! - Drafts: ephemeral, step-by-step profile input
//! - Messages: user-facing texts
//! - Gateway: the update loop tying it to registration, distribution and
//!   the admin console

pub mod commands;
pub mod drafts;
pub mod gateway;
pub mod messages;

pub use commands::{parse_command, Command};
pub use drafts::{DraftStep, ProfileDraftManager};
pub use gateway::{BotConfig, GatewayBot};
