//! Production Messaging Client: Telegram Bot API
//!
//! Implements `MessagingClient` over the HTTPS Bot API
//! (`{api_url}/bot{token}/{method}`, JSON bodies, `{ok, result}` envelopes).
//!
//! ## Updates
//!
//! `receive_updates` long-polls `getUpdates` and keeps the offset in a shared
//! atomic so that clones of the client never re-deliver an acknowledged update.
//! Only private-chat messages, channel posts and `chat_member` updates are
//! translated; everything else is acknowledged and dropped.

use super::traits::*;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Default public Bot API endpoint
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Long-poll duration passed to `getUpdates`
const POLL_TIMEOUT_SECS: u64 = 25;

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    offset: Arc<AtomicI64>,
}

impl TelegramClient {
    /// Create a client for `token` against `api_url`
    pub fn new(api_url: &str, token: &str, request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            request_timeout,
            offset: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Call a Bot API method and decode its `result`
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Duration,
    ) -> PlatformResult<T> {
        debug!(method, "telegram api call");

        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(format!("{}: {}", method, e)))?;

        if envelope.ok {
            envelope.result.ok_or_else(|| {
                PlatformError::InvalidResponse(format!("{}: ok response without result", method))
            })
        } else {
            let code = envelope.error_code.unwrap_or_default();
            let description = envelope.description.unwrap_or_default();
            if code == 403 {
                Err(PlatformError::RecipientUnavailable(description))
            } else {
                Err(PlatformError::Api { code, description })
            }
        }
    }
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout(timeout)
    } else {
        PlatformError::Network(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatInviteLink {
    invite_link: String,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    #[serde(default)]
    is_member: Option<bool>,
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    phone_number: String,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
    caption: Option<String>,
    contact: Option<Contact>,
}

#[derive(Debug, Deserialize)]
struct ChatMemberUpdated {
    chat: Chat,
    old_chat_member: ChatMember,
    new_chat_member: ChatMember,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    channel_post: Option<TgMessage>,
    chat_member: Option<ChatMemberUpdated>,
}

fn parse_role(member: &ChatMember) -> PlatformResult<MemberRole> {
    match member.status.as_str() {
        "creator" => Ok(MemberRole::Owner),
        "administrator" => Ok(MemberRole::Administrator),
        "member" => Ok(MemberRole::Member),
        "restricted" => Ok(MemberRole::Restricted {
            is_member: member.is_member.unwrap_or(false),
        }),
        "left" => Ok(MemberRole::Left),
        "kicked" => Ok(MemberRole::Kicked),
        other => Err(PlatformError::InvalidResponse(format!(
            "unknown chat member status '{}'",
            other
        ))),
    }
}

fn translate(update: TgUpdate) -> Option<Update> {
    let id = update.update_id;

    if let Some(message) = update.message {
        if message.chat.kind.as_deref() != Some("private") {
            return None;
        }
        let from = UserId(message.from.as_ref().map(|u| u.id).unwrap_or(message.chat.id));
        let kind = if let Some(contact) = message.contact {
            UpdateKind::Contact {
                from,
                phone: contact.phone_number,
            }
        } else {
            UpdateKind::Text {
                from,
                text: message.text?,
            }
        };
        return Some(Update { id, kind });
    }

    if let Some(post) = update.channel_post {
        let text = post.text.or(post.caption)?;
        return Some(Update {
            id,
            kind: UpdateKind::ChannelPost {
                channel: ChannelId(post.chat.id),
                text,
            },
        });
    }

    if let Some(change) = update.chat_member {
        let user = change.new_chat_member.user.as_ref()?.id;
        let old = parse_role(&change.old_chat_member).ok()?;
        let new = parse_role(&change.new_chat_member).ok()?;
        return Some(Update {
            id,
            kind: UpdateKind::MemberChanged {
                channel: ChannelId(change.chat.id),
                user: UserId(user),
                old,
                new,
            },
        });
    }

    None
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[async_trait]
impl MessagingClient for TelegramClient {
    async fn send_message(&self, user: UserId, text: &str) -> PlatformResult<()> {
        let _: Value = self
            .call(
                "sendMessage",
                json!({ "chat_id": user.0, "text": text }),
                self.request_timeout,
            )
            .await?;
        Ok(())
    }

    async fn create_single_use_invite(
        &self,
        channel: ChannelId,
        ttl: Duration,
    ) -> PlatformResult<String> {
        let link: ChatInviteLink = self
            .call(
                "createChatInviteLink",
                json!({
                    "chat_id": channel.0,
                    "expire_date": unix_now() + ttl.as_secs(),
                    "member_limit": 1,
                }),
                self.request_timeout,
            )
            .await?;
        Ok(link.invite_link)
    }

    async fn revoke_invite(&self, channel: ChannelId, url: &str) -> PlatformResult<()> {
        let _: Value = self
            .call(
                "revokeChatInviteLink",
                json!({ "chat_id": channel.0, "invite_link": url }),
                self.request_timeout,
            )
            .await?;
        Ok(())
    }

    async fn check_membership(
        &self,
        channel: ChannelId,
        user: UserId,
    ) -> PlatformResult<MemberRole> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                json!({ "chat_id": channel.0, "user_id": user.0 }),
                self.request_timeout,
            )
            .await?;
        parse_role(&member)
    }

    async fn receive_updates(&self) -> PlatformResult<Vec<Update>> {
        let offset = self.offset.load(Ordering::SeqCst);
        let raw: Vec<TgUpdate> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "channel_post", "chat_member"],
                }),
                self.request_timeout + Duration::from_secs(POLL_TIMEOUT_SECS),
            )
            .await?;

        if let Some(last) = raw.iter().map(|u| u.update_id).max() {
            self.offset.fetch_max(last + 1, Ordering::SeqCst);
        }

        Ok(raw.into_iter().filter_map(translate).collect())
    }
}
