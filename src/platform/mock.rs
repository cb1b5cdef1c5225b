//! Mock Messaging Client for Testing
//!
//! Records every outbound call and lets tests script membership answers,
//! per-user send failures and slow responses.

use super::traits::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock messaging client for testing
#[derive(Clone, Default)]
pub struct MockMessagingClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    sent_messages: Vec<SentMessage>,
    roles: HashMap<(ChannelId, UserId), MemberRole>,
    failing_recipients: HashSet<UserId>,
    membership_unavailable: bool,
    invite_failure: bool,
    delay: Option<Duration>,
    invites: Vec<(ChannelId, String, Duration)>,
    revoked: Vec<String>,
    incoming: Vec<Update>,
    next_invite: u64,
    next_update: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipient: UserId,
    pub content: String,
}

impl MockMessagingClient {
    /// Create new mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the role the platform reports for `user` in `channel`
    pub fn set_role(&self, channel: ChannelId, user: UserId, role: MemberRole) {
        self.state.lock().unwrap().roles.insert((channel, user), role);
    }

    /// Make every send to `user` fail
    pub fn fail_sends_to(&self, user: UserId) {
        self.state.lock().unwrap().failing_recipients.insert(user);
    }

    /// Let sends to `user` succeed again
    pub fn restore_sends_to(&self, user: UserId) {
        self.state.lock().unwrap().failing_recipients.remove(&user);
    }

    /// Make membership queries return a network error
    pub fn set_membership_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().membership_unavailable = unavailable;
    }

    /// Make invite creation fail
    pub fn set_invite_failure(&self, fail: bool) {
        self.state.lock().unwrap().invite_failure = fail;
    }

    /// Delay every call (for timeout tests)
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Queue an inbound update
    pub fn push_update(&self, kind: UpdateKind) {
        let mut state = self.state.lock().unwrap();
        state.next_update += 1;
        let id = state.next_update;
        state.incoming.push(Update { id, kind });
    }

    /// Get sent messages for assertions
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent_messages.clone()
    }

    /// Messages sent to one user
    pub fn messages_to(&self, user: UserId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent_messages
            .iter()
            .filter(|msg| msg.recipient == user)
            .map(|msg| msg.content.clone())
            .collect()
    }

    /// Last message sent to a user, if any
    pub fn last_message_to(&self, user: UserId) -> Option<String> {
        self.messages_to(user).pop()
    }

    /// Invite links created so far
    pub fn created_invites(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .invites
            .iter()
            .map(|(_, url, _)| url.clone())
            .collect()
    }

    /// Invite links revoked so far
    pub fn revoked_invites(&self) -> Vec<String> {
        self.state.lock().unwrap().revoked.clone()
    }

    /// Clear all state
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = MockState::default();
    }

    async fn pause(&self) {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MessagingClient for MockMessagingClient {
    async fn send_message(&self, user: UserId, text: &str) -> PlatformResult<()> {
        self.pause().await;

        let mut state = self.state.lock().unwrap();
        if state.failing_recipients.contains(&user) {
            return Err(PlatformError::RecipientUnavailable(format!(
                "bot was blocked by user {}",
                user
            )));
        }

        state.sent_messages.push(SentMessage {
            recipient: user,
            content: text.to_string(),
        });
        Ok(())
    }

    async fn create_single_use_invite(
        &self,
        channel: ChannelId,
        ttl: Duration,
    ) -> PlatformResult<String> {
        self.pause().await;

        let mut state = self.state.lock().unwrap();
        if state.invite_failure {
            return Err(PlatformError::Network("connection reset".to_string()));
        }

        state.next_invite += 1;
        let url = format!("https://t.me/+mock{}", state.next_invite);
        state.invites.push((channel, url.clone(), ttl));
        Ok(url)
    }

    async fn revoke_invite(&self, _channel: ChannelId, url: &str) -> PlatformResult<()> {
        self.pause().await;

        self.state.lock().unwrap().revoked.push(url.to_string());
        Ok(())
    }

    async fn check_membership(
        &self,
        channel: ChannelId,
        user: UserId,
    ) -> PlatformResult<MemberRole> {
        self.pause().await;

        let state = self.state.lock().unwrap();
        if state.membership_unavailable {
            return Err(PlatformError::Network("getChatMember failed".to_string()));
        }

        Ok(state
            .roles
            .get(&(channel, user))
            .copied()
            .unwrap_or(MemberRole::Left))
    }

    async fn receive_updates(&self) -> PlatformResult<Vec<Update>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.incoming.drain(..).collect())
    }
}
