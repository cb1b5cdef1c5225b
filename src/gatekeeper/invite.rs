//! One-time Invite Links
//!
//! - At most one redeemable link per user (`DuplicateActiveLink` otherwise)
//! - Links admit one member and expire after the configured TTL, both on the
//!   platform side and here
//! - Expiry is lazy: every read site compares `expires_at` with the clock
//! - A consumed or revoked link never grants access again
//!
//! Revoked links are stored as `used` with no `used_at`.

use crate::clock::Timestamp;
use crate::error::{GatewayError, GatewayResult};
use crate::platform::retry::with_timeout;
use crate::platform::{ChannelId, MessagingClient, UserId};
use crate::store::{InviteLink, RecordStore, UserStore};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Random bytes in a link id (hex encoded).
const LINK_ID_BYTES: usize = 16;

pub struct InviteLinkManager<C: MessagingClient> {
    client: C,
    users: Arc<UserStore>,
    records: Arc<dyn RecordStore>,
    request_timeout: Duration,
    /// Serializes link mutations so consumption is exactly-once.
    write_lock: Mutex<()>,
}

impl<C: MessagingClient> InviteLinkManager<C> {
    pub fn new(client: C, users: Arc<UserStore>, request_timeout: Duration) -> Self {
        let records = users.records();
        Self {
            client,
            users,
            records,
            request_timeout,
            write_lock: Mutex::new(()),
        }
    }

    /// Whether `link` has expired at `now`.
    pub fn is_expired(link: &InviteLink, now: Timestamp) -> bool {
        link.is_expired(now)
    }

    /// The user's most recent link, used or not.
    pub async fn current(&self, user: UserId) -> GatewayResult<Option<InviteLink>> {
        let Some(record) = self.users.get(user).await? else {
            return Ok(None);
        };
        match record.invite_link_id {
            Some(id) => Ok(self.records.get_link(&id).await?),
            None => Ok(None),
        }
    }

    /// Create a single-use link for `user`.
    pub async fn issue(
        &self,
        user: UserId,
        channel: ChannelId,
        ttl: Duration,
    ) -> GatewayResult<InviteLink> {
        let _guard = self.write_lock.lock().await;

        let now = self.users.now();
        if let Some(existing) = self.current(user).await? {
            if existing.is_redeemable(now) {
                return Err(GatewayError::DuplicateActiveLink(user));
            }
        }

        let url = with_timeout(
            self.request_timeout,
            self.client.create_single_use_invite(channel, ttl),
        )
        .await?;

        let link = InviteLink {
            id: new_link_id(),
            user_id: user,
            channel_id: channel,
            url,
            created_at: now,
            expires_at: now.saturating_add(ttl.as_secs()),
            used: false,
            used_at: None,
        };
        self.records.put_link(&link).await?;
        self.users.set_invite_link(user, Some(link.id.clone())).await?;

        info!(
            user_id = %user,
            link_id = %link.id,
            expires_at = link.expires_at,
            "Invite link issued"
        );
        Ok(link)
    }

    /// Mark the current link used.
    ///
    /// Returns false, changing nothing, when there is no link or it is
    /// already used or expired at call time.
    pub async fn consume(&self, user: UserId) -> GatewayResult<bool> {
        let _guard = self.write_lock.lock().await;

        let now = self.users.now();
        let Some(mut link) = self.current(user).await? else {
            return Ok(false);
        };

        if link.used {
            return Ok(false);
        }
        if Self::is_expired(&link, now) {
            info!(user_id = %user, link_id = %link.id, "Invite link expired before use");
            return Ok(false);
        }

        link.used = true;
        link.used_at = Some(now);
        self.records.put_link(&link).await?;
        info!(user_id = %user, link_id = %link.id, "Invite link consumed");
        Ok(true)
    }

    /// Retire any outstanding link without granting access.
    ///
    /// Platform-side revocation is best-effort. Returns whether a link was
    /// outstanding.
    pub async fn revoke(&self, user: UserId) -> GatewayResult<bool> {
        let _guard = self.write_lock.lock().await;

        let Some(mut link) = self.current(user).await? else {
            return Ok(false);
        };
        if link.used {
            return Ok(false);
        }

        link.used = true;
        link.used_at = None;
        self.records.put_link(&link).await?;

        if let Err(e) = with_timeout(
            self.request_timeout,
            self.client.revoke_invite(link.channel_id, &link.url),
        )
        .await
        {
            warn!(user_id = %user, link_id = %link.id, error = %e, "Platform revocation failed");
        }

        info!(user_id = %user, link_id = %link.id, "Invite link revoked");
        Ok(true)
    }
}

fn new_link_id() -> String {
    let mut bytes = [0u8; LINK_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::platform::MockMessagingClient;
    use crate::store::MemoryStore;

    const CHANNEL: ChannelId = ChannelId(-1001);
    const TTL: Duration = Duration::from_secs(3600);

    struct Fixture {
        client: MockMessagingClient,
        clock: ManualClock,
        manager: InviteLinkManager<MockMessagingClient>,
    }

    async fn fixture(user: UserId) -> Fixture {
        let client = MockMessagingClient::new();
        let clock = ManualClock::new(10_000);
        let users = Arc::new(UserStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
        ));
        users.get_or_create(user).await.unwrap();
        let manager = InviteLinkManager::new(client.clone(), users, Duration::from_secs(5));
        Fixture {
            client,
            clock,
            manager,
        }
    }

    #[tokio::test]
    async fn test_issue_creates_platform_invite() {
        let f = fixture(UserId(42)).await;
        let link = f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap();

        assert!(!link.used);
        assert_eq!(link.expires_at, 13_600);
        assert_eq!(link.id.len(), LINK_ID_BYTES * 2);
        assert_eq!(f.client.created_invites(), vec![link.url.clone()]);
        assert_eq!(f.manager.current(UserId(42)).await.unwrap(), Some(link));
    }

    #[tokio::test]
    async fn test_second_issue_is_rejected_while_redeemable() {
        let f = fixture(UserId(42)).await;
        f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap();

        let err = f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateActiveLink(UserId(42))));
        assert_eq!(f.client.created_invites().len(), 1);
    }

    #[tokio::test]
    async fn test_issue_allowed_after_expiry() {
        let f = fixture(UserId(42)).await;
        let first = f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap();
        f.clock.advance(TTL);

        let second = f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_consume_is_exactly_once() {
        let f = fixture(UserId(42)).await;
        f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap();

        assert!(f.manager.consume(UserId(42)).await.unwrap());
        assert!(!f.manager.consume(UserId(42)).await.unwrap());

        let link = f.manager.current(UserId(42)).await.unwrap().unwrap();
        assert!(link.used);
        assert_eq!(link.used_at, Some(10_000));
    }

    #[tokio::test]
    async fn test_consume_expired_link_fails_without_change() {
        let f = fixture(UserId(42)).await;
        f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap();
        f.clock.advance(TTL + Duration::from_secs(1));

        assert!(!f.manager.consume(UserId(42)).await.unwrap());
        let link = f.manager.current(UserId(42)).await.unwrap().unwrap();
        assert!(!link.used);
    }

    #[tokio::test]
    async fn test_consume_without_link() {
        let f = fixture(UserId(42)).await;
        assert!(!f.manager.consume(UserId(42)).await.unwrap());
        assert!(!f.manager.consume(UserId(7)).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_blocks_consumption() {
        let f = fixture(UserId(42)).await;
        let link = f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap();

        assert!(f.manager.revoke(UserId(42)).await.unwrap());
        assert!(!f.manager.consume(UserId(42)).await.unwrap());
        assert!(!f.manager.revoke(UserId(42)).await.unwrap());
        assert_eq!(f.client.revoked_invites(), vec![link.url]);

        // A fresh link can be issued once the old one is retired
        assert!(f.manager.issue(UserId(42), CHANNEL, TTL).await.is_ok());
    }

    #[tokio::test]
    async fn test_platform_failure_surfaces() {
        let f = fixture(UserId(42)).await;
        f.client.set_invite_failure(true);

        let err = f.manager.issue(UserId(42), CHANNEL, TTL).await.unwrap_err();
        assert!(matches!(err, GatewayError::Platform(_)));
        assert_eq!(f.manager.current(UserId(42)).await.unwrap(), None);
    }
}
