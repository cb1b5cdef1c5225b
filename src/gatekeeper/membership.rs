//! Membership verification against the restricted channel.
//!
//! A failed or timed-out platform query is `VerificationUnavailable`, never
//! a negative answer.

use crate::error::{GatewayError, GatewayResult};
use crate::platform::retry::with_timeout;
use crate::platform::{ChannelId, MessagingClient, UserId};
use std::time::Duration;
use tracing::{debug, warn};

pub struct MembershipVerifier<C: MessagingClient> {
    client: C,
    request_timeout: Duration,
}

impl<C: MessagingClient> MembershipVerifier<C> {
    pub fn new(client: C, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Owner, administrator and member count as present; restricted users
    /// count only while the platform reports them as members.
    pub async fn is_member(&self, user: UserId, channel: ChannelId) -> GatewayResult<bool> {
        match with_timeout(
            self.request_timeout,
            self.client.check_membership(channel, user),
        )
        .await
        {
            Ok(role) => {
                debug!(user_id = %user, channel = %channel, ?role, "Membership checked");
                Ok(role.is_present())
            }
            Err(e) => {
                warn!(user_id = %user, channel = %channel, error = %e, "Membership check failed");
                Err(GatewayError::VerificationUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemberRole, MockMessagingClient};

    const CHANNEL: ChannelId = ChannelId(-1001);

    #[tokio::test]
    async fn test_roles_map_to_presence() {
        let client = MockMessagingClient::new();
        let verifier = MembershipVerifier::new(client.clone(), Duration::from_secs(1));

        let cases = [
            (1, MemberRole::Owner, true),
            (2, MemberRole::Administrator, true),
            (3, MemberRole::Member, true),
            (4, MemberRole::Restricted { is_member: true }, true),
            (5, MemberRole::Restricted { is_member: false }, false),
            (6, MemberRole::Left, false),
            (7, MemberRole::Kicked, false),
        ];
        for (id, role, _) in cases {
            client.set_role(CHANNEL, UserId(id), role);
        }

        for (id, role, expected) in cases {
            assert_eq!(
                verifier.is_member(UserId(id), CHANNEL).await.unwrap(),
                expected,
                "{:?}",
                role
            );
        }
    }

    #[tokio::test]
    async fn test_platform_error_is_unavailable_not_false() {
        let client = MockMessagingClient::new();
        client.set_membership_unavailable(true);
        let verifier = MembershipVerifier::new(client, Duration::from_secs(1));

        let err = verifier.is_member(UserId(1), CHANNEL).await.unwrap_err();
        assert!(matches!(err, GatewayError::VerificationUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_unavailable() {
        let client = MockMessagingClient::new();
        client.set_role(CHANNEL, UserId(1), MemberRole::Member);
        client.set_delay(Some(Duration::from_secs(30)));
        let verifier = MembershipVerifier::new(client, Duration::from_secs(2));

        let err = verifier.is_member(UserId(1), CHANNEL).await.unwrap_err();
        assert!(matches!(err, GatewayError::VerificationUnavailable(_)));
    }
}
