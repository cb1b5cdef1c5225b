//! Registration Workflow
//!
//! Onboarding state machine:
//!
//! ```text
//! NEW --start--> AWAITING_PROFILE --valid profile--> AWAITING_MEMBERSHIP
//!     (link issued) --joined + member + link consumed--> ACTIVE
//! ```
//!
//! - Invalid profile input is rejected with no state change
//! - "joined" while not yet a member, or while verification is unavailable,
//!   leaves the user waiting
//! - A member whose link can no longer be consumed gets a fresh link; the
//!   old one is never retried
//!
//! Every operation holds the per-user lock for its whole duration.

use super::invite::InviteLinkManager;
use super::membership::MembershipVerifier;
use super::user_locks::UserLocks;
use crate::error::{GatewayError, GatewayResult};
use crate::platform::{ChannelId, MessagingClient, UserId};
use crate::store::{AccessLevel, InviteLink, User, UserState, UserStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MIN_NAME_CHARS: usize = 2;
const MAX_NAME_CHARS: usize = 64;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// Raw profile input as collected from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSubmission {
    pub name: String,
    pub phone: String,
    pub access_level: String,
}

/// Result of `start`.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Prompt for contact and profile
    AwaitingProfile,
    /// Profile done; the redeemable link if there is one
    AwaitingMembership(Option<InviteLink>),
    AlreadyActive(User),
    Suspended,
}

/// Result of a valid profile submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileOutcome {
    LinkIssued(InviteLink),
    /// Profile stored but the platform refused a link; user may ask again
    LinkUnavailable(String),
}

/// Result of a "joined" report.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Activated(User),
    AlreadyActive(User),
    NotMember,
    /// Membership could not be checked; try again later
    VerificationUnavailable,
    /// Member, but the link was expired or missing; here is a fresh one
    LinkReissued(InviteLink),
}

pub struct RegistrationWorkflow<C: MessagingClient> {
    users: Arc<UserStore>,
    invites: InviteLinkManager<C>,
    verifier: MembershipVerifier<C>,
    locks: UserLocks,
    channel: ChannelId,
    invite_ttl: Duration,
}

impl<C: MessagingClient> RegistrationWorkflow<C> {
    pub fn new(
        client: C,
        users: Arc<UserStore>,
        locks: UserLocks,
        channel: ChannelId,
        invite_ttl: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            invites: InviteLinkManager::new(client.clone(), Arc::clone(&users), request_timeout),
            verifier: MembershipVerifier::new(client, request_timeout),
            users,
            locks,
            channel,
            invite_ttl,
        }
    }

    pub fn invites(&self) -> &InviteLinkManager<C> {
        &self.invites
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// First contact or `/start`.
    pub async fn start(&self, user: UserId) -> GatewayResult<StartOutcome> {
        let _guard = self.locks.lock(user).await;

        let record = self.users.get_or_create(user).await?;
        match record.state {
            UserState::New | UserState::AwaitingProfile => {
                self.users.begin_registration(user).await?;
                Ok(StartOutcome::AwaitingProfile)
            }
            UserState::AwaitingMembership => {
                let now = self.users.now();
                let link = self
                    .invites
                    .current(user)
                    .await?
                    .filter(|link| link.is_redeemable(now));
                Ok(StartOutcome::AwaitingMembership(link))
            }
            UserState::Active => Ok(StartOutcome::AlreadyActive(record)),
            UserState::Suspended { .. } => {
                info!(user_id = %user, "Suspended user attempted start");
                Ok(StartOutcome::Suspended)
            }
        }
    }

    /// Validate and store the profile, then issue the invite link.
    pub async fn submit_profile(
        &self,
        user: UserId,
        submission: &ProfileSubmission,
    ) -> GatewayResult<ProfileOutcome> {
        let _guard = self.locks.lock(user).await;

        let (name, phone, level) = validate_profile(submission)?;
        self.users.update_profile(user, &name, &phone, level).await?;

        match self.invites.issue(user, self.channel, self.invite_ttl).await {
            Ok(link) => Ok(ProfileOutcome::LinkIssued(link)),
            Err(GatewayError::Platform(e)) => {
                warn!(user_id = %user, error = %e, "Could not issue invite link");
                Ok(ProfileOutcome::LinkUnavailable(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// The user says they joined the channel.
    pub async fn joined(&self, user: UserId) -> GatewayResult<JoinOutcome> {
        let _guard = self.locks.lock(user).await;

        let record = self
            .users
            .get(user)
            .await?
            .ok_or(GatewayError::UserNotFound(user))?;
        match record.state {
            UserState::AwaitingMembership => {}
            UserState::Active => return Ok(JoinOutcome::AlreadyActive(record)),
            other => {
                return Err(GatewayError::InvalidState {
                    user,
                    operation: "verify membership",
                    actual: other,
                })
            }
        }

        let is_member = match self.verifier.is_member(user, self.channel).await {
            Ok(is_member) => is_member,
            Err(GatewayError::VerificationUnavailable(_)) => {
                return Ok(JoinOutcome::VerificationUnavailable)
            }
            Err(e) => return Err(e),
        };

        if !is_member {
            info!(user_id = %user, "Joined reported but user is not a member");
            return Ok(JoinOutcome::NotMember);
        }

        if self.invites.consume(user).await? {
            let activated = self.users.activate(user).await?;
            return Ok(JoinOutcome::Activated(activated));
        }

        info!(user_id = %user, "Member without a redeemable link, reissuing");
        let link = self.replace_link(user).await?;
        Ok(JoinOutcome::LinkReissued(link))
    }

    /// Retire the current link and issue a new one.
    pub async fn reissue_link(&self, user: UserId) -> GatewayResult<InviteLink> {
        let _guard = self.locks.lock(user).await;

        let record = self
            .users
            .get(user)
            .await?
            .ok_or(GatewayError::UserNotFound(user))?;
        if record.state != UserState::AwaitingMembership {
            return Err(GatewayError::InvalidState {
                user,
                operation: "reissue link",
                actual: record.state,
            });
        }

        self.replace_link(user).await
    }

    pub async fn profile(&self, user: UserId) -> GatewayResult<User> {
        let _guard = self.locks.lock(user).await;
        self.users
            .get(user)
            .await?
            .ok_or(GatewayError::UserNotFound(user))
    }

    async fn replace_link(&self, user: UserId) -> GatewayResult<InviteLink> {
        self.invites.revoke(user).await?;
        self.invites.issue(user, self.channel, self.invite_ttl).await
    }
}

/// Trim and check profile input.
pub fn validate_profile(
    submission: &ProfileSubmission,
) -> GatewayResult<(String, String, AccessLevel)> {
    let name = validate_name(&submission.name)?;
    let phone = validate_phone(&submission.phone)?;
    let level = validate_access_level(&submission.access_level)?;
    Ok((name, phone, level))
}

pub fn validate_name(raw: &str) -> GatewayResult<String> {
    let name = raw.trim();
    let chars = name.chars().count();
    if chars < MIN_NAME_CHARS {
        return Err(GatewayError::InvalidProfile(format!(
            "name must be at least {} characters",
            MIN_NAME_CHARS
        )));
    }
    if chars > MAX_NAME_CHARS {
        return Err(GatewayError::InvalidProfile(format!(
            "name must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

pub fn validate_phone(raw: &str) -> GatewayResult<String> {
    normalize_phone(raw).ok_or_else(|| {
        GatewayError::InvalidProfile(format!(
            "phone must contain {} to {} digits",
            MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
        ))
    })
}

pub fn validate_access_level(raw: &str) -> GatewayResult<AccessLevel> {
    raw.parse::<AccessLevel>()
        .map_err(GatewayError::InvalidProfile)
}

/// Strip separators; keep an optional leading `+`.
fn normalize_phone(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let (plus, rest) = match raw.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", raw),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' => {}
            _ => return None,
        }
    }

    if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        Some(format!("{}{}", plus, digits))
    } else {
        None
    }
}
