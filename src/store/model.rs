//! Persisted records: users, invite links, signals, deliveries, channel events.

use crate::clock::Timestamp;
use crate::platform::{ChannelId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Registration stage a user can be suspended from and restored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    New,
    AwaitingProfile,
    AwaitingMembership,
    Active,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::New => "new",
            Stage::AwaitingProfile => "awaiting_profile",
            Stage::AwaitingMembership => "awaiting_membership",
            Stage::Active => "active",
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Stage::New),
            "awaiting_profile" => Ok(Stage::AwaitingProfile),
            "awaiting_membership" => Ok(Stage::AwaitingMembership),
            "active" => Ok(Stage::Active),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// Registration state of a user.
///
/// `Suspended` remembers the stage it interrupted so that reinstatement
/// restores exactly that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserState {
    New,
    AwaitingProfile,
    AwaitingMembership,
    Active,
    Suspended { previous: Stage },
}

impl UserState {
    /// Storage label (suspension drops the previous stage)
    pub fn label(&self) -> &'static str {
        match self {
            UserState::Suspended { .. } => "suspended",
            other => other.stage().map(|s| s.as_str()).unwrap_or("suspended"),
        }
    }

    /// The stage for a non-suspended state
    pub fn stage(&self) -> Option<Stage> {
        match self {
            UserState::New => Some(Stage::New),
            UserState::AwaitingProfile => Some(Stage::AwaitingProfile),
            UserState::AwaitingMembership => Some(Stage::AwaitingMembership),
            UserState::Active => Some(Stage::Active),
            UserState::Suspended { .. } => None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, UserState::Suspended { .. })
    }
}

impl From<Stage> for UserState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::New => UserState::New,
            Stage::AwaitingProfile => UserState::AwaitingProfile,
            Stage::AwaitingMembership => UserState::AwaitingMembership,
            Stage::Active => UserState::Active,
        }
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserState::Suspended { previous } => write!(f, "suspended (from {})", previous.as_str()),
            other => f.write_str(other.label()),
        }
    }
}

/// Subscription tier chosen at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    Basic,
    Premium,
    Vip,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Basic => "basic",
            AccessLevel::Premium => "premium",
            AccessLevel::Vip => "vip",
        }
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(AccessLevel::Basic),
            "premium" => Ok(AccessLevel::Premium),
            "vip" => Ok(AccessLevel::Vip),
            other => Err(format!("unknown access level '{}'", other)),
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile captured once during registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub phone: String,
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub state: UserState,
    pub profile: Option<Profile>,
    /// Current invite link (owned by the invite manager)
    pub invite_link_id: Option<String>,
    pub created_at: Timestamp,
    pub activated_at: Option<Timestamp>,
    /// Last observed channel membership; set on activation, cleared on leave
    pub channel_member: bool,
}

impl User {
    pub fn new(id: UserId, now: Timestamp) -> Self {
        Self {
            id,
            state: UserState::New,
            profile: None,
            invite_link_id: None,
            created_at: now,
            activated_at: None,
            channel_member: false,
        }
    }

    /// ACTIVE and still in the channel
    pub fn receives_signals(&self) -> bool {
        self.state == UserState::Active && self.channel_member
    }
}

/// Filter for user listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserFilter {
    #[default]
    All,
    New,
    AwaitingProfile,
    AwaitingMembership,
    Active,
    Suspended,
}

impl UserFilter {
    /// State label to match, `None` for all users
    pub fn label(&self) -> Option<&'static str> {
        match self {
            UserFilter::All => None,
            UserFilter::New => Some("new"),
            UserFilter::AwaitingProfile => Some("awaiting_profile"),
            UserFilter::AwaitingMembership => Some("awaiting_membership"),
            UserFilter::Active => Some("active"),
            UserFilter::Suspended => Some("suspended"),
        }
    }

    pub fn matches(&self, state: &UserState) -> bool {
        self.label().map_or(true, |label| label == state.label())
    }
}

/// Per-state user counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserCounts {
    pub total: u64,
    pub active: u64,
    /// New, awaiting profile or awaiting membership
    pub pending: u64,
    pub suspended: u64,
    /// Users last seen as channel members
    pub in_channel: u64,
    /// Users with a profile, by access level
    pub basic: u64,
    pub premium: u64,
    pub vip: u64,
}

impl UserCounts {
    pub fn record(&mut self, user: &User) {
        self.add(
            &user.state,
            user.profile.as_ref().map(|p| p.access_level),
            user.channel_member,
            1,
        );
    }

    /// Count `n` users sharing a state, access level and membership flag.
    pub fn add(
        &mut self,
        state: &UserState,
        level: Option<AccessLevel>,
        channel_member: bool,
        n: u64,
    ) {
        self.total += n;
        match state {
            UserState::Active => self.active += n,
            UserState::Suspended { .. } => self.suspended += n,
            _ => self.pending += n,
        }
        if channel_member {
            self.in_channel += n;
        }
        match level {
            Some(AccessLevel::Basic) => self.basic += n,
            Some(AccessLevel::Premium) => self.premium += n,
            Some(AccessLevel::Vip) => self.vip += n,
            None => {}
        }
    }
}

/// One-time channel invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteLink {
    pub id: String,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub url: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub used: bool,
    pub used_at: Option<Timestamp>,
}

impl InviteLink {
    /// Expired once `now` reaches `expires_at`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Unused and unexpired
    pub fn is_redeemable(&self, now: Timestamp) -> bool {
        !self.used && !self.is_expired(now)
    }
}

/// What a distribution run carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    /// Signal pushed by an admin
    Signal,
    /// Free-form admin announcement
    Broadcast,
    /// Post mirrored from the restricted channel
    AutoForward,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Signal => "signal",
            SignalKind::Broadcast => "broadcast",
            SignalKind::AutoForward => "auto_forward",
        }
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signal" => Ok(SignalKind::Signal),
            "broadcast" => Ok(SignalKind::Broadcast),
            "auto_forward" => Ok(SignalKind::AutoForward),
            other => Err(format!("unknown signal kind '{}'", other)),
        }
    }
}

/// Who issued a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Issuer {
    Admin(UserId),
    System,
}

impl Issuer {
    /// Storage form: admin id, or `None` for the system
    pub fn admin_id(&self) -> Option<i64> {
        match self {
            Issuer::Admin(id) => Some(id.0),
            Issuer::System => None,
        }
    }
}

impl fmt::Display for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issuer::Admin(id) => write!(f, "admin:{}", id),
            Issuer::System => f.write_str("system"),
        }
    }
}

/// Opaque payload fanned out to active users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub kind: SignalKind,
    pub payload: String,
    pub issuer: Issuer,
    pub created_at: Timestamp,
}

impl Signal {
    pub fn new(kind: SignalKind, payload: impl Into<String>, issuer: Issuer, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload: payload.into(),
            issuer,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed { reason: String },
}

impl DeliveryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed { .. } => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            DeliveryStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// Rebuild from the stored label and optional reason
    pub fn from_parts(label: &str, reason: Option<String>) -> Result<Self, String> {
        match label {
            "pending" => Ok(DeliveryStatus::Pending),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed {
                reason: reason.unwrap_or_default(),
            }),
            other => Err(format!("unknown delivery status '{}'", other)),
        }
    }
}

/// Outcome of delivering one signal to one user in one run.
///
/// Keyed by `(run_id, user_id)`: rerunning a signal adds records, it never
/// rewrites an earlier run's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub run_id: Uuid,
    pub signal_id: Uuid,
    pub user_id: UserId,
    pub status: DeliveryStatus,
    pub attempted_at: Option<Timestamp>,
}

/// Observed membership change in the restricted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelEventKind {
    Joined,
    Left,
}

impl ChannelEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelEventKind::Joined => "joined",
            ChannelEventKind::Left => "left",
        }
    }
}

impl FromStr for ChannelEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joined" => Ok(ChannelEventKind::Joined),
            "left" => Ok(ChannelEventKind::Left),
            other => Err(format!("unknown channel event '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub user_id: UserId,
    pub kind: ChannelEventKind,
    pub timestamp: Timestamp,
    pub details: String,
}
