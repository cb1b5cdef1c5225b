//! Gateway Bot
//!
//! Polls the platform for updates and routes them:
//! - private text: user commands, admin commands, profile input
//! - shared contacts: the phone step of the profile
//! - posts in the restricted channel: auto-forwarded to ACTIVE users
//! - membership changes in the restricted channel: logged as channel events
//!   and tracked on the user, so members who left stop receiving signals
//!
//! Failures are logged and answered, never fatal to the loop.

use super::commands::{help_text, parse_command, Command};
use super::drafts::{DraftStep, ProfileDraftManager};
use super::messages::*;
use crate::admin::{format_audit_log, AdminConsole};
use crate::distribution::SignalDistributor;
use crate::error::{GatewayError, GatewayResult};
use crate::gatekeeper::{
    registration::{validate_access_level, validate_name, validate_phone},
    JoinOutcome, ProfileOutcome, RegistrationWorkflow, StartOutcome,
};
use crate::platform::retry::{is_transient, retry_with_backoff, with_timeout};
use crate::platform::{ChannelId, MemberRole, MessagingClient, Update, UpdateKind, UserId};
use crate::store::{ChannelEvent, ChannelEventKind, Issuer, SignalKind, UserState, UserStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bot loop settings
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Pause between update polls
    pub poll_interval: Duration,

    /// Bound on each reply sent
    pub request_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct GatewayBot<C: MessagingClient> {
    client: C,
    users: Arc<UserStore>,
    workflow: Arc<RegistrationWorkflow<C>>,
    distributor: Arc<SignalDistributor<C>>,
    console: Arc<AdminConsole<C>>,
    drafts: ProfileDraftManager,
    config: BotConfig,
    shutdown: CancellationToken,
}

impl<C: MessagingClient> GatewayBot<C> {
    pub fn new(
        client: C,
        users: Arc<UserStore>,
        workflow: Arc<RegistrationWorkflow<C>>,
        distributor: Arc<SignalDistributor<C>>,
        console: Arc<AdminConsole<C>>,
        config: BotConfig,
    ) -> Self {
        Self {
            client,
            users,
            workflow,
            distributor,
            console,
            drafts: ProfileDraftManager::new(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Run the update loop until `shutdown` fires.
    pub async fn run(&mut self, shutdown: CancellationToken) -> GatewayResult<()> {
        self.shutdown = shutdown.clone();
        let mut poll_interval = tokio::time::interval(self.config.poll_interval);
        info!(channel = %self.workflow.channel(), "Gateway bot started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(drafts = self.drafts.active_count(), "Gateway bot stopping");
                    return Ok(());
                }
                _ = poll_interval.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// Fetch and handle one batch of updates. Returns how many were handled.
    pub async fn poll_once(&mut self) -> usize {
        let client = self.client.clone();
        let updates = match retry_with_backoff(
            move || {
                let client = client.clone();
                async move { client.receive_updates().await }
            },
            is_transient,
        )
        .await
        {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Error receiving updates, will retry");
                return 0;
            }
        };

        let count = updates.len();
        for update in updates {
            self.process(update).await;
        }
        count
    }

    /// Handle one update; errors are logged and answered to the sender.
    pub async fn process(&mut self, update: Update) {
        let update_id = update.id;
        let sender = sender_of(&update.kind);

        if let Err(e) = self.handle_update(update).await {
            warn!(update_id, error = %e, "Error handling update");
            if let Some(user) = sender {
                self.reply(user, &error_reply(&e, user)).await;
            }
        }
    }

    async fn handle_update(&mut self, update: Update) -> GatewayResult<()> {
        match update.kind {
            UpdateKind::Text { from, text } => {
                let reply = self.handle_text(from, &text).await?;
                self.reply(from, &reply).await;
            }
            UpdateKind::Contact { from, phone } => {
                let reply = self.handle_contact(from, &phone).await?;
                self.reply(from, &reply).await;
            }
            UpdateKind::ChannelPost { channel, text } => {
                self.handle_channel_post(channel, &text).await?;
            }
            UpdateKind::MemberChanged {
                channel,
                user,
                old,
                new,
            } => {
                self.handle_member_change(channel, user, old, new).await?;
            }
        }
        Ok(())
    }

    async fn handle_text(&mut self, from: UserId, text: &str) -> GatewayResult<String> {
        let command = parse_command(text);
        debug!(user_id = %from, ?command, "Private message");

        match command {
            Command::Start => self.handle_start(from).await,
            Command::Joined => self.handle_joined(from).await,
            Command::NewLink => {
                let link = self.workflow.reissue_link(from).await?;
                Ok(msg_invite(&link, self.users.now()))
            }
            Command::Profile => {
                let user = self.workflow.profile(from).await?;
                Ok(msg_profile(&user))
            }
            Command::Cancel => {
                if self.drafts.cancel(from) {
                    Ok(msg_cancelled())
                } else {
                    Ok(msg_nothing_to_cancel())
                }
            }
            Command::Help => Ok(help_text(self.console.is_admin(from))),
            Command::Text(input) => self.handle_profile_input(from, &input).await,
            Command::Unknown(raw) => Ok(msg_unknown_command(&raw)),
            admin => self.handle_admin(from, admin).await,
        }
    }

    async fn handle_start(&mut self, from: UserId) -> GatewayResult<String> {
        let reply = match self.workflow.start(from).await? {
            StartOutcome::AwaitingProfile => match self.drafts.begin(from) {
                DraftStep::Phone => msg_welcome(),
                DraftStep::Name => msg_ask_name(),
                DraftStep::AccessLevel => msg_ask_access_level(),
            },
            StartOutcome::AwaitingMembership(Some(link)) => msg_invite(&link, self.users.now()),
            StartOutcome::AwaitingMembership(None) => msg_awaiting_membership_without_link(),
            StartOutcome::AlreadyActive(user) => msg_profile(&user),
            StartOutcome::Suspended => msg_suspended(),
        };
        Ok(reply)
    }

    async fn handle_joined(&mut self, from: UserId) -> GatewayResult<String> {
        let reply = match self.workflow.joined(from).await? {
            JoinOutcome::Activated(user) => {
                info!(user_id = %user.id, "User activated");
                msg_activated()
            }
            JoinOutcome::AlreadyActive(user) => msg_profile(&user),
            JoinOutcome::NotMember => msg_not_member(),
            JoinOutcome::VerificationUnavailable => msg_verification_unavailable(),
            JoinOutcome::LinkReissued(link) => msg_link_reissued(&link, self.users.now()),
        };
        Ok(reply)
    }

    async fn handle_contact(&mut self, from: UserId, phone: &str) -> GatewayResult<String> {
        if self.drafts.get(from).is_none() && !self.resume_draft(from).await? {
            return Ok(help_text(self.console.is_admin(from)));
        }
        Ok(self.record_phone(from, phone))
    }

    /// Free text is the next profile field.
    async fn handle_profile_input(&mut self, from: UserId, input: &str) -> GatewayResult<String> {
        if self.drafts.get(from).is_none() && !self.resume_draft(from).await? {
            return Ok(help_text(self.console.is_admin(from)));
        }

        let step = self.drafts.begin(from);
        match step {
            DraftStep::Phone => Ok(self.record_phone(from, input)),
            DraftStep::Name => match validate_name(input) {
                Ok(name) => {
                    self.drafts
                        .set_name(from, name)
                        .map_err(|e| GatewayError::InvalidProfile(e.to_string()))?;
                    Ok(msg_ask_access_level())
                }
                Err(GatewayError::InvalidProfile(reason)) => Ok(msg_invalid_input(&reason)),
                Err(e) => Err(e),
            },
            DraftStep::AccessLevel => {
                if let Err(GatewayError::InvalidProfile(reason)) = validate_access_level(input) {
                    return Ok(msg_invalid_input(&reason));
                }
                let submission = self
                    .drafts
                    .complete(from, input)
                    .map_err(|e| GatewayError::InvalidProfile(e.to_string()))?;

                match self.workflow.submit_profile(from, &submission).await? {
                    ProfileOutcome::LinkIssued(link) => Ok(msg_invite(&link, self.users.now())),
                    ProfileOutcome::LinkUnavailable(_) => Ok(msg_link_unavailable()),
                }
            }
        }
    }

    fn record_phone(&mut self, from: UserId, raw: &str) -> String {
        let phone = match validate_phone(raw) {
            Ok(phone) => phone,
            Err(e) => return msg_invalid_input(&profile_reason(&e)),
        };
        match self.drafts.set_phone(from, phone) {
            Ok(DraftStep::AccessLevel) => msg_ask_access_level(),
            Ok(_) => msg_ask_name(),
            Err(_) => msg_ask_phone(),
        }
    }

    /// Start a draft for a user awaiting their profile (e.g. after a restart).
    async fn resume_draft(&mut self, from: UserId) -> GatewayResult<bool> {
        match self.users.get(from).await? {
            Some(user) if user.state == UserState::AwaitingProfile => {
                self.drafts.begin(from);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn handle_admin(&mut self, from: UserId, command: Command) -> GatewayResult<String> {
        let reply = match command {
            Command::Users { filter, page } => {
                let users = self.console.list_users(from, filter, page).await?;
                msg_user_page(&users, page)
            }
            Command::User { id } => {
                let user = self.console.find_user(from, id).await?;
                msg_user_detail(&user)
            }
            Command::Stats => msg_stats(&self.console.get_stats(from).await?),
            Command::Signal { payload } => self.console.send_signal(from, &payload).await?.summary(),
            Command::Broadcast { message } => {
                self.console.broadcast(from, &message).await?.summary()
            }
            Command::Suspend { id } => {
                let user = self.console.suspend_user(from, id).await?;
                self.drafts.cancel(id);
                msg_suspended_user(&user)
            }
            Command::Reinstate { id } => {
                let user = self.console.reinstate_user(from, id).await?;
                msg_reinstated_user(&user)
            }
            Command::Audit { limit } => {
                let entries = self.console.audit_log(from, limit).await?;
                format_audit_log(&entries, self.users.now())
            }
            other => msg_unknown_command(&format!("{:?}", other)),
        };
        Ok(reply)
    }

    /// Mirror a channel post to ACTIVE users.
    async fn handle_channel_post(&self, channel: ChannelId, text: &str) -> GatewayResult<()> {
        if channel != self.workflow.channel() || text.trim().is_empty() {
            return Ok(());
        }

        let signal = self
            .distributor
            .signal(SignalKind::AutoForward, text, Issuer::System);
        let report = self
            .distributor
            .distribute_with_cancel(signal, &self.shutdown)
            .await?;
        info!(
            signal_id = %report.signal_id,
            delivered = report.delivered,
            failed = report.failed,
            "Channel post forwarded"
        );
        Ok(())
    }

    async fn handle_member_change(
        &self,
        channel: ChannelId,
        user: UserId,
        old: MemberRole,
        new: MemberRole,
    ) -> GatewayResult<()> {
        if channel != self.workflow.channel() {
            return Ok(());
        }

        let kind = match (old.is_present(), new.is_present()) {
            (false, true) => ChannelEventKind::Joined,
            (true, false) => ChannelEventKind::Left,
            _ => return Ok(()),
        };

        let event = ChannelEvent {
            user_id: user,
            kind,
            timestamp: self.users.now(),
            details: format!("{:?} -> {:?}", old, new),
        };
        self.users.records().append_channel_event(&event).await?;
        info!(user_id = %user, event = kind.as_str(), "Channel membership changed");

        let joined = kind == ChannelEventKind::Joined;
        let known = self.users.set_channel_member(user, joined).await?;
        if joined && known.is_some() {
            self.reply(user, &msg_channel_welcome()).await;
        }
        Ok(())
    }

    /// Best-effort private reply.
    async fn reply(&self, user: UserId, text: &str) {
        if let Err(e) = with_timeout(
            self.config.request_timeout,
            self.client.send_message(user, text),
        )
        .await
        {
            warn!(user_id = %user, error = %e, "Failed to send reply");
        }
    }
}

fn sender_of(kind: &UpdateKind) -> Option<UserId> {
    match kind {
        UpdateKind::Text { from, .. } | UpdateKind::Contact { from, .. } => Some(*from),
        UpdateKind::ChannelPost { .. } | UpdateKind::MemberChanged { .. } => None,
    }
}

fn profile_reason(err: &GatewayError) -> String {
    match err {
        GatewayError::InvalidProfile(reason) => reason.clone(),
        other => other.to_string(),
    }
}

/// Text sent back when handling a private message failed.
fn error_reply(err: &GatewayError, sender: UserId) -> String {
    match err {
        GatewayError::Unauthorized(_) => msg_unauthorized(),
        GatewayError::UserNotFound(id) if *id == sender => msg_not_registered(),
        GatewayError::UserNotFound(id) => format!("❓ User {} not found.", id),
        GatewayError::InvalidState {
            user,
            actual: UserState::Suspended { .. },
            ..
        } if *user == sender => msg_suspended(),
        GatewayError::InvalidState { user, actual, .. } if *user == sender => {
            format!("⚠️ That is not available while your status is {}.", actual)
        }
        GatewayError::InvalidState {
            user,
            operation,
            actual,
        } => format!("⚠️ User {} is {}, cannot {}.", user, actual, operation),
        GatewayError::InvalidProfile(reason) => msg_invalid_input(reason),
        GatewayError::VerificationUnavailable(_) => msg_verification_unavailable(),
        other => msg_error(&other.to_string()),
    }
}
