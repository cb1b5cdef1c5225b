//! Admin Console
//!
//! Privileged operations over users and distribution. The admin set is fixed
//! at construction. Every call is checked against it and leaves an audit
//! entry, including denied attempts.

use super::audit_trail::{ActionType, AuditEntry, AuditQuery, Outcome};
use crate::distribution::{DistributionReport, SignalDistributor};
use crate::error::{GatewayError, GatewayResult};
use crate::gatekeeper::UserLocks;
use crate::platform::{MessagingClient, UserId};
use crate::store::{Issuer, RecordStore, SignalKind, User, UserCounts, UserFilter, UserStore};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct AdminConsole<C: MessagingClient> {
    admins: HashSet<UserId>,
    users: Arc<UserStore>,
    records: Arc<dyn RecordStore>,
    distributor: Arc<SignalDistributor<C>>,
    locks: UserLocks,
    page_size: usize,
    shutdown: CancellationToken,
}

impl<C: MessagingClient> AdminConsole<C> {
    pub fn new(
        admins: HashSet<UserId>,
        users: Arc<UserStore>,
        distributor: Arc<SignalDistributor<C>>,
        locks: UserLocks,
        page_size: usize,
    ) -> Self {
        let records = users.records();
        Self {
            admins,
            users,
            records,
            distributor,
            locks,
            page_size: page_size.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Distributions started from the console stop when `token` fires.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn is_admin(&self, caller: UserId) -> bool {
        self.admins.contains(&caller)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Page `page` (1-based) of users matching `filter`.
    pub async fn list_users(
        &self,
        caller: UserId,
        filter: UserFilter,
        page: usize,
    ) -> GatewayResult<Vec<User>> {
        let target = format!("page {} ({})", page, filter.label().unwrap_or("all"));
        self.audited(caller, ActionType::ListUsers, Some(target), || {
            self.users
                .list(filter, page.saturating_sub(1), self.page_size)
        })
        .await
    }

    pub async fn get_stats(&self, caller: UserId) -> GatewayResult<UserCounts> {
        self.audited(caller, ActionType::ViewStats, None, || self.users.counts())
            .await
    }

    pub async fn find_user(&self, caller: UserId, target: UserId) -> GatewayResult<User> {
        self.audited(caller, ActionType::FindUser, Some(target.to_string()), || async move {
            self.users
                .get(target)
                .await?
                .ok_or(GatewayError::UserNotFound(target))
        })
        .await
    }

    pub async fn send_signal(
        &self,
        caller: UserId,
        payload: &str,
    ) -> GatewayResult<DistributionReport> {
        self.audited(caller, ActionType::SendSignal, None, || {
            self.fan_out(SignalKind::Signal, payload, caller)
        })
        .await
    }

    pub async fn broadcast(
        &self,
        caller: UserId,
        message: &str,
    ) -> GatewayResult<DistributionReport> {
        self.audited(caller, ActionType::Broadcast, None, || {
            self.fan_out(SignalKind::Broadcast, message, caller)
        })
        .await
    }

    pub async fn suspend_user(&self, caller: UserId, target: UserId) -> GatewayResult<User> {
        self.audited(caller, ActionType::SuspendUser, Some(target.to_string()), || async move {
            let _guard = self.locks.lock(target).await;
            self.users.suspend(target).await
        })
        .await
    }

    pub async fn reinstate_user(&self, caller: UserId, target: UserId) -> GatewayResult<User> {
        self.audited(caller, ActionType::ReinstateUser, Some(target.to_string()), || async move {
            let _guard = self.locks.lock(target).await;
            self.users.reinstate(target).await
        })
        .await
    }

    /// Most recent audit entries first.
    pub async fn audit_log(&self, caller: UserId, limit: usize) -> GatewayResult<Vec<AuditEntry>> {
        self.audited(caller, ActionType::ViewAudit, None, || async move {
            let query = AuditQuery {
                limit: Some(limit),
                ..Default::default()
            };
            Ok(self.records.audit_log(&query).await?)
        })
        .await
    }

    async fn fan_out(
        &self,
        kind: SignalKind,
        payload: &str,
        caller: UserId,
    ) -> GatewayResult<DistributionReport> {
        let signal = self
            .distributor
            .signal(kind, payload, Issuer::Admin(caller));
        self.distributor
            .distribute_with_cancel(signal, &self.shutdown)
            .await
    }

    /// Check authorization, run `operation`, and record the outcome.
    async fn audited<T, F, Fut>(
        &self,
        caller: UserId,
        action: ActionType,
        target: Option<String>,
        operation: F,
    ) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        if !self.is_admin(caller) {
            warn!(caller = %caller, action = action.as_str(), "Unauthorized admin attempt");
            self.record(caller, action, target, Outcome::Denied).await;
            return Err(GatewayError::Unauthorized(caller));
        }

        let result = operation().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Failed(e.to_string()),
        };
        info!(
            caller = %caller,
            action = action.as_str(),
            outcome = outcome.label(),
            "Admin action"
        );
        self.record(caller, action, target, outcome).await;
        result
    }

    async fn record(
        &self,
        caller: UserId,
        action: ActionType,
        target: Option<String>,
        outcome: Outcome,
    ) {
        let entry = AuditEntry::new(self.users.now(), caller, action, target, outcome);
        if let Err(e) = self.records.append_audit(&entry).await {
            warn!(caller = %caller, action = action.as_str(), error = %e, "Audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::platform::MockMessagingClient;
    use crate::store::{AccessLevel, MemoryStore, Stage, UserState};
    use std::time::Duration;

    const ADMIN: UserId = UserId(1);
    const STRANGER: UserId = UserId(7);

    struct Fixture {
        client: MockMessagingClient,
        users: Arc<UserStore>,
        console: AdminConsole<MockMessagingClient>,
    }

    fn fixture() -> Fixture {
        let client = MockMessagingClient::new();
        let users = Arc::new(UserStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_000)),
        ));
        let distributor = Arc::new(SignalDistributor::new(
            client.clone(),
            Arc::clone(&users),
            Duration::from_secs(5),
        ));
        let console = AdminConsole::new(
            HashSet::from([ADMIN]),
            Arc::clone(&users),
            distributor,
            UserLocks::new(),
            2,
        );
        Fixture {
            client,
            users,
            console,
        }
    }

    async fn activate(users: &UserStore, id: i64) {
        let id = UserId(id);
        users.get_or_create(id).await.unwrap();
        users.begin_registration(id).await.unwrap();
        users
            .update_profile(id, "User", "+15550000000", AccessLevel::Premium)
            .await
            .unwrap();
        users.activate(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_admin_signal_is_rejected_and_audited() {
        let f = fixture();
        activate(&f.users, 10).await;

        let err = f.console.send_signal(STRANGER, "BUY XYZ").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(STRANGER)));
        assert!(f.client.sent_messages().is_empty());

        let log = f.console.audit_log(ADMIN, 10).await.unwrap();
        let denied = log
            .iter()
            .find(|e| e.actor == STRANGER)
            .expect("denied attempt audited");
        assert_eq!(denied.action_type, ActionType::SendSignal);
        assert_eq!(denied.outcome, Outcome::Denied);
    }

    #[tokio::test]
    async fn test_admin_signal_reaches_active_users() {
        let f = fixture();
        for id in [10, 11] {
            activate(&f.users, id).await;
        }

        let report = f.console.send_signal(ADMIN, "BUY XYZ").await.unwrap();
        assert_eq!((report.total, report.delivered), (2, 2));

        // The audit query itself is recorded after it runs
        let log = f.console.audit_log(ADMIN, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action_type, ActionType::SendSignal);
        assert_eq!(log[0].outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn test_stats_and_paging() {
        let f = fixture();
        for id in [10, 11, 12] {
            activate(&f.users, id).await;
        }
        f.users.get_or_create(UserId(13)).await.unwrap();

        let stats = f.console.get_stats(ADMIN).await.unwrap();
        assert_eq!((stats.total, stats.active, stats.pending), (4, 3, 1));
        assert_eq!(stats.in_channel, 3);

        let first = f.console.list_users(ADMIN, UserFilter::All, 1).await.unwrap();
        let second = f.console.list_users(ADMIN, UserFilter::All, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_ne!(first[0].id, second[0].id);
    }

    #[tokio::test]
    async fn test_suspend_and_reinstate() {
        let f = fixture();
        activate(&f.users, 10).await;

        let suspended = f.console.suspend_user(ADMIN, UserId(10)).await.unwrap();
        assert_eq!(
            suspended.state,
            UserState::Suspended {
                previous: Stage::Active
            }
        );

        let report = f.console.broadcast(ADMIN, "maintenance").await.unwrap();
        assert_eq!(report.total, 0);

        let restored = f.console.reinstate_user(ADMIN, UserId(10)).await.unwrap();
        assert_eq!(restored.state, UserState::Active);
    }

    #[tokio::test]
    async fn test_failed_action_is_audited_as_failed() {
        let f = fixture();
        let err = f.console.suspend_user(ADMIN, UserId(99)).await.unwrap_err();
        assert!(matches!(err, GatewayError::UserNotFound(_)));

        let log = f.console.audit_log(ADMIN, 10).await.unwrap();
        let entry = log
            .iter()
            .find(|e| e.action_type == ActionType::SuspendUser)
            .unwrap();
        assert!(matches!(entry.outcome, Outcome::Failed(_)));
        assert_eq!(entry.target.as_deref(), Some("99"));
    }

    #[tokio::test]
    async fn test_find_user() {
        let f = fixture();
        activate(&f.users, 10).await;
        assert_eq!(f.console.find_user(ADMIN, UserId(10)).await.unwrap().id, UserId(10));
        assert!(f.console.find_user(STRANGER, UserId(10)).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_distribution() {
        let f = fixture();
        activate(&f.users, 10).await;
        let token = CancellationToken::new();
        token.cancel();
        let console = f.console.with_shutdown(token);

        let report = console.broadcast(ADMIN, "late").await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.pending, 1);
    }
}
