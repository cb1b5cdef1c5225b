//! User registry and the only writer of registration state.
//!
//! Every transition runs under a store-wide write lock and is persisted
//! before it returns, so readers never observe a half-applied change.

use super::model::{AccessLevel, Profile, User, UserCounts, UserFilter, UserState};
use super::RecordStore;
use crate::clock::{Clock, Timestamp};
use crate::error::{GatewayError, GatewayResult};
use crate::platform::UserId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct UserStore {
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

fn invalid(user: &User, operation: &'static str) -> GatewayError {
    GatewayError::InvalidState {
        user: user.id,
        operation,
        actual: user.state,
    }
}

impl UserStore {
    pub fn new(records: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Underlying record store (shared with the invite manager and distributor).
    pub fn records(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.records)
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub async fn get(&self, id: UserId) -> GatewayResult<Option<User>> {
        Ok(self.records.get_user(id).await?)
    }

    /// Fetch a user, creating it in `New` on first contact.
    pub async fn get_or_create(&self, id: UserId) -> GatewayResult<User> {
        if let Some(user) = self.records.get_user(id).await? {
            return Ok(user);
        }

        let _guard = self.write_lock.lock().await;
        let user = self
            .records
            .insert_user_if_absent(User::new(id, self.clock.now()))
            .await?;
        info!(user_id = %id, state = %user.state, "User registered");
        Ok(user)
    }

    /// Apply `change` to the stored user under the write lock.
    ///
    /// `change` returns whether the record was modified; unmodified users
    /// are not rewritten.
    async fn transition<F>(&self, id: UserId, change: F) -> GatewayResult<User>
    where
        F: FnOnce(&mut User, Timestamp) -> GatewayResult<bool>,
    {
        let _guard = self.write_lock.lock().await;
        let mut user = self
            .records
            .get_user(id)
            .await?
            .ok_or(GatewayError::UserNotFound(id))?;

        if change(&mut user, self.clock.now())? {
            self.records.put_user(&user).await?;
        }
        Ok(user)
    }

    /// NEW → AWAITING_PROFILE. No-op when already awaiting a profile.
    pub async fn begin_registration(&self, id: UserId) -> GatewayResult<User> {
        self.transition(id, |user, _| match user.state {
            UserState::New => {
                user.state = UserState::AwaitingProfile;
                info!(user_id = %id, "Registration started");
                Ok(true)
            }
            UserState::AwaitingProfile => Ok(false),
            _ => Err(invalid(user, "begin registration")),
        })
        .await
    }

    /// Store the profile and move to AWAITING_MEMBERSHIP.
    pub async fn update_profile(
        &self,
        id: UserId,
        name: &str,
        phone: &str,
        access_level: AccessLevel,
    ) -> GatewayResult<User> {
        self.transition(id, |user, _| match user.state {
            UserState::New | UserState::AwaitingProfile => {
                user.profile = Some(Profile {
                    name: name.to_string(),
                    phone: phone.to_string(),
                    access_level,
                });
                user.state = UserState::AwaitingMembership;
                info!(user_id = %id, level = %access_level, "Profile completed");
                Ok(true)
            }
            _ => Err(invalid(user, "update profile")),
        })
        .await
    }

    /// AWAITING_MEMBERSHIP → ACTIVE. Idempotent once active.
    ///
    /// Callers have just verified membership, so the user is marked as a
    /// channel member.
    pub async fn activate(&self, id: UserId) -> GatewayResult<User> {
        self.transition(id, |user, now| match user.state {
            UserState::AwaitingMembership => {
                user.state = UserState::Active;
                user.activated_at = Some(now);
                user.channel_member = true;
                info!(user_id = %id, "User activated");
                Ok(true)
            }
            UserState::Active => Ok(false),
            _ => Err(invalid(user, "activate")),
        })
        .await
    }

    pub async fn suspend(&self, id: UserId) -> GatewayResult<User> {
        self.transition(id, |user, _| match user.state.stage() {
            Some(previous) => {
                user.state = UserState::Suspended { previous };
                info!(user_id = %id, previous = previous.as_str(), "User suspended");
                Ok(true)
            }
            None => Err(invalid(user, "suspend")),
        })
        .await
    }

    /// Restore the stage the user was suspended from.
    pub async fn reinstate(&self, id: UserId) -> GatewayResult<User> {
        self.transition(id, |user, _| match user.state {
            UserState::Suspended { previous } => {
                user.state = UserState::from(previous);
                info!(user_id = %id, restored = previous.as_str(), "User reinstated");
                Ok(true)
            }
            _ => Err(invalid(user, "reinstate")),
        })
        .await
    }

    pub async fn set_invite_link(&self, id: UserId, link_id: Option<String>) -> GatewayResult<User> {
        self.transition(id, |user, _| {
            if user.invite_link_id == link_id {
                return Ok(false);
            }
            user.invite_link_id = link_id;
            Ok(true)
        })
        .await
    }

    /// Record an observed join or leave. `None` for users never seen.
    pub async fn set_channel_member(
        &self,
        id: UserId,
        member: bool,
    ) -> GatewayResult<Option<User>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut user) = self.records.get_user(id).await? else {
            return Ok(None);
        };

        if user.channel_member != member {
            user.channel_member = member;
            self.records.put_user(&user).await?;
            info!(user_id = %id, member, state = %user.state, "Channel membership updated");
        }
        Ok(Some(user))
    }

    /// Page `page` (zero-based) of users matching `filter`.
    pub async fn list(
        &self,
        filter: UserFilter,
        page: usize,
        page_size: usize,
    ) -> GatewayResult<Vec<User>> {
        let offset = page.saturating_mul(page_size);
        Ok(self
            .records
            .list_users(filter, offset, Some(page_size))
            .await?)
    }

    /// Every ACTIVE user still in the channel, read once under the write lock.
    pub async fn active_snapshot(&self) -> GatewayResult<Vec<User>> {
        let _guard = self.write_lock.lock().await;
        let active = self
            .records
            .list_users(UserFilter::Active, 0, None)
            .await?;
        Ok(active.into_iter().filter(User::receives_signals).collect())
    }

    pub async fn counts(&self) -> GatewayResult<UserCounts> {
        Ok(self.records.count_users().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::model::Stage;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn store_with_clock() -> (UserStore, ManualClock) {
        let clock = ManualClock::new(1_000);
        let store = UserStore::new(Arc::new(MemoryStore::new()), Arc::new(clock.clone()));
        (store, clock)
    }

    async fn awaiting_membership(store: &UserStore, id: UserId) {
        store.get_or_create(id).await.unwrap();
        store.begin_registration(id).await.unwrap();
        store
            .update_profile(id, "Ali", "+989121234567", AccessLevel::Basic)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (store, clock) = store_with_clock();
        let first = store.get_or_create(UserId(42)).await.unwrap();
        clock.advance(Duration::from_secs(60));
        let second = store.get_or_create(UserId(42)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.state, UserState::New);
        assert_eq!(store.counts().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_activate_from_new_fails() {
        let (store, _) = store_with_clock();
        store.get_or_create(UserId(1)).await.unwrap();

        let err = store.activate(UserId(1)).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidState { .. }));
        assert_eq!(store.get(UserId(1)).await.unwrap().unwrap().state, UserState::New);
    }

    #[tokio::test]
    async fn test_activate_sets_timestamp_and_is_idempotent() {
        let (store, clock) = store_with_clock();
        awaiting_membership(&store, UserId(1)).await;

        clock.advance(Duration::from_secs(5));
        let user = store.activate(UserId(1)).await.unwrap();
        assert_eq!(user.state, UserState::Active);
        assert_eq!(user.activated_at, Some(1_005));

        clock.advance(Duration::from_secs(5));
        let again = store.activate(UserId(1)).await.unwrap();
        assert_eq!(again.activated_at, Some(1_005));
    }

    #[tokio::test]
    async fn test_update_profile_rejected_after_membership_stage() {
        let (store, _) = store_with_clock();
        awaiting_membership(&store, UserId(1)).await;

        let err = store
            .update_profile(UserId(1), "Other", "+1", AccessLevel::Vip)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_suspend_and_reinstate_restore_previous_stage() {
        let (store, _) = store_with_clock();
        awaiting_membership(&store, UserId(1)).await;

        let suspended = store.suspend(UserId(1)).await.unwrap();
        assert_eq!(
            suspended.state,
            UserState::Suspended {
                previous: Stage::AwaitingMembership
            }
        );
        assert!(store.suspend(UserId(1)).await.is_err());

        let restored = store.reinstate(UserId(1)).await.unwrap();
        assert_eq!(restored.state, UserState::AwaitingMembership);
        assert!(restored.profile.is_some());
        assert!(store.reinstate(UserId(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (store, _) = store_with_clock();
        assert!(matches!(
            store.suspend(UserId(99)).await,
            Err(GatewayError::UserNotFound(UserId(99)))
        ));
    }

    #[tokio::test]
    async fn test_users_who_left_are_not_snapshotted() {
        let (store, _) = store_with_clock();
        for id in [1, 2] {
            awaiting_membership(&store, UserId(id)).await;
            let user = store.activate(UserId(id)).await.unwrap();
            assert!(user.channel_member);
        }

        let left = store.set_channel_member(UserId(2), false).await.unwrap().unwrap();
        assert_eq!(left.state, UserState::Active);
        let ids: Vec<UserId> = store.active_snapshot().await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![UserId(1)]);

        store.set_channel_member(UserId(2), true).await.unwrap();
        assert_eq!(store.active_snapshot().await.unwrap().len(), 2);
        assert_eq!(store.counts().await.unwrap().in_channel, 2);
    }

    #[tokio::test]
    async fn test_channel_member_for_unknown_user() {
        let (store, _) = store_with_clock();
        assert!(store.set_channel_member(UserId(7), true).await.unwrap().is_none());
        assert!(store.get(UserId(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_state_carries_state() {
        let (store, _) = store_with_clock();
        awaiting_membership(&store, UserId(1)).await;
        store.suspend(UserId(1)).await.unwrap();

        match store.activate(UserId(1)).await.unwrap_err() {
            GatewayError::InvalidState { actual, .. } => assert_eq!(
                actual,
                UserState::Suspended {
                    previous: Stage::AwaitingMembership
                }
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_pages_in_creation_order() {
        let (store, clock) = store_with_clock();
        for id in [30, 10, 20] {
            store.get_or_create(UserId(id)).await.unwrap();
            clock.advance(Duration::from_secs(1));
        }

        let first = store.list(UserFilter::All, 0, 2).await.unwrap();
        let second = store.list(UserFilter::All, 1, 2).await.unwrap();
        let ids: Vec<i64> = first.iter().chain(second.iter()).map(|u| u.id.0).collect();
        assert_eq!(ids, vec![30, 10, 20]);
        assert!(store.list(UserFilter::All, 2, 2).await.unwrap().is_empty());
    }
}
