//! In-memory record store.
//!
//! Used by tests and by `run` when no store path is configured. Nothing
//! survives a restart.

use super::{RecordStore, StoreResult};
use crate::admin::audit_trail::{query_audit_log, AuditEntry, AuditQuery};
use crate::platform::UserId;
use crate::store::model::{
    ChannelEvent, DeliveryRecord, InviteLink, Signal, User, UserCounts, UserFilter,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Records {
    users: HashMap<UserId, User>,
    links: HashMap<String, InviteLink>,
    link_order: Vec<String>,
    signals: HashMap<Uuid, Signal>,
    /// Insertion order, unique by `(run_id, user_id)`
    deliveries: Vec<DeliveryRecord>,
    audit: Vec<AuditEntry>,
    channel_events: Vec<ChannelEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Records>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Records) -> T) -> T {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Records) -> T) -> T {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read(|r| r.users.get(&id).cloned()))
    }

    async fn insert_user_if_absent(&self, user: User) -> StoreResult<User> {
        Ok(self.write(|r| r.users.entry(user.id).or_insert(user).clone()))
    }

    async fn put_user(&self, user: &User) -> StoreResult<()> {
        self.write(|r| r.users.insert(user.id, user.clone()));
        Ok(())
    }

    async fn list_users(
        &self,
        filter: UserFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.read(|r| {
            r.users
                .values()
                .filter(|u| filter.matches(&u.state))
                .cloned()
                .collect()
        });
        users.sort_by_key(|u| (u.created_at, u.id.0));

        Ok(users
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count_users(&self) -> StoreResult<UserCounts> {
        Ok(self.read(|r| {
            let mut counts = UserCounts::default();
            for user in r.users.values() {
                counts.record(user);
            }
            counts
        }))
    }

    async fn put_link(&self, link: &InviteLink) -> StoreResult<()> {
        self.write(|r| {
            if r.links.insert(link.id.clone(), link.clone()).is_none() {
                r.link_order.push(link.id.clone());
            }
        });
        Ok(())
    }

    async fn get_link(&self, id: &str) -> StoreResult<Option<InviteLink>> {
        Ok(self.read(|r| r.links.get(id).cloned()))
    }

    async fn links_for_user(&self, user: UserId) -> StoreResult<Vec<InviteLink>> {
        Ok(self.read(|r| {
            r.link_order
                .iter()
                .filter_map(|id| r.links.get(id))
                .filter(|link| link.user_id == user)
                .cloned()
                .collect()
        }))
    }

    async fn insert_signal(&self, signal: &Signal) -> StoreResult<()> {
        self.write(|r| r.signals.insert(signal.id, signal.clone()));
        Ok(())
    }

    async fn get_signal(&self, id: Uuid) -> StoreResult<Option<Signal>> {
        Ok(self.read(|r| r.signals.get(&id).cloned()))
    }

    async fn insert_deliveries(&self, records: &[DeliveryRecord]) -> StoreResult<()> {
        self.write(|r| {
            for record in records {
                upsert_delivery(&mut r.deliveries, record);
            }
        });
        Ok(())
    }

    async fn put_delivery(&self, record: &DeliveryRecord) -> StoreResult<()> {
        self.write(|r| upsert_delivery(&mut r.deliveries, record));
        Ok(())
    }

    async fn deliveries(&self, signal_id: Uuid) -> StoreResult<Vec<DeliveryRecord>> {
        Ok(self.read(|r| {
            r.deliveries
                .iter()
                .filter(|d| d.signal_id == signal_id)
                .cloned()
                .collect()
        }))
    }

    async fn run_deliveries(&self, run_id: Uuid) -> StoreResult<Vec<DeliveryRecord>> {
        Ok(self.read(|r| {
            r.deliveries
                .iter()
                .filter(|d| d.run_id == run_id)
                .cloned()
                .collect()
        }))
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.write(|r| r.audit.push(entry.clone()));
        Ok(())
    }

    async fn audit_log(&self, query: &AuditQuery) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.read(|r| query_audit_log(&r.audit, query)))
    }

    async fn append_channel_event(&self, event: &ChannelEvent) -> StoreResult<()> {
        self.write(|r| r.channel_events.push(event.clone()));
        Ok(())
    }

    async fn channel_events(&self, user: UserId) -> StoreResult<Vec<ChannelEvent>> {
        Ok(self.read(|r| {
            r.channel_events
                .iter()
                .filter(|e| e.user_id == user)
                .cloned()
                .collect()
        }))
    }
}

fn upsert_delivery(deliveries: &mut Vec<DeliveryRecord>, record: &DeliveryRecord) {
    match deliveries
        .iter_mut()
        .find(|r| r.run_id == record.run_id && r.user_id == record.user_id)
    {
        Some(existing) => *existing = record.clone(),
        None => deliveries.push(record.clone()),
    }
}
