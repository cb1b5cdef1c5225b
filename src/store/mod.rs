//! Record Store Module
//!
//! Durable records behind the gateway: users, invite links, signals,
//! delivery records, the admin audit trail and observed channel events.
//!
//! `RecordStore` is the persistence seam. `MemoryStore` backs tests and
//! ephemeral runs; `SqliteStore` is the on-disk implementation. All state
//! transitions go through `UserStore`, which serializes writers.

pub mod memory;
pub mod model;
pub mod sqlite;
pub mod user_store;

pub use memory::MemoryStore;
pub use model::{
    AccessLevel, ChannelEvent, ChannelEventKind, DeliveryRecord, DeliveryStatus, InviteLink,
    Issuer, Profile, Signal, SignalKind, Stage, User, UserCounts, UserFilter, UserState,
};
pub use sqlite::SqliteStore;
pub use user_store::UserStore;

use crate::admin::audit_trail::{AuditEntry, AuditQuery};
use crate::platform::UserId;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed persistence for every gateway record.
///
/// Writes are visible to subsequent reads on the same store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Insert `user` unless a record with its id exists; returns the stored record.
    async fn insert_user_if_absent(&self, user: User) -> StoreResult<User>;

    async fn put_user(&self, user: &User) -> StoreResult<()>;

    /// Users matching `filter`, ordered by `(created_at, id)`.
    async fn list_users(
        &self,
        filter: UserFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<User>>;

    async fn count_users(&self) -> StoreResult<UserCounts>;

    async fn put_link(&self, link: &InviteLink) -> StoreResult<()>;

    async fn get_link(&self, id: &str) -> StoreResult<Option<InviteLink>>;

    /// Every link ever issued to `user`, oldest first.
    async fn links_for_user(&self, user: UserId) -> StoreResult<Vec<InviteLink>>;

    async fn insert_signal(&self, signal: &Signal) -> StoreResult<()>;

    async fn get_signal(&self, id: Uuid) -> StoreResult<Option<Signal>>;

    async fn insert_deliveries(&self, records: &[DeliveryRecord]) -> StoreResult<()>;

    /// Upsert a single delivery record keyed by `(run_id, user_id)`.
    async fn put_delivery(&self, record: &DeliveryRecord) -> StoreResult<()>;

    /// Every record for `signal_id` across all runs, in insertion order.
    async fn deliveries(&self, signal_id: Uuid) -> StoreResult<Vec<DeliveryRecord>>;

    /// Records of one distribution run, in insertion order.
    async fn run_deliveries(&self, run_id: Uuid) -> StoreResult<Vec<DeliveryRecord>>;

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;

    /// Audit entries matching `query`, most recent first.
    async fn audit_log(&self, query: &AuditQuery) -> StoreResult<Vec<AuditEntry>>;

    async fn append_channel_event(&self, event: &ChannelEvent) -> StoreResult<()>;

    async fn channel_events(&self, user: UserId) -> StoreResult<Vec<ChannelEvent>>;
}
