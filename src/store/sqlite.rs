//! SQLite record store.
//!
//! Schema is created on open (`CREATE TABLE IF NOT EXISTS`). Rows are read
//! into `*Row` structs and converted to model types, rejecting unknown
//! labels as `StoreError::Corrupt`.

use super::{RecordStore, StoreError, StoreResult};
use crate::admin::audit_trail::{ActionType, AuditEntry, AuditQuery, Outcome};
use crate::clock::Timestamp;
use crate::platform::{ChannelId, UserId};
use crate::store::model::{
    AccessLevel, ChannelEvent, ChannelEventKind, DeliveryRecord, DeliveryStatus, InviteLink,
    Issuer, Profile, Signal, SignalKind, Stage, User, UserCounts, UserFilter, UserState,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        state TEXT NOT NULL,
        previous_stage TEXT,
        name TEXT,
        phone TEXT,
        access_level TEXT,
        invite_link_id TEXT,
        created_at INTEGER NOT NULL,
        activated_at INTEGER,
        channel_member INTEGER NOT NULL DEFAULT 0
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_users_order ON users (created_at, id)",
    r#"CREATE TABLE IF NOT EXISTS invite_links (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        channel_id INTEGER NOT NULL,
        url TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        used INTEGER NOT NULL DEFAULT 0,
        used_at INTEGER
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_invite_links_user ON invite_links (user_id)",
    r#"CREATE TABLE IF NOT EXISTS signals (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        issuer INTEGER,
        created_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS deliveries (
        run_id TEXT NOT NULL,
        signal_id TEXT NOT NULL,
        user_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        reason TEXT,
        attempted_at INTEGER,
        PRIMARY KEY (run_id, user_id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_deliveries_signal ON deliveries (signal_id)",
    r#"CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        actor INTEGER NOT NULL,
        action TEXT NOT NULL,
        target TEXT,
        outcome TEXT NOT NULL,
        reason TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS channel_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        details TEXT NOT NULL
    )"#,
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "Opened SQLite store");
        Ok(store)
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn corrupt(e: String) -> StoreError {
    StoreError::Corrupt(e)
}

fn to_ts(value: i64) -> StoreResult<Timestamp> {
    Timestamp::try_from(value).map_err(|_| corrupt(format!("negative timestamp {}", value)))
}

fn from_ts(value: Timestamp) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    state: String,
    previous_stage: Option<String>,
    name: Option<String>,
    phone: Option<String>,
    access_level: Option<String>,
    invite_link_id: Option<String>,
    created_at: i64,
    activated_at: Option<i64>,
    channel_member: bool,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        let state = if row.state == "suspended" {
            let previous = row
                .previous_stage
                .ok_or_else(|| corrupt(format!("user {} suspended without previous stage", row.id)))?
                .parse::<Stage>()
                .map_err(corrupt)?;
            UserState::Suspended { previous }
        } else {
            UserState::from(row.state.parse::<Stage>().map_err(corrupt)?)
        };

        let profile = match (row.name, row.phone, row.access_level) {
            (Some(name), Some(phone), Some(level)) => Some(Profile {
                name,
                phone,
                access_level: level.parse::<AccessLevel>().map_err(corrupt)?,
            }),
            _ => None,
        };

        Ok(User {
            id: UserId(row.id),
            state,
            profile,
            invite_link_id: row.invite_link_id,
            created_at: to_ts(row.created_at)?,
            activated_at: row.activated_at.map(to_ts).transpose()?,
            channel_member: row.channel_member,
        })
    }
}

const USER_COLUMNS: &str = "id, state, previous_stage, name, phone, access_level, \
     invite_link_id, created_at, activated_at, channel_member";

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    id: String,
    user_id: i64,
    channel_id: i64,
    url: String,
    created_at: i64,
    expires_at: i64,
    used: bool,
    used_at: Option<i64>,
}

impl TryFrom<LinkRow> for InviteLink {
    type Error = StoreError;

    fn try_from(row: LinkRow) -> StoreResult<Self> {
        Ok(InviteLink {
            id: row.id,
            user_id: UserId(row.user_id),
            channel_id: ChannelId(row.channel_id),
            url: row.url,
            created_at: to_ts(row.created_at)?,
            expires_at: to_ts(row.expires_at)?,
            used: row.used,
            used_at: row.used_at.map(to_ts).transpose()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SignalRow {
    id: String,
    kind: String,
    payload: String,
    issuer: Option<i64>,
    created_at: i64,
}

impl TryFrom<SignalRow> for Signal {
    type Error = StoreError;

    fn try_from(row: SignalRow) -> StoreResult<Self> {
        Ok(Signal {
            id: parse_uuid(&row.id)?,
            kind: row.kind.parse::<SignalKind>().map_err(corrupt)?,
            payload: row.payload,
            issuer: row.issuer.map_or(Issuer::System, |id| Issuer::Admin(UserId(id))),
            created_at: to_ts(row.created_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    run_id: String,
    signal_id: String,
    user_id: i64,
    status: String,
    reason: Option<String>,
    attempted_at: Option<i64>,
}

impl TryFrom<DeliveryRow> for DeliveryRecord {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> StoreResult<Self> {
        Ok(DeliveryRecord {
            run_id: parse_uuid(&row.run_id)?,
            signal_id: parse_uuid(&row.signal_id)?,
            user_id: UserId(row.user_id),
            status: DeliveryStatus::from_parts(&row.status, row.reason).map_err(corrupt)?,
            attempted_at: row.attempted_at.map(to_ts).transpose()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    timestamp: i64,
    actor: i64,
    action: String,
    target: Option<String>,
    outcome: String,
    reason: Option<String>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> StoreResult<Self> {
        Ok(AuditEntry {
            timestamp: to_ts(row.timestamp)?,
            actor: UserId(row.actor),
            action_type: row.action.parse::<ActionType>().map_err(corrupt)?,
            target: row.target,
            outcome: Outcome::from_parts(&row.outcome, row.reason).map_err(corrupt)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChannelEventRow {
    user_id: i64,
    kind: String,
    timestamp: i64,
    details: String,
}

impl TryFrom<ChannelEventRow> for ChannelEvent {
    type Error = StoreError;

    fn try_from(row: ChannelEventRow) -> StoreResult<Self> {
        Ok(ChannelEvent {
            user_id: UserId(row.user_id),
            kind: row.kind.parse::<ChannelEventKind>().map_err(corrupt)?,
            timestamp: to_ts(row.timestamp)?,
            details: row.details,
        })
    }
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| corrupt(format!("bad uuid '{}': {}", value, e)))
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn insert_user_if_absent(&self, user: User) -> StoreResult<User> {
        sqlx::query(
            "INSERT INTO users (id, state, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(user.id.0)
        .bind(user.state.label())
        .bind(from_ts(user.created_at))
        .execute(&self.pool)
        .await?;

        self.get_user(user.id)
            .await?
            .ok_or_else(|| corrupt(format!("user {} vanished after insert", user.id)))
    }

    async fn put_user(&self, user: &User) -> StoreResult<()> {
        let previous = match user.state {
            UserState::Suspended { previous } => Some(previous.as_str()),
            _ => None,
        };
        let profile = user.profile.as_ref();

        sqlx::query(
            r#"INSERT INTO users (id, state, previous_stage, name, phone, access_level,
                                  invite_link_id, created_at, activated_at, channel_member)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   state = excluded.state,
                   previous_stage = excluded.previous_stage,
                   name = excluded.name,
                   phone = excluded.phone,
                   access_level = excluded.access_level,
                   invite_link_id = excluded.invite_link_id,
                   activated_at = excluded.activated_at,
                   channel_member = excluded.channel_member"#,
        )
        .bind(user.id.0)
        .bind(user.state.label())
        .bind(previous)
        .bind(profile.map(|p| p.name.as_str()))
        .bind(profile.map(|p| p.phone.as_str()))
        .bind(profile.map(|p| p.access_level.as_str()))
        .bind(user.invite_link_id.as_deref())
        .bind(from_ts(user.created_at))
        .bind(user.activated_at.map(from_ts))
        .bind(user.channel_member)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_users(
        &self,
        filter: UserFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE (?1 IS NULL OR state = ?1) \
             ORDER BY created_at, id LIMIT ?2 OFFSET ?3",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(filter.label())
            .bind(limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX)))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn count_users(&self) -> StoreResult<UserCounts> {
        let rows: Vec<(String, Option<String>, bool, i64)> = sqlx::query_as(
            "SELECT state, access_level, channel_member, COUNT(*) FROM users \
             GROUP BY state, access_level, channel_member",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = UserCounts::default();
        for (state, level, channel_member, n) in rows {
            // Only the label matters for counting
            let state = match state.as_str() {
                "suspended" => UserState::Suspended {
                    previous: Stage::New,
                },
                other => UserState::from(other.parse::<Stage>().map_err(corrupt)?),
            };
            let level = level
                .map(|l| l.parse::<AccessLevel>())
                .transpose()
                .map_err(corrupt)?;
            counts.add(&state, level, channel_member, u64::try_from(n).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn put_link(&self, link: &InviteLink) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO invite_links (id, user_id, channel_id, url, created_at,
                                         expires_at, used, used_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   used = excluded.used,
                   used_at = excluded.used_at"#,
        )
        .bind(&link.id)
        .bind(link.user_id.0)
        .bind(link.channel_id.0)
        .bind(&link.url)
        .bind(from_ts(link.created_at))
        .bind(from_ts(link.expires_at))
        .bind(link.used)
        .bind(link.used_at.map(from_ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_link(&self, id: &str) -> StoreResult<Option<InviteLink>> {
        sqlx::query_as::<_, LinkRow>(
            "SELECT id, user_id, channel_id, url, created_at, expires_at, used, used_at \
             FROM invite_links WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(InviteLink::try_from)
        .transpose()
    }

    async fn links_for_user(&self, user: UserId) -> StoreResult<Vec<InviteLink>> {
        let rows = sqlx::query_as::<_, LinkRow>(
            "SELECT id, user_id, channel_id, url, created_at, expires_at, used, used_at \
             FROM invite_links WHERE user_id = ? ORDER BY rowid",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn insert_signal(&self, signal: &Signal) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO signals (id, kind, payload, issuer, created_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(signal.id.to_string())
        .bind(signal.kind.as_str())
        .bind(&signal.payload)
        .bind(signal.issuer.admin_id())
        .bind(from_ts(signal.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_signal(&self, id: Uuid) -> StoreResult<Option<Signal>> {
        sqlx::query_as::<_, SignalRow>(
            "SELECT id, kind, payload, issuer, created_at FROM signals WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(Signal::try_from)
        .transpose()
    }

    async fn insert_deliveries(&self, records: &[DeliveryRecord]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            upsert_delivery(&mut *tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn put_delivery(&self, record: &DeliveryRecord) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_delivery(&mut *conn, record).await
    }

    async fn deliveries(&self, signal_id: Uuid) -> StoreResult<Vec<DeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            "SELECT run_id, signal_id, user_id, status, reason, attempted_at \
             FROM deliveries WHERE signal_id = ? ORDER BY rowid",
        )
        .bind(signal_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn run_deliveries(&self, run_id: Uuid) -> StoreResult<Vec<DeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            "SELECT run_id, signal_id, user_id, status, reason, attempted_at \
             FROM deliveries WHERE run_id = ? ORDER BY rowid",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (timestamp, actor, action, target, outcome, reason) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(from_ts(entry.timestamp))
        .bind(entry.actor.0)
        .bind(entry.action_type.as_str())
        .bind(entry.target.as_deref())
        .bind(entry.outcome.label())
        .bind(entry.outcome.reason())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_log(&self, query: &AuditQuery) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT timestamp, actor, action, target, outcome, reason FROM audit_log \
             WHERE (?1 IS NULL OR actor = ?1) AND (?2 IS NULL OR action = ?2) \
             ORDER BY timestamp DESC, id DESC LIMIT ?3",
        )
        .bind(query.actor.map(|a| a.0))
        .bind(query.action_type.map(|a| a.as_str()))
        .bind(
            query
                .limit
                .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX)),
        )
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn append_channel_event(&self, event: &ChannelEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO channel_events (user_id, kind, timestamp, details) VALUES (?, ?, ?, ?)",
        )
        .bind(event.user_id.0)
        .bind(event.kind.as_str())
        .bind(from_ts(event.timestamp))
        .bind(&event.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn channel_events(&self, user: UserId) -> StoreResult<Vec<ChannelEvent>> {
        let rows = sqlx::query_as::<_, ChannelEventRow>(
            "SELECT user_id, kind, timestamp, details FROM channel_events \
             WHERE user_id = ? ORDER BY id",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }
}

async fn upsert_delivery(
    conn: &mut sqlx::SqliteConnection,
    record: &DeliveryRecord,
) -> StoreResult<()> {
    sqlx::query(
        r#"INSERT INTO deliveries (run_id, signal_id, user_id, status, reason, attempted_at)
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT(run_id, user_id) DO UPDATE SET
               status = excluded.status,
               reason = excluded.reason,
               attempted_at = excluded.attempted_at"#,
    )
    .bind(record.run_id.to_string())
    .bind(record.signal_id.to_string())
    .bind(record.user_id.0)
    .bind(record.status.label())
    .bind(record.status.reason())
    .bind(record.attempted_at.map(from_ts))
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspended_user() -> User {
        User {
            id: UserId(42),
            state: UserState::Suspended {
                previous: Stage::AwaitingMembership,
            },
            profile: Some(Profile {
                name: "Ali".to_string(),
                phone: "+989121234567".to_string(),
                access_level: AccessLevel::Premium,
            }),
            invite_link_id: Some("link-1".to_string()),
            created_at: 1_000,
            activated_at: None,
            channel_member: true,
        }
    }

    #[tokio::test]
    async fn test_user_round_trip_keeps_suspension_stage() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.put_user(&suspended_user()).await.unwrap();

        let loaded = store.get_user(UserId(42)).await.unwrap().unwrap();
        assert_eq!(loaded, suspended_user());
    }

    #[tokio::test]
    async fn test_insert_if_absent_does_not_overwrite() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.put_user(&suspended_user()).await.unwrap();

        let existing = store
            .insert_user_if_absent(User::new(UserId(42), 5_000))
            .await
            .unwrap();
        assert!(existing.state.is_suspended());
        assert_eq!(existing.created_at, 1_000);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (id, created) in [(3, 50), (1, 50), (2, 10)] {
            store
                .insert_user_if_absent(User::new(UserId(id), created))
                .await
                .unwrap();
        }
        store.put_user(&suspended_user()).await.unwrap();

        let ids: Vec<i64> = store
            .list_users(UserFilter::New, 0, None)
            .await
            .unwrap()
            .iter()
            .map(|u| u.id.0)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);

        let page = store.list_users(UserFilter::All, 2, Some(2)).await.unwrap();
        assert_eq!(page.len(), 2);

        let counts = store.count_users().await.unwrap();
        assert_eq!(counts.total, 4);
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.suspended, 1);
        assert_eq!(counts.in_channel, 1);
        assert_eq!((counts.basic, counts.premium, counts.vip), (0, 1, 0));
    }

    #[tokio::test]
    async fn test_link_update_marks_used() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut link = InviteLink {
            id: "abc".to_string(),
            user_id: UserId(42),
            channel_id: ChannelId(-100),
            url: "https://t.me/+abc".to_string(),
            created_at: 10,
            expires_at: 20,
            used: false,
            used_at: None,
        };
        store.put_link(&link).await.unwrap();
        link.used = true;
        link.used_at = Some(15);
        store.put_link(&link).await.unwrap();

        assert_eq!(store.get_link("abc").await.unwrap(), Some(link.clone()));
        assert_eq!(store.links_for_user(UserId(42)).await.unwrap(), vec![link]);
    }

    #[tokio::test]
    async fn test_signal_and_deliveries() {
        let store = SqliteStore::in_memory().await.unwrap();
        let signal = Signal::new(SignalKind::Broadcast, "hello", Issuer::System, 7);
        store.insert_signal(&signal).await.unwrap();
        assert_eq!(store.get_signal(signal.id).await.unwrap(), Some(signal.clone()));

        let run_id = Uuid::new_v4();
        let pending: Vec<DeliveryRecord> = [1, 2]
            .iter()
            .map(|id| DeliveryRecord {
                run_id,
                signal_id: signal.id,
                user_id: UserId(*id),
                status: DeliveryStatus::Pending,
                attempted_at: None,
            })
            .collect();
        store.insert_deliveries(&pending).await.unwrap();
        store
            .put_delivery(&DeliveryRecord {
                status: DeliveryStatus::Failed {
                    reason: "timeout".to_string(),
                },
                attempted_at: Some(8),
                ..pending[1].clone()
            })
            .await
            .unwrap();

        let records = store.deliveries(signal.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, DeliveryStatus::Pending);
        assert_eq!(records[1].status.reason(), Some("timeout"));

        // A rerun of the same signal adds its own rows
        let rerun = DeliveryRecord {
            run_id: Uuid::new_v4(),
            status: DeliveryStatus::Delivered,
            attempted_at: Some(9),
            ..pending[1].clone()
        };
        store.put_delivery(&rerun).await.unwrap();

        let records = store.deliveries(signal.id).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].status.reason(), Some("timeout"));
        assert_eq!(store.run_deliveries(run_id).await.unwrap().len(), 2);
        assert_eq!(store.run_deliveries(rerun.run_id).await.unwrap(), vec![rerun]);
    }

    #[tokio::test]
    async fn test_audit_query_filters() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (ts, actor, action) in [
            (1, 1, ActionType::ListUsers),
            (2, 7, ActionType::SendSignal),
            (3, 1, ActionType::SendSignal),
        ] {
            let outcome = if actor == 7 {
                Outcome::Denied
            } else {
                Outcome::Success
            };
            store
                .append_audit(&AuditEntry::new(ts, UserId(actor), action, None, outcome))
                .await
                .unwrap();
        }

        let all = store.audit_log(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].timestamp, 3);

        let signals = store
            .audit_log(&AuditQuery {
                action_type: Some(ActionType::SendSignal),
                actor: Some(UserId(7)),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].outcome, Outcome::Denied);
    }

    #[tokio::test]
    async fn test_open_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gate.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.put_user(&suspended_user()).await.unwrap();
            store
                .append_channel_event(&ChannelEvent {
                    user_id: UserId(42),
                    kind: ChannelEventKind::Joined,
                    timestamp: 9,
                    details: "member".to_string(),
                })
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).await.unwrap();
        assert!(reopened.get_user(UserId(42)).await.unwrap().is_some());
        assert_eq!(reopened.channel_events(UserId(42)).await.unwrap().len(), 1);
    }
}
