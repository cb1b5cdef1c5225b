//! Admin Audit Trail
//!
//! Every privileged operation, allowed or denied, leaves an `AuditEntry`:
//! - Fields: timestamp, actor (admin user id), action type, target, outcome
//! - Immutable append-only log (no deletion)
//! - Query interface for the `/audit` admin command

use crate::clock::Timestamp;
use crate::platform::UserId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Admin action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    ListUsers,
    FindUser,
    ViewStats,
    SendSignal,
    Broadcast,
    SuspendUser,
    ReinstateUser,
    ViewAudit,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ListUsers => "list_users",
            ActionType::FindUser => "find_user",
            ActionType::ViewStats => "view_stats",
            ActionType::SendSignal => "send_signal",
            ActionType::Broadcast => "broadcast",
            ActionType::SuspendUser => "suspend_user",
            ActionType::ReinstateUser => "reinstate_user",
            ActionType::ViewAudit => "view_audit",
        }
    }

    /// Format action type for display.
    pub fn display(&self) -> &'static str {
        match self {
            ActionType::ListUsers => "List Users",
            ActionType::FindUser => "Find User",
            ActionType::ViewStats => "View Stats",
            ActionType::SendSignal => "Send Signal",
            ActionType::Broadcast => "Broadcast",
            ActionType::SuspendUser => "Suspend User",
            ActionType::ReinstateUser => "Reinstate User",
            ActionType::ViewAudit => "View Audit",
        }
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list_users" => Ok(ActionType::ListUsers),
            "find_user" => Ok(ActionType::FindUser),
            "view_stats" => Ok(ActionType::ViewStats),
            "send_signal" => Ok(ActionType::SendSignal),
            "broadcast" => Ok(ActionType::Broadcast),
            "suspend_user" => Ok(ActionType::SuspendUser),
            "reinstate_user" => Ok(ActionType::ReinstateUser),
            "view_audit" => Ok(ActionType::ViewAudit),
            other => Err(format!("unknown action type '{}'", other)),
        }
    }
}

/// How an audited action ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    /// Caller is not an admin
    Denied,
    Failed(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Denied => "denied",
            Outcome::Failed(_) => "failed",
        }
    }

    pub fn from_parts(label: &str, reason: Option<String>) -> Result<Self, String> {
        match label {
            "success" => Ok(Outcome::Success),
            "denied" => Ok(Outcome::Denied),
            "failed" => Ok(Outcome::Failed(reason.unwrap_or_default())),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Single audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unix timestamp (seconds since epoch).
    pub timestamp: Timestamp,
    /// Caller who attempted the action.
    pub actor: UserId,
    pub action_type: ActionType,
    /// Target user id or broadcast description.
    pub target: Option<String>,
    pub outcome: Outcome,
}

impl AuditEntry {
    pub fn new(
        timestamp: Timestamp,
        actor: UserId,
        action_type: ActionType,
        target: Option<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp,
            actor,
            action_type,
            target,
            outcome,
        }
    }

    /// Format timestamp as human-readable relative time.
    pub fn relative_time(&self, now: Timestamp) -> String {
        if now < self.timestamp {
            return format!("Unix: {}", self.timestamp);
        }

        let elapsed = now - self.timestamp;

        match elapsed {
            0..=60 => "Just now".to_string(),
            61..=3600 => format!("{} min ago", elapsed / 60),
            3601..=86400 => format!("{} hours ago", elapsed / 3600),
            86401..=604800 => format!("{} days ago", elapsed / 86400),
            _ => format!("Unix: {}", self.timestamp),
        }
    }
}

/// Query options for audit log.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub action_type: Option<ActionType>,
    pub actor: Option<UserId>,
    /// Limit number of results (most recent first).
    pub limit: Option<usize>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            action_type: None,
            actor: None,
            limit: Some(50),
        }
    }
}

/// Query audit log with filters.
///
/// `entries` are in append order; the result is most recent first.
pub fn query_audit_log(entries: &[AuditEntry], query: &AuditQuery) -> Vec<AuditEntry> {
    let mut filtered: Vec<AuditEntry> = entries
        .iter()
        .rev()
        .filter(|entry| {
            query
                .action_type
                .map_or(true, |action| entry.action_type == action)
                && query.actor.map_or(true, |actor| entry.actor == actor)
        })
        .cloned()
        .collect();

    filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }

    filtered
}

/// Format audit log for display in a private chat.
pub fn format_audit_log(entries: &[AuditEntry], now: Timestamp) -> String {
    if entries.is_empty() {
        return "No audit entries found.".to_string();
    }

    let mut output = String::from("📋 Admin Audit Trail\n\n");

    for entry in entries {
        let target = entry.target.as_deref().unwrap_or("-");
        let outcome = match &entry.outcome {
            Outcome::Failed(reason) => format!("failed: {}", reason),
            other => other.label().to_string(),
        };
        output.push_str(&format!(
            "• {} · {} by {}\n  target: {} ({})\n\n",
            entry.relative_time(now),
            entry.action_type.display(),
            entry.actor,
            target,
            outcome
        ));
    }

    output.trim_end().to_string()
}
