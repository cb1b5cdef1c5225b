//! Admin module: privileged console and its audit trail

pub mod audit_trail;
pub mod console;

pub use audit_trail::{format_audit_log, ActionType, AuditEntry, AuditQuery, Outcome};
pub use console::AdminConsole;
