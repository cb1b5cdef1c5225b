//! Private chat commands.
//!
//! User commands drive registration; admin commands map onto
//! `AdminConsole`. Anything that is not a command is free text for the
//! profile draft in progress.

use crate::platform::UserId;
use crate::store::UserFilter;

/// Parsed private chat message
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Begin (or resume) registration
    Start,

    /// Report having joined the channel
    Joined,

    /// Replace the current invite link
    NewLink,

    /// Show own profile and status
    Profile,

    /// Abandon the profile being entered
    Cancel,

    Help,

    /// List users: `/users [filter] [page]`
    Users { filter: UserFilter, page: usize },

    /// Look up one user
    User { id: UserId },

    Stats,

    /// Push a signal to active users
    Signal { payload: String },

    /// Announce to active users
    Broadcast { message: String },

    Suspend { id: UserId },

    Reinstate { id: UserId },

    /// Recent admin actions: `/audit [limit]`
    Audit { limit: usize },

    /// Not a command (profile input)
    Text(String),

    /// Malformed or unknown command
    Unknown(String),
}

/// Default number of audit entries shown.
pub const DEFAULT_AUDIT_LIMIT: usize = 20;

impl Command {
    /// Command syntax and description, `None` for non-commands
    pub fn help_text(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Command::Start => Some(("/start", "Register or show your status")),
            Command::Joined => Some(("/joined", "Confirm you joined the channel")),
            Command::NewLink => Some(("/newlink", "Get a fresh invite link")),
            Command::Profile => Some(("/profile", "Show your profile")),
            Command::Cancel => Some(("/cancel", "Cancel profile entry")),
            Command::Help => Some(("/help", "Show this help message")),
            Command::Users { .. } => Some((
                "/users [filter] [page]",
                "List users (filter: all, new, profile, membership, active, suspended)",
            )),
            Command::User { .. } => Some(("/user <id>", "Show one user")),
            Command::Stats => Some(("/stats", "User statistics")),
            Command::Signal { .. } => Some(("/signal <text>", "Send a signal to active users")),
            Command::Broadcast { .. } => {
                Some(("/broadcast <text>", "Send an announcement to active users"))
            }
            Command::Suspend { .. } => Some(("/suspend <id>", "Suspend a user")),
            Command::Reinstate { .. } => Some(("/reinstate <id>", "Reinstate a suspended user")),
            Command::Audit { .. } => Some(("/audit [limit]", "Recent admin actions")),
            Command::Text(_) | Command::Unknown(_) => None,
        }
    }

    pub fn is_admin_command(&self) -> bool {
        matches!(
            self,
            Command::Users { .. }
                | Command::User { .. }
                | Command::Stats
                | Command::Signal { .. }
                | Command::Broadcast { .. }
                | Command::Suspend { .. }
                | Command::Reinstate { .. }
                | Command::Audit { .. }
        )
    }

    fn user_commands() -> Vec<Command> {
        vec![
            Command::Start,
            Command::Joined,
            Command::NewLink,
            Command::Profile,
            Command::Cancel,
            Command::Help,
        ]
    }

    fn admin_commands() -> Vec<Command> {
        vec![
            Command::Users {
                filter: UserFilter::All,
                page: 1,
            },
            Command::User { id: UserId(0) },
            Command::Stats,
            Command::Signal {
                payload: String::new(),
            },
            Command::Broadcast {
                message: String::new(),
            },
            Command::Suspend { id: UserId(0) },
            Command::Reinstate { id: UserId(0) },
            Command::Audit {
                limit: DEFAULT_AUDIT_LIMIT,
            },
        ]
    }
}

/// Help listing; admin commands only for admins.
pub fn help_text(include_admin: bool) -> String {
    let mut commands = Command::user_commands();
    if include_admin {
        commands.extend(Command::admin_commands());
    }

    let mut text = String::from("📖 Commands\n");
    for (syntax, description) in commands.iter().filter_map(Command::help_text) {
        text.push_str(&format!("\n{} - {}", syntax, description));
    }
    text
}

fn parse_filter(word: &str) -> Option<UserFilter> {
    match word.to_lowercase().as_str() {
        "all" => Some(UserFilter::All),
        "new" => Some(UserFilter::New),
        "profile" | "awaiting_profile" => Some(UserFilter::AwaitingProfile),
        "membership" | "awaiting_membership" => Some(UserFilter::AwaitingMembership),
        "active" => Some(UserFilter::Active),
        "suspended" => Some(UserFilter::Suspended),
        _ => None,
    }
}

fn parse_user_id(word: Option<&&str>) -> Option<UserId> {
    word.and_then(|w| w.parse::<i64>().ok()).map(UserId)
}

/// Parse command from message text
pub fn parse_command(text: &str) -> Command {
    let text = text.trim();

    if !text.starts_with('/') {
        return Command::Text(text.to_string());
    }

    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.is_empty() {
        return Command::Unknown(text.to_string());
    }

    // "/start@GateBot" from group-style mentions
    let name = parts[0].split('@').next().unwrap_or(parts[0]);
    let rest = || text[parts[0].len()..].trim().to_string();

    match name {
        "/start" => Command::Start,
        "/joined" => Command::Joined,
        "/newlink" => Command::NewLink,
        "/profile" => Command::Profile,
        "/cancel" => Command::Cancel,
        "/help" => Command::Help,
        "/stats" => Command::Stats,

        "/users" => {
            let mut filter = UserFilter::All;
            let mut page = 1;
            for word in &parts[1..] {
                if let Ok(n) = word.parse::<usize>() {
                    page = n.max(1);
                } else if let Some(f) = parse_filter(word) {
                    filter = f;
                } else {
                    return Command::Unknown(text.to_string());
                }
            }
            Command::Users { filter, page }
        }

        "/user" => match parse_user_id(parts.get(1)) {
            Some(id) => Command::User { id },
            None => Command::Unknown(text.to_string()),
        },

        "/suspend" => match parse_user_id(parts.get(1)) {
            Some(id) => Command::Suspend { id },
            None => Command::Unknown(text.to_string()),
        },

        "/reinstate" => match parse_user_id(parts.get(1)) {
            Some(id) => Command::Reinstate { id },
            None => Command::Unknown(text.to_string()),
        },

        "/signal" => {
            let payload = rest();
            if payload.is_empty() {
                return Command::Unknown(text.to_string());
            }
            Command::Signal { payload }
        }

        "/broadcast" => {
            let message = rest();
            if message.is_empty() {
                return Command::Unknown(text.to_string());
            }
            Command::Broadcast { message }
        }

        "/audit" => match parts.get(1) {
            None => Command::Audit {
                limit: DEFAULT_AUDIT_LIMIT,
            },
            Some(n) => match n.parse::<usize>() {
                Ok(limit) if limit > 0 => Command::Audit { limit },
                _ => Command::Unknown(text.to_string()),
            },
        },

        _ => Command::Unknown(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_commands() {
        assert_eq!(parse_command("/start"), Command::Start);
        assert_eq!(parse_command("  /joined "), Command::Joined);
        assert_eq!(parse_command("/start@GateBot"), Command::Start);
        assert_eq!(parse_command("/newlink"), Command::NewLink);
    }

    #[test]
    fn test_parse_free_text() {
        assert_eq!(parse_command("Ali Rezaei"), Command::Text("Ali Rezaei".to_string()));
    }

    #[test]
    fn test_parse_signal_keeps_payload_spacing() {
        assert_eq!(
            parse_command("/signal BUY XYZ  @ 12.5"),
            Command::Signal {
                payload: "BUY XYZ  @ 12.5".to_string()
            }
        );
        assert!(matches!(parse_command("/signal"), Command::Unknown(_)));
    }

    #[test]
    fn test_parse_broadcast() {
        assert_eq!(
            parse_command("/broadcast Maintenance tonight"),
            Command::Broadcast {
                message: "Maintenance tonight".to_string()
            }
        );
    }

    #[test]
    fn test_parse_users() {
        assert_eq!(
            parse_command("/users"),
            Command::Users {
                filter: UserFilter::All,
                page: 1
            }
        );
        assert_eq!(
            parse_command("/users suspended 3"),
            Command::Users {
                filter: UserFilter::Suspended,
                page: 3
            }
        );
        assert_eq!(
            parse_command("/users 0"),
            Command::Users {
                filter: UserFilter::All,
                page: 1
            }
        );
        assert!(matches!(parse_command("/users gold"), Command::Unknown(_)));
    }

    #[test]
    fn test_parse_user_targets() {
        assert_eq!(parse_command("/suspend 42"), Command::Suspend { id: UserId(42) });
        assert_eq!(parse_command("/reinstate 42"), Command::Reinstate { id: UserId(42) });
        assert_eq!(parse_command("/user 42"), Command::User { id: UserId(42) });
        assert!(matches!(parse_command("/suspend"), Command::Unknown(_)));
        assert!(matches!(parse_command("/suspend bob"), Command::Unknown(_)));
    }

    #[test]
    fn test_parse_audit() {
        assert_eq!(
            parse_command("/audit"),
            Command::Audit {
                limit: DEFAULT_AUDIT_LIMIT
            }
        );
        assert_eq!(parse_command("/audit 5"), Command::Audit { limit: 5 });
        assert!(matches!(parse_command("/audit 0"), Command::Unknown(_)));
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(parse_command("/unknown"), Command::Unknown(_)));
    }

    #[test]
    fn test_help_text_hides_admin_commands() {
        let user_help = help_text(false);
        assert!(user_help.contains("/joined"));
        assert!(!user_help.contains("/signal"));

        let admin_help = help_text(true);
        assert!(admin_help.contains("/signal <text>"));
        assert!(admin_help.contains("/audit [limit]"));
    }

    #[test]
    fn test_admin_classification() {
        assert!(parse_command("/stats").is_admin_command());
        assert!(!parse_command("/profile").is_admin_command());
    }
}
