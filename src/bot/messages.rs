//! User-facing message texts.

use crate::clock::Timestamp;
use crate::store::{InviteLink, User, UserCounts};

pub fn msg_welcome() -> String {
    "👋 Welcome!\n\n\
     To get access to the channel we need a short profile.\n\n\
     1️⃣ Share your phone number (use the contact button, or type it)\n\
     2️⃣ Send your full name\n\
     3️⃣ Choose an access level: basic, premium or vip\n\n\
     Send /cancel at any time to start over."
        .to_string()
}

pub fn msg_ask_name() -> String {
    "✅ Phone number saved.\n\nNow send your full name.".to_string()
}

pub fn msg_ask_access_level() -> String {
    "✅ Name saved.\n\nChoose your access level: basic, premium or vip".to_string()
}

pub fn msg_ask_phone() -> String {
    "📱 Please share your phone number first.".to_string()
}

pub fn msg_invalid_input(reason: &str) -> String {
    format!("❌ {}\n\nPlease try again.", reason)
}

/// Invite link with its expiry, relative to `now`.
pub fn msg_invite(link: &InviteLink, now: Timestamp) -> String {
    let minutes = link.expires_at.saturating_sub(now).div_ceil(60);
    format!(
        "🔗 Your personal invite link:\n{}\n\n\
         It admits only you and expires in {} minute(s).\n\
         After joining the channel, send /joined.",
        link.url, minutes
    )
}

pub fn msg_link_unavailable() -> String {
    "⚠️ Your profile is saved but we could not create an invite link right now.\n\
     Send /newlink to try again."
        .to_string()
}

pub fn msg_awaiting_membership_without_link() -> String {
    "⏳ Your profile is complete. Send /newlink to get an invite link.".to_string()
}

pub fn msg_activated() -> String {
    "🎉 Membership verified. Your access is now active and you will receive signals here."
        .to_string()
}

pub fn msg_not_member() -> String {
    "🔍 You are not in the channel yet. Join with your invite link, then send /joined again."
        .to_string()
}

pub fn msg_verification_unavailable() -> String {
    "⏳ We could not check your membership right now. Please try /joined again in a moment."
        .to_string()
}

pub fn msg_link_reissued(link: &InviteLink, now: Timestamp) -> String {
    format!(
        "♻️ Your previous link could not be used.\n\n{}",
        msg_invite(link, now)
    )
}

pub fn msg_suspended() -> String {
    "⛔ Your access is suspended. Please contact an administrator.".to_string()
}

pub fn msg_cancelled() -> String {
    "🚫 Profile entry cancelled. Send /start to begin again.".to_string()
}

pub fn msg_nothing_to_cancel() -> String {
    "Nothing to cancel.".to_string()
}

pub fn msg_not_registered() -> String {
    "You are not registered yet. Send /start to begin.".to_string()
}

pub fn msg_unknown_command(text: &str) -> String {
    format!("❓ Unknown command: {}\n\nSend /help for the list of commands.", text)
}

pub fn msg_unauthorized() -> String {
    "⛔ This command is for administrators only.".to_string()
}

pub fn msg_channel_welcome() -> String {
    "👋 Welcome to the channel!".to_string()
}

pub fn msg_error(error: &str) -> String {
    format!("⚠️ Error processing your request: {}", error)
}

pub fn msg_profile(user: &User) -> String {
    let mut text = format!("👤 Your profile\n\nStatus: {}", user.state);
    match &user.profile {
        Some(profile) => text.push_str(&format!(
            "\nName: {}\nPhone: {}\nAccess level: {}",
            profile.name, profile.phone, profile.access_level
        )),
        None => text.push_str("\nProfile not completed yet."),
    }
    text
}

/// One line per user for admin listings.
pub fn msg_user_line(user: &User) -> String {
    let name = user
        .profile
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("-");
    format!("{} · {} · {}", user.id, name, user.state)
}

pub fn msg_user_page(users: &[User], page: usize) -> String {
    if users.is_empty() {
        return format!("👥 Users (page {})\n\nNo users on this page.", page);
    }
    let lines: Vec<String> = users.iter().map(msg_user_line).collect();
    format!("👥 Users (page {})\n\n{}", page, lines.join("\n"))
}

pub fn msg_user_detail(user: &User) -> String {
    let mut text = format!("👤 User {}\n\nStatus: {}", user.id, user.state);
    if let Some(profile) = &user.profile {
        text.push_str(&format!(
            "\nName: {}\nPhone: {}\nAccess level: {}",
            profile.name, profile.phone, profile.access_level
        ));
    }
    if let Some(link) = &user.invite_link_id {
        text.push_str(&format!("\nInvite link: {}", link));
    }
    text.push_str(if user.channel_member {
        "\nIn channel: yes"
    } else {
        "\nIn channel: no"
    });
    text
}

pub fn msg_stats(counts: &UserCounts) -> String {
    format!(
        "📊 Users\n\nTotal: {}\nActive: {}\nPending: {}\nSuspended: {}\nIn channel: {}\n\n\
         By access level\nBasic: {}\nPremium: {}\nVIP: {}",
        counts.total,
        counts.active,
        counts.pending,
        counts.suspended,
        counts.in_channel,
        counts.basic,
        counts.premium,
        counts.vip
    )
}

pub fn msg_suspended_user(user: &User) -> String {
    format!("⛔ User {} suspended ({})", user.id, user.state)
}

pub fn msg_reinstated_user(user: &User) -> String {
    format!("✅ User {} reinstated ({})", user.id, user.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ChannelId, UserId};
    use crate::store::{AccessLevel, Profile, UserState};

    #[test]
    fn test_invite_rounds_minutes_up() {
        let link = InviteLink {
            id: "abc".to_string(),
            user_id: UserId(1),
            channel_id: ChannelId(-100),
            url: "https://t.me/+abc".to_string(),
            created_at: 0,
            expires_at: 600,
            used: false,
            used_at: None,
        };
        assert!(msg_invite(&link, 0).contains("10 minute(s)"));
        assert!(msg_invite(&link, 541).contains("1 minute(s)"));
        assert!(msg_invite(&link, 0).contains("https://t.me/+abc"));
    }

    #[test]
    fn test_profile_text() {
        let mut user = User::new(UserId(5), 0);
        assert!(msg_profile(&user).contains("not completed"));

        user.state = UserState::Active;
        user.profile = Some(Profile {
            name: "Sara".to_string(),
            phone: "+15551234567".to_string(),
            access_level: AccessLevel::Vip,
        });
        let text = msg_profile(&user);
        assert!(text.contains("Status: active"));
        assert!(text.contains("Access level: vip"));
    }

    #[test]
    fn test_user_page() {
        let users = vec![User::new(UserId(1), 0), User::new(UserId(2), 0)];
        let text = msg_user_page(&users, 2);
        assert!(text.contains("page 2"));
        assert!(text.contains("1 · - · new"));
        assert!(msg_user_page(&[], 3).contains("No users"));
    }

    #[test]
    fn test_stats_break_down_by_level() {
        let counts = UserCounts {
            total: 6,
            active: 4,
            pending: 1,
            suspended: 1,
            in_channel: 3,
            basic: 2,
            premium: 1,
            vip: 2,
        };
        let text = msg_stats(&counts);
        assert!(text.contains("Active: 4"));
        assert!(text.contains("In channel: 3"));
        assert!(text.contains("Premium: 1"));
        assert!(text.contains("VIP: 2"));
    }
}
