//! Ephemeral Profile Drafts
//!
//! Profile input arrives one message at a time: contact (phone), then
//! name, then access level. The partial profile lives here, in memory
//! only, until it is complete and handed to the registration workflow.
//! Drafts are dropped on completion or `/cancel` and do not survive a
//! restart; the user simply starts the profile again.

use crate::gatekeeper::ProfileSubmission;
use crate::platform::UserId;
use std::collections::HashMap;

/// What the draft needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStep {
    Phone,
    Name,
    AccessLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub phone: Option<String>,
    pub name: Option<String>,
}

impl ProfileDraft {
    pub fn step(&self) -> DraftStep {
        match (&self.phone, &self.name) {
            (None, _) => DraftStep::Phone,
            (Some(_), None) => DraftStep::Name,
            (Some(_), Some(_)) => DraftStep::AccessLevel,
        }
    }
}

/// In-memory draft manager, keyed by user.
#[derive(Debug, Default)]
pub struct ProfileDraftManager {
    drafts: HashMap<UserId, ProfileDraft>,
}

impl ProfileDraftManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a draft, or return the step of the one in progress.
    pub fn begin(&mut self, user: UserId) -> DraftStep {
        self.drafts.entry(user).or_default().step()
    }

    pub fn get(&self, user: UserId) -> Option<&ProfileDraft> {
        self.drafts.get(&user)
    }

    /// Store a validated phone; later steps keep their values.
    pub fn set_phone(&mut self, user: UserId, phone: String) -> Result<DraftStep, DraftError> {
        let draft = self.draft_mut(user)?;
        draft.phone = Some(phone);
        Ok(draft.step())
    }

    pub fn set_name(&mut self, user: UserId, name: String) -> Result<DraftStep, DraftError> {
        let draft = self.draft_mut(user)?;
        if draft.step() != DraftStep::Name {
            return Err(DraftError::WrongStep {
                user,
                expected: draft.step(),
            });
        }
        draft.name = Some(name);
        Ok(draft.step())
    }

    /// Remove the draft and build the submission with `access_level`.
    pub fn complete(
        &mut self,
        user: UserId,
        access_level: &str,
    ) -> Result<ProfileSubmission, DraftError> {
        let draft = self.draft_mut(user)?;
        let (phone, name) = match (&draft.phone, &draft.name) {
            (Some(phone), Some(name)) => (phone.clone(), name.clone()),
            _ => {
                return Err(DraftError::WrongStep {
                    user,
                    expected: draft.step(),
                })
            }
        };
        self.drafts.remove(&user);

        Ok(ProfileSubmission {
            name,
            phone,
            access_level: access_level.to_string(),
        })
    }

    /// Drop a draft; true if one existed.
    pub fn cancel(&mut self, user: UserId) -> bool {
        self.drafts.remove(&user).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.drafts.len()
    }

    fn draft_mut(&mut self, user: UserId) -> Result<&mut ProfileDraft, DraftError> {
        self.drafts
            .get_mut(&user)
            .ok_or(DraftError::NotFound(user))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DraftError {
    #[error("No profile in progress for {0}")]
    NotFound(UserId),

    #[error("Profile for {user} is waiting for {expected:?}")]
    WrongStep { user: UserId, expected: DraftStep },
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: UserId = UserId(42);

    #[test]
    fn test_steps_follow_input_order() {
        let mut drafts = ProfileDraftManager::new();
        assert_eq!(drafts.begin(USER), DraftStep::Phone);
        assert_eq!(
            drafts.set_phone(USER, "+15551234567".to_string()),
            Ok(DraftStep::Name)
        );
        assert_eq!(
            drafts.set_name(USER, "Sara".to_string()),
            Ok(DraftStep::AccessLevel)
        );

        let submission = drafts.complete(USER, "vip").unwrap();
        assert_eq!(submission.name, "Sara");
        assert_eq!(submission.phone, "+15551234567");
        assert_eq!(submission.access_level, "vip");
        assert_eq!(drafts.active_count(), 0);
    }

    #[test]
    fn test_begin_resumes_existing_draft() {
        let mut drafts = ProfileDraftManager::new();
        drafts.begin(USER);
        drafts.set_phone(USER, "5551234567".to_string()).unwrap();
        assert_eq!(drafts.begin(USER), DraftStep::Name);
        assert_eq!(drafts.active_count(), 1);
    }

    #[test]
    fn test_name_before_phone_is_rejected() {
        let mut drafts = ProfileDraftManager::new();
        drafts.begin(USER);
        assert_eq!(
            drafts.set_name(USER, "Sara".to_string()),
            Err(DraftError::WrongStep {
                user: USER,
                expected: DraftStep::Phone
            })
        );
    }

    #[test]
    fn test_incomplete_draft_cannot_complete() {
        let mut drafts = ProfileDraftManager::new();
        drafts.begin(USER);
        drafts.set_phone(USER, "5551234567".to_string()).unwrap();
        assert!(drafts.complete(USER, "basic").is_err());
        assert!(drafts.get(USER).is_some());
    }

    #[test]
    fn test_missing_draft() {
        let mut drafts = ProfileDraftManager::new();
        assert_eq!(
            drafts.set_phone(USER, "5551234567".to_string()),
            Err(DraftError::NotFound(USER))
        );
        assert!(!drafts.cancel(USER));
    }

    #[test]
    fn test_cancel_drops_draft() {
        let mut drafts = ProfileDraftManager::new();
        drafts.begin(USER);
        assert!(drafts.cancel(USER));
        assert!(drafts.get(USER).is_none());
    }
}
