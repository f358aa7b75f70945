use serde::{Deserialize, Serialize};

use crate::domain::chat::{ChatParticipant, ParticipantPermission, ParticipantRole};
use crate::ids::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantChange {
    Added,
    Removed,
}

impl ParticipantChange {
    fn verb(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

pub fn can_user_manage_participants(
    participant: Option<&ChatParticipant>,
    required: ParticipantPermission,
) -> bool {
    let Some(participant) = participant.filter(|participant| participant.is_active) else {
        return false;
    };
    if participant.role == ParticipantRole::Owner {
        return true;
    }

    let permissions = participant.permissions;
    match required {
        ParticipantPermission::Add => permissions.can_invite || permissions.can_manage,
        ParticipantPermission::Remove => permissions.can_remove || permissions.can_manage,
        ParticipantPermission::Any => {
            permissions.can_invite || permissions.can_remove || permissions.can_manage
        }
    }
}

/// "A", "A and B", "A, B and C".
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    }
}

/// Text of the single system message posted for a participant change.
///
/// `targets` pairs each affected user with its display name.
pub fn participant_change_message(
    actor: (&UserId, &str),
    targets: &[(UserId, String)],
    change: ParticipantChange,
    summary_limit: usize,
) -> String {
    let (actor_id, actor_name) = actor;
    if change == ParticipantChange::Removed {
        if let [(only, _)] = targets {
            if only == actor_id {
                return format!("{actor_name} left the conversation");
            }
        }
    }

    let names: Vec<String> = targets.iter().map(|(_, name)| name.clone()).collect();
    let subject = if names.len() > summary_limit {
        format!("{} participants", names.len())
    } else {
        join_names(&names)
    };
    format!("{actor_name} {} {subject}", change.verb())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        can_user_manage_participants, join_names, participant_change_message, ParticipantChange,
    };
    use crate::domain::chat::{
        ChatParticipant, ParticipantPermission, ParticipantPermissions, ParticipantRole,
    };
    use crate::ids::{ThreadId, UserId};

    fn participant(role: ParticipantRole, permissions: ParticipantPermissions) -> ChatParticipant {
        ChatParticipant {
            thread_id: ThreadId::from("thr-1"),
            user_id: UserId::from("caller"),
            role,
            permissions,
            unread_count: 0,
            last_read_at: None,
            is_active: true,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    fn targets(names: &[&str]) -> Vec<(UserId, String)> {
        names.iter().map(|name| (UserId::from(*name), name.to_string())).collect()
    }

    #[test]
    fn owners_hold_every_participant_right() {
        let owner = participant(ParticipantRole::Owner, ParticipantPermissions::default());
        assert!(can_user_manage_participants(Some(&owner), ParticipantPermission::Remove));
    }

    #[test]
    fn members_need_the_matching_flag() {
        let inviter = participant(
            ParticipantRole::Member,
            ParticipantPermissions { can_invite: true, ..ParticipantPermissions::default() },
        );
        assert!(can_user_manage_participants(Some(&inviter), ParticipantPermission::Add));
        assert!(can_user_manage_participants(Some(&inviter), ParticipantPermission::Any));
        assert!(!can_user_manage_participants(Some(&inviter), ParticipantPermission::Remove));

        let plain = participant(ParticipantRole::Member, ParticipantPermissions::default());
        assert!(!can_user_manage_participants(Some(&plain), ParticipantPermission::Any));
        assert!(!can_user_manage_participants(None, ParticipantPermission::Add));
    }

    #[test]
    fn inactive_participants_lose_their_rights() {
        let mut moderator =
            participant(ParticipantRole::Moderator, ParticipantRole::Moderator.default_permissions());
        moderator.is_active = false;
        assert!(!can_user_manage_participants(Some(&moderator), ParticipantPermission::Add));
    }

    #[test]
    fn names_are_joined_with_a_final_and() {
        assert_eq!(join_names(&["Ana".to_string()]), "Ana");
        assert_eq!(join_names(&["Ana".to_string(), "Ben".to_string()]), "Ana and Ben");
        assert_eq!(
            join_names(&["Ana".to_string(), "Ben".to_string(), "Cy".to_string()]),
            "Ana, Ben and Cy"
        );
    }

    #[test]
    fn change_messages_name_small_groups_and_count_large_ones() {
        let actor = UserId::from("owner");
        let actor = (&actor, "Olive Owner");

        assert_eq!(
            participant_change_message(actor, &targets(&["Ana"]), ParticipantChange::Added, 3),
            "Olive Owner added Ana"
        );
        assert_eq!(
            participant_change_message(
                actor,
                &targets(&["Ana", "Ben", "Cy"]),
                ParticipantChange::Removed,
                3
            ),
            "Olive Owner removed Ana, Ben and Cy"
        );
        assert_eq!(
            participant_change_message(
                actor,
                &targets(&["Ana", "Ben", "Cy", "Dee"]),
                ParticipantChange::Added,
                3
            ),
            "Olive Owner added 4 participants"
        );
    }

    #[test]
    fn self_removal_reads_as_leaving() {
        let me = UserId::from("ana");
        let message = participant_change_message(
            (&me, "Ana Lyst"),
            &[(UserId::from("ana"), "Ana Lyst".to_string())],
            ParticipantChange::Removed,
            3,
        );
        assert_eq!(message, "Ana Lyst left the conversation");
    }
}
