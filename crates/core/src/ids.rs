use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($($(#[$meta:meta])* $name:ident => $prefix:literal),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub String);

            impl $name {
                pub fn generate() -> Self {
                    Self(format!(concat!($prefix, "-{}"), uuid::Uuid::new_v4()))
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<String> for $name {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }
        )+
    };
}

string_id! {
    /// Reference into the external user directory.
    UserId => "usr",
    ApplicationId => "app",
    ApprovalGroupId => "grp",
    GroupMemberId => "mbr",
    AssignmentId => "asg",
    DecisionId => "dec",
    FinalApprovalId => "fin",
    IssueId => "iss",
    ThreadId => "thr",
    MessageId => "msg",
}
