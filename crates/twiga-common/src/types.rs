use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Implements the text round-trip used for database columns and user input:
/// `as_str`, `Display` and a case-insensitive `FromStr`.
macro_rules! impl_db_enum {
    ($t:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $t {
            pub const ALL: &'static [$t] = &[$($t::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($t::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $t {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($name => Ok($t::$variant),)+
                    other => Err(Error::Other(format!(
                        "unknown {}: {other}",
                        stringify!($t)
                    ))),
                }
            }
        }
    };
}

/// Conversation state of a user, persisted on the `users` row.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    New,
    Onboarding,
    Active,
    Blocked,
    RateLimited,
    HasPendingMessage,
    /// A stored value this build does not recognise.
    #[serde(other)]
    Unknown,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Onboarding => "onboarding",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::RateLimited => "rate_limited",
            Self::HasPendingMessage => "has_pending_message",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient decoding for database rows: unrecognised values map to `Unknown`.
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "onboarding" => Ok(Self::Onboarding),
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            "rate_limited" => Ok(Self::RateLimited),
            "has_pending_message" => Ok(Self::HasPendingMessage),
            other => Err(Error::Other(format!("unknown UserState: {other}"))),
        }
    }
}

/// Progress through the onboarding conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingState {
    New,
    AwaitingSubject,
    AwaitingGrade,
    Completed,
}

impl_db_enum!(OnboardingState {
    New => "new",
    AwaitingSubject => "awaiting_subject",
    AwaitingGrade => "awaiting_grade",
    Completed => "completed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Admin,
}

impl_db_enum!(Role {
    Teacher => "teacher",
    Admin => "admin",
});

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Geography,
    Mathematics,
    Biology,
}

impl_db_enum!(Subject {
    Geography => "geography",
    Mathematics => "mathematics",
    Biology => "biology",
});

impl Subject {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Geography => "Geography",
            Self::Mathematics => "Mathematics",
            Self::Biology => "Biology",
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeLevel {
    P1,
    P2,
    P3,
    P4,
    P5,
    P6,
    Os1,
    Os2,
    Os3,
    Os4,
    As1,
    As2,
}

impl_db_enum!(GradeLevel {
    P1 => "p1",
    P2 => "p2",
    P3 => "p3",
    P4 => "p4",
    P5 => "p5",
    P6 => "p6",
    Os1 => "os1",
    Os2 => "os2",
    Os3 => "os3",
    Os4 => "os4",
    As1 => "as1",
    As2 => "as2",
});

impl GradeLevel {
    /// Ordinary and advanced secondary levels, the grades offered during onboarding.
    pub const SECONDARY: &'static [GradeLevel] = &[
        GradeLevel::Os1,
        GradeLevel::Os2,
        GradeLevel::Os3,
        GradeLevel::Os4,
        GradeLevel::As1,
        GradeLevel::As2,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::P1 => "Standard 1",
            Self::P2 => "Standard 2",
            Self::P3 => "Standard 3",
            Self::P4 => "Standard 4",
            Self::P5 => "Standard 5",
            Self::P6 => "Standard 6",
            Self::Os1 => "Form 1",
            Self::Os2 => "Form 2",
            Self::Os3 => "Form 3",
            Self::Os4 => "Form 4",
            Self::As1 => "Form 5",
            Self::As2 => "Form 6",
        }
    }

    /// Accepts either the stored name (`os2`) or the display label (`Form 2`).
    pub fn from_label_or_name(input: &str) -> Option<Self> {
        let needle = input.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.label().eq_ignore_ascii_case(needle))
            .or_else(|| needle.parse().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl_db_enum!(MessageRole {
    User => "user",
    Assistant => "assistant",
    System => "system",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Exercise,
}

impl_db_enum!(ContentType {
    Text => "text",
    Exercise => "exercise",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_state_round_trips_through_text() {
        for state in [
            UserState::New,
            UserState::Onboarding,
            UserState::Active,
            UserState::Blocked,
            UserState::RateLimited,
            UserState::HasPendingMessage,
        ] {
            assert_eq!(UserState::from_db(state.as_str()), state);
        }
    }

    #[test]
    fn unrecognised_user_state_decodes_as_unknown() {
        assert_eq!(UserState::from_db("suspended"), UserState::Unknown);
        assert!("suspended".parse::<UserState>().is_err());
    }

    #[test]
    fn grade_level_accepts_labels_and_names() {
        assert_eq!(GradeLevel::from_label_or_name("Form 2"), Some(GradeLevel::Os2));
        assert_eq!(GradeLevel::from_label_or_name(" form 5 "), Some(GradeLevel::As1));
        assert_eq!(GradeLevel::from_label_or_name("OS4"), Some(GradeLevel::Os4));
        assert_eq!(GradeLevel::from_label_or_name("Form 9"), None);
    }

    #[test]
    fn subject_parse_is_case_insensitive() {
        assert_eq!("Geography".parse::<Subject>().ok(), Some(Subject::Geography));
        assert!("chemistry".parse::<Subject>().is_err());
    }
}
