//! Fixed, non-generated reply texts.

use twiga_common::{GradeLevel, Subject};

pub const DEFAULT_SUPPORT_CONTACT: &str = "dev@ai.or.tz";

pub const RATE_LIMITED: &str = "🚫 You have reached your daily messaging limit, so Twiga 🦒 is quite sleepy from all of today's texting 🥱. Let's talk more tomorrow!";

pub const PENDING_MESSAGE: &str =
    "You have a pending message. Please wait for a response before sending a new message.";

pub fn default_error(support_contact: &str) -> String {
    format!(
        "There appears to have occurred an error. Please contact support ({support_contact}) for assistance."
    )
}

pub fn blocked(support_contact: &str) -> String {
    format!(
        "Your account is currently blocked. Please contact support ({support_contact}) for assistance."
    )
}

pub fn welcome(name: &str) -> String {
    format!(
        "Hello {name}! 👋 I'm Twiga 🦒, your teaching assistant. Which subject do you teach?"
    )
}

pub const ASK_SUBJECT_AGAIN: &str =
    "Sorry, I didn't recognise that subject. Please pick one of the options below.";

pub fn ask_grade(subject: Subject) -> String {
    format!("Great, {}! Which class do you teach it to?", subject.label())
}

pub const ASK_GRADE_AGAIN: &str =
    "Sorry, I didn't recognise that class. Please pick one of the options below.";

pub fn class_unavailable(subject: Subject, grade: GradeLevel) -> String {
    format!(
        "Sorry, {} for {} is not available yet. Please choose another subject.",
        subject.label(),
        grade.label()
    )
}

pub fn onboarding_complete(subject: Subject, grade: GradeLevel) -> String {
    format!(
        "You're all set! 🎉 I'll help you teach {} to {}. Ask me anything, for example to explain a topic or prepare exercises.",
        subject.label(),
        grade.label()
    )
}
