pub mod error;
pub mod message;
pub mod types;

pub use error::{Error, Result};
pub use message::{InboundMessage, Reply, ReplySender};
pub use types::{ContentType, GradeLevel, MessageRole, OnboardingState, Role, Subject, UserState};
