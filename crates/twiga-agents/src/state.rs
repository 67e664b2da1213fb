use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use twiga_common::{InboundMessage, Reply, Result, UserState};
use twiga_db::User;

use crate::replies;

/// What the pipeline should do with a message after the state check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateOutcome {
    /// Not intercepted; continue with normal handling.
    PassThrough,
    /// The onboarding flow consumed the message and replied itself.
    Handled,
    /// Send this canned reply and stop.
    Reply(Reply),
}

/// Drives users through onboarding. Implementations reply through their own
/// sender.
#[async_trait]
pub trait OnboardingProcessor: Send + Sync {
    async fn process_state(&self, user: &User, inbound: &InboundMessage) -> Result<()>;
}

/// Builds a canned reply text from the support contact.
type StateHandler = fn(&str) -> String;

fn blocked_handler(support: &str) -> String {
    replies::blocked(support)
}

fn rate_limited_handler(_support: &str) -> String {
    replies::RATE_LIMITED.to_string()
}

fn pending_message_handler(_support: &str) -> String {
    replies::PENDING_MESSAGE.to_string()
}

fn default_handler(support: &str) -> String {
    replies::default_error(support)
}

/// Intercepts messages based on the user's persisted state.
pub struct StateDispatcher {
    onboarding: Arc<dyn OnboardingProcessor>,
    support_contact: String,
    handlers: HashMap<UserState, StateHandler>,
}

impl StateDispatcher {
    pub fn new(onboarding: Arc<dyn OnboardingProcessor>, support_contact: impl Into<String>) -> Self {
        let handlers: HashMap<UserState, StateHandler> = HashMap::from([
            (UserState::Blocked, blocked_handler as StateHandler),
            (UserState::RateLimited, rate_limited_handler),
            (UserState::HasPendingMessage, pending_message_handler),
        ]);
        Self {
            onboarding,
            support_contact: support_contact.into(),
            handlers,
        }
    }

    /// Decide how to treat `inbound` given `user.state`.
    ///
    /// Active users pass through, new and onboarding users are handed to the
    /// onboarding flow, and every other state gets a canned reply. Only an
    /// onboarding failure produces an error.
    pub async fn handle_state(&self, user: &User, inbound: &InboundMessage) -> Result<StateOutcome> {
        match user.state {
            UserState::Active => Ok(StateOutcome::PassThrough),
            UserState::New | UserState::Onboarding => {
                info!("user {} is onboarding ({})", user.wa_id, user.onboarding_state);
                self.onboarding.process_state(user, inbound).await?;
                Ok(StateOutcome::Handled)
            }
            state => {
                debug!("user {} intercepted in state {state}", user.wa_id);
                Ok(StateOutcome::Reply(self.canned_reply(state)))
            }
        }
    }

    /// Canned reply for a state. Unmapped states get the support text.
    pub fn canned_reply(&self, state: UserState) -> Reply {
        let handler = self
            .handlers
            .get(&state)
            .copied()
            .unwrap_or(default_handler as StateHandler);
        Reply::text(handler(&self.support_contact))
    }
}
