use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use twiga_agents::{Responder, StateDispatcher, StateOutcome};
use twiga_channels::{WhatsAppOnMessageFn, format_text_for_whatsapp};
use twiga_common::{InboundMessage, Reply, Result, UserState};
use twiga_db::{TwigaStore, User};

/// Inbound message flow: load the user, apply the daily limit, run the state
/// dispatcher and hand pass-through messages to the responder.
pub struct MessagePipeline {
    store: Arc<TwigaStore>,
    dispatcher: StateDispatcher,
    responder: Responder,
    daily_message_limit: Option<u32>,
}

impl MessagePipeline {
    /// A `daily_message_limit` of zero disables the limit.
    pub fn new(
        store: Arc<TwigaStore>,
        dispatcher: StateDispatcher,
        responder: Responder,
        daily_message_limit: Option<u32>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            responder,
            daily_message_limit: daily_message_limit.filter(|limit| *limit > 0),
        }
    }

    /// Wrap the pipeline as a channel callback.
    pub fn into_handler(self: Arc<Self>) -> WhatsAppOnMessageFn {
        let on_message: WhatsAppOnMessageFn = Arc::new(move |inbound: InboundMessage| {
            let pipeline = Arc::clone(&self);
            Box::pin(async move { pipeline.handle(inbound).await })
        });
        on_message
    }

    /// Process one message. `Ok(None)` means a reply was already sent by the
    /// onboarding flow. Errors are logged here and left to the channel to
    /// answer with the support text.
    pub async fn handle(&self, inbound: InboundMessage) -> Result<Option<Reply>> {
        let wa_id = inbound.wa_id.clone();
        self.process(inbound).await.inspect_err(|e| {
            if e.is_data_access() {
                error!("data access failed while handling message from {wa_id}: {e}");
            } else {
                warn!("failed to handle message from {wa_id}: {e}");
            }
        })
    }

    async fn process(&self, inbound: InboundMessage) -> Result<Option<Reply>> {
        let user = self
            .store
            .get_or_create_user(&inbound.wa_id, inbound.name.as_deref())
            .await?;
        let user = self.apply_rate_limit(user, Utc::now()).await?;

        match self.dispatcher.handle_state(&user, &inbound).await? {
            StateOutcome::PassThrough => {
                let answer = self.responder.respond(&user, &inbound).await?;
                Ok(Some(Reply::text(format_text_for_whatsapp(&answer))))
            }
            StateOutcome::Handled => Ok(None),
            StateOutcome::Reply(reply) => Ok(Some(reply)),
        }
    }

    /// Move active users at the limit to `rate_limited` and back again once
    /// the day's count is under the limit.
    async fn apply_rate_limit(&self, mut user: User, now: DateTime<Utc>) -> Result<User> {
        let Some(limit) = self.daily_message_limit else {
            return Ok(user);
        };
        if !matches!(user.state, UserState::Active | UserState::RateLimited) {
            return Ok(user);
        }

        let sent_today = self
            .store
            .count_user_messages_since(user.id, start_of_day(now))
            .await?;

        let next = if sent_today >= limit {
            UserState::RateLimited
        } else {
            UserState::Active
        };
        if next == user.state {
            return Ok(user);
        }

        info!(
            "user {} moves {} -> {next} ({sent_today}/{limit} messages today)",
            user.wa_id, user.state
        );
        user.state = next;
        self.store.update_user(&user).await
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn start_of_day_is_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 15, 42, 7).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap()
        );
    }
}
