use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use twiga_common::{
    GradeLevel, InboundMessage, OnboardingState, Reply, ReplySender, Result, Subject, UserState,
};
use twiga_db::{TwigaStore, User};

use crate::replies;
use crate::state::OnboardingProcessor;

/// Asks a new teacher for their subject and class over a short exchange of
/// quick-reply messages, then activates them.
pub struct ConversationalOnboarding {
    store: Arc<TwigaStore>,
    sender: Arc<dyn ReplySender>,
}

impl ConversationalOnboarding {
    pub fn new(store: Arc<TwigaStore>, sender: Arc<dyn ReplySender>) -> Self {
        Self { store, sender }
    }

    async fn ask_subject(&self, mut user: User, text: String) -> Result<()> {
        user.state = UserState::Onboarding;
        user.onboarding_state = OnboardingState::AwaitingSubject;
        user.selected_subject = None;
        let user = self.store.update_user(&user).await?;
        self.sender
            .send_reply(&user.wa_id, &Reply::with_options(text, subject_options()))
            .await
    }

    async fn on_subject(&self, mut user: User, text: &str) -> Result<()> {
        let Ok(subject) = text.parse::<Subject>() else {
            return self
                .sender
                .send_reply(
                    &user.wa_id,
                    &Reply::with_options(replies::ASK_SUBJECT_AGAIN, subject_options()),
                )
                .await;
        };

        user.selected_subject = Some(subject);
        user.onboarding_state = OnboardingState::AwaitingGrade;
        let user = self.store.update_user(&user).await?;
        self.sender
            .send_reply(
                &user.wa_id,
                &Reply::with_options(replies::ask_grade(subject), grade_options()),
            )
            .await
    }

    async fn on_grade(&self, mut user: User, text: &str) -> Result<()> {
        let Some(subject) = user.selected_subject else {
            warn!("user {} awaiting grade without a subject", user.wa_id);
            let greeting = replies::welcome(user.display_name());
            return self.ask_subject(user, greeting).await;
        };

        let Some(grade) = GradeLevel::from_label_or_name(text) else {
            return self
                .sender
                .send_reply(
                    &user.wa_id,
                    &Reply::with_options(replies::ASK_GRADE_AGAIN, grade_options()),
                )
                .await;
        };

        if self.store.get_class(subject, grade).await?.is_none() {
            info!("class {subject} {grade} requested by {} does not exist", user.wa_id);
            return self
                .ask_subject(user, replies::class_unavailable(subject, grade))
                .await;
        }

        self.store.add_teacher_class(&user, subject, grade).await?;
        user.add_class_info(subject, grade);
        user.selected_subject = None;
        user.state = UserState::Active;
        user.onboarding_state = OnboardingState::Completed;
        let user = self.store.update_user(&user).await?;
        info!("user {} completed onboarding", user.wa_id);

        self.sender
            .send_reply(
                &user.wa_id,
                &Reply::text(replies::onboarding_complete(subject, grade)),
            )
            .await
    }
}

#[async_trait]
impl OnboardingProcessor for ConversationalOnboarding {
    async fn process_state(&self, user: &User, inbound: &InboundMessage) -> Result<()> {
        let user = user.clone();
        match user.onboarding_state {
            OnboardingState::AwaitingSubject => self.on_subject(user, &inbound.text).await,
            OnboardingState::AwaitingGrade => self.on_grade(user, &inbound.text).await,
            // Completed users only land here if their state was reset; start over.
            OnboardingState::New | OnboardingState::Completed => {
                let greeting = replies::welcome(user.display_name());
                self.ask_subject(user, greeting).await
            }
        }
    }
}

fn subject_options() -> Vec<String> {
    Subject::ALL.iter().map(|s| s.label().to_string()).collect()
}

fn grade_options() -> Vec<String> {
    GradeLevel::SECONDARY
        .iter()
        .map(|g| g.label().to_string())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every reply instead of sending it.
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub(crate) sent: Mutex<Vec<(String, Reply)>>,
    }

    impl RecordingSender {
        pub(crate) fn last(&self) -> Reply {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl ReplySender for RecordingSender {
        async fn send_reply(&self, to: &str, reply: &Reply) -> Result<()> {
            self.sent.lock().unwrap().push((to.to_string(), reply.clone()));
            Ok(())
        }
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            message_id: "wamid.1".into(),
            wa_id: "255700000001".into(),
            name: Some("Amina".into()),
            text: text.into(),
        }
    }

    async fn setup() -> (Arc<TwigaStore>, Arc<RecordingSender>, ConversationalOnboarding) {
        let store = Arc::new(TwigaStore::in_memory().unwrap());
        store
            .create_class(Subject::Geography, GradeLevel::Os2)
            .await
            .unwrap();
        let sender = Arc::new(RecordingSender::default());
        let onboarding = ConversationalOnboarding::new(store.clone(), sender.clone());
        (store, sender, onboarding)
    }

    async fn step(
        store: &TwigaStore,
        onboarding: &ConversationalOnboarding,
        text: &str,
    ) -> User {
        let user = store
            .get_or_create_user("255700000001", Some("Amina"))
            .await
            .unwrap();
        onboarding.process_state(&user, &inbound(text)).await.unwrap();
        store.get_user_by_waid("255700000001").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn walks_from_new_to_active() {
        let (store, sender, onboarding) = setup().await;

        let user = step(&store, &onboarding, "hello").await;
        assert_eq!(user.state, UserState::Onboarding);
        assert_eq!(user.onboarding_state, OnboardingState::AwaitingSubject);
        let greeting = sender.last();
        assert!(greeting.text.contains("Amina"));
        assert_eq!(
            greeting.options,
            Some(vec!["Geography".into(), "Mathematics".into(), "Biology".into()])
        );

        let user = step(&store, &onboarding, "Geography").await;
        assert_eq!(user.onboarding_state, OnboardingState::AwaitingGrade);
        assert_eq!(user.selected_subject, Some(Subject::Geography));
        assert_eq!(sender.last().options.map(|o| o.len()), Some(6));

        let user = step(&store, &onboarding, "Form 2").await;
        assert_eq!(user.state, UserState::Active);
        assert_eq!(user.onboarding_state, OnboardingState::Completed);
        assert_eq!(user.class_info, serde_json::json!({ "geography": ["os2"] }));
        assert!(sender.last().options.is_none());

        let classes = store.get_teacher_classes(user.id).await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].grade_level, GradeLevel::Os2);
    }

    #[tokio::test]
    async fn unknown_subject_is_asked_again() {
        let (store, sender, onboarding) = setup().await;
        step(&store, &onboarding, "hello").await;

        let user = step(&store, &onboarding, "Chemistry").await;
        assert_eq!(user.onboarding_state, OnboardingState::AwaitingSubject);
        assert_eq!(sender.last().text, replies::ASK_SUBJECT_AGAIN);
    }

    #[tokio::test]
    async fn unknown_grade_is_asked_again() {
        let (store, sender, onboarding) = setup().await;
        step(&store, &onboarding, "hello").await;
        step(&store, &onboarding, "geography").await;

        let user = step(&store, &onboarding, "Form 9").await;
        assert_eq!(user.onboarding_state, OnboardingState::AwaitingGrade);
        assert_eq!(sender.last().text, replies::ASK_GRADE_AGAIN);
    }

    #[tokio::test]
    async fn missing_class_returns_to_subject_selection() {
        let (store, sender, onboarding) = setup().await;
        step(&store, &onboarding, "hello").await;
        step(&store, &onboarding, "Biology").await;

        let user = step(&store, &onboarding, "Form 1").await;
        assert_eq!(user.state, UserState::Onboarding);
        assert_eq!(user.onboarding_state, OnboardingState::AwaitingSubject);
        assert_eq!(user.selected_subject, None);
        let reply = sender.last();
        assert!(reply.text.contains("not available"));
        assert_eq!(reply.options.map(|o| o.len()), Some(3));
        assert!(store.get_teacher_classes(user.id).await.unwrap().is_empty());
    }
}
