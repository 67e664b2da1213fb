use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twiga_common::{
    ContentType, GradeLevel, MessageRole, OnboardingState, Role, Subject, UserState,
};

/// A WhatsApp user, keyed externally by `wa_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub wa_id: String,
    pub name: Option<String>,
    pub state: UserState,
    pub onboarding_state: OnboardingState,
    pub role: Role,
    /// Subject picked during onboarding, kept until a grade is chosen.
    pub selected_subject: Option<Subject>,
    /// Subject name to the grades taught, e.g. `{"geography": ["os2"]}`.
    pub class_info: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Record that this user teaches `grade` of `subject`. Idempotent.
    pub fn add_class_info(&mut self, subject: Subject, grade: GradeLevel) {
        if !self.class_info.is_object() {
            self.class_info = serde_json::json!({});
        }
        let Some(map) = self.class_info.as_object_mut() else {
            return;
        };
        let grades = map
            .entry(subject.as_str())
            .or_insert_with(|| serde_json::json!([]));
        if let Some(list) = grades.as_array_mut() {
            let grade = serde_json::Value::from(grade.as_str());
            if !list.contains(&grade) {
                list.push(grade);
            }
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.wa_id)
    }
}

/// A stored chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for messages before persistence assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub user_id: i64,
    pub role: MessageRole,
    pub content: String,
}

impl NewMessage {
    pub fn new(user_id: i64, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            user_id,
            role,
            content: content.into(),
        }
    }
}

/// A (subject, grade) pair that teachers can be linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: i64,
    pub subject: Subject,
    pub grade_level: GradeLevel,
    pub status: String,
}

/// A curriculum document such as a textbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub name: String,
    pub resource_type: String,
    pub authors: Vec<String>,
    pub grade_levels: Vec<GradeLevel>,
    pub subjects: Vec<Subject>,
    pub file_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResource {
    pub name: String,
    pub resource_type: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub grade_levels: Vec<GradeLevel>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub file_location: Option<String>,
}

/// A retrievable unit of curriculum text. The embedding is not loaded back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub resource_id: i64,
    pub content: String,
    pub content_type: ContentType,
    pub top_level_section_index: Option<String>,
    pub top_level_section_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub resource_id: i64,
    pub content: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub top_level_section_index: Option<String>,
    #[serde(default)]
    pub top_level_section_title: Option<String>,
    pub embedding: Vec<f32>,
}
