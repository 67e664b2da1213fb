use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use twiga_agents::EmbeddingProvider;
use twiga_common::{ContentType, GradeLevel, Subject, UserState};
use twiga_db::{Class, NewChunk, NewResource, Resource, TwigaStore, User};

/// Texts embedded per provider request during import.
const EMBED_BATCH_SIZE: usize = 64;

pub fn parse_subject(input: &str) -> Result<Subject> {
    input.parse().map_err(|_| {
        let known: Vec<&str> = Subject::ALL.iter().map(Subject::as_str).collect();
        anyhow::anyhow!("unknown subject '{input}' (expected one of: {})", known.join(", "))
    })
}

pub fn parse_grade(input: &str) -> Result<GradeLevel> {
    GradeLevel::from_label_or_name(input).ok_or_else(|| {
        let known: Vec<&str> = GradeLevel::ALL.iter().map(GradeLevel::as_str).collect();
        anyhow::anyhow!("unknown grade '{input}' (expected one of: {})", known.join(", "))
    })
}

pub async fn add_class(store: &TwigaStore, subject: &str, grade: &str) -> Result<Class> {
    let class = store
        .create_class(parse_subject(subject)?, parse_grade(grade)?)
        .await?;
    Ok(class)
}

pub fn format_class(class: &Class) -> String {
    format!(
        "{:>4}  {:<12} {:<4} {:<8} [{}]",
        class.id,
        class.subject.label(),
        class.grade_level.as_str(),
        class.grade_level.label(),
        class.status
    )
}

/// Create a resource and link it to the (subject, grade) class, creating the
/// class if needed.
pub async fn add_resource(
    store: &TwigaStore,
    name: &str,
    resource_type: &str,
    subject: &str,
    grade: &str,
) -> Result<Resource> {
    let subject = parse_subject(subject)?;
    let grade = parse_grade(grade)?;
    let class = store.create_class(subject, grade).await?;
    let resource = store
        .create_resource(NewResource {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            authors: Vec::new(),
            grade_levels: vec![grade],
            subjects: vec![subject],
            file_location: None,
        })
        .await?;
    store.link_class_resource(class.id, resource.id).await?;
    Ok(resource)
}

pub async fn find_user(store: &TwigaStore, wa_id: &str) -> Result<User> {
    store
        .get_user_by_waid(wa_id)
        .await?
        .with_context(|| format!("no user with wa_id {wa_id}"))
}

pub async fn set_user_state(store: &TwigaStore, wa_id: &str, state: &str) -> Result<User> {
    let state: UserState = state.parse()?;
    let mut user = find_user(store, wa_id).await?;
    user.state = state;
    Ok(store.update_user(&user).await?)
}

pub fn format_user(user: &User) -> String {
    let mut lines = vec![
        format!("id:               {}", user.id),
        format!("wa_id:            {}", user.wa_id),
        format!("name:             {}", user.name.as_deref().unwrap_or("-")),
        format!("state:            {}", user.state),
        format!("onboarding_state: {}", user.onboarding_state),
        format!("role:             {}", user.role),
    ];
    if let Some(subject) = user.selected_subject {
        lines.push(format!("selected_subject: {subject}"));
    }
    lines.push(format!("class_info:       {}", user.class_info));
    lines.push(format!("created_at:       {}", user.created_at.to_rfc3339()));
    lines.push(format!("updated_at:       {}", user.updated_at.to_rfc3339()));
    lines.join("\n")
}

/// One line of a chunk import file. The embedding is computed when absent.
#[derive(Debug, Deserialize)]
pub struct ChunkRecord {
    pub resource_id: i64,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub top_level_section_index: Option<String>,
    #[serde(default)]
    pub top_level_section_title: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

fn default_content_type() -> ContentType {
    ContentType::Text
}

pub fn parse_chunk_records(input: &str) -> Result<Vec<ChunkRecord>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid chunk on line {}", i + 1))
        })
        .collect()
}

/// Embed records lacking a vector and store them all. Returns the count stored.
pub async fn import_chunks(
    store: &TwigaStore,
    embedder: &dyn EmbeddingProvider,
    records: Vec<ChunkRecord>,
) -> Result<usize> {
    let mut chunks = Vec::with_capacity(records.len());
    for batch in records.chunks(EMBED_BATCH_SIZE) {
        let missing: Vec<String> = batch
            .iter()
            .filter(|r| r.embedding.is_none())
            .map(|r| r.content.clone())
            .collect();
        let mut computed = embedder.embed_documents(&missing).await?.into_iter();

        for record in batch {
            let embedding = match &record.embedding {
                Some(v) => v.clone(),
                None => computed
                    .next()
                    .context("embedding provider returned too few vectors")?,
            };
            chunks.push(NewChunk {
                resource_id: record.resource_id,
                content: record.content.clone(),
                content_type: record.content_type,
                top_level_section_index: record.top_level_section_index.clone(),
                top_level_section_title: record.top_level_section_title.clone(),
                embedding,
            });
        }
    }
    Ok(store.insert_chunks(chunks).await?)
}

pub async fn import_chunks_file(
    store: &TwigaStore,
    embedder: &dyn EmbeddingProvider,
    path: &Path,
) -> Result<usize> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records = parse_chunk_records(&input)?;
    import_chunks(store, embedder, records).await
}
