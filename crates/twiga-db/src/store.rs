use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, error, info};
use twiga_common::{Error, GradeLevel, OnboardingState, Result, Role, Subject, UserState};

use crate::migrations::{MIGRATIONS, MIGRATIONS_TABLE};
use crate::models::{Class, Message, NewMessage, NewResource, Resource, User};

const USER_COLUMNS: &str = "id, wa_id, name, state, onboarding_state, role, selected_subject,
     class_info, created_at, updated_at";

/// Relational store for users, messages, classes and curriculum content.
///
/// Every public operation runs in its own short transaction; a failed
/// operation drops its transaction uncommitted, which rolls it back.
pub struct TwigaStore {
    conn: Mutex<Connection>,
}

impl TwigaStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening twiga store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.connection()?;
        conn.execute_batch(MIGRATIONS_TABLE)
            .map_err(|e| Error::Database(format!("failed to create migrations table: {e}")))?;

        let tx = begin(&mut conn)?;
        for migration in MIGRATIONS {
            tx.execute_batch(migration.sql).map_err(|e| {
                Error::Database(format!("migration {} failed: {e}", migration.name))
            })?;
            let applied = tx
                .execute(
                    "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?, ?)",
                    params![migration.version, migration.name],
                )
                .map_err(|e| Error::Database(format!("failed to record migration: {e}")))?;
            if applied > 0 {
                info!("applied migration {} ({})", migration.version, migration.name);
            }
        }
        commit(tx)
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("database lock poisoned".into()))
    }

    // --- users ---

    /// Return the user with `wa_id`, creating it (state `new`, role `teacher`)
    /// on first contact. Safe to call concurrently for the same identity.
    pub async fn get_or_create_user(&self, wa_id: &str, name: Option<&str>) -> Result<User> {
        self.get_or_create_user_sync(wa_id, name).map_err(|e| {
            error!("database operation failed for wa_id {wa_id}: {e}");
            Error::UserCreation(e.to_string())
        })
    }

    pub async fn get_user_by_waid(&self, wa_id: &str) -> Result<Option<User>> {
        self.get_user_by_waid_sync(wa_id).map_err(|e| {
            error!("failed to query user {wa_id}: {e}");
            Error::UserQuery(e.to_string())
        })
    }

    /// Persist every mutable field of `user` and return the stored row.
    pub async fn update_user(&self, user: &User) -> Result<User> {
        let updated = self.update_user_sync(user).map_err(|e| {
            error!("failed to update user {}: {e}", user.wa_id);
            Error::UserUpdate(e.to_string())
        })?;
        info!("updated user {}", updated.wa_id);
        Ok(updated)
    }

    /// Move the user back to `active` only if it is still `has_pending_message`.
    /// Returns false when another writer changed the state in the meantime.
    pub async fn release_pending(&self, user_id: i64) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE users SET state = ?, updated_at = ?
                 WHERE id = ? AND state = ?",
                params![
                    UserState::Active.as_str(),
                    format_timestamp(Utc::now()),
                    user_id,
                    UserState::HasPendingMessage.as_str(),
                ],
            )
            .map_err(|e| {
                error!("failed to release pending state for user {user_id}: {e}");
                Error::UserUpdate(e.to_string())
            })?;
        Ok(changed > 0)
    }

    pub async fn count_users(&self) -> Result<i64> {
        let conn = self.connection()?;
        conn.query_row("SELECT count(*) FROM users", [], |row| row.get(0))
            .map_err(|e| Error::UserQuery(format!("failed to count users: {e}")))
    }

    // --- classes ---

    /// Link `user` to the existing (subject, grade) class. Fails if the class
    /// does not exist; linking twice is a no-op.
    pub async fn add_teacher_class(
        &self,
        user: &User,
        subject: Subject,
        grade: GradeLevel,
    ) -> Result<Class> {
        let class = self
            .add_teacher_class_sync(user.id, subject, grade)
            .map_err(|e| {
                error!("failed to add teacher class for user {}: {e}", user.id);
                Error::UserUpdate(format!("failed to add teacher class: {e}"))
            })?;
        info!("added class {subject} {grade} for user {}", user.id);
        Ok(class)
    }

    /// Create the (subject, grade) class if missing and return it.
    pub async fn create_class(&self, subject: Subject, grade: GradeLevel) -> Result<Class> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;
        tx.execute(
            "INSERT INTO classes (subject, grade_level) VALUES (?, ?)
             ON CONFLICT(subject, grade_level) DO NOTHING",
            params![subject.as_str(), grade.as_str()],
        )
        .map_err(|e| Error::Database(format!("failed to insert class: {e}")))?;
        let class = find_class(&tx, subject, grade)?
            .ok_or_else(|| Error::Database(format!("class {subject} {grade} vanished")))?;
        commit(tx)?;
        Ok(class)
    }

    pub async fn get_class(&self, subject: Subject, grade: GradeLevel) -> Result<Option<Class>> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;
        let class = find_class(&tx, subject, grade)?;
        commit(tx)?;
        Ok(class)
    }

    pub async fn list_classes(&self) -> Result<Vec<Class>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, subject, grade_level, status FROM classes
                 ORDER BY subject, grade_level",
            )
            .map_err(|e| Error::Database(format!("failed to prepare class query: {e}")))?;
        let rows = stmt
            .query_map([], row_to_class)
            .map_err(|e| Error::Database(format!("failed to list classes: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect class rows: {e}")))
    }

    pub async fn get_teacher_classes(&self, user_id: i64) -> Result<Vec<Class>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.subject, c.grade_level, c.status
                 FROM classes c
                 JOIN teachers_classes tc ON tc.class_id = c.id
                 WHERE tc.teacher_id = ?
                 ORDER BY c.id",
            )
            .map_err(|e| Error::UserQuery(format!("failed to prepare teacher classes: {e}")))?;
        let rows = stmt
            .query_map(params![user_id], row_to_class)
            .map_err(|e| Error::UserQuery(format!("failed to query teacher classes: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::UserQuery(format!("failed to collect teacher classes: {e}")))
    }

    // --- resources ---

    pub async fn create_resource(&self, resource: NewResource) -> Result<Resource> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;
        tx.execute(
            "INSERT INTO resources (
                name, resource_type, authors, grade_levels, subjects, file_location, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                resource.name,
                resource.resource_type,
                serde_json::to_string(&resource.authors)?,
                serde_json::to_string(&resource.grade_levels)?,
                serde_json::to_string(&resource.subjects)?,
                resource.file_location,
                format_timestamp(Utc::now()),
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert resource: {e}")))?;
        let id = tx.last_insert_rowid();
        commit(tx)?;

        Ok(Resource {
            id,
            name: resource.name,
            resource_type: resource.resource_type,
            authors: resource.authors,
            grade_levels: resource.grade_levels,
            subjects: resource.subjects,
            file_location: resource.file_location,
        })
    }

    /// Make `resource_id` searchable for teachers of `class_id`. Idempotent.
    pub async fn link_class_resource(&self, class_id: i64, resource_id: i64) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;
        tx.execute(
            "INSERT INTO classes_resources (class_id, resource_id) VALUES (?, ?)
             ON CONFLICT(class_id, resource_id) DO NOTHING",
            params![class_id, resource_id],
        )
        .map_err(|e| Error::Database(format!("failed to link class resource: {e}")))?;
        commit(tx)
    }

    pub async fn get_class_resource_ids(&self, class_ids: &[i64]) -> Result<Vec<i64>> {
        if class_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; class_ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT resource_id FROM classes_resources
             WHERE class_id IN ({placeholders}) ORDER BY resource_id"
        );
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare resource query: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(class_ids), |row| row.get(0))
            .map_err(|e| Error::Database(format!("failed to query class resources: {e}")))?;
        rows.collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect resource ids: {e}")))
    }

    // --- messages ---

    /// The newest `limit` messages of a user, oldest first.
    pub async fn get_user_message_history(&self, user_id: i64, limit: usize) -> Result<Vec<Message>> {
        let mut messages = self.recent_messages_sync(user_id, limit).inspect_err(|e| {
            error!("failed to retrieve message history for user {user_id}: {e}");
        })?;

        if messages.is_empty() {
            debug!("no message history found for user {user_id}");
        }
        messages.reverse();
        Ok(messages)
    }

    /// Insert a batch of messages atomically. An empty batch never touches
    /// the database.
    pub async fn create_new_messages(&self, messages: Vec<NewMessage>) -> Result<Vec<Message>> {
        let Some(first) = messages.first() else {
            return Ok(Vec::new());
        };
        let user_id = first.user_id;

        self.create_new_messages_sync(&messages).map_err(|e| {
            error!("unexpected error creating messages for user {user_id}: {e}");
            Error::MessageCreation(e.to_string())
        })
    }

    pub async fn create_new_message(&self, message: NewMessage) -> Result<Message> {
        self.create_new_messages(vec![message])
            .await?
            .pop()
            .ok_or_else(|| Error::MessageCreation("no message was created".into()))
    }

    /// Number of messages `user_id` sent at or after `since`.
    pub async fn count_user_messages_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<u32> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT count(*) FROM messages
             WHERE user_id = ? AND role = 'user' AND created_at >= ?",
            params![user_id, format_timestamp(since)],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to count messages: {e}")))
    }

    fn get_or_create_user_sync(&self, wa_id: &str, name: Option<&str>) -> Result<User> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;
        let now = format_timestamp(Utc::now());

        let inserted = tx
            .execute(
                "INSERT INTO users (wa_id, name, state, onboarding_state, role, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(wa_id) DO NOTHING",
                params![
                    wa_id,
                    name,
                    UserState::New.as_str(),
                    OnboardingState::New.as_str(),
                    Role::Teacher.as_str(),
                    now,
                    now,
                ],
            )
            .map_err(|e| Error::Database(format!("failed to insert user: {e}")))?;

        let user = find_user(&tx, wa_id)?
            .ok_or_else(|| Error::Database(format!("user {wa_id} missing after upsert")))?;
        commit(tx)?;

        if inserted > 0 {
            info!("created new user with wa_id: {wa_id}");
        }
        Ok(user)
    }

    fn get_user_by_waid_sync(&self, wa_id: &str) -> Result<Option<User>> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;
        let user = find_user(&tx, wa_id)?;
        commit(tx)?;
        Ok(user)
    }

    fn update_user_sync(&self, user: &User) -> Result<User> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;

        let changed = tx
            .execute(
                "UPDATE users SET name = ?, state = ?, onboarding_state = ?, role = ?,
                    selected_subject = ?, class_info = ?, updated_at = ?
                 WHERE id = ?",
                params![
                    user.name,
                    user.state.as_str(),
                    user.onboarding_state.as_str(),
                    user.role.as_str(),
                    user.selected_subject.map(|s| s.as_str()),
                    serde_json::to_string(&user.class_info)?,
                    format_timestamp(Utc::now()),
                    user.id,
                ],
            )
            .map_err(|e| Error::Database(format!("failed to update user row: {e}")))?;

        if changed == 0 {
            return Err(Error::NotFound(format!("user {} does not exist", user.id)));
        }

        let stored = find_user(&tx, &user.wa_id)?
            .ok_or_else(|| Error::NotFound(format!("user {} does not exist", user.wa_id)))?;
        commit(tx)?;
        Ok(stored)
    }

    fn add_teacher_class_sync(&self, user_id: i64, subject: Subject, grade: GradeLevel) -> Result<Class> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;

        let class = find_class(&tx, subject, grade)?
            .ok_or_else(|| Error::NotFound(format!("class {subject} {grade} does not exist")))?;

        let linked: Option<i64> = tx
            .query_row(
                "SELECT id FROM teachers_classes WHERE teacher_id = ? AND class_id = ?",
                params![user_id, class.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to query teacher class: {e}")))?;

        if linked.is_none() {
            tx.execute(
                "INSERT INTO teachers_classes (teacher_id, class_id) VALUES (?, ?)",
                params![user_id, class.id],
            )
            .map_err(|e| Error::Database(format!("failed to insert teacher class: {e}")))?;
        }

        commit(tx)?;
        Ok(class)
    }

    fn recent_messages_sync(&self, user_id: i64, limit: usize) -> Result<Vec<Message>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, role, content, created_at
                 FROM messages
                 WHERE user_id = ?
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?",
            )
            .map_err(|e| Error::Database(format!("failed to prepare history query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id, limit as i64], row_to_message)
            .map_err(|e| Error::Database(format!("failed to execute history query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect history rows: {e}")))
    }

    fn create_new_messages_sync(&self, messages: &[NewMessage]) -> Result<Vec<Message>> {
        let mut conn = self.connection()?;
        let tx = begin(&mut conn)?;
        let mut created = Vec::with_capacity(messages.len());

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO messages (user_id, role, content, created_at) VALUES (?, ?, ?, ?)",
                )
                .map_err(|e| Error::Database(format!("failed to prepare message insert: {e}")))?;

            for message in messages {
                let created_at = Utc::now();
                stmt.execute(params![
                    message.user_id,
                    message.role.as_str(),
                    message.content,
                    format_timestamp(created_at),
                ])
                .map_err(|e| Error::Database(format!("failed to insert message: {e}")))?;

                created.push(Message {
                    id: tx.last_insert_rowid(),
                    user_id: message.user_id,
                    role: message.role,
                    content: message.content.clone(),
                    created_at,
                });
            }
        }

        commit(tx)?;
        Ok(created)
    }
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>> {
    conn.transaction()
        .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))
}

fn commit(tx: Transaction<'_>) -> Result<()> {
    tx.commit()
        .map_err(|e| Error::Database(format!("failed to commit transaction: {e}")))
}

fn find_user(conn: &Connection, wa_id: &str) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE wa_id = ?"),
        params![wa_id],
        row_to_user,
    )
    .optional()
    .map_err(|e| Error::Database(format!("failed to load user: {e}")))
}

fn find_class(conn: &Connection, subject: Subject, grade: GradeLevel) -> Result<Option<Class>> {
    conn.query_row(
        "SELECT id, subject, grade_level, status FROM classes
         WHERE subject = ? AND grade_level = ?",
        params![subject.as_str(), grade.as_str()],
        row_to_class,
    )
    .optional()
    .map_err(|e| Error::Database(format!("failed to load class: {e}")))
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let state: String = row.get(3)?;
    let selected_subject: Option<String> = row.get(6)?;
    let selected_subject = selected_subject
        .map(|s| Subject::from_str(&s).map_err(|e| conversion_error(6, e)))
        .transpose()?;
    let class_info: String = row.get(7)?;

    Ok(User {
        id: row.get(0)?,
        wa_id: row.get(1)?,
        name: row.get(2)?,
        state: UserState::from_db(&state),
        onboarding_state: decode_column(row, 4)?,
        role: decode_column(row, 5)?,
        selected_subject,
        class_info: serde_json::from_str(&class_info).unwrap_or(serde_json::Value::Null),
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
    })
}

fn row_to_class(row: &rusqlite::Row<'_>) -> rusqlite::Result<Class> {
    Ok(Class {
        id: row.get(0)?,
        subject: decode_column(row, 1)?,
        grade_level: decode_column(row, 2)?,
        status: row.get(3)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: decode_column(row, 2)?,
        content: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

/// Decode a text column into one of the shared domain enums.
pub(crate) fn decode_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion_error(idx, e))
}

fn conversion_error(idx: usize, e: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(e.to_string())),
    )
}

/// Fixed-width UTC timestamps so that text comparison orders chronologically.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(Error::Database(format!("invalid timestamp format: {raw}")))
}
