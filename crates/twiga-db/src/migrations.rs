/// A versioned schema batch. Every statement is idempotent so the batch can be
/// re-applied on each open; the applied version is recorded in `_migrations`.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "users_messages_classes",
        sql: "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wa_id TEXT NOT NULL UNIQUE,
                name TEXT,
                state TEXT NOT NULL DEFAULT 'new',
                onboarding_state TEXT NOT NULL DEFAULT 'new',
                role TEXT NOT NULL DEFAULT 'teacher',
                selected_subject TEXT,
                class_info TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS ix_messages_user_created
                ON messages(user_id, created_at);

            CREATE TABLE IF NOT EXISTS classes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                grade_level TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                UNIQUE (subject, grade_level)
            );

            CREATE TABLE IF NOT EXISTS teachers_classes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                teacher_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                class_id INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
                UNIQUE (teacher_id, class_id)
            );",
    },
    Migration {
        version: 2,
        name: "resources_sections_chunks",
        sql: "CREATE TABLE IF NOT EXISTS resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                authors TEXT NOT NULL DEFAULT '[]',
                grade_levels TEXT NOT NULL DEFAULT '[]',
                subjects TEXT NOT NULL DEFAULT '[]',
                file_location TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS classes_resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                class_id INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
                resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
                UNIQUE (class_id, resource_id)
            );

            CREATE INDEX IF NOT EXISTS ix_classes_resources_class_id
                ON classes_resources(class_id);
            CREATE INDEX IF NOT EXISTS ix_classes_resources_resource_id
                ON classes_resources(resource_id);

            CREATE TABLE IF NOT EXISTS sections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
                parent_section_id INTEGER REFERENCES sections(id),
                section_index TEXT,
                section_title TEXT,
                section_type TEXT,
                section_order INTEGER NOT NULL,
                page_range TEXT,
                summary TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS ix_sections_resource_id
                ON sections(resource_id);

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'text',
                top_level_section_index TEXT,
                top_level_section_title TEXT,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS ix_chunks_resource_id
                ON chunks(resource_id);",
    },
];

pub const MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";
