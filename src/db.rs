use crate::domain::model::Role;
use anyhow::{bail, Context};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "school.sqlite3";
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_VERSION_KEY: &str = "schema.version";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates missing tables and indexes and seeds reference data. Safe to run on
/// every open.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;
    if let Some(found) = settings_get_json(conn, SCHEMA_VERSION_KEY)? {
        let version = found.as_i64().unwrap_or(0);
        if version > SCHEMA_VERSION {
            bail!(
                "workspace schema version {} is newer than supported version {}",
                version,
                SCHEMA_VERSION
            );
        }
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roles(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            surname TEXT NOT NULL,
            patronymic TEXT,
            role_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            deleted_at TEXT,
            FOREIGN KEY(role_id) REFERENCES roles(id)
        )",
        [],
    )?;
    // Soft-deleted users release their email.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_users_email_active
         ON users(email) WHERE deleted_at IS NULL",
        [],
    )?;

    // One profile row per user for life: role changes restore it instead of
    // inserting a second one.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL UNIQUE,
            classroom_number TEXT,
            created_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            class_teacher_id INTEGER,
            created_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY(class_teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pupils(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL UNIQUE,
            class_id INTEGER,
            created_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pupils_class ON pupils(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS disciplines(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            deleted_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS discipline_teachers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            discipline_id INTEGER NOT NULL,
            teacher_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY(discipline_id) REFERENCES disciplines(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            UNIQUE(discipline_id, teacher_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_discipline_teachers_teacher
         ON discipline_teachers(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_offerings(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            discipline_teacher_id INTEGER NOT NULL,
            class_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY(discipline_teacher_id) REFERENCES discipline_teachers(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_class_offerings_active
         ON class_offerings(discipline_teacher_id, class_id) WHERE deleted_at IS NULL",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_offerings_class ON class_offerings(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            discipline_teacher_id INTEGER NOT NULL,
            class_id INTEGER NOT NULL,
            pupil_id INTEGER NOT NULL,
            quarter INTEGER NOT NULL,
            mark REAL NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY(discipline_teacher_id) REFERENCES discipline_teachers(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(pupil_id) REFERENCES pupils(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_grades_active
         ON grades(discipline_teacher_id, class_id, pupil_id, quarter) WHERE deleted_at IS NULL",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_class_pair
         ON grades(class_id, discipline_teacher_id)",
        [],
    )?;

    seed_roles(conn)?;
    settings_set_json(conn, SCHEMA_VERSION_KEY, &serde_json::json!(SCHEMA_VERSION))?;
    Ok(())
}

fn seed_roles(conn: &Connection) -> anyhow::Result<()> {
    for role in Role::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO roles(name) VALUES(?)",
            [role.as_str()],
        )
        .with_context(|| format!("failed to seed role {}", role.as_str()))?;
    }
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(
            serde_json::from_str(&text)
                .with_context(|| format!("setting {} is not valid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}
