//! School administration rules over the workspace database.
//!
//! Every operation takes the connection explicitly. Operations that issue
//! more than one write open their own transaction; the `*_in` helpers they
//! share assume the caller already holds one.

pub mod disciplines;
pub mod error;
pub mod gradebook;
pub mod identity;
pub mod model;
pub mod offerings;
pub mod profiles;
pub mod roster;

use chrono::{SecondsFormat, Utc};
use error::{SchoolError, SchoolResult};
use rusqlite::{Connection, OptionalExtension};

/// Tables whose rows carry a `deleted_at` soft-delete marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Teacher,
    Pupil,
    Class,
    Discipline,
    DisciplineTeacher,
    Grade,
}

impl Entity {
    pub fn name(self) -> &'static str {
        match self {
            Entity::User => "user",
            Entity::Teacher => "teacher",
            Entity::Pupil => "pupil",
            Entity::Class => "class",
            Entity::Discipline => "discipline",
            Entity::DisciplineTeacher => "disciplineTeacher",
            Entity::Grade => "grade",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Entity::User => "users",
            Entity::Teacher => "teachers",
            Entity::Pupil => "pupils",
            Entity::Class => "classes",
            Entity::Discipline => "disciplines",
            Entity::DisciplineTeacher => "discipline_teachers",
            Entity::Grade => "grades",
        }
    }
}

pub fn is_active(conn: &Connection, entity: Entity, id: i64) -> SchoolResult<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE id = ? AND deleted_at IS NULL",
        entity.table()
    );
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

pub fn require_active(conn: &Connection, entity: Entity, id: i64) -> SchoolResult<()> {
    if is_active(conn, entity, id)? {
        Ok(())
    } else {
        Err(SchoolError::not_found(entity.name(), id))
    }
}

/// RFC 3339 UTC with fixed millisecond precision, so stored timestamps sort
/// lexically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn normalize_timestamp(raw: &str) -> SchoolResult<String> {
    chrono::DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| {
            t.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        })
        .map_err(|e| SchoolError::Validation(format!("invalid timestamp {:?}: {}", raw, e)))
}

/// Trims and rejects empty required text.
pub fn required_text(value: &str, field: &str) -> SchoolResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(SchoolError::Validation(format!("{} must not be empty", field)));
    }
    Ok(t.to_string())
}

/// Blank optional text is stored as NULL.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Lower-cased search needle, or None when the query is blank.
pub fn search_needle(query: &str) -> Option<String> {
    let t = query.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_lowercase())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::identity::{self, NewUser};
    use super::model::{Role, User};
    use rusqlite::Connection;

    pub fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::db::init_schema(&conn).expect("init schema");
        conn
    }

    pub fn user(conn: &Connection, email: &str, role: Role) -> User {
        identity::register_user(
            conn,
            &NewUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                name: format!("Name-{}", email),
                surname: "Surname".to_string(),
                patronymic: None,
                role,
            },
        )
        .expect("register user")
    }
}
