//! Role profiles: a Teacher row exists and is active iff its user currently
//! holds TEACHER, and likewise Pupil for STUDENT. Profile rows are never
//! deleted or duplicated, only soft-deleted and restored.

use super::error::{SchoolError, SchoolResult};
use super::model::{PersonName, Pupil, Role, Teacher};
use super::{now_timestamp, optional_text, require_active, search_needle, Entity};
use rusqlite::{Connection, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Teacher,
    Pupil,
}

impl ProfileKind {
    const ALL: [ProfileKind; 2] = [ProfileKind::Teacher, ProfileKind::Pupil];

    /// The profile a role requires, if any.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Teacher => Some(ProfileKind::Teacher),
            Role::Student => Some(ProfileKind::Pupil),
            Role::Admin | Role::SuperAdmin => None,
        }
    }

    fn table(self) -> &'static str {
        match self {
            ProfileKind::Teacher => "teachers",
            ProfileKind::Pupil => "pupils",
        }
    }

    fn entity(self) -> &'static str {
        match self {
            ProfileKind::Teacher => "teacher",
            ProfileKind::Pupil => "pupil",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileChange {
    Created(i64),
    Restored(i64),
    Unchanged(i64),
}

/// `old_role` is None for a user being registered. Both profile kinds are
/// checked on every call, so any pair of roles is handled.
pub(crate) fn apply_role_change_in(
    conn: &Connection,
    user_id: i64,
    old_role: Option<Role>,
    new_role: Role,
) -> SchoolResult<()> {
    require_active(conn, Entity::User, user_id)?;

    let old_kind = old_role.and_then(ProfileKind::for_role);
    let new_kind = ProfileKind::for_role(new_role);
    for kind in ProfileKind::ALL {
        let had = old_kind == Some(kind);
        let has = new_kind == Some(kind);
        if has && !had {
            let change = ensure_profile(conn, kind, user_id)?;
            log::debug!("user {}: {} profile {:?}", user_id, kind.entity(), change);
        } else if had && !has {
            let n = soft_delete_profile(conn, kind, user_id)?;
            log::debug!("user {}: soft-deleted {} {} profile row(s)", user_id, n, kind.entity());
        }
    }
    Ok(())
}

fn profile_rows(
    conn: &Connection,
    kind: ProfileKind,
    user_id: i64,
) -> SchoolResult<Vec<(i64, Option<String>)>> {
    let sql = format!("SELECT id, deleted_at FROM {} WHERE user_id = ?", kind.table());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    if rows.len() > 1 {
        let msg = format!(
            "user {} has {} {} rows",
            user_id,
            rows.len(),
            kind.entity()
        );
        return Err(SchoolError::InvariantViolation(msg));
    }
    Ok(rows)
}

/// Creates the profile, restores a soft-deleted one, or leaves an active one.
fn ensure_profile(conn: &Connection, kind: ProfileKind, user_id: i64) -> SchoolResult<ProfileChange> {
    match profile_rows(conn, kind, user_id)?.first() {
        None => {
            let sql = format!(
                "INSERT INTO {}(user_id, created_at) VALUES(?, ?)",
                kind.table()
            );
            conn.execute(&sql, (user_id, now_timestamp()))?;
            Ok(ProfileChange::Created(conn.last_insert_rowid()))
        }
        Some((id, Some(_))) => {
            let sql = format!("UPDATE {} SET deleted_at = NULL WHERE id = ?", kind.table());
            conn.execute(&sql, [id])?;
            Ok(ProfileChange::Restored(*id))
        }
        Some((id, None)) => Ok(ProfileChange::Unchanged(*id)),
    }
}

fn soft_delete_profile(conn: &Connection, kind: ProfileKind, user_id: i64) -> SchoolResult<usize> {
    let sql = format!(
        "UPDATE {} SET deleted_at = ? WHERE user_id = ? AND deleted_at IS NULL",
        kind.table()
    );
    Ok(conn.execute(&sql, (now_timestamp(), user_id))?)
}

fn restore_profile(conn: &Connection, kind: ProfileKind, user_id: i64) -> SchoolResult<bool> {
    // Also surfaces a duplicated profile before touching it.
    profile_rows(conn, kind, user_id)?;
    let sql = format!(
        "UPDATE {} SET deleted_at = NULL WHERE user_id = ? AND deleted_at IS NOT NULL",
        kind.table()
    );
    Ok(conn.execute(&sql, [user_id])? > 0)
}

/// Soft-deletes the user and then any profile rows. Missing profiles are fine.
pub fn delete_user(conn: &Connection, user_id: i64) -> SchoolResult<()> {
    let tx = conn.unchecked_transaction()?;
    let n = tx.execute(
        "UPDATE users SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        (now_timestamp(), user_id),
    )?;
    if n == 0 {
        return Err(SchoolError::not_found("user", user_id));
    }
    for kind in ProfileKind::ALL {
        soft_delete_profile(&tx, kind, user_id)?;
    }
    tx.commit()?;
    log::info!("soft-deleted user {}", user_id);
    Ok(())
}

pub fn restore_teacher(conn: &Connection, user_id: i64) -> SchoolResult<bool> {
    restore_profile(conn, ProfileKind::Teacher, user_id)
}

pub fn restore_pupil(conn: &Connection, user_id: i64) -> SchoolResult<bool> {
    restore_profile(conn, ProfileKind::Pupil, user_id)
}

pub fn delete_teacher(conn: &Connection, user_id: i64) -> SchoolResult<bool> {
    Ok(soft_delete_profile(conn, ProfileKind::Teacher, user_id)? > 0)
}

pub fn delete_pupil(conn: &Connection, user_id: i64) -> SchoolResult<bool> {
    Ok(soft_delete_profile(conn, ProfileKind::Pupil, user_id)? > 0)
}

pub(crate) const TEACHER_SELECT: &str = "SELECT t.id, t.user_id, t.classroom_number, t.created_at,
            u.id, u.name, u.surname, u.patronymic
     FROM teachers t JOIN users u ON u.id = t.user_id";

pub(crate) const PUPIL_SELECT: &str = "SELECT p.id, p.user_id, p.class_id, p.created_at,
            u.id, u.name, u.surname, u.patronymic
     FROM pupils p JOIN users u ON u.id = p.user_id";

pub(crate) fn person_at(row: &Row<'_>, start: usize) -> rusqlite::Result<PersonName> {
    Ok(PersonName {
        id: row.get(start)?,
        name: row.get(start + 1)?,
        surname: row.get(start + 2)?,
        patronymic: row.get(start + 3)?,
    })
}

pub(crate) fn map_teacher(row: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: row.get(0)?,
        user_id: row.get(1)?,
        classroom_number: row.get(2)?,
        created_at: row.get(3)?,
        user: person_at(row, 4)?,
    })
}

pub(crate) fn map_pupil(row: &Row<'_>) -> rusqlite::Result<Pupil> {
    Ok(Pupil {
        id: row.get(0)?,
        user_id: row.get(1)?,
        class_id: row.get(2)?,
        created_at: row.get(3)?,
        user: person_at(row, 4)?,
    })
}

pub fn list_teachers(conn: &Connection) -> SchoolResult<Vec<Teacher>> {
    let sql = format!("{TEACHER_SELECT} WHERE t.deleted_at IS NULL ORDER BY t.id");
    let mut stmt = conn.prepare(&sql)?;
    let teachers = stmt
        .query_map([], map_teacher)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(teachers)
}

pub fn search_teachers(conn: &Connection, query: &str) -> SchoolResult<Vec<Teacher>> {
    let all = list_teachers(conn)?;
    Ok(match search_needle(query) {
        Some(needle) => all.into_iter().filter(|t| t.user.matches(&needle)).collect(),
        None => all,
    })
}

pub fn get_teacher(conn: &Connection, teacher_id: i64) -> SchoolResult<Teacher> {
    let sql = format!("{TEACHER_SELECT} WHERE t.id = ? AND t.deleted_at IS NULL");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map([teacher_id], map_teacher)?;
    match rows.next() {
        Some(t) => Ok(t?),
        None => Err(SchoolError::not_found("teacher", teacher_id)),
    }
}

pub fn set_classroom(
    conn: &Connection,
    teacher_id: i64,
    classroom_number: Option<&str>,
) -> SchoolResult<Teacher> {
    require_active(conn, Entity::Teacher, teacher_id)?;
    conn.execute(
        "UPDATE teachers SET classroom_number = ? WHERE id = ?",
        (optional_text(classroom_number), teacher_id),
    )?;
    get_teacher(conn, teacher_id)
}

pub fn list_pupils(conn: &Connection) -> SchoolResult<Vec<Pupil>> {
    let sql = format!("{PUPIL_SELECT} WHERE p.deleted_at IS NULL ORDER BY u.surname, u.name, p.id");
    let mut stmt = conn.prepare(&sql)?;
    let pupils = stmt.query_map([], map_pupil)?.collect::<Result<Vec<_>, _>>()?;
    Ok(pupils)
}

pub fn search_pupils(conn: &Connection, query: &str) -> SchoolResult<Vec<Pupil>> {
    let Some(needle) = search_needle(query) else {
        return Err(SchoolError::Validation("search query must not be empty".into()));
    };
    Ok(list_pupils(conn)?
        .into_iter()
        .filter(|p| p.user.matches(&needle))
        .collect())
}

/// Active pupils whose class is `class_id`. A soft-deleted pupil still
/// pointing at the class is not a member.
pub fn pupils_by_class(conn: &Connection, class_id: i64) -> SchoolResult<Vec<Pupil>> {
    let sql = format!(
        "{PUPIL_SELECT} WHERE p.class_id = ? AND p.deleted_at IS NULL
         ORDER BY u.surname, u.name, p.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let pupils = stmt
        .query_map([class_id], map_pupil)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pupils)
}

/// Id of the user's active profile of `kind`, if any.
pub fn active_profile_id(
    conn: &Connection,
    kind: ProfileKind,
    user_id: i64,
) -> SchoolResult<Option<i64>> {
    Ok(profile_rows(conn, kind, user_id)?
        .into_iter()
        .find(|(_, deleted)| deleted.is_none())
        .map(|(id, _)| id))
}
