//! Which discipline-teacher pairs teach which class.

use super::disciplines::link_teacher;
use super::error::{SchoolError, SchoolResult};
use super::model::{
    contains_ci, ClassOffering, ClassRef, DisciplineRef, DisciplineTeacherPair, TeacherOffering,
    TeacherRef,
};
use super::profiles::person_at;
use super::{now_timestamp, require_active, search_needle, Entity};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

fn map_offering(row: &Row<'_>) -> rusqlite::Result<ClassOffering> {
    Ok(ClassOffering {
        id: row.get(0)?,
        discipline_teacher_id: row.get(1)?,
        class_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn active_offering(
    conn: &Connection,
    discipline_teacher_id: i64,
    class_id: i64,
) -> SchoolResult<Option<ClassOffering>> {
    let found = conn
        .query_row(
            "SELECT id, discipline_teacher_id, class_id, created_at FROM class_offerings
             WHERE discipline_teacher_id = ? AND class_id = ? AND deleted_at IS NULL",
            [discipline_teacher_id, class_id],
            map_offering,
        )
        .optional()?;
    Ok(found)
}

fn insert_offering(conn: &Connection, discipline_teacher_id: i64, class_id: i64) -> SchoolResult<i64> {
    conn.execute(
        "INSERT INTO class_offerings(discipline_teacher_id, class_id, created_at)
         VALUES(?, ?, ?)",
        (discipline_teacher_id, class_id, now_timestamp()),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Links the teacher to the discipline if needed and makes the pair teach the
/// class. An existing active offering is returned unchanged.
pub fn assign_discipline_to_class(
    conn: &Connection,
    class_id: i64,
    teacher_id: i64,
    discipline_id: i64,
) -> SchoolResult<ClassOffering> {
    let tx = conn.unchecked_transaction()?;
    require_active(&tx, Entity::Class, class_id)?;
    require_active(&tx, Entity::Teacher, teacher_id)?;
    require_active(&tx, Entity::Discipline, discipline_id)?;

    let pair_id = link_teacher(&tx, discipline_id, teacher_id)?;
    let offering = match active_offering(&tx, pair_id, class_id)? {
        Some(existing) => existing,
        None => {
            insert_offering(&tx, pair_id, class_id)?;
            active_offering(&tx, pair_id, class_id)?.ok_or_else(|| {
                SchoolError::InvariantViolation(format!(
                    "offering for pair {} in class {} vanished after insert",
                    pair_id, class_id
                ))
            })?
        }
    };
    tx.commit()?;
    Ok(offering)
}

/// Active pairs whose link, discipline and teacher are all active, flagged
/// with whether the class has an active offering for them. A blank or absent
/// search matches every pair.
pub fn discipline_teacher_pairs(
    conn: &Connection,
    class_id: i64,
    search: Option<&str>,
) -> SchoolResult<Vec<DisciplineTeacherPair>> {
    require_active(conn, Entity::Class, class_id)?;
    let mut stmt = conn.prepare(
        "SELECT dt.id, d.id, d.name, t.id, u.id, u.name, u.surname, u.patronymic,
                EXISTS(SELECT 1 FROM class_offerings o
                       WHERE o.discipline_teacher_id = dt.id
                         AND o.class_id = ?
                         AND o.deleted_at IS NULL)
         FROM discipline_teachers dt
         JOIN disciplines d ON d.id = dt.discipline_id
         JOIN teachers t ON t.id = dt.teacher_id
         JOIN users u ON u.id = t.user_id
         WHERE dt.deleted_at IS NULL
           AND d.deleted_at IS NULL
           AND t.deleted_at IS NULL
         ORDER BY d.name, u.surname, u.name, dt.id",
    )?;
    let pairs = stmt
        .query_map([class_id], |r| {
            Ok(DisciplineTeacherPair {
                id: r.get(0)?,
                discipline: DisciplineRef {
                    id: r.get(1)?,
                    name: r.get(2)?,
                },
                teacher: TeacherRef {
                    id: r.get(3)?,
                    user: person_at(r, 4)?,
                },
                assigned: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let Some(needle) = search.and_then(search_needle) else {
        return Ok(pairs);
    };
    Ok(pairs
        .into_iter()
        .filter(|p| contains_ci(&p.discipline.name, &needle) || p.teacher.user.matches(&needle))
        .collect())
}

/// The link, its discipline and its teacher are all active.
pub(crate) fn is_active_pair(conn: &Connection, pair_id: i64) -> SchoolResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM discipline_teachers dt
             JOIN disciplines d ON d.id = dt.discipline_id
             JOIN teachers t ON t.id = dt.teacher_id
             WHERE dt.id = ?
               AND dt.deleted_at IS NULL
               AND d.deleted_at IS NULL
               AND t.deleted_at IS NULL",
            [pair_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Replaces the class's offerings with exactly the listed pairs. Any inactive
/// pair aborts the whole replacement.
pub fn replace_class_offerings(
    conn: &Connection,
    class_id: i64,
    pair_ids: &[i64],
) -> SchoolResult<Vec<ClassOffering>> {
    let tx = conn.unchecked_transaction()?;
    require_active(&tx, Entity::Class, class_id)?;

    let dropped = tx.execute(
        "UPDATE class_offerings SET deleted_at = ? WHERE class_id = ? AND deleted_at IS NULL",
        (now_timestamp(), class_id),
    )?;
    let distinct: BTreeSet<i64> = pair_ids.iter().copied().collect();
    for &pair_id in &distinct {
        if !is_active_pair(&tx, pair_id)? {
            return Err(SchoolError::not_found(Entity::DisciplineTeacher.name(), pair_id));
        }
        insert_offering(&tx, pair_id, class_id)?;
    }
    tx.commit()?;

    log::info!(
        "class {} offerings replaced: {} previous, {} now",
        class_id,
        dropped,
        distinct.len()
    );
    class_offerings(conn, class_id)
}

pub fn class_offerings(conn: &Connection, class_id: i64) -> SchoolResult<Vec<ClassOffering>> {
    let mut stmt = conn.prepare(
        "SELECT id, discipline_teacher_id, class_id, created_at FROM class_offerings
         WHERE class_id = ? AND deleted_at IS NULL ORDER BY id",
    )?;
    let rows = stmt
        .query_map([class_id], map_offering)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Distinct (pair, class) combinations the teacher currently teaches.
pub fn disciplines_and_classes_by_teacher(
    conn: &Connection,
    teacher_id: i64,
) -> SchoolResult<Vec<TeacherOffering>> {
    require_active(conn, Entity::Teacher, teacher_id)?;
    let mut stmt = conn.prepare(
        "SELECT DISTINCT dt.id, d.id, d.name, c.id, c.name
         FROM discipline_teachers dt
         JOIN disciplines d ON d.id = dt.discipline_id
         JOIN class_offerings o ON o.discipline_teacher_id = dt.id AND o.deleted_at IS NULL
         JOIN classes c ON c.id = o.class_id AND c.deleted_at IS NULL
         WHERE dt.teacher_id = ? AND dt.deleted_at IS NULL
         ORDER BY d.name, c.name, dt.id, c.id",
    )?;
    let rows = stmt
        .query_map([teacher_id], |r| {
            Ok(TeacherOffering {
                discipline_teacher_id: r.get(0)?,
                discipline: DisciplineRef {
                    id: r.get(1)?,
                    name: r.get(2)?,
                },
                class: ClassRef {
                    id: r.get(3)?,
                    name: r.get(4)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
