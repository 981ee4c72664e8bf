use super::error::{SchoolError, SchoolResult};
use super::model::{AssignableTeacher, Discipline, TeacherRef};
use super::profiles::{list_teachers, person_at};
use super::{now_timestamp, optional_text, require_active, required_text, search_needle, Entity};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;

/// Active links of the discipline to active teachers.
fn linked_teachers(conn: &Connection, discipline_id: i64) -> SchoolResult<Vec<TeacherRef>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, u.id, u.name, u.surname, u.patronymic
         FROM discipline_teachers dt
         JOIN teachers t ON t.id = dt.teacher_id
         JOIN users u ON u.id = t.user_id
         WHERE dt.discipline_id = ?
           AND dt.deleted_at IS NULL
           AND t.deleted_at IS NULL
         ORDER BY u.surname, u.name, t.id",
    )?;
    let teachers = stmt
        .query_map([discipline_id], |r| {
            Ok(TeacherRef {
                id: r.get(0)?,
                user: person_at(r, 1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(teachers)
}

pub fn list_disciplines(conn: &Connection) -> SchoolResult<Vec<Discipline>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, created_at
         FROM disciplines WHERE deleted_at IS NULL ORDER BY name, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, name, description, created_at) in rows {
        out.push(Discipline {
            teachers: linked_teachers(conn, id)?,
            id,
            name,
            description,
            created_at,
        });
    }
    Ok(out)
}

pub fn get_discipline(conn: &Connection, discipline_id: i64) -> SchoolResult<Discipline> {
    let row = conn
        .query_row(
            "SELECT name, description, created_at
             FROM disciplines WHERE id = ? AND deleted_at IS NULL",
            [discipline_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((name, description, created_at)) = row else {
        return Err(SchoolError::not_found("discipline", discipline_id));
    };
    Ok(Discipline {
        id: discipline_id,
        name,
        description,
        created_at,
        teachers: linked_teachers(conn, discipline_id)?,
    })
}

pub fn create_discipline(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> SchoolResult<Discipline> {
    let name = required_text(name, "name")?;
    conn.execute(
        "INSERT INTO disciplines(name, description, created_at) VALUES(?, ?, ?)",
        (&name, optional_text(description), now_timestamp()),
    )?;
    let id = conn.last_insert_rowid();
    log::info!("created discipline {} ({})", id, name);
    get_discipline(conn, id)
}

pub fn delete_discipline(conn: &Connection, discipline_id: i64) -> SchoolResult<()> {
    let n = conn.execute(
        "UPDATE disciplines SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        (now_timestamp(), discipline_id),
    )?;
    if n == 0 {
        return Err(SchoolError::not_found("discipline", discipline_id));
    }
    log::info!("soft-deleted discipline {}", discipline_id);
    Ok(())
}

pub fn teachers_by_discipline(conn: &Connection, discipline_id: i64) -> SchoolResult<Vec<TeacherRef>> {
    require_active(conn, Entity::Discipline, discipline_id)?;
    linked_teachers(conn, discipline_id)
}

/// Every active teacher matching `query`, flagged with whether it is linked
/// to the discipline. A blank query matches everyone.
pub fn search_teachers_by_discipline(
    conn: &Connection,
    discipline_id: i64,
    query: &str,
) -> SchoolResult<Vec<AssignableTeacher>> {
    require_active(conn, Entity::Discipline, discipline_id)?;
    let linked: HashSet<i64> = linked_teachers(conn, discipline_id)?
        .into_iter()
        .map(|t| t.id)
        .collect();
    let needle = search_needle(query);

    Ok(list_teachers(conn)?
        .into_iter()
        .filter(|t| needle.as_deref().map(|n| t.user.matches(n)).unwrap_or(true))
        .map(|t| AssignableTeacher {
            assigned: linked.contains(&t.id),
            id: t.id,
            user: t.user,
            classroom_number: t.classroom_number,
        })
        .collect())
}

/// Finds, restores or creates the (discipline, teacher) link and returns its
/// id. A link row is never duplicated, so a restored link keeps its id.
pub(crate) fn link_teacher(conn: &Connection, discipline_id: i64, teacher_id: i64) -> SchoolResult<i64> {
    let existing: Option<(i64, Option<String>)> = conn
        .query_row(
            "SELECT id, deleted_at FROM discipline_teachers
             WHERE discipline_id = ? AND teacher_id = ?",
            [discipline_id, teacher_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    match existing {
        Some((id, None)) => Ok(id),
        Some((id, Some(_))) => {
            conn.execute(
                "UPDATE discipline_teachers SET deleted_at = NULL WHERE id = ?",
                [id],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO discipline_teachers(discipline_id, teacher_id, created_at)
                 VALUES(?, ?, ?)",
                (discipline_id, teacher_id, now_timestamp()),
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

/// Replaces the discipline's teacher set. Any inactive teacher id aborts the
/// whole replacement.
pub fn assign_teachers_to_discipline(
    conn: &Connection,
    discipline_id: i64,
    teacher_ids: &[i64],
) -> SchoolResult<Vec<TeacherRef>> {
    let tx = conn.unchecked_transaction()?;
    require_active(&tx, Entity::Discipline, discipline_id)?;

    let dropped = tx.execute(
        "UPDATE discipline_teachers SET deleted_at = ?
         WHERE discipline_id = ? AND deleted_at IS NULL",
        (now_timestamp(), discipline_id),
    )?;
    let mut linked = HashSet::new();
    for &teacher_id in teacher_ids {
        require_active(&tx, Entity::Teacher, teacher_id)?;
        linked.insert(link_teacher(&tx, discipline_id, teacher_id)?);
    }
    tx.commit()?;

    log::info!(
        "discipline {} teachers replaced: {} previous, {} now",
        discipline_id,
        dropped,
        linked.len()
    );
    linked_teachers(conn, discipline_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Role;
    use crate::domain::profiles::{self, ProfileKind};
    use crate::domain::testing;

    fn teacher(conn: &Connection, email: &str) -> i64 {
        let u = testing::user(conn, email, Role::Teacher);
        profiles::active_profile_id(conn, ProfileKind::Teacher, u.id)
            .expect("query")
            .expect("teacher")
    }

    fn link_ids(conn: &Connection, discipline_id: i64) -> Vec<(i64, i64, bool)> {
        let mut stmt = conn
            .prepare(
                "SELECT id, teacher_id, deleted_at IS NULL FROM discipline_teachers
                 WHERE discipline_id = ? ORDER BY id",
            )
            .expect("prepare");
        let rows = stmt
            .query_map([discipline_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("rows");
        rows
    }

    #[test]
    fn reassigning_a_teacher_restores_the_original_link() {
        let conn = testing::conn();
        let math = create_discipline(&conn, "Math", None).expect("discipline");
        let t1 = teacher(&conn, "t1@school.ru");
        let t2 = teacher(&conn, "t2@school.ru");

        assign_teachers_to_discipline(&conn, math.id, &[t1, t2]).expect("first");
        let before = link_ids(&conn, math.id);
        let t1_link = before[0].0;

        assign_teachers_to_discipline(&conn, math.id, &[t2]).expect("second");
        let after = assign_teachers_to_discipline(&conn, math.id, &[t1, t2]).expect("third");
        assert_eq!(after.len(), 2);

        let rows = link_ids(&conn, math.id);
        assert_eq!(rows.len(), 2, "no duplicate link rows");
        assert_eq!(rows[0], (t1_link, t1, true));
    }

    #[test]
    fn unknown_teacher_rolls_back_the_whole_replacement() {
        let conn = testing::conn();
        let d = create_discipline(&conn, "Physics", Some("  ")).expect("discipline");
        assert_eq!(d.description, None);
        let t1 = teacher(&conn, "t1@school.ru");
        assign_teachers_to_discipline(&conn, d.id, &[t1]).expect("first");

        let e = assign_teachers_to_discipline(&conn, d.id, &[t1, 999]).expect_err("bad id");
        assert!(matches!(e, SchoolError::NotFound { entity: "teacher", id: 999 }));
        let linked = teachers_by_discipline(&conn, d.id).expect("linked");
        assert_eq!(linked.iter().map(|t| t.id).collect::<Vec<_>>(), vec![t1]);
    }

    #[test]
    fn search_flags_assigned_teachers() {
        let conn = testing::conn();
        let d = create_discipline(&conn, "History", None).expect("discipline");
        let t1 = teacher(&conn, "alpha@school.ru");
        let t2 = teacher(&conn, "beta@school.ru");
        assign_teachers_to_discipline(&conn, d.id, &[t2]).expect("assign");

        let all = search_teachers_by_discipline(&conn, d.id, "").expect("all");
        let flags: Vec<(i64, bool)> = all.iter().map(|t| (t.id, t.assigned)).collect();
        assert!(flags.contains(&(t1, false)));
        assert!(flags.contains(&(t2, true)));

        let beta = search_teachers_by_discipline(&conn, d.id, "BETA").expect("beta");
        assert_eq!(beta.len(), 1);
        assert!(beta[0].assigned);

        delete_discipline(&conn, d.id).expect("delete");
        assert!(matches!(
            teachers_by_discipline(&conn, d.id),
            Err(SchoolError::NotFound { entity: "discipline", .. })
        ));
    }
}
