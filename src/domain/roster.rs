use super::error::{SchoolError, SchoolResult};
use super::model::{Pupil, SchoolClass, TeacherRef};
use super::profiles::{person_at, pupils_by_class};
use super::{now_timestamp, require_active, required_text, Entity};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

/// `class_teacher: Some(None)` clears the homeroom teacher.
#[derive(Debug, Clone, Default)]
pub struct ClassPatch {
    pub name: Option<String>,
    pub class_teacher: Option<Option<i64>>,
}

struct ClassRow {
    id: i64,
    name: String,
    class_teacher_id: Option<i64>,
    created_at: String,
}

/// The homeroom teacher is shown whether or not its profile is still active.
fn teacher_ref(conn: &Connection, teacher_id: i64) -> SchoolResult<Option<TeacherRef>> {
    let found = conn
        .query_row(
            "SELECT t.id, u.id, u.name, u.surname, u.patronymic
             FROM teachers t JOIN users u ON u.id = t.user_id
             WHERE t.id = ?",
            [teacher_id],
            |r| {
                Ok(TeacherRef {
                    id: r.get(0)?,
                    user: person_at(r, 1)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

fn hydrate(conn: &Connection, row: ClassRow) -> SchoolResult<SchoolClass> {
    let teacher = match row.class_teacher_id {
        Some(tid) => teacher_ref(conn, tid)?,
        None => None,
    };
    Ok(SchoolClass {
        pupils: pupils_by_class(conn, row.id)?,
        id: row.id,
        name: row.name,
        class_teacher_id: row.class_teacher_id,
        teacher,
        created_at: row.created_at,
    })
}

pub fn list_classes(conn: &Connection) -> SchoolResult<Vec<SchoolClass>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, class_teacher_id, created_at
         FROM classes WHERE deleted_at IS NULL
         ORDER BY name, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                class_teacher_id: r.get(2)?,
                created_at: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|row| hydrate(conn, row)).collect()
}

pub fn get_class(conn: &Connection, class_id: i64) -> SchoolResult<SchoolClass> {
    let row = conn
        .query_row(
            "SELECT id, name, class_teacher_id, created_at
             FROM classes WHERE id = ? AND deleted_at IS NULL",
            [class_id],
            |r| {
                Ok(ClassRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    class_teacher_id: r.get(2)?,
                    created_at: r.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| SchoolError::not_found("class", class_id))?;
    hydrate(conn, row)
}

/// The teacher id is checked only by the foreign key.
pub fn create_class(
    conn: &Connection,
    name: &str,
    class_teacher_id: Option<i64>,
) -> SchoolResult<SchoolClass> {
    let name = required_text(name, "name")?;
    conn.execute(
        "INSERT INTO classes(name, class_teacher_id, created_at) VALUES(?, ?, ?)",
        (&name, class_teacher_id, now_timestamp()),
    )?;
    let id = conn.last_insert_rowid();
    log::info!("created class {} ({})", id, name);
    get_class(conn, id)
}

pub fn update_class(conn: &Connection, class_id: i64, patch: &ClassPatch) -> SchoolResult<SchoolClass> {
    require_active(conn, Entity::Class, class_id)?;

    let mut sets: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(name) = &patch.name {
        sets.push("name = ?");
        binds.push(Value::Text(required_text(name, "name")?));
    }
    if let Some(teacher) = patch.class_teacher {
        sets.push("class_teacher_id = ?");
        binds.push(teacher.map(Value::Integer).unwrap_or(Value::Null));
    }
    if !sets.is_empty() {
        binds.push(Value::Integer(class_id));
        let sql = format!("UPDATE classes SET {} WHERE id = ?", sets.join(", "));
        conn.execute(&sql, params_from_iter(binds))?;
    }
    get_class(conn, class_id)
}

/// Members keep their `class_id`; the class simply stops being listed.
pub fn delete_class(conn: &Connection, class_id: i64) -> SchoolResult<()> {
    let n = conn.execute(
        "UPDATE classes SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        (now_timestamp(), class_id),
    )?;
    if n == 0 {
        return Err(SchoolError::not_found("class", class_id));
    }
    log::info!("soft-deleted class {}", class_id);
    Ok(())
}

/// Replaces the class roster with the listed pupils. Ids of unknown or
/// soft-deleted pupils are skipped.
pub fn assign_students_to_class(
    conn: &Connection,
    class_id: i64,
    pupil_ids: &[i64],
) -> SchoolResult<Vec<Pupil>> {
    let tx = conn.unchecked_transaction()?;
    require_active(&tx, Entity::Class, class_id)?;

    let cleared = tx.execute(
        "UPDATE pupils SET class_id = NULL WHERE class_id = ? AND deleted_at IS NULL",
        [class_id],
    )?;
    let mut assigned = 0usize;
    {
        let mut stmt =
            tx.prepare("UPDATE pupils SET class_id = ? WHERE id = ? AND deleted_at IS NULL")?;
        for pupil_id in pupil_ids {
            assigned += stmt.execute([class_id, *pupil_id])?;
        }
    }
    tx.commit()?;

    log::info!(
        "class {} roster replaced: {} cleared, {} assigned",
        class_id,
        cleared,
        assigned
    );
    pupils_by_class(conn, class_id)
}
