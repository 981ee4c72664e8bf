use super::error::{SchoolError, SchoolResult};
use super::model::Grade;
use super::offerings::is_active_pair;
use super::profiles::person_at;
use super::{now_timestamp, require_active, Entity};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

pub const QUARTERS: std::ops::RangeInclusive<i64> = 1..=4;

#[derive(Debug, Clone, Copy)]
pub struct GradeInput {
    pub class_id: i64,
    pub pupil_id: i64,
    pub discipline_teacher_id: i64,
    pub quarter: i64,
    pub mark: f64,
}

pub fn validate_quarter(quarter: i64) -> SchoolResult<i64> {
    if QUARTERS.contains(&quarter) {
        Ok(quarter)
    } else {
        Err(SchoolError::Validation(format!(
            "quarter must be between 1 and 4, got {}",
            quarter
        )))
    }
}

pub fn validate_mark(mark: f64) -> SchoolResult<f64> {
    if mark.is_finite() && mark >= 0.0 {
        Ok(mark)
    } else {
        Err(SchoolError::Validation(format!(
            "mark must be a non-negative number, got {}",
            mark
        )))
    }
}

const GRADE_COLUMNS: &str = "g.id, g.discipline_teacher_id, g.class_id, g.pupil_id, g.quarter, g.mark,
     g.created_at, g.updated_at, g.deleted_at";

fn map_grade(row: &Row<'_>) -> rusqlite::Result<Grade> {
    Ok(Grade {
        id: row.get(0)?,
        discipline_teacher_id: row.get(1)?,
        class_id: row.get(2)?,
        pupil_id: row.get(3)?,
        quarter: row.get(4)?,
        mark: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        deleted_at: row.get(8)?,
        pupil: None,
    })
}

fn grade_by_id(conn: &Connection, grade_id: i64) -> SchoolResult<Option<Grade>> {
    let sql = format!("SELECT {GRADE_COLUMNS} FROM grades g WHERE g.id = ?");
    Ok(conn.query_row(&sql, [grade_id], map_grade).optional()?)
}

/// Active grades of one class for one pair, with pupil names. `quarter: None`
/// returns all quarters.
pub fn list_grades(
    conn: &Connection,
    class_id: i64,
    discipline_teacher_id: i64,
    quarter: Option<i64>,
) -> SchoolResult<Vec<Grade>> {
    let mut sql = format!(
        "SELECT {GRADE_COLUMNS}, u.id, u.name, u.surname, u.patronymic
         FROM grades g
         JOIN pupils p ON p.id = g.pupil_id
         JOIN users u ON u.id = p.user_id
         WHERE g.class_id = ? AND g.discipline_teacher_id = ? AND g.deleted_at IS NULL"
    );
    let mut binds = vec![Value::Integer(class_id), Value::Integer(discipline_teacher_id)];
    if let Some(q) = quarter {
        sql.push_str(" AND g.quarter = ?");
        binds.push(Value::Integer(validate_quarter(q)?));
    }
    sql.push_str(" ORDER BY u.surname, u.name, g.quarter, g.id");

    let mut stmt = conn.prepare(&sql)?;
    let grades = stmt
        .query_map(params_from_iter(binds), |r| {
            let mut g = map_grade(r)?;
            g.pupil = Some(person_at(r, 9)?);
            Ok(g)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(grades)
}

/// Sets the mark for (pair, class, pupil, quarter). An existing active grade
/// keeps its id and creation time; the last write wins.
pub fn upsert_grade(conn: &Connection, input: &GradeInput) -> SchoolResult<Grade> {
    let quarter = validate_quarter(input.quarter)?;
    let mark = validate_mark(input.mark)?;

    let tx = conn.unchecked_transaction()?;
    require_active(&tx, Entity::Class, input.class_id)?;
    require_active(&tx, Entity::Pupil, input.pupil_id)?;
    if !is_active_pair(&tx, input.discipline_teacher_id)? {
        return Err(SchoolError::not_found(
            Entity::DisciplineTeacher.name(),
            input.discipline_teacher_id,
        ));
    }

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM grades
             WHERE discipline_teacher_id = ? AND class_id = ? AND pupil_id = ? AND quarter = ?
               AND deleted_at IS NULL",
            [
                input.discipline_teacher_id,
                input.class_id,
                input.pupil_id,
                quarter,
            ],
            |r| r.get(0),
        )
        .optional()?;
    let now = now_timestamp();
    let grade_id = match existing {
        Some(id) => {
            tx.execute(
                "UPDATE grades SET mark = ?, updated_at = ? WHERE id = ?",
                (mark, &now, id),
            )?;
            id
        }
        None => {
            tx.execute(
                "INSERT INTO grades(discipline_teacher_id, class_id, pupil_id, quarter, mark,
                                    created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    input.discipline_teacher_id,
                    input.class_id,
                    input.pupil_id,
                    quarter,
                    mark,
                    &now,
                    &now,
                ),
            )?;
            tx.last_insert_rowid()
        }
    };
    tx.commit()?;

    grade_by_id(conn, grade_id)?
        .ok_or_else(|| SchoolError::not_found(Entity::Grade.name(), grade_id))
}

pub fn soft_delete_grade(conn: &Connection, grade_id: i64) -> SchoolResult<Grade> {
    let n = conn.execute(
        "UPDATE grades SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        (now_timestamp(), grade_id),
    )?;
    if n == 0 {
        return Err(SchoolError::not_found(Entity::Grade.name(), grade_id));
    }
    grade_by_id(conn, grade_id)?
        .ok_or_else(|| SchoolError::not_found(Entity::Grade.name(), grade_id))
}
