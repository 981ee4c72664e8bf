use crate::domain::gradebook::{self, GradeInput};
use crate::domain::{offerings, profiles};
use crate::ipc::auth::{Access, Actor, STAFF};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{dispatch, DomainHandler};
use crate::ipc::params::{get_f64, get_i64, get_id, get_opt_i64};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn grades_list(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    let pair_id = get_id(params, "disciplineTeacherId")?;
    let quarter = get_opt_i64(params, "quarter")?;
    Ok(json!({ "grades": gradebook::list_grades(conn, class_id, pair_id, quarter)? }))
}

fn grades_upsert(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let input = GradeInput {
        class_id: get_id(params, "classId")?,
        pupil_id: get_id(params, "pupilId")?,
        discipline_teacher_id: get_id(params, "disciplineTeacherId")?,
        quarter: gradebook::validate_quarter(get_i64(params, "quarter")?)?,
        mark: gradebook::validate_mark(get_f64(params, "mark")?)?,
    };
    let grade = gradebook::upsert_grade(conn, &input)?;
    Ok(json!({ "grade": grade }))
}

fn grades_delete(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let grade = gradebook::soft_delete_grade(conn, get_id(params, "gradeId")?)?;
    Ok(json!({ "grade": grade }))
}

fn grades_teacher_offerings(
    conn: &Connection,
    params: &Value,
    _: Option<&Actor>,
) -> Result<Value, HandlerErr> {
    let teacher_id = get_id(params, "teacherId")?;
    let taught = offerings::disciplines_and_classes_by_teacher(conn, teacher_id)?;
    Ok(json!({ "offerings": taught }))
}

fn grades_pupils(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    Ok(json!({ "pupils": profiles::pupils_by_class(conn, class_id)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (access, handler): (Access, DomainHandler) = match req.method.as_str() {
        "grades.list" => (STAFF, grades_list),
        "grades.upsert" => (STAFF, grades_upsert),
        "grades.delete" => (STAFF, grades_delete),
        "grades.teacherOfferings" => (STAFF, grades_teacher_offerings),
        "grades.pupils" => (STAFF, grades_pupils),
        _ => return None,
    };
    Some(dispatch(state, req, access, handler))
}
