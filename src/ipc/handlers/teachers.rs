use crate::domain::profiles;
use crate::ipc::auth::{Access, Actor, ADMIN, STAFF};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{dispatch, DomainHandler};
use crate::ipc::params::{get_id, get_nullable_str, get_opt_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn teachers_list(conn: &Connection, _: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    Ok(json!({ "teachers": profiles::list_teachers(conn)? }))
}

fn teachers_search(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let q = get_opt_str(params, "q")?.unwrap_or_default();
    Ok(json!({ "teachers": profiles::search_teachers(conn, &q)? }))
}

fn teachers_delete(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let user_id = get_id(params, "userId")?;
    let changed = profiles::delete_teacher(conn, user_id)?;
    Ok(json!({ "userId": user_id, "deleted": changed }))
}

fn teachers_restore(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let user_id = get_id(params, "userId")?;
    let restored = profiles::restore_teacher(conn, user_id)?;
    Ok(json!({ "userId": user_id, "restored": restored }))
}

fn teachers_set_classroom(
    conn: &Connection,
    params: &Value,
    _: Option<&Actor>,
) -> Result<Value, HandlerErr> {
    let teacher_id = get_id(params, "teacherId")?;
    let classroom = get_nullable_str(params, "classroomNumber")?
        .ok_or_else(|| HandlerErr::bad_params("missing params.classroomNumber"))?;
    let teacher = profiles::set_classroom(conn, teacher_id, classroom.as_deref())?;
    Ok(json!({ "teacher": teacher }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (access, handler): (Access, DomainHandler) = match req.method.as_str() {
        "teachers.list" => (STAFF, teachers_list),
        "teachers.search" => (STAFF, teachers_search),
        "teachers.delete" => (ADMIN, teachers_delete),
        "teachers.restore" => (ADMIN, teachers_restore),
        "teachers.setClassroom" => (ADMIN, teachers_set_classroom),
        _ => return None,
    };
    Some(dispatch(state, req, access, handler))
}
