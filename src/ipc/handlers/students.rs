use crate::domain::profiles;
use crate::ipc::auth::{Access, Actor, ADMIN, STAFF};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{dispatch, DomainHandler};
use crate::ipc::params::{get_id, get_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn students_list(conn: &Connection, _: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    Ok(json!({ "pupils": profiles::list_pupils(conn)? }))
}

fn students_search(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let q = get_str(params, "q")?;
    Ok(json!({ "pupils": profiles::search_pupils(conn, &q)? }))
}

fn students_by_class(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    Ok(json!({ "pupils": profiles::pupils_by_class(conn, class_id)? }))
}

fn students_delete(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let user_id = get_id(params, "userId")?;
    let changed = profiles::delete_pupil(conn, user_id)?;
    Ok(json!({ "userId": user_id, "deleted": changed }))
}

fn students_restore(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let user_id = get_id(params, "userId")?;
    let restored = profiles::restore_pupil(conn, user_id)?;
    Ok(json!({ "userId": user_id, "restored": restored }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (access, handler): (Access, DomainHandler) = match req.method.as_str() {
        "students.list" => (STAFF, students_list),
        "students.search" => (STAFF, students_search),
        "students.byClass" => (STAFF, students_by_class),
        "students.delete" => (ADMIN, students_delete),
        "students.restore" => (ADMIN, students_restore),
        _ => return None,
    };
    Some(dispatch(state, req, access, handler))
}
