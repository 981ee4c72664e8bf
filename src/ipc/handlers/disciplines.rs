use crate::domain::disciplines;
use crate::ipc::auth::{Access, Actor, ADMIN, STAFF};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{dispatch, DomainHandler};
use crate::ipc::params::{get_id, get_id_list, get_opt_str, get_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn disciplines_list(conn: &Connection, _: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    Ok(json!({ "disciplines": disciplines::list_disciplines(conn)? }))
}

fn disciplines_create(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let name = get_str(params, "name")?;
    let description = get_opt_str(params, "description")?;
    let discipline = disciplines::create_discipline(conn, &name, description.as_deref())?;
    Ok(json!({ "discipline": discipline }))
}

fn disciplines_delete(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let discipline_id = get_id(params, "disciplineId")?;
    disciplines::delete_discipline(conn, discipline_id)?;
    Ok(json!({ "disciplineId": discipline_id, "deleted": true }))
}

fn teachers_list(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let discipline_id = get_id(params, "disciplineId")?;
    Ok(json!({ "teachers": disciplines::teachers_by_discipline(conn, discipline_id)? }))
}

fn teachers_search(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let discipline_id = get_id(params, "disciplineId")?;
    let search = get_opt_str(params, "search")?.unwrap_or_default();
    let teachers = disciplines::search_teachers_by_discipline(conn, discipline_id, &search)?;
    Ok(json!({ "teachers": teachers }))
}

fn teachers_assign(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let discipline_id = get_id(params, "disciplineId")?;
    let teacher_ids = get_id_list(params, "teacherIds")?;
    let teachers = disciplines::assign_teachers_to_discipline(conn, discipline_id, &teacher_ids)?;
    Ok(json!({ "teachers": teachers }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (access, handler): (Access, DomainHandler) = match req.method.as_str() {
        "disciplines.list" => (STAFF, disciplines_list),
        "disciplines.create" => (ADMIN, disciplines_create),
        "disciplines.delete" => (ADMIN, disciplines_delete),
        "disciplines.teachers.list" => (STAFF, teachers_list),
        "disciplines.teachers.search" => (STAFF, teachers_search),
        "disciplines.teachers.assign" => (ADMIN, teachers_assign),
        _ => return None,
    };
    Some(dispatch(state, req, access, handler))
}
