use crate::domain::offerings;
use crate::domain::roster::{self, ClassPatch};
use crate::ipc::auth::{Access, Actor, ADMIN, STAFF};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{dispatch, DomainHandler};
use crate::ipc::params::{get_id, get_id_list, get_nullable_id, get_object, get_opt_id, get_opt_str, get_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn classes_list(conn: &Connection, _: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    Ok(json!({ "classes": roster::list_classes(conn)? }))
}

fn classes_get(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class = roster::get_class(conn, get_id(params, "classId")?)?;
    Ok(json!({ "class": class }))
}

fn classes_create(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let name = get_str(params, "name")?;
    let class_teacher = get_opt_id(params, "classTeacher")?;
    let class = roster::create_class(conn, &name, class_teacher)?;
    Ok(json!({ "class": class }))
}

fn classes_update(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    let raw = Value::Object(get_object(params, "patch")?.clone());
    let patch = ClassPatch {
        name: get_opt_str(&raw, "name")?,
        class_teacher: get_nullable_id(&raw, "classTeacher")?,
    };
    let class = roster::update_class(conn, class_id, &patch)?;
    Ok(json!({ "class": class }))
}

fn classes_delete(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    roster::delete_class(conn, class_id)?;
    Ok(json!({ "classId": class_id, "deleted": true }))
}

fn classes_assign_students(
    conn: &Connection,
    params: &Value,
    _: Option<&Actor>,
) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    let pupil_ids = get_id_list(params, "pupilIds")?;
    let pupils = roster::assign_students_to_class(conn, class_id, &pupil_ids)?;
    Ok(json!({ "pupils": pupils }))
}

fn classes_assign_discipline(
    conn: &Connection,
    params: &Value,
    _: Option<&Actor>,
) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    let teacher_id = get_id(params, "teacherId")?;
    let discipline_id = get_id(params, "disciplineId")?;
    let offering = offerings::assign_discipline_to_class(conn, class_id, teacher_id, discipline_id)?;
    Ok(json!({ "offering": offering }))
}

fn pairs_list(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    Ok(json!({ "pairs": offerings::discipline_teacher_pairs(conn, class_id, None)? }))
}

fn pairs_search(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    let search = get_opt_str(params, "search")?;
    let pairs = offerings::discipline_teacher_pairs(conn, class_id, search.as_deref())?;
    Ok(json!({ "pairs": pairs }))
}

fn pairs_replace(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let class_id = get_id(params, "classId")?;
    let pair_ids = get_id_list(params, "pairs")?;
    let current = offerings::replace_class_offerings(conn, class_id, &pair_ids)?;
    Ok(json!({ "offerings": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (access, handler): (Access, DomainHandler) = match req.method.as_str() {
        "classes.list" => (STAFF, classes_list),
        "classes.get" => (STAFF, classes_get),
        "classes.create" => (ADMIN, classes_create),
        "classes.update" => (ADMIN, classes_update),
        "classes.delete" => (ADMIN, classes_delete),
        "classes.assignStudents" => (STAFF, classes_assign_students),
        "classes.assignDiscipline" => (ADMIN, classes_assign_discipline),
        "classes.disciplineTeachers.list" => (STAFF, pairs_list),
        "classes.disciplineTeachers.search" => (STAFF, pairs_search),
        "classes.disciplineTeachers.replace" => (ADMIN, pairs_replace),
        _ => return None,
    };
    Some(dispatch(state, req, access, handler))
}
