use crate::domain::identity::{self, NewUser, UserFilter, UserPatch};
use crate::domain::model::User;
use crate::domain::profiles::{self, ProfileKind};
use crate::ipc::auth::{Access, Actor, ADMIN};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::dispatch;
use crate::ipc::params::{
    get_id, get_nullable_str, get_object, get_opt_role, get_opt_str, get_role, get_str,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

/// The user plus the ids of its active teacher and pupil profiles.
fn user_view(conn: &Connection, user: User) -> Result<Value, HandlerErr> {
    let teacher_id = profiles::active_profile_id(conn, ProfileKind::Teacher, user.id)?;
    let pupil_id = profiles::active_profile_id(conn, ProfileKind::Pupil, user.id)?;
    Ok(json!({ "user": user, "teacherId": teacher_id, "pupilId": pupil_id }))
}

fn users_register(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let new = NewUser {
        email: get_str(params, "email")?,
        password_hash: get_str(params, "passwordHash")?,
        name: get_str(params, "name")?,
        surname: get_str(params, "surname")?,
        patronymic: get_opt_str(params, "patronymic")?,
        role: get_role(params, "role")?,
    };
    let user = identity::register_user(conn, &new)?;
    user_view(conn, user)
}

fn users_me(conn: &Connection, _: &Value, actor: Option<&Actor>) -> Result<Value, HandlerErr> {
    let actor = actor.ok_or_else(|| HandlerErr::bad_params("missing params.actor"))?;
    let user = identity::get_user(conn, actor.user_id)?;
    user_view(conn, user)
}

fn users_get(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let user = identity::get_user(conn, get_id(params, "userId")?)?;
    user_view(conn, user)
}

fn users_list(conn: &Connection, _: &Value, actor: Option<&Actor>) -> Result<Value, HandlerErr> {
    let users = identity::list_users(conn, actor.map(|a| a.user_id))?;
    Ok(json!({ "users": users }))
}

fn users_search(conn: &Connection, params: &Value, actor: Option<&Actor>) -> Result<Value, HandlerErr> {
    let q = get_str(params, "q")?;
    let users = identity::search_users(conn, &q, actor.map(|a| a.user_id))?;
    Ok(json!({ "users": users }))
}

fn users_filter(conn: &Connection, params: &Value, actor: Option<&Actor>) -> Result<Value, HandlerErr> {
    let filter = match get_opt_role(params, "role")? {
        Some(role) => UserFilter::Role(role),
        None => match (get_opt_str(params, "from")?, get_opt_str(params, "to")?) {
            (Some(from), Some(to)) => UserFilter::CreatedBetween { from, to },
            _ => {
                return Err(HandlerErr::bad_params(
                    "filter needs params.role or both params.from and params.to",
                ))
            }
        },
    };
    let users = identity::filter_users(conn, &filter, actor.map(|a| a.user_id))?;
    Ok(json!({ "users": users }))
}

fn users_update(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let user_id = get_id(params, "userId")?;
    let raw = Value::Object(get_object(params, "patch")?.clone());
    let patch = UserPatch {
        name: get_opt_str(&raw, "name")?,
        surname: get_opt_str(&raw, "surname")?,
        patronymic: get_nullable_str(&raw, "patronymic")?,
        email: get_opt_str(&raw, "email")?,
        role: get_opt_role(&raw, "role")?,
    };
    let user = identity::update_user(conn, user_id, &patch)?;
    user_view(conn, user)
}

fn users_delete(conn: &Connection, params: &Value, _: Option<&Actor>) -> Result<Value, HandlerErr> {
    let user_id = get_id(params, "userId")?;
    profiles::delete_user(conn, user_id)?;
    Ok(json!({ "userId": user_id, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (access, handler): (Access, super::DomainHandler) = match req.method.as_str() {
        "users.register" => (ADMIN, users_register),
        "users.me" => (Access::Public, users_me),
        "users.get" => (ADMIN, users_get),
        "users.list" => (ADMIN, users_list),
        "users.search" => (ADMIN, users_search),
        "users.filter" => (ADMIN, users_filter),
        "users.update" => (ADMIN, users_update),
        "users.delete" => (ADMIN, users_delete),
        _ => return None,
    };
    Some(dispatch(state, req, access, handler))
}
