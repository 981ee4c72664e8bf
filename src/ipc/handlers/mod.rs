pub mod backup;
pub mod classes;
pub mod core;
pub mod disciplines;
pub mod grades;
pub mod students;
pub mod teachers;
pub mod users;

use crate::ipc::auth::{self, Access, Actor};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::Value;

pub type DomainHandler = fn(&Connection, &Value, Option<&Actor>) -> Result<Value, HandlerErr>;

/// Runs a workspace-bound handler after the workspace and actor checks.
pub fn dispatch(state: &AppState, req: &Request, access: Access, handler: DomainHandler) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let actor = match auth::actor_from_params(&req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = auth::authorize(actor.as_ref(), access, &req.method) {
        return e.response(&req.id);
    }
    log::debug!("dispatch {}", req.method);
    match handler(conn, &req.params, actor.as_ref()) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}
