use crate::domain::model::Role;
use crate::ipc::error::HandlerErr;
use crate::ipc::params::{get_role, parse_id};
use serde_json::Value;

/// The authenticated user as vouched for by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, Copy)]
pub enum Access {
    Public,
    Roles(&'static [Role]),
}

pub const ADMIN: Access = Access::Roles(&[Role::Admin]);
pub const STAFF: Access = Access::Roles(&[Role::Admin, Role::Teacher]);

/// Reads `params.actor`. A request without one comes from the trusted host.
pub fn actor_from_params(params: &Value) -> Result<Option<Actor>, HandlerErr> {
    let Some(raw) = params.get("actor") else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(None);
    }
    let user_id = raw
        .get("userId")
        .ok_or_else(|| HandlerErr::bad_params("missing params.actor.userId"))
        .and_then(|v| parse_id(v, "actor.userId"))?;
    let role = get_role(raw, "role")?;
    Ok(Some(Actor { user_id, role }))
}

pub fn authorize(actor: Option<&Actor>, access: Access, method: &str) -> Result<(), HandlerErr> {
    let (Some(actor), Access::Roles(allowed)) = (actor, access) else {
        return Ok(());
    };
    if actor.role == Role::SuperAdmin || allowed.contains(&actor.role) {
        return Ok(());
    }
    log::warn!(
        "user {} with role {} may not call {}",
        actor.user_id,
        actor.role.as_str(),
        method
    );
    Err(HandlerErr {
        code: "forbidden",
        message: format!("role {} may not call {}", actor.role.as_str(), method),
        details: None,
    })
}
