use crate::backup;
use crate::db;
use crate::ipc::auth::{self, ADMIN};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn required_path(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn check_actor(req: &Request) -> Option<serde_json::Value> {
    let checked = auth::actor_from_params(&req.params)
        .and_then(|actor| auth::authorize(actor.as_ref(), ADMIN, &req.method));
    checked.err().map(|e| e.response(&req.id))
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(denied) = check_actor(req) {
        return denied;
    }
    let Some(out_path) = required_path(req, "outPath") else {
        return err(&req.id, "bad_params", "missing params.outPath", None);
    };
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match backup::export_workspace_bundle(&workspace, &PathBuf::from(&out_path)) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": out_path,
                "bundleFormat": backup::BUNDLE_FORMAT,
                "bundleId": summary.bundle_id,
                "dbSha256": summary.db_sha256,
                "entryCount": summary.entry_count,
            }),
        ),
        Err(e) => {
            log::warn!("export to {} failed: {:#}", out_path, e);
            err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            )
        }
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(denied) = check_actor(req) {
        return denied;
    }
    let Some(in_path) = required_path(req, "inPath") else {
        return err(&req.id, "bad_params", "missing params.inPath", None);
    };
    let target = required_path(req, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(target) = target else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let replaces_open = state.workspace.as_deref() == Some(target.as_path());
    if replaces_open {
        // The open handle must not outlive the file it points at.
        state.db = None;
    }

    let imported = backup::import_workspace_bundle(&PathBuf::from(&in_path), &target);
    if replaces_open {
        match db::open_db(&target) {
            Ok(conn) => state.db = Some(conn),
            Err(e) => {
                state.workspace = None;
                return err(&req.id, "db_open_failed", format!("{e:#}"), None);
            }
        }
    }

    match imported {
        Ok(summary) => ok(
            &req.id,
            json!({
                "workspacePath": target.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "bundleId": summary.bundle_id,
            }),
        ),
        Err(e) => {
            log::warn!("import from {} failed: {:#}", in_path, e);
            err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import(state, req)),
        _ => None,
    }
}
