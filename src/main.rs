mod backup;
mod config;
mod db;
mod domain;
mod ipc;

use std::io::{self, BufRead, Write};

fn main() {
    let config = config::Config::from_env();
    config::init_logging(&config);
    log::info!("schoold {} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState::default();
    if let Some(path) = &config.workspace {
        match db::open_db(path) {
            Ok(conn) => {
                log::info!("workspace opened: {}", path.to_string_lossy());
                state.workspace = Some(path.clone());
                state.db = Some(conn);
            }
            Err(e) => log::error!("failed to open workspace {}: {:#}", path.to_string_lossy(), e),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let mut input = stdin.lock();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::error!("stdin read failed: {}", e);
                break;
            }
        }

        let resp = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => match serde_json::from_str::<ipc::Request>(line) {
                Ok(req) => ipc::handle_request(&mut state, req),
                Err(e) => {
                    log::warn!("undecodable request line: {}", e);
                    bad_json(e.to_string())
                }
            },
            Err(e) => {
                log::warn!("request line is not utf-8: {}", e);
                bad_json(format!("request line is not valid utf-8: {}", e))
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    log::info!("stdin closed, exiting");
}

fn bad_json(message: String) -> serde_json::Value {
    serde_json::json!({
        "ok": false,
        "error": { "code": "bad_json", "message": message }
    })
}
