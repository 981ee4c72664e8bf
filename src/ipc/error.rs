use crate::domain::error::SchoolError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<SchoolError> for HandlerErr {
    fn from(e: SchoolError) -> Self {
        let details = match &e {
            SchoolError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            SchoolError::MissingReference(_) => Some(json!({ "entity": "reference" })),
            SchoolError::InvariantViolation(_) => {
                log::error!("{}", e);
                None
            }
            SchoolError::Storage(_) => {
                log::warn!("{}", e);
                None
            }
            SchoolError::Conflict(_) | SchoolError::Validation(_) => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}
