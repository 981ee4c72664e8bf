//! Typed access to request params. Every failure is `bad_params` naming the
//! offending key.

use crate::domain::model::Role;
use crate::ipc::error::HandlerErr;
use serde_json::{Map, Value};

/// Ids arrive as JSON integers or decimal strings and must be positive.
pub fn parse_id(v: &Value, key: &str) -> Result<i64, HandlerErr> {
    let n = match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n > 0 => Ok(n),
        _ => Err(HandlerErr::bad_params(format!(
            "{} must be a positive integer",
            key
        ))),
    }
}

pub fn get_id(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing params.{}", key)))?;
    parse_id(v, key)
}

/// Absent or null both mean "no id".
pub fn get_opt_id(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_id(v, key).map(Some),
    }
}

/// Absent = untouched (None), null = cleared (Some(None)).
pub fn get_nullable_id(params: &Value, key: &str) -> Result<Option<Option<i64>>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => parse_id(v, key).map(|id| Some(Some(id))),
    }
}

pub fn get_id_list(params: &Value, key: &str) -> Result<Vec<i64>, HandlerErr> {
    let arr = params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params(format!("params.{} must be an array", key)))?;
    arr.iter()
        .enumerate()
        .map(|(i, v)| parse_id(v, &format!("{}[{}]", key, i)))
        .collect()
}

pub fn get_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing params.{}", key)))
}

pub fn get_opt_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_nullable_str(params: &Value, key: &str) -> Result<Option<Option<String>>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => Ok(Some(Some(s.clone()))),
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be a string or null",
            key
        ))),
    }
}

pub fn parse_role(v: &Value, key: &str) -> Result<Role, HandlerErr> {
    v.as_str()
        .and_then(Role::parse)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a known role", key)))
}

pub fn get_role(params: &Value, key: &str) -> Result<Role, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing params.{}", key)))?;
    parse_role(v, key)
}

pub fn get_opt_role(params: &Value, key: &str) -> Result<Option<Role>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_role(v, key).map(Some),
    }
}

pub fn get_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key)))
}

pub fn get_opt_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => get_i64(params, key).map(Some),
    }
}

pub fn get_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))
}

pub fn get_object<'a>(params: &'a Value, key: &str) -> Result<&'a Map<String, Value>, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("params.{} must be an object", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_accept_integers_and_numeric_strings_only() {
        let p = json!({ "a": 7, "b": " 12 ", "c": 0, "d": "x1", "e": 1.5, "f": -3 });
        assert_eq!(get_id(&p, "a").expect("int"), 7);
        assert_eq!(get_id(&p, "b").expect("string"), 12);
        for key in ["c", "d", "e", "f", "missing"] {
            let e = get_id(&p, key).expect_err(key);
            assert_eq!(e.code, "bad_params");
        }
    }

    #[test]
    fn nullable_ids_distinguish_absent_from_null() {
        let p = json!({ "t": null, "u": "4" });
        assert_eq!(get_nullable_id(&p, "t").expect("null"), Some(None));
        assert_eq!(get_nullable_id(&p, "u").expect("set"), Some(Some(4)));
        assert_eq!(get_nullable_id(&p, "v").expect("absent"), None);
    }

    #[test]
    fn id_list_names_the_bad_element() {
        let p = json!({ "ids": [1, "2", "three"] });
        let e = get_id_list(&p, "ids").expect_err("bad element");
        assert!(e.message.contains("ids[2]"), "{}", e.message);
        assert_eq!(get_id_list(&json!({ "ids": [] }), "ids").expect("empty"), Vec::<i64>::new());
    }
}
