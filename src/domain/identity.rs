use super::error::{SchoolError, SchoolResult};
use super::model::{PersonName, Role, User};
use super::{normalize_timestamp, now_timestamp, optional_text, profiles, required_text, search_needle};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    /// Opaque; hashing happens before the request reaches this process.
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub patronymic: Option<String>,
    pub role: Role,
}

/// Absent fields are left untouched. `patronymic: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub patronymic: Option<Option<String>>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone)]
pub enum UserFilter {
    Role(Role),
    /// Inclusive RFC 3339 bounds.
    CreatedBetween { from: String, to: String },
}

const USER_COLUMNS: &str =
    "u.id, u.email, u.name, u.surname, u.patronymic, r.name, u.created_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        surname: row.get(3)?,
        patronymic: row.get(4)?,
        role: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn normalize_email(raw: &str) -> SchoolResult<String> {
    let email = required_text(raw, "email")?.to_lowercase();
    if !email.contains('@') {
        return Err(SchoolError::Validation(format!("invalid email: {}", email)));
    }
    Ok(email)
}

fn require_assignable(role: Role) -> SchoolResult<()> {
    if role.is_assignable() {
        Ok(())
    } else {
        Err(SchoolError::Validation(format!(
            "role {} cannot be assigned",
            role.as_str()
        )))
    }
}

pub(crate) fn role_id(conn: &Connection, role: Role) -> SchoolResult<i64> {
    conn.query_row("SELECT id FROM roles WHERE name = ?", [role.as_str()], |r| {
        r.get(0)
    })
    .optional()?
    .ok_or_else(|| SchoolError::InvariantViolation(format!("role {} is not seeded", role.as_str())))
}

fn email_taken(conn: &Connection, email: &str, except_user: Option<i64>) -> SchoolResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM users
             WHERE email = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR id <> ?2)",
            (email, except_user),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn register_user(conn: &Connection, new: &NewUser) -> SchoolResult<User> {
    let email = normalize_email(&new.email)?;
    let name = required_text(&new.name, "name")?;
    let surname = required_text(&new.surname, "surname")?;
    let patronymic = optional_text(new.patronymic.as_deref());
    if new.password_hash.trim().is_empty() {
        return Err(SchoolError::Validation("passwordHash must not be empty".into()));
    }
    require_assignable(new.role)?;

    let tx = conn.unchecked_transaction()?;
    if email_taken(&tx, &email, None)? {
        return Err(SchoolError::Conflict("user already exists".into()));
    }
    let role_id = role_id(&tx, new.role)?;
    tx.execute(
        "INSERT INTO users(email, password_hash, name, surname, patronymic, role_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &email,
            &new.password_hash,
            &name,
            &surname,
            &patronymic,
            role_id,
            now_timestamp(),
        ),
    )?;
    let user_id = tx.last_insert_rowid();
    profiles::apply_role_change_in(&tx, user_id, None, new.role)?;
    tx.commit()?;

    log::info!("registered user {} as {}", user_id, new.role.as_str());
    get_user(conn, user_id)
}

pub fn get_user(conn: &Connection, user_id: i64) -> SchoolResult<User> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id
         WHERE u.id = ? AND u.deleted_at IS NULL"
    );
    conn.query_row(&sql, [user_id], map_user)
        .optional()?
        .ok_or_else(|| SchoolError::not_found("user", user_id))
}

/// Role of an active user.
pub(crate) fn current_role(conn: &Connection, user_id: i64) -> SchoolResult<Role> {
    conn.query_row(
        "SELECT r.name FROM users u JOIN roles r ON r.id = u.role_id
         WHERE u.id = ? AND u.deleted_at IS NULL",
        [user_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| SchoolError::not_found("user", user_id))
}

fn query_users(
    conn: &Connection,
    extra_where: &str,
    exclude_user: Option<i64>,
    extra_binds: Vec<Value>,
) -> SchoolResult<Vec<User>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id
         WHERE u.deleted_at IS NULL
           AND r.name <> '{}'
           AND (?1 IS NULL OR u.id <> ?1)
           {extra_where}
         ORDER BY u.created_at DESC, u.id DESC",
        Role::SuperAdmin.as_str()
    );
    let mut binds = vec![exclude_user.map(Value::Integer).unwrap_or(Value::Null)];
    binds.extend(extra_binds);
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params_from_iter(binds), map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn list_users(conn: &Connection, exclude_user: Option<i64>) -> SchoolResult<Vec<User>> {
    query_users(conn, "", exclude_user, Vec::new())
}

pub fn search_users(
    conn: &Connection,
    query: &str,
    exclude_user: Option<i64>,
) -> SchoolResult<Vec<User>> {
    let Some(needle) = search_needle(query) else {
        return Err(SchoolError::Validation("search query must not be empty".into()));
    };
    // Filtering happens here rather than with LIKE so Cyrillic names compare
    // case-insensitively.
    Ok(list_users(conn, exclude_user)?
        .into_iter()
        .filter(|u| {
            PersonName {
                id: u.id,
                name: u.name.clone(),
                surname: u.surname.clone(),
                patronymic: u.patronymic.clone(),
            }
            .matches(&needle)
        })
        .collect())
}

pub fn filter_users(
    conn: &Connection,
    filter: &UserFilter,
    exclude_user: Option<i64>,
) -> SchoolResult<Vec<User>> {
    match filter {
        UserFilter::Role(role) => query_users(
            conn,
            "AND r.name = ?2",
            exclude_user,
            vec![Value::Text(role.as_str().to_string())],
        ),
        UserFilter::CreatedBetween { from, to } => {
            let from = normalize_timestamp(from)?;
            let to = normalize_timestamp(to)?;
            if from > to {
                return Err(SchoolError::Validation("from must not be after to".into()));
            }
            query_users(
                conn,
                "AND u.created_at >= ?2 AND u.created_at <= ?3",
                exclude_user,
                vec![Value::Text(from), Value::Text(to)],
            )
        }
    }
}

/// Applies a partial update. A role change runs the profile transition in the
/// same transaction, so a failure leaves the user exactly as it was.
pub fn update_user(conn: &Connection, user_id: i64, patch: &UserPatch) -> SchoolResult<User> {
    let tx = conn.unchecked_transaction()?;
    let old_role = current_role(&tx, user_id)?;

    let mut sets: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();

    if let Some(name) = &patch.name {
        sets.push("name = ?");
        binds.push(Value::Text(required_text(name, "name")?));
    }
    if let Some(surname) = &patch.surname {
        sets.push("surname = ?");
        binds.push(Value::Text(required_text(surname, "surname")?));
    }
    if let Some(patronymic) = &patch.patronymic {
        sets.push("patronymic = ?");
        binds.push(
            optional_text(patronymic.as_deref())
                .map(Value::Text)
                .unwrap_or(Value::Null),
        );
    }
    if let Some(new_role) = patch.role {
        require_assignable(new_role)?;
        if new_role != old_role {
            profiles::apply_role_change_in(&tx, user_id, Some(old_role), new_role)?;
            sets.push("role_id = ?");
            binds.push(Value::Integer(role_id(&tx, new_role)?));
        }
    }
    if let Some(email) = &patch.email {
        let email = normalize_email(email)?;
        if email_taken(&tx, &email, Some(user_id))? {
            return Err(SchoolError::Conflict("email is already registered".into()));
        }
        sets.push("email = ?");
        binds.push(Value::Text(email));
    }

    if !sets.is_empty() {
        sets.push("updated_at = ?");
        binds.push(Value::Text(now_timestamp()));
        binds.push(Value::Integer(user_id));
        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        tx.execute(&sql, params_from_iter(binds))?;
    }
    tx.commit()?;
    get_user(conn, user_id)
}
