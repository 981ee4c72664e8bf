use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Seeded sentinel: never listed, never assignable.
    SuperAdmin,
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Teacher, Role::Student];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUPER_ADMIN" | "SUPERADMIN" => Some(Role::SuperAdmin),
            "ADMIN" => Some(Role::Admin),
            "TEACHER" => Some(Role::Teacher),
            "STUDENT" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
        }
    }

    pub fn is_assignable(self) -> bool {
        match self {
            Role::SuperAdmin => false,
            Role::Admin | Role::Teacher | Role::Student => true,
        }
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let name = value.as_str()?;
        Role::parse(name).ok_or_else(|| FromSqlError::Other(format!("unknown role {:?}", name).into()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub patronymic: Option<String>,
    pub role: Role,
    pub created_at: String,
}

/// Denormalized person fields attached to teacher and pupil rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub patronymic: Option<String>,
}

impl PersonName {
    /// Case-insensitive substring match on any name part.
    pub fn matches(&self, needle_lower: &str) -> bool {
        contains_ci(&self.name, needle_lower)
            || contains_ci(&self.surname, needle_lower)
            || self
                .patronymic
                .as_deref()
                .map(|p| contains_ci(p, needle_lower))
                .unwrap_or(false)
    }
}

pub fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: i64,
    pub user_id: i64,
    pub classroom_number: Option<String>,
    pub created_at: String,
    pub user: PersonName,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pupil {
    pub id: i64,
    pub user_id: i64,
    pub class_id: Option<i64>,
    pub created_at: String,
    pub user: PersonName,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRef {
    pub id: i64,
    pub user: PersonName,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: i64,
    pub name: String,
    pub class_teacher_id: Option<i64>,
    pub teacher: Option<TeacherRef>,
    pub pupils: Vec<Pupil>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discipline {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub teachers: Vec<TeacherRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignableTeacher {
    pub id: i64,
    pub user: PersonName,
    pub classroom_number: Option<String>,
    pub assigned: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineTeacherPair {
    pub id: i64,
    pub discipline: DisciplineRef,
    pub teacher: TeacherRef,
    pub assigned: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOffering {
    pub id: i64,
    pub discipline_teacher_id: i64,
    pub class_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherOffering {
    pub discipline_teacher_id: i64,
    pub discipline: DisciplineRef,
    pub class: ClassRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: i64,
    pub discipline_teacher_id: i64,
    pub class_id: i64,
    pub pupil_id: i64,
    pub quarter: i64,
    pub mark: f64,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pupil: Option<PersonName>,
}
