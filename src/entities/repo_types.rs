use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::entities::repo::{Entity, EntityQuery};

/// Student profile attached to a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: i64,
    pub specialization: Option<String>,
    pub study_year: Option<i32>,
    pub group_name: Option<String>,
}

/// Professor profile attached to a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProfesorInfo {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: i64,
    pub department: Option<String>,
    pub academic_title: Option<String>,
}

/// Thesis of a student, optionally with a coordinating professor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Licenta {
    #[serde(default)]
    pub id: Option<i64>,
    pub student_info_id: i64,
    pub profesor_info_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "aplicare_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AplicareStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Application of a student to a professor for a thesis topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AplicareLicenta {
    #[serde(default)]
    pub id: Option<i64>,
    pub student_info_id: i64,
    pub profesor_info_id: i64,
    pub title: String,
    pub message: Option<String>,
    #[serde(default)]
    pub status: AplicareStatus,
}

impl Entity for StudentInfo {
    const NAME: &'static str = "StudentInfo";
    const TABLE: &'static str = "student_info";
    const FIELDS: &'static [&'static str] = &["user_id", "specialization", "study_year", "group_name"];
    const OWNER_COLUMN: &'static str = "user_id";
    const OWNER_UNIQUE: Option<&'static str> = Some("ux_student_info_user");

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn with_id(self, id: i64) -> Self {
        Self { id: Some(id), ..self }
    }
    fn owner_id(&self) -> i64 {
        self.user_id
    }
    fn bind_fields<'q>(&'q self, q: EntityQuery<'q, Self>) -> EntityQuery<'q, Self> {
        q.bind(self.user_id)
            .bind(&self.specialization)
            .bind(self.study_year)
            .bind(&self.group_name)
    }
}

impl Entity for ProfesorInfo {
    const NAME: &'static str = "ProfesorInfo";
    const TABLE: &'static str = "profesor_info";
    const FIELDS: &'static [&'static str] = &["user_id", "department", "academic_title"];
    const OWNER_COLUMN: &'static str = "user_id";
    const OWNER_UNIQUE: Option<&'static str> = Some("ux_profesor_info_user");

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn with_id(self, id: i64) -> Self {
        Self { id: Some(id), ..self }
    }
    fn owner_id(&self) -> i64 {
        self.user_id
    }
    fn bind_fields<'q>(&'q self, q: EntityQuery<'q, Self>) -> EntityQuery<'q, Self> {
        q.bind(self.user_id)
            .bind(&self.department)
            .bind(&self.academic_title)
    }
}

impl Entity for Licenta {
    const NAME: &'static str = "Licenta";
    const TABLE: &'static str = "licenta";
    const FIELDS: &'static [&'static str] =
        &["student_info_id", "profesor_info_id", "title", "description"];
    const OWNER_COLUMN: &'static str = "student_info_id";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn with_id(self, id: i64) -> Self {
        Self { id: Some(id), ..self }
    }
    fn owner_id(&self) -> i64 {
        self.student_info_id
    }
    fn bind_fields<'q>(&'q self, q: EntityQuery<'q, Self>) -> EntityQuery<'q, Self> {
        q.bind(self.student_info_id)
            .bind(self.profesor_info_id)
            .bind(&self.title)
            .bind(&self.description)
    }
}

impl Entity for AplicareLicenta {
    const NAME: &'static str = "AplicareLicenta";
    const TABLE: &'static str = "aplicare_licenta";
    const FIELDS: &'static [&'static str] = &[
        "student_info_id",
        "profesor_info_id",
        "title",
        "message",
        "status",
    ];
    const OWNER_COLUMN: &'static str = "student_info_id";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn with_id(self, id: i64) -> Self {
        Self { id: Some(id), ..self }
    }
    fn owner_id(&self) -> i64 {
        self.student_info_id
    }
    fn bind_fields<'q>(&'q self, q: EntityQuery<'q, Self>) -> EntityQuery<'q, Self> {
        q.bind(self.student_info_id)
            .bind(self.profesor_info_id)
            .bind(&self.title)
            .bind(&self.message)
            .bind(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entities_deserialize_without_id() {
        let a: AplicareLicenta = serde_json::from_str(
            r#"{"studentInfoId":1,"profesorInfoId":2,"title":"Compilatoare"}"#,
        )
        .unwrap();
        assert_eq!(a.id, None);
        assert_eq!(a.status, AplicareStatus::Pending);
        assert_eq!(a.message, None);
    }

    #[test]
    fn status_uses_upper_case_names() {
        let json = serde_json::to_string(&AplicareStatus::Accepted).unwrap();
        assert_eq!(json, r#""ACCEPTED""#);
    }

    #[test]
    fn fields_list_matches_bound_columns() {
        // every field list excludes id and names the owner column
        for (fields, owner) in [
            (StudentInfo::FIELDS, StudentInfo::OWNER_COLUMN),
            (ProfesorInfo::FIELDS, ProfesorInfo::OWNER_COLUMN),
            (Licenta::FIELDS, Licenta::OWNER_COLUMN),
            (AplicareLicenta::FIELDS, AplicareLicenta::OWNER_COLUMN),
        ] {
            assert!(!fields.contains(&"id"));
            assert!(fields.contains(&owner));
        }
    }
}
