use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::StoreError;
use crate::store::{Document, Fields};
use crate::youtube;

/// A typed view of documents in one collection.
pub trait Record: DeserializeOwned + Send + 'static {
    const COLLECTION: &'static str;

    // Timestamp field live lists are ordered by (newest first)
    const SORT_FIELD: &'static str;

    fn sort_key(&self) -> DateTime<Utc>;

    fn from_document(doc: Document) -> Result<Self, StoreError> {
        let Document { id, mut fields } = doc;
        fields.insert("id".into(), Value::String(id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|e| StoreError::Malformed {
            id,
            reason: e.to_string(),
        })
    }
}

// Strings searched by the client-side filter
pub trait Searchable {
    fn haystacks(&self) -> Vec<&str>;
}

/// Case-insensitive substring filter. An empty term keeps everything.
pub fn search<T: Searchable + Clone>(items: &[T], term: &str) -> Vec<T> {
    let term = term.trim().to_lowercase();
    items
        .iter()
        .filter(|item| {
            term.is_empty()
                || item
                    .haystacks()
                    .iter()
                    .any(|h| h.to_lowercase().contains(&term))
        })
        .cloned()
        .collect()
}

pub fn to_fields<S: Serialize>(value: &S) -> Result<Fields, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::Malformed {
            id: String::new(),
            reason: format!("expected an object, got {}", other),
        }),
        Err(e) => Err(StoreError::Malformed {
            id: String::new(),
            reason: e.to_string(),
        }),
    }
}

pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::from(at.timestamp_millis())
}

// Announcements

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub created_by_name: String,
    #[serde(default)]
    pub is_important: bool,
}

impl Record for Announcement {
    const COLLECTION: &'static str = "announcements";
    const SORT_FIELD: &'static str = "createdAt";

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Searchable for Announcement {
    fn haystacks(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.content.as_str()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnouncementDto {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_important: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnouncementDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_important: Option<bool>,
}

// Courses

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(Level::Beginner),
            "Intermediate" => Ok(Level::Intermediate),
            "Advanced" => Ok(Level::Advanced),
            other => Err(format!("unknown level: {}", other)),
        }
    }
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
        }
    }
}

pub const COURSE_CATEGORIES: [&str; 7] = [
    "Web Development",
    "Mobile Development",
    "Data Science",
    "Design",
    "Business",
    "Marketing",
    "Other",
];

pub const DEFAULT_DURATION: &str = "0:00";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub youtube_url: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default = "default_duration")]
    pub duration: String,
    pub category: String,
    pub level: Level,
    #[serde(default)]
    pub is_published: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub created_by_name: String,
}

fn default_duration() -> String {
    DEFAULT_DURATION.to_string()
}

impl Course {
    pub fn embed_url(&self) -> String {
        youtube::embed_url(&self.youtube_url)
    }
}

impl Record for Course {
    const COLLECTION: &'static str = "courses";
    const SORT_FIELD: &'static str = "createdAt";

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Searchable for Course {
    fn haystacks(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.description.as_str(), self.category.as_str()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseDto {
    pub title: String,
    pub description: String,
    pub youtube_url: String,
    pub category: String,
    pub level: Level,
    #[serde(default)]
    pub is_published: bool,
}

impl CreateCourseDto {
    // Same rules as the admin course form
    pub fn validate(&self) -> Result<(), String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Title is required".into());
        }
        let title_len = self.title.chars().count();
        if title_len < 3 {
            return Err("Title must be at least 3 characters".into());
        }
        if title_len > 100 {
            return Err("Title cannot exceed 100 characters".into());
        }

        if self.description.trim().is_empty() {
            return Err("Description is required".into());
        }
        let description_len = self.description.chars().count();
        if description_len < 10 {
            return Err("Description must be at least 10 characters".into());
        }
        if description_len > 1000 {
            return Err("Description cannot exceed 1000 characters".into());
        }

        if self.youtube_url.trim().is_empty() {
            return Err("YouTube URL is required".into());
        }
        if !youtube::is_youtube_url(&self.youtube_url) {
            return Err("Please enter a valid YouTube URL".into());
        }

        if self.category.trim().is_empty() {
            return Err("Please select a category".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

// Materials

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default = "default_file_type")]
    pub file_type: String,
    #[serde(default = "default_file_size")]
    pub file_size: String,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
}

fn default_file_type() -> String {
    "PDF".to_string()
}

fn default_file_size() -> String {
    "0 KB".to_string()
}

impl Record for Material {
    const COLLECTION: &'static str = "materials";
    const SORT_FIELD: &'static str = "uploadedAt";

    fn sort_key(&self) -> DateTime<Utc> {
        self.uploaded_at
    }
}

impl Searchable for Material {
    fn haystacks(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.course_code.as_str(), self.course_name.as_str()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMaterialDto {
    pub title: String,
    pub course_code: String,
    pub course_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMaterialDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<String>,
}

// Users

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Record for UserProfile {
    const COLLECTION: &'static str = "users";
    const SORT_FIELD: &'static str = "createdAt";

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Searchable for UserProfile {
    fn haystacks(&self) -> Vec<&str> {
        let mut out = vec![self.email.as_str()];
        if let Some(name) = &self.display_name {
            out.push(name);
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProfileDto {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(id: &str, value: Value) -> Document {
        match value {
            Value::Object(fields) => Document::new(id, fields),
            _ => unreachable!(),
        }
    }

    fn course_dto() -> CreateCourseDto {
        CreateCourseDto {
            title: "Intro to Rust".into(),
            description: "Ownership, borrowing and lifetimes".into(),
            youtube_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
            category: COURSE_CATEGORIES[0].into(),
            level: Level::Beginner,
            is_published: true,
        }
    }

    #[test]
    fn material_fills_in_defaults() {
        let doc = document("m1", json!({"title": "Week 1", "uploadedAt": 1_700_000_000_000i64}));
        let material = Material::from_document(doc).unwrap();

        assert_eq!(material.id, "m1");
        assert_eq!(material.file_type, "PDF");
        assert_eq!(material.file_size, "0 KB");
        assert_eq!(material.uploaded_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn malformed_document_names_its_id() {
        let doc = document("c9", json!({"title": "no other fields"}));
        let err = Course::from_document(doc).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { ref id, .. } if id == "c9"));
    }

    #[test]
    fn update_dto_only_carries_present_fields() {
        let patch = to_fields(&UpdateCourseDto {
            is_published: Some(false),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(patch.len(), 1);
        assert_eq!(patch["isPublished"], false);
    }

    #[test]
    fn course_validation_follows_form_rules() {
        assert!(course_dto().validate().is_ok());

        let mut dto = course_dto();
        dto.title = "ab".into();
        assert_eq!(dto.validate().unwrap_err(), "Title must be at least 3 characters");

        let mut dto = course_dto();
        dto.description = "short".into();
        assert_eq!(
            dto.validate().unwrap_err(),
            "Description must be at least 10 characters"
        );

        let mut dto = course_dto();
        dto.youtube_url = "https://vimeo.com/1".into();
        assert_eq!(dto.validate().unwrap_err(), "Please enter a valid YouTube URL");

        let mut dto = course_dto();
        dto.category = String::new();
        assert_eq!(dto.validate().unwrap_err(), "Please select a category");
    }

    #[test]
    fn search_is_case_insensitive_over_all_haystacks() {
        let now = Utc::now();
        let user = |id: &str, email: &str, name: Option<&str>| UserProfile {
            id: id.into(),
            email: email.into(),
            display_name: name.map(Into::into),
            role: Role::User,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let users = vec![
            user("1", "ada@uni.edu", Some("Ada Lovelace")),
            user("2", "alan@uni.edu", None),
        ];

        assert_eq!(search(&users, "LOVE").len(), 1);
        assert_eq!(search(&users, "uni.edu").len(), 2);
        assert_eq!(search(&users, "  ").len(), 2);
        assert!(search(&users, "grace").is_empty());
    }
}
