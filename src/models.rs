use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseKindError {
    kind: &'static str,
    value: String,
}

/// Whether the poster is an employer looking for a worker or a worker looking for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    SeekingWorker,
    SeekingJob,
}

impl PostType {
    pub fn as_str(self) -> &'static str {
        match self {
            PostType::SeekingWorker => "seeking_worker",
            PostType::SeekingJob => "seeking_job",
        }
    }

    pub fn label(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (PostType::SeekingWorker, Locale::Ar) => "مطلوب موظف",
            (PostType::SeekingWorker, Locale::En) => "Hiring",
            (PostType::SeekingJob, Locale::Ar) => "باحث عن عمل",
            (PostType::SeekingJob, Locale::En) => "Looking for work",
        }
    }
}

impl FromStr for PostType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "seeking_worker" | "hiring" | "worker" => Ok(PostType::SeekingWorker),
            "seeking_job" | "job" => Ok(PostType::SeekingJob),
            _ => Err(ParseKindError {
                kind: "post type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    FullTime,
    PartTime,
    Remote,
    Freelance,
    Contract,
}

impl WorkType {
    pub const ALL: [WorkType; 5] = [
        WorkType::FullTime,
        WorkType::PartTime,
        WorkType::Remote,
        WorkType::Freelance,
        WorkType::Contract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkType::FullTime => "full_time",
            WorkType::PartTime => "part_time",
            WorkType::Remote => "remote",
            WorkType::Freelance => "freelance",
            WorkType::Contract => "contract",
        }
    }

    pub fn label(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (WorkType::FullTime, Locale::Ar) => "دوام كامل",
            (WorkType::FullTime, Locale::En) => "Full time",
            (WorkType::PartTime, Locale::Ar) => "دوام جزئي",
            (WorkType::PartTime, Locale::En) => "Part time",
            (WorkType::Remote, Locale::Ar) => "عن بعد",
            (WorkType::Remote, Locale::En) => "Remote",
            (WorkType::Freelance, Locale::Ar) => "عمل حر",
            (WorkType::Freelance, Locale::En) => "Freelance",
            (WorkType::Contract, Locale::Ar) => "عقد مؤقت",
            (WorkType::Contract, Locale::En) => "Contract",
        }
    }
}

impl FromStr for WorkType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        WorkType::ALL
            .into_iter()
            .find(|w| w.as_str() == normalized)
            .ok_or_else(|| ParseKindError {
                kind: "work type",
                value: s.to_string(),
            })
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ParseKindError| FromSqlError::Other(Box::new(e)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

sql_text_enum!(PostType);
sql_text_enum!(WorkType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ar,
    En,
}

impl FromStr for Locale {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ar" | "arabic" => Ok(Locale::Ar),
            "en" | "english" => Ok(Locale::En),
            _ => Err(ParseKindError {
                kind: "locale",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub slug: String,
    pub post_type: PostType,
    pub title: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>, // free text when not in the catalog
    pub country: String,
    pub city: Option<String>,
    pub salary: Option<String>,
    pub work_type: WorkType,
    pub description: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub owner_id: i64,
    pub like_count: i64,
    pub rating: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// User-submitted listing fields, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingDraft {
    pub post_type: Option<PostType>,
    pub title: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub country: String,
    pub city: Option<String>,
    pub salary: Option<String>,
    pub work_type: Option<WorkType>,
    pub description: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub user_id: i64,
    pub listing_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub listing_id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub text: String,
    pub parent_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub category_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Editable profile fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub created_at: String,
    pub expires_at: String,
}
