use thiserror::Error;

use crate::models::Locale;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database not initialized, run 'souq init' first")]
    NotInitialized,

    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    #[error("invalid input: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("not signed in or session expired")]
    Unauthorized,

    #[error("user {user_id} may not modify {entity} {id}")]
    Forbidden {
        user_id: i64,
        entity: &'static str,
        id: i64,
    },

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("an account already exists for {0}")]
    EmailTaken(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Generic toast-style message shown to end users. Details stay in the logs.
    pub fn user_message(&self, locale: Locale) -> String {
        match (self, locale) {
            (AppError::Validation(errors), Locale::Ar) => {
                format!("يرجى تصحيح الحقول التالية: {}", field_list(errors))
            }
            (AppError::Validation(errors), Locale::En) => {
                format!("Please correct the following fields: {}", field_list(errors))
            }
            (AppError::NotFound { .. }, Locale::Ar) => "العنصر المطلوب غير موجود".to_string(),
            (AppError::NotFound { .. }, Locale::En) => "The requested item was not found".to_string(),
            (AppError::Unauthorized, Locale::Ar) => "يرجى تسجيل الدخول أولاً".to_string(),
            (AppError::Unauthorized, Locale::En) => "Please sign in first".to_string(),
            (AppError::Forbidden { .. }, Locale::Ar) => "لا تملك صلاحية تعديل هذا العنصر".to_string(),
            (AppError::Forbidden { .. }, Locale::En) => {
                "You are not allowed to modify this item".to_string()
            }
            (AppError::InvalidCredentials, Locale::Ar) => {
                "البريد الإلكتروني أو كلمة المرور غير صحيحة".to_string()
            }
            (AppError::InvalidCredentials, Locale::En) => "Invalid email or password".to_string(),
            (AppError::EmailTaken(_), Locale::Ar) => "هذا البريد الإلكتروني مسجل مسبقاً".to_string(),
            (AppError::EmailTaken(_), Locale::En) => "This email is already registered".to_string(),
            (AppError::NotInitialized, Locale::Ar) => "الخدمة غير جاهزة بعد".to_string(),
            (AppError::NotInitialized, Locale::En) => "The service is not set up yet".to_string(),
            (AppError::Storage(_) | AppError::Io(_) | AppError::PasswordHash(_), Locale::Ar) => {
                "حدث خطأ، يرجى المحاولة مرة أخرى".to_string()
            }
            (AppError::Storage(_) | AppError::Io(_) | AppError::PasswordHash(_), Locale::En) => {
                "Something went wrong, please try again".to_string()
            }
        }
    }
}

fn field_list(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.field)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_get_generic_message() {
        let err = AppError::Storage(rusqlite::Error::InvalidQuery);
        assert_eq!(
            err.user_message(Locale::En),
            "Something went wrong, please try again"
        );
        assert!(!err.user_message(Locale::Ar).contains("storage"));
    }

    #[test]
    fn validation_message_lists_fields() {
        let err = AppError::Validation(vec![
            FieldError::new("title", "too short"),
            FieldError::new("contact", "missing"),
        ]);
        assert_eq!(err.to_string(), "invalid input: title: too short; contact: missing");
        assert!(err.user_message(Locale::En).ends_with("title, contact"));
    }
}
