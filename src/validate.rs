use std::sync::LazyLock;

use regex::Regex;

use crate::catalog;
use crate::error::{AppError, FieldError, Result};
use crate::models::{ListingDraft, PostType, ProfileUpdate, UserProfile, WorkType};

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 120;
pub const DESCRIPTION_MAX: usize = 5000;
pub const COMMENT_MAX: usize = 2000;
pub const PASSWORD_MIN: usize = 8;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

// Optional leading +, then digits with spaces or dashes, 7-15 digits overall.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{5,18}[0-9]$").expect("phone pattern is valid"));

/// A draft that passed validation, with the enums resolved.
#[derive(Debug, Clone)]
pub struct ValidListing {
    pub post_type: PostType,
    pub title: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub country: String,
    pub city: Option<String>,
    pub salary: Option<String>,
    pub work_type: WorkType,
    pub description: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}

pub fn is_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

pub fn is_phone(value: &str) -> bool {
    let value = value.trim();
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    PHONE_RE.is_match(value) && (7..=15).contains(&digits)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

pub fn listing(draft: &ListingDraft) -> Result<ValidListing> {
    let mut errors = Vec::new();

    let title = draft.title.trim().to_string();
    let title_len = title.chars().count();
    if title_len < TITLE_MIN {
        errors.push(FieldError::new("title", format!("at least {TITLE_MIN} characters")));
    } else if title_len > TITLE_MAX {
        errors.push(FieldError::new("title", format!("at most {TITLE_MAX} characters")));
    }

    let description = draft.description.trim().to_string();
    if description.is_empty() {
        errors.push(FieldError::new("description", "required"));
    } else if description.chars().count() > DESCRIPTION_MAX {
        errors.push(FieldError::new(
            "description",
            format!("at most {DESCRIPTION_MAX} characters"),
        ));
    }

    if draft.post_type.is_none() {
        errors.push(FieldError::new("post_type", "required"));
    }
    if draft.work_type.is_none() {
        errors.push(FieldError::new("work_type", "required"));
    }

    let country_code = draft.country.trim().to_uppercase();
    let country = catalog::country(&country_code);
    if country.is_none() {
        errors.push(FieldError::new("country", format!("unknown country '{}'", draft.country)));
    }

    let mut city = None;
    if let (Some(country), Some(input)) = (country, non_empty(draft.city.as_deref())) {
        match country.city(&input) {
            Some(found) => city = Some(found.id.to_string()),
            None => errors.push(FieldError::new(
                "city",
                format!("'{input}' is not a city in {}", country.name_en),
            )),
        }
    }

    let category_id = non_empty(draft.category_id.as_deref()).map(|c| c.to_lowercase());
    if let Some(id) = category_id.as_deref() {
        if catalog::category(id).is_none() {
            errors.push(FieldError::new("category_id", format!("unknown category '{id}'")));
        }
    }
    let category_name = non_empty(draft.category_name.as_deref());

    let contact_phone = non_empty(draft.contact_phone.as_deref());
    let contact_email = non_empty(draft.contact_email.as_deref());
    if contact_phone.is_none() && contact_email.is_none() {
        errors.push(FieldError::new("contact", "a phone number or email is required"));
    }
    if let Some(phone) = contact_phone.as_deref() {
        if !is_phone(phone) {
            errors.push(FieldError::new("contact_phone", "invalid phone number"));
        }
    }
    if let Some(email) = contact_email.as_deref() {
        if !is_email(email) {
            errors.push(FieldError::new("contact_email", "invalid email"));
        }
    }

    match (draft.post_type, draft.work_type, errors.is_empty()) {
        (Some(post_type), Some(work_type), true) => Ok(ValidListing {
            post_type,
            title,
            category_id,
            category_name,
            country: country_code,
            city,
            salary: non_empty(draft.salary.as_deref()),
            work_type,
            description,
            contact_phone,
            contact_email,
        }),
        _ => Err(AppError::Validation(errors)),
    }
}

pub fn sign_up(email: &str, password: &str, display_name: &str) -> Result<()> {
    let mut errors = Vec::new();
    if !is_email(email) {
        errors.push(FieldError::new("email", "invalid email"));
    }
    if password.chars().count() < PASSWORD_MIN {
        errors.push(FieldError::new("password", format!("at least {PASSWORD_MIN} characters")));
    }
    if display_name.trim().is_empty() {
        errors.push(FieldError::new("display_name", "required"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Check `update` against the stored profile it applies to. Returns the update
/// with the city resolved to its catalog id.
pub fn profile_update(update: &ProfileUpdate, current: &UserProfile) -> Result<ProfileUpdate> {
    let mut errors = Vec::new();
    let mut normalized = update.clone();
    if let Some(name) = &update.display_name {
        if name.trim().is_empty() {
            errors.push(FieldError::new("display_name", "required"));
        }
    }
    if let Some(phone) = update.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        if !is_phone(phone) {
            errors.push(FieldError::new("phone", "invalid phone number"));
        }
    }
    let country = match update.country.as_deref().map(str::trim) {
        Some("") => None,
        Some(code) => {
            let found = catalog::country(code);
            if found.is_none() {
                errors.push(FieldError::new("country", format!("unknown country '{code}'")));
            }
            found
        }
        None => current.country.as_deref().and_then(catalog::country),
    };
    let country_known = update.country.as_deref().is_none_or(|c| c.trim().is_empty()) || country.is_some();

    // A city given now, or the stored one when only the country changes.
    let city = match update.city.as_deref().map(str::trim) {
        Some("") => None,
        Some(city) => Some(city),
        None if update.country.is_some() => current.city.as_deref(),
        None => None,
    };
    if let Some(city) = city.filter(|_| country_known) {
        match country {
            Some(country) => match country.city(city) {
                Some(found) if update.city.is_some() => normalized.city = Some(found.id.to_string()),
                Some(_) => {}
                None => errors.push(FieldError::new(
                    "city",
                    format!("'{city}' is not a city in {}", country.name_en),
                )),
            },
            None => errors.push(FieldError::new("city", "a city needs a country")),
        }
    }
    if let Some(id) = update.category_id.as_deref().filter(|c| !c.trim().is_empty()) {
        if catalog::category(id.trim()).is_none() {
            errors.push(FieldError::new("category_id", format!("unknown category '{id}'")));
        }
    }
    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn comment_text(text: &str) -> Result<String> {
    let text = text.trim();
    let len = text.chars().count();
    if len == 0 {
        return Err(AppError::Validation(vec![FieldError::new("text", "required")]));
    }
    if len > COMMENT_MAX {
        return Err(AppError::Validation(vec![FieldError::new(
            "text",
            format!("at most {COMMENT_MAX} characters"),
        )]));
    }
    Ok(text.to_string())
}
