// Domain types and validation - pure, no database access
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_ABOUT_CHARS: usize = 255;
pub const MAX_POST_CHARS: usize = 2000;
pub const MAX_COMMENT_CHARS: usize = 500;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_PASSWORD_CHARS: usize = 128;

/// A single field-tagged validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All validation failures for one record. Nothing is persisted when non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Registration input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        // Checked in the form it is stored and looked up in
        if !is_valid_email(&normalize_email(&self.email)) {
            errors.add("email", "is invalid");
        }
        let password_len = self.password.chars().count();
        if password_len < MIN_PASSWORD_CHARS {
            errors.add("password", "is too short (minimum is 6 characters)");
        } else if password_len > MAX_PASSWORD_CHARS {
            errors.add("password", "is too long (maximum is 128 characters)");
        }
        validate_names(&mut errors, &self.firstname, &self.lastname);
        errors.into_result()
    }
}

/// Editable profile fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub firstname: String,
    pub lastname: String,
    #[serde(default)]
    pub about: String,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validate_names(&mut errors, &self.firstname, &self.lastname);
        if self.about.chars().count() > MAX_ABOUT_CHARS {
            errors.add("about", "is too long (maximum is 255 characters)");
        }
        errors.into_result()
    }
}

/// Profile fields handed over by an external identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedProfile {
    pub provider: String,
    pub uid: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub image_url: Option<String>,
}

fn validate_names(errors: &mut ValidationErrors, firstname: &str, lastname: &str) {
    if firstname.trim().is_empty() {
        errors.add("firstname", "can't be blank");
    }
    if lastname.trim().is_empty() {
        errors.add("lastname", "can't be blank");
    }
}

/// One `@`, something on both sides, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trim a post or comment body and check it against `max` characters.
pub fn clean_body(field: &str, body: &str, max: usize) -> Result<String, ValidationErrors> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ValidationErrors::single(field, "can't be blank"));
    }
    if body.chars().count() > max {
        return Err(ValidationErrors::single(
            field,
            &format!("is too long (maximum is {} characters)", max),
        ));
    }
    Ok(body.to_string())
}

/// Relationship between the viewer and another user, read from the viewer's own edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    None,
    PendingOutgoing,
    PendingIncoming,
    Accepted,
}

impl FriendshipStatus {
    pub fn from_edge(viewer_id: &str, requested_by_id: &str, accepted: bool) -> Self {
        if accepted {
            FriendshipStatus::Accepted
        } else if requested_by_id == viewer_id {
            FriendshipStatus::PendingOutgoing
        } else {
            FriendshipStatus::PendingIncoming
        }
    }
}
