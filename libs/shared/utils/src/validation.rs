// Client-side input checks. Every failure here is a `MalformedInput` and is
// raised before any network call.

use regex::Regex;

use shared_models::error::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MIN_NAME_LENGTH: usize = 2;
const MAX_EMAIL_LENGTH: usize = 254;

pub fn is_valid_email(email: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .map(|re| re.is_match(email))
        .unwrap_or(false)
        && email.len() <= MAX_EMAIL_LENGTH
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if is_valid_email(email.trim()) {
        Ok(())
    } else {
        Err(AppError::ValidationError("Invalid email address".to_string()))
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_name(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().chars().count() < MIN_NAME_LENGTH {
        return Err(AppError::ValidationError(format!(
            "{} must be at least {} characters",
            field, MIN_NAME_LENGTH
        )));
    }
    Ok(())
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    Ok(())
}
