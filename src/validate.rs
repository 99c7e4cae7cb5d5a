use crate::error::ApiError;

pub const SHORT_TEXT: usize = 128;
pub const LONG_TEXT: usize = 1000;
pub const NAME_TEXT: usize = 150;

/// Trims `value` and checks it is non-empty and at most `max` characters.
pub fn required(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ApiError::Validation(format!("{field}: this field may not be blank")));
    }
    bounded(field, v, max)
}

/// Like [`required`] but blank is allowed.
pub fn bounded(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let v = value.trim();
    if v.chars().count() > max {
        return Err(ApiError::Validation(format!(
            "{field}: ensure this field has no more than {max} characters"
        )));
    }
    Ok(v.to_string())
}

pub fn required_opt(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, ApiError> {
    value.map(|v| required(field, v, max)).transpose()
}
