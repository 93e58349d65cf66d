//! Input validation for values typed at the console or read from the config file.

use crate::settings::{OneWireAddress, MAX_HOST_NAME_LEN, MAX_TOPIC_LEN};

/// Password bounds shared by `c.pass` and the `set-password` subcommand.
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("topic must not contain MQTT wildcards (+ or #)")]
    Wildcard,

    #[error("topic contains control characters")]
    ControlCharacters,

    #[error("topic must not contain empty levels")]
    EmptyLevel,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HostNameError {
    #[error("host name cannot be empty")]
    Empty,

    #[error("host name is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("host name may only contain letters, digits and '-'")]
    InvalidCharacters,

    #[error("host name cannot start or end with '-'")]
    EdgeHyphen,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password too short (min {})", MIN_PASSWORD_LEN)]
    TooShort,

    #[error("password too long (max {})", MAX_PASSWORD_LEN)]
    TooLong,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid sensor address '{0}' - expected 8 hex bytes, e.g. 28:FF:64:1E:04:16:03:5C")]
pub struct AddressError(pub String);

/// Validate an MQTT publish topic. An empty topic is allowed and means "unset".
pub fn validate_topic(topic: &str) -> Result<&str, TopicError> {
    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong { max: MAX_TOPIC_LEN });
    }
    if topic.contains(['+', '#']) {
        return Err(TopicError::Wildcard);
    }
    if topic.chars().any(|c| c.is_control()) {
        return Err(TopicError::ControlCharacters);
    }
    if !topic.is_empty() && topic.split('/').any(|level| level.is_empty()) {
        return Err(TopicError::EmptyLevel);
    }
    Ok(topic)
}

/// Validate a single MQTT value name (one topic level).
pub fn validate_value_name(name: &str, max: usize) -> Result<&str, TopicError> {
    if name.len() > max {
        return Err(TopicError::TooLong { max });
    }
    if name.contains('/') {
        return Err(TopicError::EmptyLevel);
    }
    validate_topic(name)
}

/// Host names follow RFC 1123 labels: `[A-Za-z0-9-]`, no leading/trailing hyphen.
pub fn validate_host_name(name: &str) -> Result<&str, HostNameError> {
    if name.is_empty() {
        return Err(HostNameError::Empty);
    }
    if name.len() > MAX_HOST_NAME_LEN {
        return Err(HostNameError::TooLong {
            max: MAX_HOST_NAME_LEN,
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(HostNameError::InvalidCharacters);
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(HostNameError::EdgeHyphen);
    }
    Ok(name)
}

pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort);
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(PasswordError::TooLong);
    }
    Ok(())
}

/// Parse a 1-Wire address written as 8 hex bytes separated by `:`, `-` or spaces.
pub fn parse_address(text: &str) -> Result<OneWireAddress, AddressError> {
    let parts: Vec<&str> = text
        .split(|c: char| c == ':' || c == '-' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 8 {
        return Err(AddressError(text.to_string()));
    }
    let mut out = [0u8; 8];
    for (slot, part) in out.iter_mut().zip(parts) {
        if part.len() > 2 {
            return Err(AddressError(text.to_string()));
        }
        *slot = u8::from_str_radix(part, 16).map_err(|_| AddressError(text.to_string()))?;
    }
    Ok(OneWireAddress(out))
}
