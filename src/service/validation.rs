//! Form validation rules
//!
//! Rules run in declaration order and only the first failure is reported,
//! so a form with several problems always yields the same message.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AppError;

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid");
    static ref USERNAME: Regex =
        Regex::new(r"^[a-zA-Z0-9_-]+$").expect("username pattern is valid");
}

/// Ordered rule runner that keeps the first failure
#[derive(Debug, Default)]
pub struct Checks {
    first: Option<String>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` unless `ok` holds or an earlier rule already failed
    pub fn check(&mut self, ok: bool, message: &str) -> &mut Self {
        if !ok && self.first.is_none() {
            self.first = Some(message.to_string());
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        match self.first.take() {
            Some(message) => Err(AppError::Validation(message)),
            None => Ok(()),
        }
    }
}

/// Length in characters, not bytes
pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

pub fn is_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

pub fn is_username(value: &str) -> bool {
    USERNAME.is_match(value)
}

pub fn is_url(value: &str) -> bool {
    url::Url::parse(value).is_ok()
}

pub fn has_lowercase(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_lowercase())
}

pub fn has_uppercase(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_uppercase())
}

pub fn has_digit(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
}

/// Trimmed, lowercased email
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Treat blank form values as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Integer at the start of `value`, ignoring whatever follows it
///
/// `" 42.9 km"` reads as 42; a value with no leading digits is `None`.
pub fn leading_integer(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let digits = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    if digits == 0 {
        return None;
    }

    let end = value.len() - unsigned.len() + digits;
    value[..end].parse().ok()
}
