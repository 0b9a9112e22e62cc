//! Phone number normalization for templated messaging.
//!
//! Destinations are accepted in local or international notation and reduced to
//! the digits-only international form the messaging API expects
//! (`60123456789`, never `+60 12-345 6789` or `0123456789`).

use thiserror::Error;

/// E.164 allows at most 15 digits including the country code.
const MAX_DIGITS: usize = 15;
const MIN_DIGITS: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,

    #[error("phone number contains invalid character '{0}'")]
    InvalidCharacter(char),

    #[error("phone number has {0} digits, expected 8-15")]
    InvalidLength(usize),
}

/// Normalizes destinations against a default country calling code.
#[derive(Debug, Clone)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl PhoneNormalizer {
    pub fn new(country_code: impl Into<String>) -> Self {
        let country_code: String = country_code.into();
        Self {
            country_code: country_code.trim_start_matches('+').to_string(),
        }
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Normalize `raw` to international digits-only form.
    ///
    /// - `+<digits>` and `00<digits>` are taken as already international
    /// - a leading trunk `0` is replaced by the default country code
    /// - digits already starting with the country code are kept
    /// - anything else is prefixed with the country code
    pub fn normalize(&self, raw: &str) -> Result<String, PhoneError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PhoneError::Empty);
        }

        let (international, rest) = match trimmed.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let mut digits = String::with_capacity(rest.len());
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '(' | ')' | '.' => {}
                other => return Err(PhoneError::InvalidCharacter(other)),
            }
        }

        if digits.is_empty() {
            return Err(PhoneError::Empty);
        }

        let normalized = if international {
            digits
        } else if let Some(stripped) = digits.strip_prefix("00") {
            stripped.to_string()
        } else if let Some(national) = digits.strip_prefix('0') {
            format!("{}{}", self.country_code, national)
        } else if digits.starts_with(&self.country_code) {
            digits
        } else {
            format!("{}{}", self.country_code, digits)
        };

        if !(MIN_DIGITS..=MAX_DIGITS).contains(&normalized.len()) {
            return Err(PhoneError::InvalidLength(normalized.len()));
        }

        Ok(normalized)
    }
}
