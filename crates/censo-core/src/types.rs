//! Shared types used across the pipeline.
//!
//! This module defines common newtypes that provide type safety
//! and clear domain modeling.

use crate::error::CensoError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for subject identifiers with validation.
///
/// Subject IDs must be valid UUIDs (v4 format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    /// Create a new `SubjectId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is not a valid UUID v4.
    pub fn new(id: impl Into<String>) -> Result<Self, CensoError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create a new random `SubjectId` using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), CensoError> {
        static UUID_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = UUID_REGEX.get_or_init(|| {
            Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
                .expect("valid regex")
        });

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(CensoError::Validation(format!(
                "invalid subject ID: must be a valid UUID v4, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Colombian national identity number.
///
/// Cedulas are 6-10 ASCII digits. The value is immutable once a
/// validation record has been created for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cedula(String);

impl Cedula {
    /// Shortest accepted cedula.
    pub const MIN_LEN: usize = 6;
    /// Longest accepted cedula.
    pub const MAX_LEN: usize = 10;

    /// Create a new `Cedula` from a string.
    ///
    /// # Errors
    /// Returns error if the value is not 6-10 digits.
    pub fn new(value: impl Into<String>) -> Result<Self, CensoError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), CensoError> {
        if !value.chars().all(|c| c.is_ascii_digit()) || value.is_empty() {
            return Err(CensoError::Validation(
                "cedula must contain only digits".to_string(),
            ));
        }
        if value.len() < Self::MIN_LEN || value.len() > Self::MAX_LEN {
            return Err(CensoError::Validation(format!(
                "cedula must be between {} and {} digits, got {}",
                Self::MIN_LEN,
                Self::MAX_LEN,
                value.len()
            )));
        }
        Ok(())
    }
}

impl TryFrom<String> for Cedula {
    type Error = CensoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cedula> for String {
    fn from(cedula: Cedula) -> Self {
        cedula.0
    }
}

impl fmt::Display for Cedula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_id_generate() {
        let id = SubjectId::generate();
        assert!(SubjectId::new(id.as_str()).is_ok());
    }

    #[test]
    fn test_subject_id_invalid() {
        assert!(SubjectId::new("not-a-uuid").is_err());
        assert!(SubjectId::new("").is_err());
    }

    #[test]
    fn test_cedula_valid() {
        assert!(Cedula::new("123456").is_ok());
        assert!(Cedula::new("1234567890").is_ok());
    }

    #[test]
    fn test_cedula_rejects_non_digits() {
        let err = Cedula::new("12345a7").unwrap_err();
        assert!(err.to_string().contains("only digits"));
        assert!(Cedula::new("").is_err());
        assert!(Cedula::new("１２３４５６").is_err());
    }

    #[test]
    fn test_cedula_rejects_bad_length() {
        assert!(Cedula::new("12345").is_err());
        assert!(Cedula::new("12345678901").is_err());
    }

    #[test]
    fn test_cedula_serde_validates() {
        let ok: Cedula = serde_json::from_str("\"98765432\"").expect("valid cedula");
        assert_eq!(ok.as_str(), "98765432");

        let bad: Result<Cedula, _> = serde_json::from_str("\"98x\"");
        assert!(bad.is_err());
    }
}
