//! LINE platform user identifier.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`LineUserId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LineUserIdError {
    /// The input string is empty or whitespace.
    #[error("LINE user id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("LINE user id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains characters LINE never issues.
    #[error("LINE user id contains invalid characters")]
    InvalidCharacters,
}

/// The user id issued by the LINE platform (`profile.userId`).
///
/// Opaque string, distinct from the backend's numeric [`crate::UserId`].
/// LINE issues ids of the form `U` followed by 32 hex digits, but the backend
/// and test fixtures use shorter ids, so only basic shape is enforced:
///
/// - Not empty after trimming
/// - At most 64 characters
/// - ASCII alphanumeric only
///
/// ## Examples
///
/// ```
/// use bakery_points_core::LineUserId;
///
/// assert!(LineUserId::parse("U4af4980629c2b3f1e1c7c1d5f1a0b2c3").is_ok());
/// assert!(LineUserId::parse("U1").is_ok());
/// assert!(LineUserId::parse("").is_err());
/// assert!(LineUserId::parse("U 1").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct LineUserId(String);

impl LineUserId {
    /// Maximum accepted length.
    pub const MAX_LENGTH: usize = 64;

    /// Parse a `LineUserId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, too long, or contains
    /// non-alphanumeric characters.
    pub fn parse(s: &str) -> Result<Self, LineUserIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LineUserIdError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(LineUserIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LineUserIdError::InvalidCharacters);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LineUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for LineUserId {
    type Err = LineUserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LineUserId {
    type Error = LineUserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LineUserId> for String {
    fn from(id: LineUserId) -> Self {
        id.0
    }
}

impl AsRef<str> for LineUserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        let id = LineUserId::parse("  U1234  ").unwrap();
        assert_eq!(id.as_str(), "U1234");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(LineUserId::parse("   "), Err(LineUserIdError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "U".repeat(65);
        assert!(matches!(
            LineUserId::parse(&long),
            Err(LineUserIdError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_invalid_characters() {
        assert_eq!(
            LineUserId::parse("U1/../x"),
            Err(LineUserIdError::InvalidCharacters)
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: LineUserId = serde_json::from_str("\"U1\"").unwrap();
        assert_eq!(ok.as_str(), "U1");
        assert!(serde_json::from_str::<LineUserId>("\"\"").is_err());
    }
}
