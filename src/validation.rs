//! Unit identity validation.
//!
//! # Responsibilities
//! - Check unit names, mount paths, versions and descriptions
//!   against fixed grammars
//! - Explain each rejection with a human-readable reason
//!
//! # Design Decisions
//! - Pure, total functions: no I/O, no state
//! - Versions must be exact SemVer; range operators are rejected
//! - Names reserved by the framework are refused regardless of shape

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Names the framework keeps for itself. `aioli` is also the
/// configuration key holding application settings.
pub const RESERVED_NAMES: &[&str] = &["aioli", "aioli-core", "aioli_core"];

/// Maximum unit name length.
pub const NAME_MAX_LEN: usize = 42;

/// Maximum description length, in characters.
pub const DESCRIPTION_MAX_LEN: usize = 256;

static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+([_-][a-z0-9]+)*$").expect("name regex"));

static PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/[A-Za-z0-9_-]*$").expect("path regex"));

// 1-3: major/minor/patch, 4: pre-release, 5: build metadata
static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    )
    .expect("version regex")
});

/// Reason a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name {0} is reserved and cannot be used")]
    ReservedName(String),

    #[error("name {0} is invalid, it may contain up to 42 lowercase alphanumeric characters separated by single underscores or hyphens")]
    InvalidName(String),

    #[error("path {0} is invalid, it must start with / and contain only alphanumerics, underscores and hyphens")]
    InvalidPath(String),

    #[error("version {0} is invalid, must be an exact Semantic Versioning string")]
    InvalidVersion(String),

    #[error("description is invalid, can be at most 256 characters long")]
    InvalidDescription,
}

/// Validate a unit name.
pub fn validate_name(value: &str) -> Result<(), ValidationError> {
    if RESERVED_NAMES.contains(&value) {
        return Err(ValidationError::ReservedName(value.to_string()));
    }

    if value.len() > NAME_MAX_LEN || !NAME_REGEX.is_match(value) {
        return Err(ValidationError::InvalidName(value.to_string()));
    }

    Ok(())
}

/// Validate a unit mount path.
pub fn validate_path(value: &str) -> Result<(), ValidationError> {
    if PATH_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPath(value.to_string()))
    }
}

/// Validate an exact SemVer version string.
pub fn validate_version(value: &str) -> Result<(), ValidationError> {
    if VERSION_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidVersion(value.to_string()))
    }
}

/// Validate a unit description.
pub fn validate_description(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > DESCRIPTION_MAX_LEN {
        Err(ValidationError::InvalidDescription)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_valid() {
        for v in [
            "0.0.0",
            "1.2.3",
            "11.905.67",
            "2.0.3-beta.0",
            "2.0.3-pre-alpha.1.2",
            "2.0.3+b.1056",
            "2.0.3-pre-alpha.1.2+b.1056",
            "1.0.0-0.3.7",
            "1.0.0-x.7.z.92",
            "1.0.0-0a",
            "1.0.0+001",
        ] {
            assert!(validate_version(v).is_ok(), "{v} should be accepted");
        }
    }

    #[test]
    fn test_version_invalid() {
        for v in ["*", ">=1.2.3", "~1.2.3", "~1.2", "^0.2.4", "<2.0.0", "1.0", "1", "a.b.c", "01.2.3", "", "1.2.3-01", "1.2.3-a..b", "1.2.3+", "1.2.3-beta."] {
            assert_eq!(
                validate_version(v),
                Err(ValidationError::InvalidVersion(v.to_string())),
                "{v} should be rejected"
            );
        }
    }

    #[test]
    fn test_name_valid() {
        let longest = "x".repeat(42);
        for n in ["test", "test1-test2-test3", "test_test", "billing", longest.as_str()] {
            assert!(validate_name(n).is_ok(), "{n} should be accepted");
        }
    }

    #[test]
    fn test_name_invalid() {
        let too_long = "x".repeat(43);
        for n in [
            too_long.as_str(),
            "Test",
            "/test",
            "test^test",
            "test=test",
            "test/test",
            "test__",
            "__test",
            "test--test",
            "-test",
            "test-",
            "",
        ] {
            assert!(
                matches!(validate_name(n), Err(ValidationError::InvalidName(_))),
                "{n} should be rejected"
            );
        }
    }

    #[test]
    fn test_name_reserved() {
        for n in RESERVED_NAMES {
            assert_eq!(
                validate_name(n),
                Err(ValidationError::ReservedName(n.to_string()))
            );
        }
    }

    #[test]
    fn test_path() {
        for p in ["/", "/test", "/test123", "/test-test", "/test_test", "/Billing"] {
            assert!(validate_path(p).is_ok(), "{p} should be accepted");
        }
        for p in ["test", "\\test", "\\test\\", "test/", "/test/", "/test.test", "/a/b", "/.."] {
            assert!(validate_path(p).is_err(), "{p} should be rejected");
        }
    }

    #[test]
    fn test_description_length() {
        assert!(validate_description("Billing unit").is_ok());
        assert!(validate_description(&"a".repeat(256)).is_ok());
        assert_eq!(
            validate_description(&"a".repeat(257)),
            Err(ValidationError::InvalidDescription)
        );
    }
}
