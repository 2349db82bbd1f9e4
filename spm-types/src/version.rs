//! Semantic versions.

use crate::Error;

/// A semantic version as defined by semver 2.0.
///
/// Package versions, installed versions and the base-OS compatibility
/// version all use this type. Ordering follows semver precedence rules.
pub type Version = semver::Version;

/// Parses a [`Version`] from a string, strictly following semver 2.0.
///
/// ## Examples
/// ```
/// use spm_types::parse_version;
///
/// assert!(parse_version("1.2.0").is_ok());
/// assert!(parse_version("1.2.0-rc.1+build5").is_ok());
/// assert!(parse_version("1.2").is_err());
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] if `input` is not a valid semver 2.0
/// version.
pub fn parse_version(input: &str) -> Result<Version, Error> {
    input.parse().map_err(|source| Error::InvalidVersion {
        version: input.to_string(),
        source,
    })
}

/// Parses a [`Version`], allowing the abbreviated numeric forms `X` and
/// `X.Y` by taking missing components as zero.
///
/// Constraint expressions and platform version files commonly abbreviate
/// versions (`>=2.0`, compatibility version `1`); standalone package
/// versions should use [`parse_version`] instead.
///
/// ## Examples
/// ```
/// use spm_types::{parse_version, parse_version_lenient};
///
/// assert_eq!(
///     parse_version_lenient("2.0").unwrap(),
///     parse_version("2.0.0").unwrap()
/// );
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] if `input` is neither a semver 2.0
/// version nor an abbreviated numeric form.
pub fn parse_version_lenient(input: &str) -> Result<Version, Error> {
    match parse_version(input) {
        Ok(version) => Ok(version),
        Err(error) => {
            let numeric = !input.is_empty()
                && input
                    .split('.')
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
            if numeric {
                let padded = match input.split('.').count() {
                    1 => format!("{input}.0.0"),
                    2 => format!("{input}.0"),
                    _ => input.to_string(),
                };
                if let Ok(version) = parse_version(&padded) {
                    return Ok(version);
                }
            }
            Err(error)
        }
    }
}
