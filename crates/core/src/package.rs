//! Package coordinates and package-URL parsing.
//!
//! A coordinate is the triple (ecosystem, name, version) identifying one
//! package release. Submissions arrive as package-URL strings
//! (`pkg:npm/left-pad@1.3.0`); anything malformed is rejected before a
//! task is ever created.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ZollError;

// ── Ecosystem ────────────────────────────────────────────────────────

/// Supported package ecosystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ecosystem {
    Npm,
    Pypi,
    CratesIo,
    Rubygems,
    Packagist,
    Golang,
}

impl Ecosystem {
    /// Canonical lowercase name, used in report paths and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pypi => "pypi",
            Self::CratesIo => "crates-io",
            Self::Rubygems => "rubygems",
            Self::Packagist => "packagist",
            Self::Golang => "golang",
        }
    }

    /// Resolve a purl type or a plain ecosystem name.
    ///
    /// Accepts both the purl-spec type ("cargo", "gem", "composer") and
    /// the names dashboards commonly use ("crates-io", "rubygems").
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "npm" => Some(Self::Npm),
            "pypi" => Some(Self::Pypi),
            "cargo" | "crates-io" | "crates.io" => Some(Self::CratesIo),
            "gem" | "rubygems" => Some(Self::Rubygems),
            "composer" | "packagist" => Some(Self::Packagist),
            "golang" | "go" => Some(Self::Golang),
            _ => None,
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Coordinate ───────────────────────────────────────────────────────

/// One package release: (ecosystem, name, version).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageCoordinate {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: String,
}

impl PackageCoordinate {
    /// Build a coordinate from already-split parts, applying the same
    /// validation as purl parsing.
    pub fn new(ecosystem: Ecosystem, name: &str, version: &str) -> Result<Self, ZollError> {
        validate_name(name)?;
        validate_version(version)?;
        Ok(Self {
            ecosystem,
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Parse and validate a package-URL string.
    ///
    /// Format: `pkg:<type>/<name>@<version>` where `<name>` may contain
    /// slashes (npm scopes, Go module paths). `%40` and `%2F` escapes
    /// are decoded. The version is mandatory — analysis always targets
    /// one exact release.
    pub fn parse_purl(raw: &str) -> Result<Self, ZollError> {
        let raw = raw.trim();
        let rest = raw
            .strip_prefix("pkg:")
            .ok_or_else(|| ZollError::Validation(format!("'{}' must start with 'pkg:'", raw)))?
            .trim_start_matches('/');

        let (eco_str, remainder) = rest.split_once('/').ok_or_else(|| {
            ZollError::Validation(format!("'{}' is missing the package name", raw))
        })?;

        let ecosystem = Ecosystem::parse(eco_str).ok_or_else(|| {
            ZollError::Validation(format!("unsupported ecosystem '{}'", eco_str))
        })?;

        let (name_part, version) = remainder.rsplit_once('@').ok_or_else(|| {
            ZollError::Validation(format!("'{}' is missing the '@version' suffix", raw))
        })?;

        let name = percent_decode(name_part);
        let version = percent_decode(version);

        validate_name(&name)?;
        validate_version(&version)?;

        Ok(Self {
            ecosystem,
            name,
            version,
        })
    }
}

impl fmt::Display for PackageCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.ecosystem, self.name, self.version)
    }
}

// ── Validation ───────────────────────────────────────────────────────

/// Decode the two escapes that show up in real purls (scoped npm names).
fn percent_decode(s: &str) -> String {
    s.replace("%40", "@").replace("%2F", "/").replace("%2f", "/")
}

/// Report locations are derived from the name, so it must be path-safe.
fn validate_name(name: &str) -> Result<(), ZollError> {
    if name.is_empty() {
        return Err(ZollError::Validation("empty package name".to_string()));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(ZollError::Validation(format!(
            "package name '{}' has a leading or trailing slash",
            name
        )));
    }
    for segment in name.split('/') {
        if segment.is_empty() {
            return Err(ZollError::Validation(format!(
                "package name '{}' has an empty path segment",
                name
            )));
        }
        if segment == "." || segment == ".." {
            return Err(ZollError::Validation(format!(
                "package name '{}' contains a path traversal segment",
                name
            )));
        }
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_' | '@' | '+' | '/' | '~'))
    {
        return Err(ZollError::Validation(format!(
            "package name '{}' contains invalid character '{}'",
            name, bad
        )));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<(), ZollError> {
    if version.is_empty() {
        return Err(ZollError::Validation("empty package version".to_string()));
    }
    if version.contains('/') || version.contains("..") || version.chars().any(char::is_whitespace) {
        return Err(ZollError::Validation(format!(
            "invalid package version '{}'",
            version
        )));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────
