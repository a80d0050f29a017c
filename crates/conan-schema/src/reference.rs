//! Recipe references (`name/version@user/channel`) and binary references
//! (`reference:package_id`).
//!
//! A [`PackageReference`] is an immutable value. User and channel are either
//! both present or both absent; an absent pair is written as `_` in the
//! canonical form so that official (user-less) recipes compare and search
//! uniformly with namespaced ones.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Stand-in for an absent user or channel in canonical references.
pub const PLACEHOLDER: &str = "_";

/// Canonical form of the reserved "invalid reference" sentinel.
pub const INVALID_REFERENCE: &str = "Invalid/0.0.1@NA/NA";

/// Upper bound on the length of every reference field.
const MAX_FIELD_LEN: usize = 101;

/// Errors produced while parsing or constructing references.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The input was empty or only whitespace.
    #[error("Empty reference")]
    Empty,

    /// No `/version` part was found.
    #[error("Reference '{0}' is missing a version (expected name/version)")]
    MissingVersion(String),

    /// Only one of user and channel was given.
    #[error("Reference '{0}' must specify both user and channel")]
    IncompleteUserChannel(String),

    /// A field contains characters or a length Conan does not accept.
    #[error("Invalid {field} '{value}' in reference")]
    InvalidField {
        /// Which field failed (`name`, `version`, `user` or `channel`).
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A binary reference without the `:package_id` part.
    #[error("Binary reference '{0}' is missing a package id")]
    MissingPackageId(String),
}

/// A recipe reference: name, version and an optional user/channel pair.
///
/// Equality, hashing and ordering all follow the canonical string
/// ([`PackageReference::canonical`]).
///
/// ```
/// use conan_schema::PackageReference;
///
/// let r: PackageReference = "zlib/1.2.13".parse().unwrap();
/// assert_eq!(r.canonical(), "zlib/1.2.13@_/_");
/// assert_eq!(r.to_string(), "zlib/1.2.13");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageReference {
    name: String,
    version: String,
    user: Option<String>,
    channel: Option<String>,
}

impl PackageReference {
    /// Build a reference from its parts.
    ///
    /// A user or channel equal to `_` is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::IncompleteUserChannel`] if exactly one of
    /// user and channel is given, or [`ReferenceError::InvalidField`] if any
    /// field fails validation.
    pub fn new(
        name: &str,
        version: &str,
        user: Option<&str>,
        channel: Option<&str>,
    ) -> Result<Self, ReferenceError> {
        let user = user.filter(|u| !u.is_empty() && *u != PLACEHOLDER);
        let channel = channel.filter(|c| !c.is_empty() && *c != PLACEHOLDER);

        if user.is_some() != channel.is_some() {
            return Err(ReferenceError::IncompleteUserChannel(format!(
                "{name}/{version}@{}/{}",
                user.unwrap_or(PLACEHOLDER),
                channel.unwrap_or(PLACEHOLDER)
            )));
        }

        validate_field("name", name)?;
        validate_field("version", version)?;
        if let Some(u) = user {
            validate_field("user", u)?;
        }
        if let Some(c) = channel {
            validate_field("channel", c)?;
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            user: user.map(str::to_string),
            channel: channel.map(str::to_string),
        })
    }

    /// Parse a reference, accepting `name/version`, `name/version@user/channel`
    /// and `name/version@_/_`. A trailing `#revision` is dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`ReferenceError`] describing the first problem found.
    pub fn parse(text: &str) -> Result<Self, ReferenceError> {
        let text = text.trim();
        let text = text.split('#').next().unwrap_or_default();
        if text.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (name_version, user_channel) = match text.split_once('@') {
            Some((left, right)) => (left, Some(right)),
            None => (text, None),
        };

        let (name, version) = name_version
            .split_once('/')
            .ok_or_else(|| ReferenceError::MissingVersion(text.to_string()))?;

        match user_channel {
            None => Self::new(name, version, None, None),
            Some(uc) => {
                let (user, channel) = uc
                    .split_once('/')
                    .ok_or_else(|| ReferenceError::IncompleteUserChannel(text.to_string()))?;
                Self::new(name, version, Some(user), Some(channel))
            }
        }
    }

    /// Parse a reference, falling back to [`PackageReference::invalid`] on
    /// malformed input. Meant for half-typed UI input.
    pub fn parse_lenient(text: &str) -> Self {
        Self::parse(text).unwrap_or_else(|_| Self::invalid())
    }

    /// The reserved sentinel reference (`Invalid/0.0.1@NA/NA`).
    pub fn invalid() -> Self {
        Self {
            name: "Invalid".to_string(),
            version: "0.0.1".to_string(),
            user: Some("NA".to_string()),
            channel: Some("NA".to_string()),
        }
    }

    /// Whether this is the reserved sentinel.
    pub fn is_invalid(&self) -> bool {
        self.canonical() == INVALID_REFERENCE
    }

    /// Recipe name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recipe version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// User namespace, `None` for official recipes.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Channel, `None` for official recipes.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// User, or `_` when absent.
    pub fn user_or_placeholder(&self) -> &str {
        self.user().unwrap_or(PLACEHOLDER)
    }

    /// Channel, or `_` when absent.
    pub fn channel_or_placeholder(&self) -> &str {
        self.channel().unwrap_or(PLACEHOLDER)
    }

    /// `version/channel`, the key the info cache stores per user.
    pub fn version_channel(&self) -> String {
        format!("{}/{}", self.version, self.channel_or_placeholder())
    }

    /// Fully qualified form, `name/version@user/channel` with `_` for an
    /// absent pair.
    pub fn canonical(&self) -> String {
        format!(
            "{}/{}@{}/{}",
            self.name,
            self.version,
            self.user_or_placeholder(),
            self.channel_or_placeholder()
        )
    }
}

fn validate_field(field: &'static str, value: &str) -> Result<(), ReferenceError> {
    let invalid = || ReferenceError::InvalidField {
        field,
        value: value.to_string(),
    };

    if value.is_empty() || value.len() > MAX_FIELD_LEN {
        return Err(invalid());
    }
    let mut chars = value.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'));
    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(invalid())
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.user, &self.channel) {
            (Some(user), Some(channel)) => {
                write!(f, "{}/{}@{user}/{channel}", self.name, self.version)
            }
            _ => write!(f, "{}/{}", self.name, self.version),
        }
    }
}

impl FromStr for PackageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageReference {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PackageReference> for String {
    fn from(value: PackageReference) -> Self {
        value.canonical()
    }
}

impl PartialOrd for PackageReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

/// A specific binary of a recipe: `reference:package_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryReference {
    /// The recipe this binary was built from.
    pub reference: PackageReference,
    /// Opaque package id.
    pub package_id: String,
}

impl BinaryReference {
    /// Parse `reference:package_id`. A `#revision` on the id is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::MissingPackageId`] if there is no `:` part,
    /// or any error of [`PackageReference::parse`].
    pub fn parse(text: &str) -> Result<Self, ReferenceError> {
        let text = text.trim();
        let (reference, package_id) = text
            .rsplit_once(':')
            .ok_or_else(|| ReferenceError::MissingPackageId(text.to_string()))?;
        let package_id = package_id.split('#').next().unwrap_or_default();
        if package_id.is_empty() {
            return Err(ReferenceError::MissingPackageId(text.to_string()));
        }
        Ok(Self {
            reference: PackageReference::parse(reference)?,
            package_id: package_id.to_string(),
        })
    }
}

impl fmt::Display for BinaryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.reference, self.package_id)
    }
}

impl FromStr for BinaryReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
