//! Three-component package version with an optional beta ordinal
//!
//! A `VersionSpec` doubles as a query: any of `major`, `minor` or `build` may
//! be the wildcard `x`, in which case the version is *dynamic* and can only be
//! resolved against concrete versions (see [`crate::version::resolver`]).
//!
//! Canonical form: `{major}.{minor}.{build}` with an optional `-beta.{n}`
//! suffix when the beta ordinal is positive.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::version::error::VersionParseError;

const WILDCARD: &str = "x";
const BETA_PREFIX: &str = "beta.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VersionSpec {
    major: Option<u32>,
    minor: Option<u32>,
    build: Option<u32>,
    beta: u32,
}

impl VersionSpec {
    /// Creates a concrete stable version
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major: Some(major),
            minor: Some(minor),
            build: Some(build),
            beta: 0,
        }
    }

    /// Creates a query; `None` components are wildcards
    pub const fn query(major: Option<u32>, minor: Option<u32>, build: Option<u32>) -> Self {
        Self {
            major,
            minor,
            build,
            beta: 0,
        }
    }

    /// `x.x.x`, matching the latest version of a package
    pub const fn latest() -> Self {
        Self::query(None, None, None)
    }

    pub const fn with_beta(mut self, beta: u32) -> Self {
        self.beta = beta;
        self
    }

    /// Parses a version or query, resetting to `0.0.0` on malformed input.
    pub fn parse(input: &str) -> Self {
        Self::try_parse(input).unwrap_or_else(|e| {
            debug!("Resetting malformed version {:?} to 0.0.0: {}", input, e);
            Self::default()
        })
    }

    /// Parses a stored package version: like [`parse`](Self::parse), but a
    /// wildcard also resets the result to `0.0.0`.
    pub fn parse_concrete(input: &str) -> Self {
        Self::try_parse_concrete(input).unwrap_or_else(|e| {
            debug!("Resetting malformed version {:?} to 0.0.0: {}", input, e);
            Self::default()
        })
    }

    pub fn try_parse(input: &str) -> Result<Self, VersionParseError> {
        let mut halves = input.split('-');
        let core = halves.next().unwrap_or_default();
        let suffix = halves.next();
        if halves.next().is_some() {
            return Err(VersionParseError::TooManySeparators(input.to_string()));
        }

        let components: Vec<&str> = core.split('.').collect();
        let [major, minor, build] = components.as_slice() else {
            return Err(VersionParseError::ComponentCount(components.len()));
        };

        let beta = match suffix {
            None => 0,
            Some(suffix) => {
                let ordinal = suffix
                    .strip_prefix(BETA_PREFIX)
                    .ok_or_else(|| VersionParseError::InvalidPrerelease(suffix.to_string()))?;
                parse_number(ordinal)?
            }
        };

        Ok(Self {
            major: parse_component(major)?,
            minor: parse_component(minor)?,
            build: parse_component(build)?,
            beta,
        })
    }

    pub fn try_parse_concrete(input: &str) -> Result<Self, VersionParseError> {
        let version = Self::try_parse(input)?;
        if version.is_dynamic() {
            return Err(VersionParseError::UnexpectedWildcard(input.to_string()));
        }
        Ok(version)
    }

    pub fn major(&self) -> Option<u32> {
        self.major
    }

    pub fn minor(&self) -> Option<u32> {
        self.minor
    }

    pub fn build(&self) -> Option<u32> {
        self.build
    }

    pub fn beta(&self) -> u32 {
        self.beta
    }

    pub fn is_beta(&self) -> bool {
        self.beta > 0
    }

    /// True if any of major, minor or build is a wildcard
    pub fn is_dynamic(&self) -> bool {
        self.major.is_none() || self.minor.is_none() || self.build.is_none()
    }

    /// Anything but the `0.0.0` reset value counts as valid
    pub fn is_valid(&self) -> bool {
        *self != Self::default()
    }

    fn key(&self) -> (Option<u32>, Option<u32>, Option<u32>, u32) {
        (self.major, self.minor, self.build, self.beta)
    }
}

fn parse_component(component: &str) -> Result<Option<u32>, VersionParseError> {
    if component == WILDCARD {
        return Ok(None);
    }
    parse_number(component).map(Some)
}

fn parse_number(text: &str) -> Result<u32, VersionParseError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionParseError::InvalidComponent(text.to_string()));
    }
    text.parse()
        .map_err(|_| VersionParseError::InvalidComponent(text.to_string()))
}

impl Ord for VersionSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        debug_assert!(
            !self.is_dynamic() && !other.is_dynamic(),
            "cannot order dynamic versions ({self} vs {other})"
        );
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for VersionSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let component = |c: Option<u32>| c.map_or_else(|| WILDCARD.to_string(), |n| n.to_string());
        write!(
            f,
            "{}.{}.{}",
            component(self.major),
            component(self.minor),
            component(self.build)
        )?;
        if self.beta > 0 {
            write!(f, "-{}{}", BETA_PREFIX, self.beta)?;
        }
        Ok(())
    }
}

impl Serialize for VersionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
