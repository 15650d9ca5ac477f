use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("Expected 3 version components, found {0}")]
    ComponentCount(usize),

    #[error("Too many '-' separators in version: {0}")]
    TooManySeparators(String),

    #[error("Unsupported prerelease suffix: {0}")]
    InvalidPrerelease(String),

    #[error("Invalid version component: {0}")]
    InvalidComponent(String),

    #[error("Wildcard not allowed in a concrete version: {0}")]
    UnexpectedWildcard(String),
}
