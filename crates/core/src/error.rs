use thiserror::Error;

/// Why a single fetch failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("body is not a FHIR resource: {0}")]
    InvalidBody(String),
}

/// Network or HTTP failure reading one resource or one page
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to fetch {url}: {cause}")]
pub struct FetchError {
    pub url: String,
    pub cause: FetchFailure,
}

impl FetchError {
    pub fn new(url: impl Into<String>, cause: FetchFailure) -> Self {
        Self {
            url: url.into(),
            cause,
        }
    }

    /// HTTP status code, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self.cause {
            FetchFailure::Status(code) => Some(code),
            _ => None,
        }
    }

    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self.cause {
            FetchFailure::Timeout | FetchFailure::Transport(_) => true,
            FetchFailure::Status(code) => code >= 500 || code == 429,
            FetchFailure::InvalidBody(_) => false,
        }
    }
}

/// A body did not have the shape the caller needed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("missing resourceType")]
    MissingResourceType,

    #[error("expected resourceType '{expected}', got '{found}'")]
    UnexpectedResourceType { expected: String, found: String },

    #[error("invalid {resource_type}: {message}")]
    Invalid {
        resource_type: String,
        message: String,
    },
}

/// Reference string that cannot be turned into a `<ResourceType>/<id>` pair
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedReference {
    #[error("reference '{0}' has no '/' separator")]
    MissingSeparator(String),

    #[error("reference '{0}' has an empty segment")]
    EmptySegment(String),

    #[error("reference '{0}' points to a contained resource")]
    Contained(String),

    #[error("reference '{0}' is an absolute URL")]
    Absolute(String),

    #[error("reference '{0}' is not of the form <ResourceType>/<id>")]
    Unrecognized(String),
}

/// Errors surfaced by bundle processing and pagination
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}
