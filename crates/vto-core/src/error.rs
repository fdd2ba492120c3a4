use thiserror::Error;

/// Malformed or missing submission parameters. Rejected before a job exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("A model image is required")]
    MissingModelImage,

    #[error("At least one garment image is required")]
    NoGarments,

    #[error("Garment #{0} has an empty image reference")]
    EmptyGarmentImage(usize),

    #[error("Output count must be between 1 and {max}, got {requested}")]
    InvalidOutputCount { requested: u32, max: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Authentication,
    InvalidInput,
    ImageSize,
    Timeout,
    Service,
}

impl BackendErrorKind {
    /// Message shown to the person polling the job
    pub fn user_message(&self) -> &str {
        match self {
            Self::Authentication => "The AI service rejected our credentials",
            Self::InvalidInput => "The AI service rejected the request parameters",
            Self::ImageSize => "The image is too large or too small for the AI service",
            Self::Timeout => "The AI service did not respond in time",
            Self::Service => "The AI service failed to process the request",
        }
    }
}

/// Failure of the AI backend call. Fails the job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {}", .kind.user_message(), .detail)]
pub struct BackendInvocationError {
    pub kind: BackendErrorKind,
    pub detail: String,
}

impl BackendInvocationError {
    pub fn new(kind: BackendErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn authentication(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Authentication, detail)
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidInput, detail)
    }

    pub fn image_size(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::ImageSize, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, detail)
    }

    pub fn service(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Service, detail)
    }
}

/// Remote backend could not be configured. Only ever logged at startup.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("No remote backend credential configured")]
    MissingCredential,

    #[error("Remote backend credential is not usable")]
    InvalidCredential,

    #[error("Failed to build remote backend client: {0}")]
    Client(String),
}

/// Errors returned by the job tracker's public operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {0} belongs to another owner")]
    Forbidden(String),

    #[error("Job store error: {0}")]
    Store(String),
}
